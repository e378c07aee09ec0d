use crate::name::Protocol;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A wire protocol known to the station.
///
/// `required_properties` and `optional_properties` are not persisted; they
/// come from the protocol provider and are merged in when a row is decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolDescription {
    pub name: Protocol,
    #[serde(default)]
    pub shareable: bool,
    #[serde(default)]
    pub logging: bool,
    #[serde(default = "default_timeout", with = "millis")]
    pub timeout: Duration,
    #[serde(default)]
    pub info: String,
    #[serde(default)]
    pub param_info: String,
    #[serde(skip)]
    pub pixmap: Vec<u8>,
    #[serde(default)]
    pub required_properties: Vec<String>,
    #[serde(default)]
    pub optional_properties: Vec<String>,
}

fn default_timeout() -> Duration {
    Duration::from_millis(1000)
}

impl ProtocolDescription {
    pub fn new(name: Protocol, info: impl Into<String>) -> Self {
        Self {
            name,
            shareable: false,
            logging: false,
            timeout: default_timeout(),
            info: info.into(),
            param_info: String::new(),
            pixmap: Vec::new(),
            required_properties: Vec::new(),
            optional_properties: Vec::new(),
        }
    }

    pub fn shareable(mut self, shareable: bool) -> Self {
        self.shareable = shareable;
        self
    }
}

/// Timeouts are written as integer milliseconds in config files.
mod millis {
    use serde::ser::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).map_err(|_| S::Error::custom("timeout out of range"))?;
        s.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
