//! Entity names - global, stable identity for every registered object
//!
//! Format: lowercase hyphenated UUID, e.g. `67e55044-10b1-426f-9247-bb680e5fe0c8`
//!
//! Names are generated once when an object is registered and never reused.
//! The nil UUID marks a name that has not been assigned yet (register
//! requests carry it).

use crate::kind::EntityKind;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;
use uuid::Uuid;

/// Surrogate row id. Never leaves the registry layer.
pub type ObjectId = i64;

/// Behaviour shared by all per-kind name types.
pub trait EntityName: Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static {
    const KIND: EntityKind;

    fn from_uuid(uuid: Uuid) -> Self;

    fn uuid(&self) -> Uuid;

    /// Fresh random name
    fn generate() -> Self {
        Self::from_uuid(Uuid::new_v4())
    }

    /// The "unset" name
    fn nil() -> Self {
        Self::from_uuid(Uuid::nil())
    }

    fn is_nil(&self) -> bool {
        self.uuid().is_nil()
    }

    /// Parse a name from its text form
    fn parse(text: &str) -> Result<Self> {
        Uuid::parse_str(text.trim())
            .map(Self::from_uuid)
            .map_err(|e| Error::InvalidName(format!("{} name {:?}: {}", Self::KIND, text, e)))
    }

    /// Text form stored in the `name` column
    fn to_name_string(&self) -> String {
        self.uuid().hyphenated().to_string()
    }
}

macro_rules! entity_name {
    ($(#[$meta:meta])* $name:ident => $kind:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl EntityName for $name {
            const KIND: EntityKind = $kind;

            fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            fn uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0.hyphenated())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                <Self as EntityName>::parse(s)
            }
        }
    };
}

entity_name!(
    /// Name of a channel
    Channel => EntityKind::Channel
);
entity_name!(
    /// Name of a device
    Device => EntityKind::Device
);
entity_name!(
    /// Name of a protocol; fixed by the protocol provider
    Protocol => EntityKind::Protocol
);
entity_name!(Radar => EntityKind::Radar);
entity_name!(Firmware => EntityKind::Firmware);
entity_name!(DeviceUi => EntityKind::DeviceUi);
entity_name!(
    /// Name of a telemetry session; also embedded in its folder name
    TmSession => EntityKind::TmSession
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_name_parse_display() {
        let name = Channel::parse("67E55044-10B1-426F-9247-BB680E5FE0C8").unwrap();
        assert_eq!(name.to_string(), "67e55044-10b1-426f-9247-bb680e5fe0c8");
        assert_eq!(name.to_name_string(), name.to_string());
        assert_eq!("67e55044-10b1-426f-9247-bb680e5fe0c8".parse::<Channel>().unwrap(), name);
    }

    #[test]
    fn test_invalid_name() {
        let err = Device::parse("not-a-uuid").unwrap_err();
        assert!(err.to_string().contains("device name"));
    }

    #[test]
    fn test_generated_names_are_unique() {
        let names: HashSet<Device> = (0..1000).map(|_| Device::generate()).collect();
        assert_eq!(names.len(), 1000);
        assert!(names.iter().all(|n| !n.is_nil()));
        assert!(Device::nil().is_nil());
    }
}
