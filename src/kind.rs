//! Entity kinds - the seven kinds of object the registry stores
//!
//! Every kind maps to exactly one table; the table name is the kind's
//! string form.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Transport link (serial/TCP/UDP) bound to one protocol
    Channel,
    /// Vehicle or station reachable through channels
    Device,
    /// Wire protocol, registered at bootstrap from the protocol provider
    Protocol,
    Radar,
    /// Firmware image, deduplicated by protocol and local value
    Firmware,
    /// Device UI bundle, deduplicated like firmware
    DeviceUi,
    /// Telemetry recording session backed by a folder on disk
    TmSession,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Channel => "channel",
            EntityKind::Device => "device",
            EntityKind::Protocol => "protocol",
            EntityKind::Radar => "radar",
            EntityKind::Firmware => "firmware",
            EntityKind::DeviceUi => "device_ui",
            EntityKind::TmSession => "tm_session",
        }
    }

    /// Name of the table holding rows of this kind
    pub fn table(&self) -> &'static str {
        self.as_str()
    }

    pub fn all() -> &'static [EntityKind] {
        &[
            EntityKind::Protocol,
            EntityKind::Radar,
            EntityKind::Channel,
            EntityKind::Firmware,
            EntityKind::DeviceUi,
            EntityKind::Device,
            EntityKind::TmSession,
        ]
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "channel" | "channels" | "ch" => Ok(EntityKind::Channel),
            "device" | "devices" | "dev" => Ok(EntityKind::Device),
            "protocol" | "protocols" => Ok(EntityKind::Protocol),
            "radar" | "radars" => Ok(EntityKind::Radar),
            "firmware" | "firmwares" | "fw" => Ok(EntityKind::Firmware),
            "device_ui" | "deviceui" | "ui" => Ok(EntityKind::DeviceUi),
            "tm_session" | "session" | "sessions" | "tm" => Ok(EntityKind::TmSession),
            _ => Err(Error::InvalidName(format!("Unknown entity kind: {}", s))),
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_aliases() {
        assert_eq!("ui".parse::<EntityKind>().unwrap(), EntityKind::DeviceUi);
        assert_eq!("Device-UI".parse::<EntityKind>().unwrap(), EntityKind::DeviceUi);
        assert_eq!("session".parse::<EntityKind>().unwrap(), EntityKind::TmSession);
        assert!("antenna".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_table_names_are_distinct() {
        let mut tables: Vec<_> = EntityKind::all().iter().map(|k| k.table()).collect();
        tables.sort();
        tables.dedup();
        assert_eq!(tables.len(), EntityKind::all().len());
    }
}
