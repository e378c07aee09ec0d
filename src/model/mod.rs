//! Descriptions - immutable values describing registered objects
//!
//! A description is created once per read or write and shared as
//! `Arc<XDescription>`. Updating an object produces a new description;
//! callers never mutate one in place.

pub mod channel;
pub mod device;
pub mod device_ui;
pub mod firmware;
pub mod protocol;
pub mod radar;
pub mod tm_session;

pub use channel::ChannelDescription;
pub use device::{DeviceDescription, DeviceField, DeviceUpdate};
pub use device_ui::DeviceUiDescription;
pub use firmware::FirmwareDescription;
pub use protocol::ProtocolDescription;
pub use radar::RadarDescription;
pub use tm_session::{FolderName, TmSessionDescription};

use crate::name::{Device, Protocol};
use serde::Serialize;
use std::fmt;

/// Address of a device within its protocol: the device name plus the
/// protocol-scoped numeric id the vehicle answers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ProtocolId {
    pub device: Device,
    pub protocol: Protocol,
    pub id: i64,
}

impl ProtocolId {
    pub fn new(device: Device, protocol: Protocol, id: i64) -> Self {
        Self { device, protocol, id }
    }
}

/// Protocol-scoped local key of a firmware image or device UI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ProtocolValue {
    pub protocol: Protocol,
    pub value: String,
}

impl ProtocolValue {
    pub fn new(protocol: Protocol, value: impl Into<String>) -> Self {
        Self { protocol, value: value.into() }
    }
}

impl fmt::Display for ProtocolValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.protocol, self.value)
    }
}
