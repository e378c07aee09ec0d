use super::ProtocolId;
use crate::name::{Channel, Device, DeviceUi, EntityName, Firmware};
use serde::Serialize;
use std::fmt;

/// A vehicle or station reachable through one or more channels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceDescription {
    pub name: Device,
    pub info: String,
    pub settings: String,
    pub protocol_id: ProtocolId,
    pub ui: Option<DeviceUi>,
    #[serde(skip)]
    pub pixmap: Vec<u8>,
    pub firmware: Option<Firmware>,
    pub register_first: bool,
    pub show_on_map: bool,
    pub log: bool,
    /// Filled from the join table on read; ignored on write
    pub channels: Vec<Channel>,
}

impl DeviceDescription {
    /// An unregistered device answering to `id` within `protocol_id.protocol`
    pub fn new(protocol_id: ProtocolId) -> Self {
        Self {
            name: Device::nil(),
            info: String::new(),
            settings: String::new(),
            protocol_id,
            ui: None,
            pixmap: Vec::new(),
            firmware: None,
            register_first: false,
            show_on_map: true,
            log: false,
            channels: Vec::new(),
        }
    }

    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = info.into();
        self
    }
}

/// One independently updatable aspect of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DeviceField {
    Firmware,
    Ui,
    Pixmap,
    Settings,
    Info,
    RegisterFirst,
    ShowOnMap,
    Log,
}

impl DeviceField {
    pub fn all() -> &'static [DeviceField] {
        &[
            DeviceField::Firmware,
            DeviceField::Ui,
            DeviceField::Pixmap,
            DeviceField::Settings,
            DeviceField::Info,
            DeviceField::RegisterFirst,
            DeviceField::ShowOnMap,
            DeviceField::Log,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceField::Firmware => "firmware",
            DeviceField::Ui => "ui",
            DeviceField::Pixmap => "pixmap",
            DeviceField::Settings => "settings",
            DeviceField::Info => "info",
            DeviceField::RegisterFirst => "register_first",
            DeviceField::ShowOnMap => "show_on_map",
            DeviceField::Log => "log",
        }
    }
}

impl fmt::Display for DeviceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Partial update: only `fields` are taken from `description`.
#[derive(Debug, Clone)]
pub struct DeviceUpdate {
    pub description: DeviceDescription,
    pub fields: Vec<DeviceField>,
}

impl DeviceUpdate {
    pub fn new(description: DeviceDescription, fields: impl IntoIterator<Item = DeviceField>) -> Self {
        Self {
            description,
            fields: fields.into_iter().collect(),
        }
    }

    /// Update every aspect
    pub fn all(description: DeviceDescription) -> Self {
        Self::new(description, DeviceField::all().iter().copied())
    }
}
