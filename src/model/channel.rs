use super::ProtocolId;
use crate::name::{Channel, EntityName, Protocol, Radar};
use serde::Serialize;
use std::time::Duration;

/// A transport link bound to one protocol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelDescription {
    pub name: Channel,
    pub protocol: Protocol,
    pub info: String,
    /// Transport parameters in text form, e.g. `udp://0.0.0.0:14550`
    pub settings: String,
    pub log: bool,
    pub timeout: Duration,
    pub dynamic_timeout: bool,
    pub read_only: bool,
    /// Whole seconds; `None` disables reconnecting
    pub reconnect: Option<Duration>,
    pub radar: Option<Radar>,
    /// Filled from the join table on read; ignored on write
    pub connected_devices: Vec<ProtocolId>,
}

impl ChannelDescription {
    /// An unregistered channel with default link settings
    pub fn new(protocol: Protocol, settings: impl Into<String>) -> Self {
        Self {
            name: Channel::nil(),
            protocol,
            info: String::new(),
            settings: settings.into(),
            log: false,
            timeout: Duration::from_millis(1000),
            dynamic_timeout: false,
            read_only: false,
            reconnect: None,
            radar: None,
            connected_devices: Vec::new(),
        }
    }

    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = info.into();
        self
    }

    pub fn with_radar(mut self, radar: Radar) -> Self {
        self.radar = Some(radar);
        self
    }

    pub fn is_connected(&self, device: &crate::name::Device) -> bool {
        self.connected_devices.iter().any(|p| &p.device == device)
    }
}
