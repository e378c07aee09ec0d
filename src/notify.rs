//! Change notifications
//!
//! Every successful write publishes one or more [`Notification`]s on a
//! broadcast channel. Subscribers that lag behind lose the oldest messages;
//! publishing never blocks and never fails the write.

use crate::kind::EntityKind;
use crate::model::{
    ChannelDescription, DeviceDescription, DeviceUiDescription, FirmwareDescription, ProtocolDescription,
    RadarDescription, TmSessionDescription,
};
use crate::name::{Channel, Device, EntityName};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

pub const NOTIFICATION_CHANNEL_SIZE: usize = 256;

/// A refreshed description of any kind
#[derive(Debug, Clone)]
pub enum AnyDescription {
    Channel(Arc<ChannelDescription>),
    Device(Arc<DeviceDescription>),
    Protocol(Arc<ProtocolDescription>),
    Radar(Arc<RadarDescription>),
    Firmware(Arc<FirmwareDescription>),
    DeviceUi(Arc<DeviceUiDescription>),
    TmSession(Arc<TmSessionDescription>),
}

impl AnyDescription {
    pub fn kind(&self) -> EntityKind {
        match self {
            AnyDescription::Channel(_) => EntityKind::Channel,
            AnyDescription::Device(_) => EntityKind::Device,
            AnyDescription::Protocol(_) => EntityKind::Protocol,
            AnyDescription::Radar(_) => EntityKind::Radar,
            AnyDescription::Firmware(_) => EntityKind::Firmware,
            AnyDescription::DeviceUi(_) => EntityKind::DeviceUi,
            AnyDescription::TmSession(_) => EntityKind::TmSession,
        }
    }

    pub fn name(&self) -> Uuid {
        match self {
            AnyDescription::Channel(d) => d.name.uuid(),
            AnyDescription::Device(d) => d.name.uuid(),
            AnyDescription::Protocol(d) => d.name.uuid(),
            AnyDescription::Radar(d) => d.name.uuid(),
            AnyDescription::Firmware(d) => d.name.uuid(),
            AnyDescription::DeviceUi(d) => d.name.uuid(),
            AnyDescription::TmSession(d) => d.name.uuid(),
        }
    }

    /// Human-readable label; the local value for firmware and UI bundles
    pub fn info(&self) -> &str {
        match self {
            AnyDescription::Channel(d) => &d.info,
            AnyDescription::Device(d) => &d.info,
            AnyDescription::Protocol(d) => &d.info,
            AnyDescription::Radar(d) => &d.info,
            AnyDescription::Firmware(d) => &d.id.value,
            AnyDescription::DeviceUi(d) => &d.id.value,
            AnyDescription::TmSession(d) => &d.info,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        match self {
            AnyDescription::Channel(d) => serde_json::to_string_pretty(d.as_ref()),
            AnyDescription::Device(d) => serde_json::to_string_pretty(d.as_ref()),
            AnyDescription::Protocol(d) => serde_json::to_string_pretty(d.as_ref()),
            AnyDescription::Radar(d) => serde_json::to_string_pretty(d.as_ref()),
            AnyDescription::Firmware(d) => serde_json::to_string_pretty(d.as_ref()),
            AnyDescription::DeviceUi(d) => serde_json::to_string_pretty(d.as_ref()),
            AnyDescription::TmSession(d) => serde_json::to_string_pretty(d.as_ref()),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Notification {
    /// An object appeared (`true`) or was removed (`false`)
    Registered {
        kind: EntityKind,
        name: Uuid,
        registered: bool,
    },
    /// An object changed; carries the fresh description
    Updated(AnyDescription),
    /// A device was joined to (`true`) or detached from (`false`) a channel
    Connected {
        connected: bool,
        device: Device,
        channel: Channel,
    },
    /// A new telemetry session folder is ready for recording
    RecordingFolder(PathBuf),
}

/// Publishing side of the notification channel
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn publish(&self, notification: Notification) {
        tracing::trace!(?notification, "publish");
        // No subscribers is not an error
        let _ = self.tx.send(notification);
    }

    pub fn registered(&self, kind: EntityKind, name: Uuid, registered: bool) {
        self.publish(Notification::Registered { kind, name, registered });
    }

    pub fn updated(&self, description: AnyDescription) {
        self.publish(Notification::Updated(description));
    }

    pub fn connected(&self, connected: bool, device: Device, channel: Channel) {
        self.publish(Notification::Connected { connected, device, channel });
    }

    pub fn recording_folder(&self, folder: PathBuf) {
        self.publish(Notification::RecordingFolder(folder));
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(NOTIFICATION_CHANNEL_SIZE)
    }
}

/// Drain everything currently queued on a receiver (test helper)
#[cfg(test)]
pub(crate) fn drain(rx: &mut broadcast::Receiver<Notification>) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(n) = rx.try_recv() {
        out.push(n);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FirmwareDescription, ProtocolValue, RadarDescription};
    use crate::name::{Protocol, Radar};

    #[test]
    fn test_publish_without_subscribers() {
        let notifier = Notifier::new(1);
        notifier.recording_folder(PathBuf::from("/tmp/session"));
        let mut rx = notifier.subscribe();
        notifier.registered(EntityKind::Radar, Uuid::nil(), true);
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn test_description_accessors() {
        let mut radar = RadarDescription::new("north", "10.0.0.1");
        radar.name = Radar::generate();
        let any = AnyDescription::Radar(Arc::new(radar.clone()));
        assert_eq!(any.kind(), EntityKind::Radar);
        assert_eq!(any.name(), radar.name.uuid());
        assert_eq!(any.info(), "north");
        assert!(any.to_json().unwrap().contains("\"settings\": \"10.0.0.1\""));

        let image = FirmwareDescription::new(ProtocolValue::new(Protocol::generate(), "4.1.0"), vec![1u8]);
        let any = AnyDescription::Firmware(Arc::new(image));
        assert_eq!(any.info(), "4.1.0");
        assert!(!any.to_json().unwrap().contains("payload"));
    }
}
