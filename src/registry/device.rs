//! Device registry
//!
//! Devices reference a protocol (required), a firmware image and a UI
//! bundle (both optional), and are joined to channels through
//! `device_channel`. Joining enforces:
//! - device and channel speak the same protocol
//! - a channel whose protocol is not shareable carries at most one device

use super::cached::{CachedRegistry, EntityCodec, row_info, row_name};
use super::channel::ChannelRegistry;
use super::protocol::ProtocolRegistry;
use super::{Ctx, column, foreign_name, optional_foreign_name, optional_id, require_id};
use crate::model::{DeviceDescription, DeviceField, DeviceUpdate, ProtocolId};
use crate::name::{Channel, Device, DeviceUi, EntityName, Firmware, ObjectId, Protocol};
use crate::notify::AnyDescription;
use crate::storage::{RelationalStore, commit};
use crate::{Error, Result};
use rusqlite::types::Value;
use rusqlite::{Row, named_params};
use std::sync::Arc;

pub type DeviceRegistry = CachedRegistry<DeviceCodec>;

const SELECT_DEVICE_CHANNELS: &str = r#"
SELECT channel.name
FROM device_channel JOIN channel ON channel.id = device_channel.channel_id
WHERE device_channel.device_id = :device_id
ORDER BY channel.id
"#;

const JOIN_DEVICE_CHANNEL: &str =
    "INSERT OR IGNORE INTO device_channel (device_id, channel_id) VALUES (:device_id, :channel_id)";

const DETACH_DEVICE_CHANNEL: &str =
    "DELETE FROM device_channel WHERE device_id = :device_id AND channel_id = :channel_id";

const DELETE_DEVICE_CHANNELS: &str = "DELETE FROM device_channel WHERE device_id = :device_id";

#[derive(Debug, Default)]
pub struct DeviceCodec;

impl EntityCodec for DeviceCodec {
    type Name = Device;
    type Description = DeviceDescription;

    const COLUMNS: &'static [&'static str] = &[
        "settings",
        "protocol_id",
        "protocol_value",
        "reg_first",
        "show_on_map",
        "device_pixmap",
        "log",
        "device_ui_id",
        "firmware_id",
    ];

    fn decode(&self, store: &RelationalStore, row: &Row<'_>) -> Result<DeviceDescription> {
        let id: ObjectId = column(row, "id")?;
        let name: Device = row_name(row)?;
        let protocol: Protocol = foreign_name(store, row, "protocol_id")?;
        let pixmap: Option<Vec<u8>> = column(row, "device_pixmap")?;

        Ok(DeviceDescription {
            name,
            info: row_info(row)?,
            settings: column(row, "settings")?,
            protocol_id: ProtocolId::new(name, protocol, column(row, "protocol_value")?),
            ui: optional_foreign_name::<DeviceUi>(store, row, "device_ui_id")?,
            pixmap: pixmap.unwrap_or_default(),
            firmware: optional_foreign_name::<Firmware>(store, row, "firmware_id")?,
            register_first: column(row, "reg_first")?,
            show_on_map: column(row, "show_on_map")?,
            log: column(row, "log")?,
            channels: device_channels(store, id)?,
        })
    }

    fn encode(&self, store: &RelationalStore, d: &DeviceDescription) -> Result<Vec<(&'static str, Value)>> {
        let protocol_id = require_id(store, &d.protocol_id.protocol, Error::ProtocolUnknown)?;
        let ui_id = optional_id(store, d.ui.as_ref(), Error::DeviceUiUnknown)?;
        let firmware_id = optional_id(store, d.firmware.as_ref(), Error::FirmwareUnknown)?;

        Ok(vec![
            ("settings", Value::from(d.settings.clone())),
            ("protocol_id", Value::from(protocol_id)),
            ("protocol_value", Value::from(d.protocol_id.id)),
            ("reg_first", Value::from(d.register_first)),
            ("show_on_map", Value::from(d.show_on_map)),
            ("device_pixmap", pixmap_value(&d.pixmap)),
            ("log", Value::from(d.log)),
            ("device_ui_id", Value::from(ui_id)),
            ("firmware_id", Value::from(firmware_id)),
        ])
    }

    fn name_of(d: &DeviceDescription) -> Device {
        d.name
    }

    fn info_of(d: &DeviceDescription) -> &str {
        &d.info
    }

    fn describe(d: Arc<DeviceDescription>) -> AnyDescription {
        AnyDescription::Device(d)
    }
}

fn pixmap_value(pixmap: &[u8]) -> Value {
    if pixmap.is_empty() {
        Value::Null
    } else {
        Value::Blob(pixmap.to_vec())
    }
}

/// Channels a device is joined to
pub(crate) fn device_channels(store: &RelationalStore, device_id: ObjectId) -> Result<Vec<Channel>> {
    let names: Vec<String> = store.query_rows(
        SELECT_DEVICE_CHANNELS,
        named_params! { ":device_id": device_id },
        |row| row.get(0),
    )?;
    names
        .iter()
        .map(|n| Channel::parse(n).map_err(|e| Error::InconsistentData(e.to_string())))
        .collect()
}

impl CachedRegistry<DeviceCodec> {
    pub fn with_defaults() -> Self {
        Self::new(DeviceCodec)
    }

    /// Apply the requested aspects of `update` in one transaction.
    ///
    /// Unchanged aspects are skipped; nothing is written or announced when
    /// no aspect changed. Errors name the failing aspect.
    pub fn update(&mut self, ctx: &Ctx<'_>, update: &DeviceUpdate) -> Result<Arc<DeviceDescription>> {
        let new = &update.description;
        let (id, old) = self.get_one(ctx.store, &new.name, true).map_err(|e| match e {
            Error::NotFound => Error::DeviceUnknown,
            other => other,
        })?;

        let tx = ctx.store.transaction().map_err(|e| Error::CantUpdate(e.to_string()))?;
        let mut changed = false;
        let mut seen = Vec::with_capacity(update.fields.len());
        for field in &update.fields {
            if seen.contains(field) {
                continue;
            }
            seen.push(*field);
            changed |= self
                .update_field(ctx.store, id, &old, new, *field)
                .map_err(|e| Error::CantUpdate(format!("{}: {}", field, e)))?;
        }

        if !changed {
            return Ok(old);
        }
        commit(tx).map_err(|e| Error::CantUpdate(e.to_string()))?;
        self.updated(ctx, &new.name)
    }

    fn update_field(
        &self,
        store: &RelationalStore,
        id: ObjectId,
        old: &DeviceDescription,
        new: &DeviceDescription,
        field: DeviceField,
    ) -> Result<bool> {
        let (column_name, value) = match field {
            DeviceField::Firmware => {
                if old.firmware == new.firmware {
                    return Ok(false);
                }
                let firmware_id = optional_id(store, new.firmware.as_ref(), Error::FirmwareUnknown)?;
                ("firmware_id", Value::from(firmware_id))
            }
            DeviceField::Ui => {
                if old.ui == new.ui {
                    return Ok(false);
                }
                let ui_id = optional_id(store, new.ui.as_ref(), Error::DeviceUiUnknown)?;
                ("device_ui_id", Value::from(ui_id))
            }
            DeviceField::Pixmap => {
                if old.pixmap == new.pixmap {
                    return Ok(false);
                }
                ("device_pixmap", pixmap_value(&new.pixmap))
            }
            DeviceField::Settings => {
                if old.settings == new.settings {
                    return Ok(false);
                }
                ("settings", Value::from(new.settings.clone()))
            }
            DeviceField::Info => {
                if old.info == new.info {
                    return Ok(false);
                }
                ("info", Value::from(new.info.clone()))
            }
            DeviceField::RegisterFirst => {
                if old.register_first == new.register_first {
                    return Ok(false);
                }
                ("reg_first", Value::from(new.register_first))
            }
            DeviceField::ShowOnMap => {
                if old.show_on_map == new.show_on_map {
                    return Ok(false);
                }
                ("show_on_map", Value::from(new.show_on_map))
            }
            DeviceField::Log => {
                if old.log == new.log {
                    return Ok(false);
                }
                ("log", Value::from(new.log))
            }
        };

        let sql = format!("UPDATE device SET {} = :value WHERE id = :device_id", column_name);
        store.execute(&sql, named_params! { ":value": value, ":device_id": id })?;
        Ok(true)
    }

    /// Delete a device with its channel joins and refresh those channels
    pub fn unregister(&mut self, ctx: &Ctx<'_>, channels: &mut ChannelRegistry, name: &Device) -> Result<()> {
        let device_id = self.get_id(ctx.store, name)?.ok_or(Error::DeviceUnknown)?;
        let joined = device_channels(ctx.store, device_id)?;

        let tx = ctx.store.transaction().map_err(|e| Error::CantUnRegister(e.to_string()))?;
        ctx.store
            .execute(DELETE_DEVICE_CHANNELS, named_params! { ":device_id": device_id })
            .map_err(|e| Error::CantUnRegister(e.to_string()))?;
        self.remove_one(ctx.store, name)?;
        commit(tx).map_err(|e| Error::CantUnRegister(e.to_string()))?;

        for channel in joined {
            if let Err(e) = channels.updated(ctx, &channel) {
                tracing::warn!("channel {} not refreshed after device {} removal: {}", channel, name, e);
            }
        }

        self.registered(ctx, name, false);
        Ok(())
    }

    /// Join or detach, then announce and refresh both sides
    pub fn connect(
        &mut self,
        ctx: &Ctx<'_>,
        channels: &mut ChannelRegistry,
        protocols: &mut ProtocolRegistry,
        device: &Device,
        channel: &Channel,
        connect: bool,
    ) -> Result<()> {
        if connect {
            self.link(ctx.store, channels, protocols, device, channel)?;
        } else {
            self.unlink(ctx.store, channels, device, channel)?;
        }

        ctx.notifier.connected(connect, *device, *channel);
        channels.updated(ctx, channel)?;
        self.updated(ctx, device)?;
        Ok(())
    }

    /// Insert the join row after checking protocol compatibility; no notifications
    pub(crate) fn link(
        &mut self,
        store: &RelationalStore,
        channels: &mut ChannelRegistry,
        protocols: &mut ProtocolRegistry,
        device: &Device,
        channel: &Channel,
    ) -> Result<()> {
        let (device_id, device_description) = self.get_one(store, device, false).map_err(|e| match e {
            Error::NotFound => Error::DeviceUnknown,
            other => other,
        })?;
        let (channel_id, channel_description) = channels.get_one(store, channel, true).map_err(|e| match e {
            Error::NotFound => Error::ChannelUnknown,
            other => other,
        })?;
        let (_, protocol) = protocols
            .get_one(store, &channel_description.protocol, false)
            .map_err(|e| match e {
                Error::NotFound => Error::ProtocolUnknown,
                other => other,
            })?;

        if device_description.protocol_id.protocol != channel_description.protocol {
            return Err(Error::ProtocolsShouldBeSame);
        }
        // The device itself doesn't count: joining an existing pair again is a no-op
        let others = channel_description
            .connected_devices
            .iter()
            .any(|p| &p.device != device);
        if !protocol.shareable && others {
            return Err(Error::ChannelCantShare);
        }

        store
            .execute(
                JOIN_DEVICE_CHANNEL,
                named_params! { ":device_id": device_id, ":channel_id": channel_id },
            )
            .map_err(|e| Error::CantJoin(e.to_string()))?;
        tracing::debug!("joined device {} to channel {}", device, channel);
        Ok(())
    }

    fn unlink(&mut self, store: &RelationalStore, channels: &ChannelRegistry, device: &Device, channel: &Channel) -> Result<()> {
        let device_id = self.get_id(store, device)?.ok_or(Error::DeviceUnknown)?;
        let channel_id = channels.get_id(store, channel)?.ok_or(Error::ChannelUnknown)?;
        store
            .execute(
                DETACH_DEVICE_CHANNEL,
                named_params! { ":device_id": device_id, ":channel_id": channel_id },
            )
            .map_err(|e| Error::CantJoin(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChannelDescription, FirmwareDescription, ProtocolValue};
    use crate::notify::{Notification, drain};
    use crate::registry::testing;
    use crate::request::Request;

    fn device_request(protocol: Protocol, id: i64) -> DeviceDescription {
        DeviceDescription::new(ProtocolId::new(Device::nil(), protocol, id))
    }

    #[test]
    fn test_register_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut hub = testing::hub(dir.path());
        let (ctx, regs) = hub.split();
        let protocol = testing::shareable_protocol().name;

        let mut request = device_request(protocol, 7).with_info("copter");
        request.settings = "sysid=7".to_string();
        request.pixmap = vec![1, 2, 3];
        request.register_first = true;
        request.log = true;

        let stored = regs.device.register(&ctx, &request).unwrap();
        let expected = DeviceDescription {
            name: stored.name,
            protocol_id: ProtocolId::new(stored.name, protocol, 7),
            ..request
        };
        assert_eq!(*stored, expected);
    }

    #[test]
    fn test_register_unknown_firmware() {
        let dir = tempfile::tempdir().unwrap();
        let mut hub = testing::hub(dir.path());
        let (ctx, regs) = hub.split();

        let mut request = device_request(testing::shareable_protocol().name, 1);
        request.firmware = Some(Firmware::generate());
        let err = regs.device.register(&ctx, &request).unwrap_err();
        assert!(matches!(err, Error::FirmwareUnknown));
        assert_eq!(ctx.store.count("device").unwrap(), 0);
    }

    #[test]
    fn test_update_selected_fields_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut hub = testing::hub(dir.path());
        let mut rx = hub.subscribe();
        let (ctx, regs) = hub.split();
        let protocol = testing::shareable_protocol().name;

        let firmware = regs
            .firmware
            .register(&ctx, &FirmwareDescription::new(ProtocolValue::new(protocol, "1.0"), vec![9u8; 16]))
            .unwrap();
        let stored = regs.device.register(&ctx, &device_request(protocol, 3).with_info("before")).unwrap();
        drain(&mut rx);

        let mut wanted = (*stored).clone();
        wanted.info = "after".to_string();
        wanted.firmware = Some(firmware.name);
        wanted.settings = "ignored".to_string();
        let updated = regs
            .device
            .update(&ctx, &DeviceUpdate::new(wanted, [DeviceField::Info, DeviceField::Firmware]))
            .unwrap();

        assert_eq!(updated.info, "after");
        assert_eq!(updated.firmware, Some(firmware.name));
        assert_eq!(updated.settings, "");
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn test_update_without_changes_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let mut hub = testing::hub(dir.path());
        let mut rx = hub.subscribe();
        let (ctx, regs) = hub.split();

        let stored = regs.device.register(&ctx, &device_request(testing::shareable_protocol().name, 3)).unwrap();
        drain(&mut rx);

        let same = regs.device.update(&ctx, &DeviceUpdate::all((*stored).clone())).unwrap();
        assert_eq!(same, stored);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_update_reports_failing_aspect_and_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut hub = testing::hub(dir.path());
        let (ctx, regs) = hub.split();

        let stored = regs.device.register(&ctx, &device_request(testing::shareable_protocol().name, 3)).unwrap();
        let mut wanted = (*stored).clone();
        wanted.info = "changed".to_string();
        wanted.ui = Some(DeviceUi::generate());

        let err = regs
            .device
            .update(&ctx, &DeviceUpdate::new(wanted, [DeviceField::Info, DeviceField::Ui]))
            .unwrap_err();
        assert!(matches!(&err, Error::CantUpdate(msg) if msg.starts_with("ui:")));

        let (_, reread) = regs.device.get_one(ctx.store, &stored.name, true).unwrap();
        assert_eq!(reread.info, "");
    }

    #[test]
    fn test_connect_rules() {
        let dir = tempfile::tempdir().unwrap();
        let mut hub = testing::hub(dir.path());
        let shared = testing::shareable_protocol().name;
        let exclusive = testing::exclusive_protocol().name;

        let (shared_channel, exclusive_channel, a, b, c) = {
            let (ctx, regs) = hub.split();
            let shared_channel = regs.channel.register(&ctx, &ChannelDescription::new(shared, "udp://:1")).unwrap();
            let exclusive_channel = regs.channel.register(&ctx, &ChannelDescription::new(exclusive, "udp://:2")).unwrap();
            let a = regs.device.register(&ctx, &device_request(exclusive, 1)).unwrap();
            let b = regs.device.register(&ctx, &device_request(exclusive, 2)).unwrap();
            let c = regs.device.register(&ctx, &device_request(shared, 3)).unwrap();
            (shared_channel.name, exclusive_channel.name, a.name, b.name, c.name)
        };

        let connect = |device, channel| Request::DeviceConnect { device, channel, connect: true };

        let err = hub.handle(connect(a, shared_channel)).unwrap_err();
        assert!(matches!(err, Error::ProtocolsShouldBeSame));

        hub.handle(connect(a, exclusive_channel)).unwrap();
        // Re-joining the same device is idempotent
        hub.handle(connect(a, exclusive_channel)).unwrap();

        let err = hub.handle(connect(b, exclusive_channel)).unwrap_err();
        assert!(matches!(err, Error::ChannelCantShare));

        let err = hub.handle(connect(Device::generate(), shared_channel)).unwrap_err();
        assert!(matches!(err, Error::DeviceUnknown));
        let err = hub.handle(connect(c, Channel::generate())).unwrap_err();
        assert!(matches!(err, Error::ChannelUnknown));

        let (ctx, regs) = hub.split();
        assert_eq!(ctx.store.count("device_channel").unwrap(), 1);
        let (_, channel) = regs.channel.get_one(ctx.store, &exclusive_channel, false).unwrap();
        assert!(channel.is_connected(&a));
        let (_, device) = regs.device.get_one(ctx.store, &a, false).unwrap();
        assert_eq!(device.channels, vec![exclusive_channel]);

        // The exclusive channel takes another device once the first one leaves
        hub.handle(Request::DeviceConnect { device: a, channel: exclusive_channel, connect: false }).unwrap();
        hub.handle(connect(b, exclusive_channel)).unwrap();
        let (ctx, regs) = hub.split();
        let (_, channel) = regs.channel.get_one(ctx.store, &exclusive_channel, false).unwrap();
        assert!(channel.is_connected(&b));
        assert!(!channel.is_connected(&a));
    }

    #[test]
    fn test_connect_and_disconnect_notify() {
        let dir = tempfile::tempdir().unwrap();
        let mut hub = testing::hub(dir.path());
        let shared = testing::shareable_protocol().name;
        let (channel, device) = {
            let (ctx, regs) = hub.split();
            let channel = regs.channel.register(&ctx, &ChannelDescription::new(shared, "udp://:1")).unwrap();
            let device = regs.device.register(&ctx, &device_request(shared, 1)).unwrap();
            (channel.name, device.name)
        };

        let mut rx = hub.subscribe();
        hub.handle(Request::DeviceConnect { device, channel, connect: true }).unwrap();
        let notes = drain(&mut rx);
        assert!(matches!(notes[0], Notification::Connected { connected: true, .. }));
        assert_eq!(notes.len(), 3);

        hub.handle(Request::DeviceConnect { device, channel, connect: false }).unwrap();
        let notes = drain(&mut rx);
        assert!(matches!(notes[0], Notification::Connected { connected: false, .. }));

        let (ctx, regs) = hub.split();
        let (_, d) = regs.device.get_one(ctx.store, &device, false).unwrap();
        assert!(d.channels.is_empty());
    }

    #[test]
    fn test_unregister_refreshes_channels() {
        let dir = tempfile::tempdir().unwrap();
        let mut hub = testing::hub(dir.path());
        let shared = testing::shareable_protocol().name;
        let (channel, device) = {
            let (ctx, regs) = hub.split();
            let channel = regs.channel.register(&ctx, &ChannelDescription::new(shared, "udp://:1")).unwrap();
            let device = regs.device.register(&ctx, &device_request(shared, 1)).unwrap();
            (channel.name, device.name)
        };
        hub.handle(Request::DeviceConnect { device, channel, connect: true }).unwrap();

        let (ctx, regs) = hub.split();
        regs.device.unregister(&ctx, &mut regs.channel, &device).unwrap();

        let (_, c) = regs.channel.get_one(ctx.store, &channel, false).unwrap();
        assert!(c.connected_devices.is_empty());
        assert!(matches!(regs.device.get_one(ctx.store, &device, false), Err(Error::NotFound)));
        assert!(matches!(
            regs.device.unregister(&ctx, &mut regs.channel, &device),
            Err(Error::DeviceUnknown)
        ));
    }
}
