//! Channel registry
//!
//! A channel row references its protocol (required) and radar (optional).
//! Devices are attached through the `device_channel` join table.

use super::cached::{CachedRegistry, EntityCodec, row_info, row_name};
use super::device::DeviceRegistry;
use super::{Ctx, column, duration_column, foreign_name, optional_foreign_name, optional_id, require_id};
use crate::model::{ChannelDescription, ProtocolId};
use crate::name::{Device, EntityName, ObjectId, Protocol};
use crate::notify::AnyDescription;
use crate::storage::{RelationalStore, commit};
use crate::{Error, Result};
use rusqlite::types::Value;
use rusqlite::{Row, ToSql, named_params};
use std::sync::Arc;
use std::time::Duration;

pub type ChannelRegistry = CachedRegistry<ChannelCodec>;

const UPDATE_CHANNEL: &str = r#"
UPDATE channel SET info = :info,
                   log = :log,
                   isDynTimeout = :isDynTimeout,
                   isReadOnly = :isReadOnly,
                   reconnectTimeout = :reconnectTimeout,
                   timeout = :timeout,
                   settings = :settings,
                   protocol_id = :protocol_id,
                   radar_id = :radar_id
WHERE id = :channel_id
"#;

const SELECT_CONNECTED_DEVICES: &str = r#"
SELECT device.name, device.protocol_value
FROM device_channel JOIN device ON device.id = device_channel.device_id
WHERE device_channel.channel_id = :channel_id
ORDER BY device.id
"#;

const DELETE_CHANNEL_DEVICES: &str = "DELETE FROM device_channel WHERE channel_id = :channel_id";

#[derive(Debug, Default)]
pub struct ChannelCodec;

impl EntityCodec for ChannelCodec {
    type Name = crate::name::Channel;
    type Description = ChannelDescription;

    const COLUMNS: &'static [&'static str] = &[
        "log",
        "isDynTimeout",
        "isReadOnly",
        "reconnectTimeout",
        "timeout",
        "settings",
        "protocol_id",
        "radar_id",
    ];

    fn decode(&self, store: &RelationalStore, row: &Row<'_>) -> Result<ChannelDescription> {
        let id: ObjectId = column(row, "id")?;
        let protocol: Protocol = foreign_name(store, row, "protocol_id")?;
        let reconnect: Option<i64> = column(row, "reconnectTimeout")?;
        let timeout: i64 = column(row, "timeout")?;

        Ok(ChannelDescription {
            name: row_name(row)?,
            protocol,
            info: row_info(row)?,
            settings: column(row, "settings")?,
            log: column(row, "log")?,
            timeout: Duration::from_millis(timeout.max(0) as u64),
            dynamic_timeout: column(row, "isDynTimeout")?,
            read_only: column(row, "isReadOnly")?,
            reconnect: reconnect.map(|secs| Duration::from_secs(secs.max(0) as u64)),
            radar: optional_foreign_name(store, row, "radar_id")?,
            connected_devices: connected_devices(store, id, protocol)?,
        })
    }

    fn encode(&self, store: &RelationalStore, d: &ChannelDescription) -> Result<Vec<(&'static str, Value)>> {
        let protocol_id = require_id(store, &d.protocol, Error::ProtocolUnknown)?;
        let radar_id = optional_id(store, d.radar.as_ref(), Error::RadarUnknown)?;
        let reconnect = d
            .reconnect
            .map(|r| duration_column("reconnectTimeout", r, |r| u128::from(r.as_secs())))
            .transpose()?;
        let timeout = duration_column("timeout", d.timeout, Duration::as_millis)?;

        Ok(vec![
            ("log", Value::from(d.log)),
            ("isDynTimeout", Value::from(d.dynamic_timeout)),
            ("isReadOnly", Value::from(d.read_only)),
            ("reconnectTimeout", Value::from(reconnect)),
            ("timeout", Value::from(timeout)),
            ("settings", Value::from(d.settings.clone())),
            ("protocol_id", Value::from(protocol_id)),
            ("radar_id", Value::from(radar_id)),
        ])
    }

    fn name_of(d: &ChannelDescription) -> crate::name::Channel {
        d.name
    }

    fn info_of(d: &ChannelDescription) -> &str {
        &d.info
    }

    fn describe(d: Arc<ChannelDescription>) -> AnyDescription {
        AnyDescription::Channel(d)
    }
}

/// Devices attached to a channel, addressed through the channel's protocol
pub(crate) fn connected_devices(store: &RelationalStore, channel_id: ObjectId, protocol: Protocol) -> Result<Vec<ProtocolId>> {
    let rows: Vec<(String, i64)> = store.query_rows(
        SELECT_CONNECTED_DEVICES,
        named_params! { ":channel_id": channel_id },
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    rows.into_iter()
        .map(|(name, value)| {
            let device = Device::parse(&name).map_err(|e| Error::InconsistentData(e.to_string()))?;
            Ok(ProtocolId::new(device, protocol, value))
        })
        .collect()
}

impl CachedRegistry<ChannelCodec> {
    pub fn with_defaults() -> Self {
        Self::new(ChannelCodec)
    }

    /// Rewrite every mutable field of an existing channel
    pub fn update(&mut self, ctx: &Ctx<'_>, d: &ChannelDescription) -> Result<Arc<ChannelDescription>> {
        let channel_id = self.get_id(ctx.store, &d.name)?.ok_or(Error::ChannelUnknown)?;

        let info = Value::from(d.info.clone());
        let values = self.codec.encode(ctx.store, d).map_err(|e| match e {
            Error::CantRegister(reason) => Error::CantUpdate(reason),
            e => e,
        })?;
        let keys: Vec<String> = values.iter().map(|(column, _)| format!(":{}", column)).collect();

        let mut params: Vec<(&str, &dyn ToSql)> = vec![(":channel_id", &channel_id as &dyn ToSql), (":info", &info as &dyn ToSql)];
        params.extend(keys.iter().zip(values.iter()).map(|(key, (_, value))| (key.as_str(), value as &dyn ToSql)));

        ctx.store
            .execute(UPDATE_CHANNEL, &params)
            .map_err(|e| Error::CantUpdate(e.to_string()))?;

        self.updated(ctx, &d.name)
            .map_err(|e| Error::CantUpdate(e.to_string()))
    }

    /// Detach every device, delete the channel and refresh the detached devices
    pub fn unregister(&mut self, ctx: &Ctx<'_>, devices: &mut DeviceRegistry, name: &crate::name::Channel) -> Result<()> {
        let channel_id = self.get_id(ctx.store, name)?.ok_or(Error::ChannelUnknown)?;
        let protocol = self.get_one(ctx.store, name, false)?.1.protocol;
        let detached = connected_devices(ctx.store, channel_id, protocol)?;

        let tx = ctx.store.transaction().map_err(|e| Error::CantUnRegister(e.to_string()))?;
        ctx.store
            .execute(DELETE_CHANNEL_DEVICES, named_params! { ":channel_id": channel_id })
            .map_err(|e| Error::CantUnRegister(e.to_string()))?;
        self.remove_one(ctx.store, name)?;
        commit(tx).map_err(|e| Error::CantUnRegister(e.to_string()))?;

        for device in detached {
            if let Err(e) = devices.updated(ctx, &device.device) {
                tracing::warn!("device {} not refreshed after channel {} removal: {}", device.device, name, e);
            }
        }

        self.registered(ctx, name, false);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeviceDescription, RadarDescription};
    use crate::name::{Channel, Radar};
    use crate::notify::{Notification, drain};
    use crate::registry::testing;
    use crate::request::{EntityRequest, EntityResponse, Request, Response};

    #[test]
    fn test_register_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut hub = testing::hub(dir.path());
        let (ctx, regs) = hub.split();
        let protocol = testing::shareable_protocol().name;

        let mut request = ChannelDescription::new(protocol, "udp://127.0.0.1:14550").with_info("ground link");
        request.reconnect = Some(Duration::from_secs(5));
        request.timeout = Duration::from_millis(250);
        request.read_only = true;

        let stored = regs.channel.register(&ctx, &request).unwrap();
        assert!(!stored.name.is_nil());
        assert_eq!(ChannelDescription { name: stored.name, ..request.clone() }, *stored);

        let (_, fetched) = regs.channel.get_one(ctx.store, &stored.name, true).unwrap();
        assert_eq!(fetched, stored);
    }

    #[test]
    fn test_oversized_timeout_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut hub = testing::hub(dir.path());
        let (ctx, regs) = hub.split();
        let protocol = testing::shareable_protocol().name;

        let mut request = ChannelDescription::new(protocol, "udp://:14550");
        request.timeout = Duration::MAX;
        let err = regs.channel.register(&ctx, &request).unwrap_err();
        assert!(matches!(err, Error::CantRegister(ref reason) if reason.starts_with("timeout")));
        assert_eq!(ctx.store.count("channel").unwrap(), 0);

        let stored = regs.channel.register(&ctx, &ChannelDescription::new(protocol, "udp://:14550")).unwrap();
        let mut update = (*stored).clone();
        update.reconnect = Some(Duration::MAX);
        let err = regs.channel.update(&ctx, &update).unwrap_err();
        assert!(matches!(err, Error::CantUpdate(ref reason) if reason.starts_with("reconnectTimeout")));

        let (_, fetched) = regs.channel.get_one(ctx.store, &stored.name, true).unwrap();
        assert_eq!(fetched.reconnect, stored.reconnect);
    }

    #[test]
    fn test_unknown_protocol_rejected_before_write() {
        let dir = tempfile::tempdir().unwrap();
        let mut hub = testing::hub(dir.path());
        let (ctx, regs) = hub.split();

        let request = ChannelDescription::new(Protocol::generate(), "tcp://10.0.0.1:5760");
        let err = regs.channel.register(&ctx, &request).unwrap_err();
        assert!(matches!(err, Error::ProtocolUnknown));
        assert_eq!(ctx.store.count("channel").unwrap(), 0);

        let request = ChannelDescription::new(testing::shareable_protocol().name, "tcp://10.0.0.1:5760")
            .with_radar(Radar::generate());
        let err = regs.channel.register(&ctx, &request).unwrap_err();
        assert!(matches!(err, Error::RadarUnknown));
        assert_eq!(ctx.store.count("channel").unwrap(), 0);
    }

    #[test]
    fn test_update_refreshes_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mut hub = testing::hub(dir.path());
        let mut rx = hub.subscribe();
        let (ctx, regs) = hub.split();
        let protocol = testing::shareable_protocol().name;

        let radar = regs.radar.register(&ctx, &RadarDescription::new("north", "10.0.0.9")).unwrap();
        let stored = regs
            .channel
            .register(&ctx, &ChannelDescription::new(protocol, "udp://0.0.0.0:14550"))
            .unwrap();
        drain(&mut rx);

        let mut changed = (*stored).clone();
        changed.info = "renamed".to_string();
        changed.radar = Some(radar.name);
        changed.reconnect = Some(Duration::from_secs(3));
        let updated = regs.channel.update(&ctx, &changed).unwrap();
        assert_eq!(*updated, changed);

        // Non-forced read sees the new value
        let (_, cached) = regs.channel.get_one(ctx.store, &stored.name, false).unwrap();
        assert_eq!(cached.info, "renamed");
        assert_eq!(cached.radar, Some(radar.name));

        let notes = drain(&mut rx);
        assert!(matches!(&notes[..], [Notification::Updated(AnyDescription::Channel(d))] if d.info == "renamed"));
    }

    #[test]
    fn test_update_unknown_channel() {
        let dir = tempfile::tempdir().unwrap();
        let mut hub = testing::hub(dir.path());
        let (ctx, regs) = hub.split();
        let mut ghost = ChannelDescription::new(testing::shareable_protocol().name, "udp://0.0.0.0:1");
        ghost.name = Channel::generate();
        let err = regs.channel.update(&ctx, &ghost).unwrap_err();
        assert!(matches!(err, Error::ChannelUnknown));
    }

    #[test]
    fn test_unregister_cascades_to_devices() {
        let dir = tempfile::tempdir().unwrap();
        let mut hub = testing::hub(dir.path());
        let protocol = testing::shareable_protocol().name;

        let channel = {
            let (ctx, regs) = hub.split();
            regs.channel
                .register(&ctx, &ChannelDescription::new(protocol, "udp://0.0.0.0:14550"))
                .unwrap()
        };
        let mut devices = Vec::new();
        for id in 1..=2 {
            let request = DeviceDescription::new(ProtocolId::new(Device::nil(), protocol, id));
            let device = {
                let (ctx, regs) = hub.split();
                regs.device.register(&ctx, &request).unwrap()
            };
            hub.handle(Request::DeviceConnect { device: device.name, channel: channel.name, connect: true })
                .unwrap();
            devices.push(device.name);
        }

        let mut rx = hub.subscribe();
        let response = hub
            .handle(Request::Channel(EntityRequest::UnRegister(channel.name)))
            .unwrap();
        assert!(matches!(response, Response::Channel(EntityResponse::Done)));

        let (ctx, regs) = hub.split();
        assert!(matches!(
            regs.channel.get_one(ctx.store, &channel.name, false),
            Err(Error::NotFound)
        ));
        assert_eq!(ctx.store.count("device_channel").unwrap(), 0);
        for device in &devices {
            let (_, d) = regs.device.get_one(ctx.store, device, false).unwrap();
            assert!(d.channels.is_empty());
        }

        let notes = drain(&mut rx);
        let refreshed = notes
            .iter()
            .filter(|n| matches!(n, Notification::Updated(AnyDescription::Device(_))))
            .count();
        assert_eq!(refreshed, 2);
        assert!(matches!(
            notes.last(),
            Some(Notification::Registered { registered: false, name, .. }) if *name == channel.name.uuid()
        ));
    }

    #[test]
    fn test_unregister_unknown_channel() {
        let dir = tempfile::tempdir().unwrap();
        let mut hub = testing::hub(dir.path());
        let err = hub
            .handle(Request::Channel(EntityRequest::UnRegister(Channel::generate())))
            .unwrap_err();
        assert!(matches!(err, Error::ChannelUnknown));
    }
}
