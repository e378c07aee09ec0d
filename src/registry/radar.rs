//! Radar registry
//!
//! Radars are looked up either by name or by their `info` text. Removing a
//! radar detaches it from every channel that referenced it.

use super::cached::{CachedRegistry, EntityCodec, row_info, row_name};
use super::channel::ChannelRegistry;
use super::{Ctx, column};
use crate::model::RadarDescription;
use crate::name::{Channel, EntityName, ObjectId, Radar};
use crate::notify::AnyDescription;
use crate::storage::{RelationalStore, commit};
use crate::{Error, Result};
use rusqlite::types::Value;
use rusqlite::{Row, named_params};
use std::sync::Arc;

pub type RadarRegistry = CachedRegistry<RadarCodec>;

const SELECT_BY_INFO: &str = "SELECT name FROM radar WHERE info = :info ORDER BY id LIMIT 1";

const UPDATE_RADAR: &str = "UPDATE radar SET info = :info, settings = :settings WHERE id = :radar_id";

const SELECT_RADAR_CHANNELS: &str = "SELECT name FROM channel WHERE radar_id = :radar_id ORDER BY id";

const DETACH_RADAR_CHANNELS: &str = "UPDATE channel SET radar_id = NULL WHERE radar_id = :radar_id";

#[derive(Debug, Default)]
pub struct RadarCodec;

impl EntityCodec for RadarCodec {
    type Name = Radar;
    type Description = RadarDescription;

    const COLUMNS: &'static [&'static str] = &["settings"];

    fn decode(&self, _store: &RelationalStore, row: &Row<'_>) -> Result<RadarDescription> {
        Ok(RadarDescription {
            name: row_name(row)?,
            info: row_info(row)?,
            settings: column(row, "settings")?,
        })
    }

    fn encode(&self, _store: &RelationalStore, d: &RadarDescription) -> Result<Vec<(&'static str, Value)>> {
        Ok(vec![("settings", Value::from(d.settings.clone()))])
    }

    fn name_of(d: &RadarDescription) -> Radar {
        d.name
    }

    fn info_of(d: &RadarDescription) -> &str {
        &d.info
    }

    fn describe(d: Arc<RadarDescription>) -> AnyDescription {
        AnyDescription::Radar(d)
    }
}

fn radar_channels(store: &RelationalStore, radar_id: ObjectId) -> Result<Vec<Channel>> {
    let names: Vec<String> = store.query_rows(
        SELECT_RADAR_CHANNELS,
        named_params! { ":radar_id": radar_id },
        |row| row.get(0),
    )?;
    names
        .iter()
        .map(|n| Channel::parse(n).map_err(|e| Error::InconsistentData(e.to_string())))
        .collect()
}

impl CachedRegistry<RadarCodec> {
    pub fn with_defaults() -> Self {
        Self::new(RadarCodec)
    }

    /// First radar whose `info` equals `info`
    pub fn by_local(&mut self, store: &RelationalStore, info: &str) -> Result<Arc<RadarDescription>> {
        let text: Option<String> = store.query_opt(SELECT_BY_INFO, named_params! { ":info": info }, |row| row.get(0))?;
        let name = text
            .map(|t| Radar::parse(&t).map_err(|e| Error::InconsistentData(e.to_string())))
            .transpose()?
            .ok_or(Error::NotFound)?;
        self.get_one(store, &name, false).map(|(_, d)| d)
    }

    pub fn update(&mut self, ctx: &Ctx<'_>, d: &RadarDescription) -> Result<Arc<RadarDescription>> {
        let radar_id = self.get_id(ctx.store, &d.name)?.ok_or(Error::RadarUnknown)?;
        ctx.store
            .execute(
                UPDATE_RADAR,
                named_params! { ":info": d.info, ":settings": d.settings, ":radar_id": radar_id },
            )
            .map_err(|e| Error::CantUpdate(e.to_string()))?;
        self.updated(ctx, &d.name)
    }

    /// Detach the radar from its channels, delete it and refresh those channels
    pub fn unregister(&mut self, ctx: &Ctx<'_>, channels: &mut ChannelRegistry, name: &Radar) -> Result<()> {
        let radar_id = self.get_id(ctx.store, name)?.ok_or(Error::RadarUnknown)?;
        let detached = radar_channels(ctx.store, radar_id)?;

        let tx = ctx.store.transaction().map_err(|e| Error::CantUnRegister(e.to_string()))?;
        ctx.store
            .execute(DETACH_RADAR_CHANNELS, named_params! { ":radar_id": radar_id })
            .map_err(|e| Error::CantUnRegister(e.to_string()))?;
        self.remove_one(ctx.store, name)?;
        commit(tx).map_err(|e| Error::CantUnRegister(e.to_string()))?;

        for channel in detached {
            if let Err(e) = channels.updated(ctx, &channel) {
                tracing::warn!("channel {} not refreshed after radar {} removal: {}", channel, name, e);
            }
        }

        self.registered(ctx, name, false);
        Ok(())
    }
}
