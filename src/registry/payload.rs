//! Shared behavior of the binary-payload kinds (firmware and device UI)
//!
//! Both kinds are keyed locally by `(protocol, value)` and deduplicated on
//! that key: registering an existing key returns the stored object. When
//! the payloads differ the stored one is kept and the mismatch is logged.

use super::cached::{CachedRegistry, EntityCodec};
use super::device::DeviceRegistry;
use super::{Ctx, column, foreign_name, name_column};
use crate::model::ProtocolValue;
use crate::name::{Device, EntityName, ObjectId, Protocol};
use crate::storage::{RelationalStore, commit};
use crate::{Error, Result};
use rusqlite::{Row, named_params};
use std::sync::Arc;

/// Codec of a kind stored as `info` (local value), `protocol_id`, `binary`
pub trait PayloadCodec: EntityCodec {
    /// Device column referencing this kind
    const DEVICE_COLUMN: &'static str;

    fn local_of(description: &Self::Description) -> &ProtocolValue;

    fn payload_of(description: &Self::Description) -> &[u8];

    /// Error for a name that has no row
    fn unknown() -> Error;

    /// Verdict on a payload before it is stored or after it is read
    fn check(&self, _id: &ProtocolValue, payload: &[u8]) -> std::result::Result<(), String> {
        if payload.is_empty() {
            return Err("empty payload".to_string());
        }
        Ok(())
    }
}

/// Columns common to every payload row
pub(crate) fn decode_payload<N: EntityName>(
    store: &RelationalStore,
    row: &Row<'_>,
) -> Result<(N, ProtocolValue, Vec<u8>)> {
    let name: N = name_column(row, "name")?;
    let protocol: Protocol = foreign_name(store, row, "protocol_id")?;
    let value: String = column(row, "info")?;
    let payload: Vec<u8> = column(row, "binary")?;
    Ok((name, ProtocolValue::new(protocol, value), payload))
}

impl<C: PayloadCodec> CachedRegistry<C> {
    fn find_local(&self, store: &RelationalStore, local: &ProtocolValue) -> Result<Option<C::Name>> {
        let sql = format!(
            "SELECT {table}.name FROM {table} JOIN protocol ON protocol.id = {table}.protocol_id \
             WHERE protocol.name = :protocol AND {table}.info = :info",
            table = self.table()
        );
        let text: Option<String> = store.query_opt(
            &sql,
            named_params! { ":protocol": local.protocol.to_name_string(), ":info": local.value },
            |row| row.get(0),
        )?;
        text.map(|t| C::Name::parse(&t).map_err(|e| Error::InconsistentData(e.to_string())))
            .transpose()
    }

    /// Object registered under `(protocol, value)`
    pub fn get_by_local(&mut self, store: &RelationalStore, local: &ProtocolValue) -> Result<Arc<C::Description>> {
        let name = self.find_local(store, local)?.ok_or(Error::NotFound)?;
        self.get_one(store, &name, false).map(|(_, d)| d)
    }

    /// Register unless the local key is taken; a taken key returns the stored object
    pub fn register_payload(&mut self, ctx: &Ctx<'_>, description: &C::Description) -> Result<Arc<C::Description>> {
        let local = C::local_of(description);
        let payload = C::payload_of(description);
        self.codec
            .check(local, payload)
            .map_err(|reason| Error::CantRegister(format!("{} {}: {}", self.table(), local, reason)))?;

        if let Some(existing) = self.find_local(ctx.store, local)? {
            let (_, stored) = self.get_one(ctx.store, &existing, false)?;
            if C::payload_of(&stored) != payload {
                tracing::warn!(
                    "{} {} already registered as {} with a different payload, keeping the stored one",
                    self.table(),
                    local,
                    existing
                );
            }
            return Ok(stored);
        }

        let (id, name) = self.insert(ctx.store, description)?;
        let stored = self.get_one_by_id(ctx.store, id)?;
        self.registered(ctx, &name, true);
        Ok(stored)
    }

    /// Clear the reference from every device, delete the row and refresh those devices
    pub fn unregister_payload(&mut self, ctx: &Ctx<'_>, devices: &mut DeviceRegistry, name: &C::Name) -> Result<()> {
        let id: ObjectId = self.get_id(ctx.store, name)?.ok_or_else(C::unknown)?;

        let select = format!("SELECT name FROM device WHERE {} = :id ORDER BY id", C::DEVICE_COLUMN);
        let detach = format!("UPDATE device SET {col} = NULL WHERE {col} = :id", col = C::DEVICE_COLUMN);

        let names: Vec<String> = ctx.store.query_rows(&select, named_params! { ":id": id }, |row| row.get(0))?;
        let detached = names
            .iter()
            .map(|n| Device::parse(n).map_err(|e| Error::InconsistentData(e.to_string())))
            .collect::<Result<Vec<_>>>()?;

        let tx = ctx.store.transaction().map_err(|e| Error::CantUnRegister(e.to_string()))?;
        ctx.store
            .execute(&detach, named_params! { ":id": id })
            .map_err(|e| Error::CantUnRegister(e.to_string()))?;
        self.remove_one(ctx.store, name)?;
        commit(tx).map_err(|e| Error::CantUnRegister(e.to_string()))?;

        for device in detached {
            if let Err(e) = devices.updated(ctx, &device) {
                tracing::warn!("device {} not refreshed after {} {} removal: {}", device, self.table(), name, e);
            }
        }

        self.registered(ctx, name, false);
        Ok(())
    }
}
