//! Entity registries - cached access to every kind of registered object
//!
//! - `cached`: the generic engine ([`CachedRegistry`] over an [`EntityCodec`])
//! - one module per entity kind with its SQL and business rules
//! - `advanced`: operations spanning several registries in one transaction
//!
//! Registries never own the store or the notifier; the hub lends both
//! through a [`Ctx`] for the duration of one request.

pub mod advanced;
pub mod cache;
pub mod cached;
pub mod channel;
pub mod device;
pub mod device_ui;
pub mod firmware;
pub mod payload;
pub mod protocol;
pub mod radar;
pub mod tm_session;

pub use cache::ObjectCache;
pub use cached::{CachedRegistry, EntityCodec};
pub use channel::{ChannelCodec, ChannelRegistry};
pub use device::{DeviceCodec, DeviceRegistry};
pub use device_ui::{DeviceUiCodec, DeviceUiRegistry};
pub use firmware::{FirmwareCodec, FirmwareRegistry};
pub use payload::PayloadCodec;
pub use protocol::{ProtocolCodec, ProtocolRegistry};
pub use radar::{RadarCodec, RadarRegistry};
pub use tm_session::{TmSessionCodec, TmSessionRegistry};

use crate::name::{EntityName, ObjectId};
use crate::notify::Notifier;
use crate::storage::RelationalStore;
use crate::{Error, Result};
use rusqlite::Row;
use rusqlite::types::FromSql;
use std::time::Duration;

/// Store and notifier lent to a registry for one operation
#[derive(Clone, Copy)]
pub struct Ctx<'a> {
    pub store: &'a RelationalStore,
    pub notifier: &'a Notifier,
}

impl<'a> Ctx<'a> {
    pub fn new(store: &'a RelationalStore, notifier: &'a Notifier) -> Self {
        Self { store, notifier }
    }
}

/// Read a column, reporting type mismatches as inconsistent data
pub(crate) fn column<T: FromSql>(row: &Row<'_>, name: &str) -> Result<T> {
    row.get(name)
        .map_err(|e| Error::InconsistentData(format!("column {}: {}", name, e)))
}

/// Read a name column
pub(crate) fn name_column<N: EntityName>(row: &Row<'_>, name: &str) -> Result<N> {
    let text: String = column(row, name)?;
    N::parse(&text).map_err(|e| Error::InconsistentData(e.to_string()))
}

/// Resolve the row id of any named object, uncached
pub(crate) fn lookup_id<N: EntityName>(store: &RelationalStore, name: &N) -> Result<Option<ObjectId>> {
    let sql = format!("SELECT id FROM {} WHERE name = :name", N::KIND.table());
    let id = store.query_opt(&sql, rusqlite::named_params! { ":name": name.to_name_string() }, |row| row.get(0))?;
    Ok(id)
}

/// Resolve the name of any object by row id, uncached
pub(crate) fn lookup_name<N: EntityName>(store: &RelationalStore, id: ObjectId) -> Result<Option<N>> {
    let sql = format!("SELECT name FROM {} WHERE id = :id", N::KIND.table());
    let text: Option<String> = store.query_opt(&sql, rusqlite::named_params! { ":id": id }, |row| row.get(0))?;
    text.map(|t| N::parse(&t).map_err(|e| Error::InconsistentData(e.to_string())))
        .transpose()
}

/// Resolve a required foreign key or fail with `missing`
pub(crate) fn require_id<N: EntityName>(store: &RelationalStore, name: &N, missing: Error) -> Result<ObjectId> {
    lookup_id(store, name)?.ok_or(missing)
}

/// Resolve an optional foreign key; a set but unknown name fails with `missing`
pub(crate) fn optional_id<N: EntityName>(
    store: &RelationalStore,
    name: Option<&N>,
    missing: Error,
) -> Result<Option<ObjectId>> {
    match name {
        Some(name) => require_id(store, name, missing).map(Some),
        None => Ok(None),
    }
}

/// Resolve the name behind a required foreign key column
pub(crate) fn foreign_name<N: EntityName>(store: &RelationalStore, row: &Row<'_>, column_name: &str) -> Result<N> {
    let id: ObjectId = column(row, column_name)?;
    lookup_name(store, id)?
        .ok_or_else(|| Error::InconsistentData(format!("{} {} not found for {}", N::KIND, id, column_name)))
}

/// Resolve the name behind a nullable foreign key column
pub(crate) fn optional_foreign_name<N: EntityName>(
    store: &RelationalStore,
    row: &Row<'_>,
    column_name: &str,
) -> Result<Option<N>> {
    let id: Option<ObjectId> = column(row, column_name)?;
    match id {
        Some(id) => lookup_name(store, id)?
            .map(Some)
            .ok_or_else(|| Error::InconsistentData(format!("{} {} not found for {}", N::KIND, id, column_name))),
        None => Ok(None),
    }
}

/// An integer column value for a duration; `as_unit` picks the stored unit
pub(crate) fn duration_column(column_name: &str, value: Duration, as_unit: fn(&Duration) -> u128) -> Result<i64> {
    i64::try_from(as_unit(&value))
        .map_err(|_| Error::CantRegister(format!("{}: {:?} out of range", column_name, value)))
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fixtures shared by the registry tests

    use crate::hub::RegistryHub;
    use crate::model::ProtocolDescription;
    use crate::name::{EntityName, Protocol};
    use crate::provider::StaticProtocols;
    use std::sync::Arc;

    pub fn shareable_protocol() -> ProtocolDescription {
        ProtocolDescription::new(Protocol::parse("11111111-1111-4111-8111-111111111111").unwrap(), "shared")
            .shareable(true)
    }

    pub fn exclusive_protocol() -> ProtocolDescription {
        ProtocolDescription::new(Protocol::parse("22222222-2222-4222-8222-222222222222").unwrap(), "exclusive")
    }

    /// In-memory hub with both test protocols registered
    pub fn hub(sessions: &std::path::Path) -> RegistryHub {
        let mut hub = RegistryHub::open_in_memory(sessions).unwrap();
        hub.update_plugins(Arc::new(StaticProtocols::new(vec![shareable_protocol(), exclusive_protocol()])));
        hub
    }
}
