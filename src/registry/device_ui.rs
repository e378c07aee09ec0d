//! Device UI registry

use super::cached::{CachedRegistry, EntityCodec};
use super::payload::{PayloadCodec, decode_payload};
use super::require_id;
use crate::model::{DeviceUiDescription, ProtocolValue};
use crate::name::DeviceUi;
use crate::notify::AnyDescription;
use crate::storage::RelationalStore;
use crate::{Error, Result};
use rusqlite::Row;
use rusqlite::types::Value;
use std::sync::Arc;

pub type DeviceUiRegistry = CachedRegistry<DeviceUiCodec>;

#[derive(Debug, Default)]
pub struct DeviceUiCodec;

impl EntityCodec for DeviceUiCodec {
    type Name = DeviceUi;
    type Description = DeviceUiDescription;

    const COLUMNS: &'static [&'static str] = &["protocol_id", "binary"];

    fn decode(&self, store: &RelationalStore, row: &Row<'_>) -> Result<DeviceUiDescription> {
        let (name, id, payload) = decode_payload(store, row)?;
        Ok(DeviceUiDescription { name, id, payload })
    }

    fn encode(&self, store: &RelationalStore, d: &DeviceUiDescription) -> Result<Vec<(&'static str, Value)>> {
        let protocol_id = require_id(store, &d.id.protocol, Error::ProtocolUnknown)?;
        Ok(vec![
            ("protocol_id", Value::from(protocol_id)),
            ("binary", Value::Blob(d.payload.clone())),
        ])
    }

    fn name_of(d: &DeviceUiDescription) -> DeviceUi {
        d.name
    }

    fn info_of(d: &DeviceUiDescription) -> &str {
        &d.id.value
    }

    fn describe(d: Arc<DeviceUiDescription>) -> AnyDescription {
        AnyDescription::DeviceUi(d)
    }
}

impl PayloadCodec for DeviceUiCodec {
    const DEVICE_COLUMN: &'static str = "device_ui_id";

    fn local_of(d: &DeviceUiDescription) -> &ProtocolValue {
        &d.id
    }

    fn payload_of(d: &DeviceUiDescription) -> &[u8] {
        &d.payload
    }

    fn unknown() -> Error {
        Error::DeviceUiUnknown
    }
}

impl CachedRegistry<DeviceUiCodec> {
    pub fn with_defaults() -> Self {
        Self::new(DeviceUiCodec)
    }
}
