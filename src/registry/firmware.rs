//! Firmware registry
//!
//! Payloads are validated through the protocol provider when one is set,
//! both on registration and on every decode.

use super::cached::{CachedRegistry, EntityCodec};
use super::payload::{PayloadCodec, decode_payload};
use super::require_id;
use crate::model::{FirmwareDescription, ProtocolValue};
use crate::name::Firmware;
use crate::notify::AnyDescription;
use crate::provider::ProtocolProvider;
use crate::storage::RelationalStore;
use crate::{Error, Result};
use rusqlite::Row;
use rusqlite::types::Value;
use std::sync::Arc;

pub type FirmwareRegistry = CachedRegistry<FirmwareCodec>;

#[derive(Default)]
pub struct FirmwareCodec {
    provider: Option<Arc<dyn ProtocolProvider>>,
}

impl EntityCodec for FirmwareCodec {
    type Name = Firmware;
    type Description = FirmwareDescription;

    const COLUMNS: &'static [&'static str] = &["protocol_id", "binary"];

    fn decode(&self, store: &RelationalStore, row: &Row<'_>) -> Result<FirmwareDescription> {
        let (name, id, payload) = decode_payload(store, row)?;
        self.check(&id, &payload)
            .map_err(|reason| Error::InconsistentData(format!("firmware {}: {}", id, reason)))?;
        Ok(FirmwareDescription { name, id, payload })
    }

    fn encode(&self, store: &RelationalStore, d: &FirmwareDescription) -> Result<Vec<(&'static str, Value)>> {
        let protocol_id = require_id(store, &d.id.protocol, Error::ProtocolUnknown)?;
        Ok(vec![
            ("protocol_id", Value::from(protocol_id)),
            ("binary", Value::Blob(d.payload.clone())),
        ])
    }

    fn name_of(d: &FirmwareDescription) -> Firmware {
        d.name
    }

    fn info_of(d: &FirmwareDescription) -> &str {
        &d.id.value
    }

    fn describe(d: Arc<FirmwareDescription>) -> AnyDescription {
        AnyDescription::Firmware(d)
    }
}

impl PayloadCodec for FirmwareCodec {
    const DEVICE_COLUMN: &'static str = "firmware_id";

    fn local_of(d: &FirmwareDescription) -> &ProtocolValue {
        &d.id
    }

    fn payload_of(d: &FirmwareDescription) -> &[u8] {
        &d.payload
    }

    fn unknown() -> Error {
        Error::FirmwareUnknown
    }

    fn check(&self, id: &ProtocolValue, payload: &[u8]) -> std::result::Result<(), String> {
        match &self.provider {
            Some(provider) => provider.check_firmware(id, payload),
            None if payload.is_empty() => Err("empty firmware image".to_string()),
            None => Ok(()),
        }
    }
}

impl CachedRegistry<FirmwareCodec> {
    pub fn with_defaults() -> Self {
        Self::new(FirmwareCodec::default())
    }

    /// Validate payloads with `provider` from now on
    pub fn set_provider(&mut self, provider: Arc<dyn ProtocolProvider>) {
        self.codec.provider = Some(provider);
        // Cached entries were validated by the previous provider
        self.clear_cache();
    }
}
