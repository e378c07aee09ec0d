//! Protocol registry
//!
//! Protocols are bootstrap-only: they come from the protocol provider and
//! are never updated or removed through requests.

use super::cached::{CachedRegistry, EntityCodec, row_info, row_name};
use super::{Ctx, column, duration_column};
use crate::model::ProtocolDescription;
use crate::name::{EntityName, Protocol};
use crate::notify::AnyDescription;
use crate::provider::ProtocolProvider;
use crate::storage::RelationalStore;
use crate::Result;
use rusqlite::Row;
use rusqlite::types::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub type ProtocolRegistry = CachedRegistry<ProtocolCodec>;

/// Required and optional property names per protocol
type Properties = (Vec<String>, Vec<String>);

#[derive(Debug, Default)]
pub struct ProtocolCodec {
    properties: HashMap<Protocol, Properties>,
}

impl EntityCodec for ProtocolCodec {
    type Name = Protocol;
    type Description = ProtocolDescription;

    const COLUMNS: &'static [&'static str] = &["shareable", "logging", "param_info", "timeout", "pixmap"];

    fn decode(&self, _store: &RelationalStore, row: &Row<'_>) -> Result<ProtocolDescription> {
        let name: Protocol = row_name(row)?;
        let timeout: i64 = column(row, "timeout")?;
        let pixmap: Option<Vec<u8>> = column(row, "pixmap")?;
        let (required, optional) = self.properties.get(&name).cloned().unwrap_or_default();

        Ok(ProtocolDescription {
            name,
            shareable: column(row, "shareable")?,
            logging: column(row, "logging")?,
            timeout: Duration::from_millis(timeout.max(0) as u64),
            info: row_info(row)?,
            param_info: column(row, "param_info")?,
            pixmap: pixmap.unwrap_or_default(),
            required_properties: required,
            optional_properties: optional,
        })
    }

    fn encode(&self, _store: &RelationalStore, d: &ProtocolDescription) -> Result<Vec<(&'static str, Value)>> {
        Ok(vec![
            ("shareable", Value::from(d.shareable)),
            ("logging", Value::from(d.logging)),
            ("param_info", Value::from(d.param_info.clone())),
            ("timeout", Value::from(duration_column("timeout", d.timeout, Duration::as_millis)?)),
            ("pixmap", Value::from((!d.pixmap.is_empty()).then(|| d.pixmap.clone()))),
        ])
    }

    fn name_of(d: &ProtocolDescription) -> Protocol {
        d.name
    }

    fn info_of(d: &ProtocolDescription) -> &str {
        &d.info
    }

    fn describe(d: Arc<ProtocolDescription>) -> AnyDescription {
        AnyDescription::Protocol(d)
    }

    /// Protocol names are fixed by the provider
    fn assign_name(&self, d: &ProtocolDescription) -> Protocol {
        if d.name.is_nil() { Protocol::generate() } else { d.name }
    }
}

impl CachedRegistry<ProtocolCodec> {
    pub fn with_defaults() -> Self {
        Self::new(ProtocolCodec::default())
    }

    /// Register every protocol the provider knows that is not stored yet.
    ///
    /// Returns the number of newly registered protocols. Failures are logged
    /// and skipped so one bad plugin can't block the others.
    pub fn update_plugins(&mut self, ctx: &Ctx<'_>, provider: &dyn ProtocolProvider) -> usize {
        let mut added = 0;
        for description in provider.protocols() {
            self.codec.properties.insert(
                description.name,
                (description.required_properties.clone(), description.optional_properties.clone()),
            );
            // Cached rows predate the property lists
            self.evict(&description.name);

            match self.get_id(ctx.store, &description.name) {
                Ok(Some(_)) => {
                    tracing::warn!("protocol {} ({}) already registered", description.name, description.info);
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("protocol {} lookup failed: {}", description.name, e);
                    continue;
                }
            }

            match self.insert(ctx.store, &description) {
                Ok((_, name)) => {
                    tracing::info!("registered protocol {} ({})", name, description.info);
                    self.registered(ctx, &name, true);
                    added += 1;
                }
                Err(e) => tracing::warn!("protocol {} not registered: {}", description.name, e),
            }
        }
        added
    }
}
