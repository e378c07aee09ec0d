//! Storage Layer - SQLite-backed persistence
//!
//! System of record is SQLite with tables:
//! - property(name, value) - holds the schema hash
//! - protocol, radar, channel, firmware, device_ui, device, tm_session
//! - device_channel(device_id, channel_id) - channel/device join

pub mod schema;
pub mod sqlite;

pub use sqlite::{Params, RelationalStore, StoreError, StoreResult, commit};
