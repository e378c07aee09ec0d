//! Protocol provider - the external source of protocol definitions
//!
//! The registry never invents protocols. At bootstrap (and whenever plugins
//! are reloaded) it asks a provider for every protocol it knows and for a
//! verdict on firmware payloads.

use crate::model::{ProtocolDescription, ProtocolValue};

/// Source of protocol descriptions and firmware validation.
///
/// Called synchronously on the registry worker; implementations must not
/// send requests back into the registry.
pub trait ProtocolProvider: Send + Sync {
    /// Every protocol this provider can speak
    fn protocols(&self) -> Vec<ProtocolDescription>;

    /// Check that `payload` is a usable firmware image for `id`
    fn check_firmware(&self, _id: &ProtocolValue, payload: &[u8]) -> std::result::Result<(), String> {
        if payload.is_empty() {
            return Err("empty firmware image".to_string());
        }
        Ok(())
    }
}

/// Provider backed by a fixed list, e.g. the `[[protocols]]` config table
#[derive(Debug, Clone, Default)]
pub struct StaticProtocols {
    protocols: Vec<ProtocolDescription>,
}

impl StaticProtocols {
    pub fn new(protocols: Vec<ProtocolDescription>) -> Self {
        Self { protocols }
    }
}

impl ProtocolProvider for StaticProtocols {
    fn protocols(&self) -> Vec<ProtocolDescription> {
        self.protocols.clone()
    }
}
