use super::ProtocolValue;
use crate::name::{EntityName, Firmware};
use serde::Serialize;

/// A firmware image. Identity for deduplication is `(protocol, local value)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FirmwareDescription {
    pub name: Firmware,
    pub id: ProtocolValue,
    #[serde(skip)]
    pub payload: Vec<u8>,
}

impl FirmwareDescription {
    pub fn new(id: ProtocolValue, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            name: Firmware::nil(),
            id,
            payload: payload.into(),
        }
    }
}
