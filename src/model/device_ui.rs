use super::ProtocolValue;
use crate::name::{DeviceUi, EntityName};
use serde::Serialize;

/// A UI bundle shown for devices of one protocol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceUiDescription {
    pub name: DeviceUi,
    pub id: ProtocolValue,
    #[serde(skip)]
    pub payload: Vec<u8>,
}

impl DeviceUiDescription {
    pub fn new(id: ProtocolValue, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            name: DeviceUi::nil(),
            id,
            payload: payload.into(),
        }
    }
}
