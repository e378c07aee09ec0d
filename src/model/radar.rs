use crate::name::{EntityName, Radar};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RadarDescription {
    pub name: Radar,
    /// Also the radar's local key for lookups
    pub info: String,
    pub settings: String,
}

impl RadarDescription {
    pub fn new(info: impl Into<String>, settings: impl Into<String>) -> Self {
        Self {
            name: Radar::nil(),
            info: info.into(),
            settings: settings.into(),
        }
    }
}
