//! # mccdb - Device inventory registry
//!
//! Persistent, cached object store for the entities a ground-control
//! station knows about.
//!
//! mccdb provides:
//! - Seven entity kinds (channel, device, protocol, radar, firmware, device UI,
//!   telemetry session) addressed by stable UUID names
//! - A generic cached registry over a SQLite store guarded by a schema hash
//! - Cross-entity transactional registration and join maintenance
//! - A single-writer worker with async request/response and broadcast
//!   change notifications

pub mod kind;
pub mod name;
pub mod model;
pub mod storage;
pub mod registry;
pub mod notify;
pub mod provider;
pub mod request;
pub mod hub;
pub mod service;
pub mod config;
pub mod ui;

// Re-exports for convenient access
pub use kind::EntityKind;
pub use name::{Channel, Device, DeviceUi, EntityName, Firmware, ObjectId, Protocol, Radar, TmSession};
pub use notify::{AnyDescription, Notification, Notifier};
pub use storage::{RelationalStore, StoreError};
pub use hub::RegistryHub;
pub use request::{EntityRequest, EntityResponse, Request, Response};
pub use service::{RegistryHandle, RegistryService};

/// Result type alias for registry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by registry operations.
///
/// Variants carrying a `String` hold the diagnostic detail (usually the
/// failing SQL text and SQLite's message).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not found")]
    NotFound,

    #[error("Inconsistent data: {0}")]
    InconsistentData(String),

    #[error("Unknown protocol")]
    ProtocolUnknown,

    #[error("Unknown radar")]
    RadarUnknown,

    #[error("Unknown channel")]
    ChannelUnknown,

    #[error("Unknown device")]
    DeviceUnknown,

    #[error("Unknown device ui")]
    DeviceUiUnknown,

    #[error("Unknown firmware")]
    FirmwareUnknown,

    #[error("Unknown telemetry session")]
    TmSessionUnknown,

    #[error("Device and channel protocols differ")]
    ProtocolsShouldBeSame,

    #[error("Channel protocol is not shareable and the channel is in use")]
    ChannelCantShare,

    #[error("Can't join device and channel: {0}")]
    CantJoin(String),

    #[error("Can't register: {0}")]
    CantRegister(String),

    #[error("Can't update: {0}")]
    CantUpdate(String),

    #[error("Can't unregister: {0}")]
    CantUnRegister(String),

    #[error("Can't get: {0}")]
    CantGet(String),

    #[error("Not implemented")]
    NotImplemented,

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Registry service stopped")]
    ServiceStopped,
}

/// Flat classification of [`Error`], stable for matching and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    InconsistentData,
    ProtocolUnknown,
    RadarUnknown,
    ChannelUnknown,
    DeviceUnknown,
    DeviceUiUnknown,
    FirmwareUnknown,
    TmSessionUnknown,
    ProtocolsShouldBeSame,
    ChannelCantShare,
    CantJoin,
    CantRegister,
    CantUpdate,
    CantUnRegister,
    CantGet,
    NotImplemented,
    InvalidName,
    ServiceStopped,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound => ErrorKind::NotFound,
            Error::InconsistentData(_) => ErrorKind::InconsistentData,
            Error::ProtocolUnknown => ErrorKind::ProtocolUnknown,
            Error::RadarUnknown => ErrorKind::RadarUnknown,
            Error::ChannelUnknown => ErrorKind::ChannelUnknown,
            Error::DeviceUnknown => ErrorKind::DeviceUnknown,
            Error::DeviceUiUnknown => ErrorKind::DeviceUiUnknown,
            Error::FirmwareUnknown => ErrorKind::FirmwareUnknown,
            Error::TmSessionUnknown => ErrorKind::TmSessionUnknown,
            Error::ProtocolsShouldBeSame => ErrorKind::ProtocolsShouldBeSame,
            Error::ChannelCantShare => ErrorKind::ChannelCantShare,
            Error::CantJoin(_) => ErrorKind::CantJoin,
            Error::CantRegister(_) => ErrorKind::CantRegister,
            Error::CantUpdate(_) => ErrorKind::CantUpdate,
            Error::CantUnRegister(_) => ErrorKind::CantUnRegister,
            Error::CantGet(_) => ErrorKind::CantGet,
            Error::NotImplemented => ErrorKind::NotImplemented,
            Error::InvalidName(_) => ErrorKind::InvalidName,
            Error::ServiceStopped => ErrorKind::ServiceStopped,
        }
    }
}

/// Read-path store failures surface as `CantGet`; write paths map explicitly.
impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Error::CantGet(e.to_string())
    }
}
