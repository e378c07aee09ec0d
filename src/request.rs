//! Typed requests and responses understood by the registry hub
//!
//! Every entity kind shares the same request shape ([`EntityRequest`]);
//! the type parameters pick what a kind accepts for updates (`U`) and for
//! local-key lookups (`L`).

use crate::kind::EntityKind;
use crate::model::{
    ChannelDescription, DeviceDescription, DeviceUiDescription, DeviceUpdate, FirmwareDescription,
    ProtocolDescription, ProtocolId, ProtocolValue, RadarDescription, TmSessionDescription,
};
use crate::name::{Channel, Device, DeviceUi, Firmware, Protocol, Radar, TmSession};
use crate::provider::ProtocolProvider;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum EntityRequest<N, D, U = D, L = ()> {
    /// Names of every object
    List,
    /// One object by name
    Description(N),
    /// One object by its local key
    DescriptionS(L),
    /// Every object, decoded
    DescriptionList,
    /// Create a new object; any name in the description is ignored
    Register(D),
    Update(U),
    UnRegister(N),
}

impl<N, D, U, L> EntityRequest<N, D, U, L> {
    pub fn label(&self) -> &'static str {
        match self {
            EntityRequest::List => "list",
            EntityRequest::Description(_) => "description",
            EntityRequest::DescriptionS(_) => "description_s",
            EntityRequest::DescriptionList => "description_list",
            EntityRequest::Register(_) => "register",
            EntityRequest::Update(_) => "update",
            EntityRequest::UnRegister(_) => "unregister",
        }
    }
}

#[derive(Debug, Clone)]
pub enum EntityResponse<N, D> {
    List(Vec<N>),
    Description(D),
    DescriptionList(Vec<D>),
    Done,
}

pub type ChannelRequest = EntityRequest<Channel, ChannelDescription>;
pub type DeviceRequest = EntityRequest<Device, DeviceDescription, DeviceUpdate>;
pub type ProtocolRequest = EntityRequest<Protocol, ProtocolDescription>;
pub type RadarRequest = EntityRequest<Radar, RadarDescription, RadarDescription, String>;
pub type FirmwareRequest = EntityRequest<Firmware, FirmwareDescription, FirmwareDescription, ProtocolValue>;
pub type DeviceUiRequest = EntityRequest<DeviceUi, DeviceUiDescription, DeviceUiDescription, ProtocolValue>;
pub type TmSessionRequest = EntityRequest<TmSession, TmSessionDescription>;

pub type ChannelResponse = EntityResponse<Channel, Arc<ChannelDescription>>;
pub type DeviceResponse = EntityResponse<Device, Arc<DeviceDescription>>;
pub type ProtocolResponse = EntityResponse<Protocol, Arc<ProtocolDescription>>;
pub type RadarResponse = EntityResponse<Radar, Arc<RadarDescription>>;
pub type FirmwareResponse = EntityResponse<Firmware, Arc<FirmwareDescription>>;
pub type DeviceUiResponse = EntityResponse<DeviceUi, Arc<DeviceUiDescription>>;
pub type TmSessionResponse = EntityResponse<TmSession, Arc<TmSessionDescription>>;

pub enum Request {
    Channel(ChannelRequest),
    Device(DeviceRequest),
    Protocol(ProtocolRequest),
    Radar(RadarRequest),
    Firmware(FirmwareRequest),
    DeviceUi(DeviceUiRequest),
    TmSession(TmSessionRequest),
    /// Join (`connect: true`) or detach a device and a channel
    DeviceConnect {
        device: Device,
        channel: Channel,
        connect: bool,
    },
    /// Create and/or link a device and a channel atomically; a nil name
    /// means "create this one"
    RegisterChannelAndDevice {
        device: DeviceDescription,
        channel: ChannelDescription,
    },
    /// Register protocols from a (re)loaded provider
    UpdatePlugins(Arc<dyn ProtocolProvider>),
    /// Reconcile telemetry sessions with the sessions directory
    SyncSessions,
    /// Row count per entity kind
    Stats,
}

impl Request {
    pub fn label(&self) -> String {
        match self {
            Request::Channel(r) => format!("channel.{}", r.label()),
            Request::Device(r) => format!("device.{}", r.label()),
            Request::Protocol(r) => format!("protocol.{}", r.label()),
            Request::Radar(r) => format!("radar.{}", r.label()),
            Request::Firmware(r) => format!("firmware.{}", r.label()),
            Request::DeviceUi(r) => format!("device_ui.{}", r.label()),
            Request::TmSession(r) => format!("tm_session.{}", r.label()),
            Request::DeviceConnect { connect: true, .. } => "device.connect".to_string(),
            Request::DeviceConnect { connect: false, .. } => "device.disconnect".to_string(),
            Request::RegisterChannelAndDevice { .. } => "advanced.register_channel_and_device".to_string(),
            Request::UpdatePlugins(_) => "plugins.update".to_string(),
            Request::SyncSessions => "tm_session.sync".to_string(),
            Request::Stats => "stats".to_string(),
        }
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Request({})", self.label())
    }
}

#[derive(Debug, Clone)]
pub enum Response {
    Channel(ChannelResponse),
    Device(DeviceResponse),
    Protocol(ProtocolResponse),
    Radar(RadarResponse),
    Firmware(FirmwareResponse),
    DeviceUi(DeviceUiResponse),
    TmSession(TmSessionResponse),
    Connected,
    ChannelAndDevice {
        protocol_id: ProtocolId,
        channel: Arc<ChannelDescription>,
    },
    PluginsUpdated(usize),
    SessionsSynced,
    Stats(Vec<(EntityKind, usize)>),
}
