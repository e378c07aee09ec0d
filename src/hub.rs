//! Registry hub - owns the store, the registries and the notifier
//!
//! The hub is the synchronous core: [`RegistryHub::handle`] runs one
//! [`Request`] to completion. Concurrency lives one level up, in
//! [`crate::service`], which moves the hub onto its own thread.

use crate::config::{RegistryConfig, ensure_db_dir};
use crate::kind::EntityKind;
use crate::notify::{Notification, Notifier};
use crate::provider::{ProtocolProvider, StaticProtocols};
use crate::registry::advanced::register_channel_and_device;
use crate::registry::{
    CachedRegistry, ChannelRegistry, Ctx, DeviceRegistry, DeviceUiRegistry, EntityCodec, FirmwareRegistry,
    ProtocolRegistry, RadarRegistry, TmSessionRegistry,
};
use crate::request::{EntityRequest, EntityResponse, Request, Response};
use crate::storage::schema::BUNDLED_SCHEMA;
use crate::storage::{RelationalStore, StoreResult};
use crate::{Error, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;

/// One registry per entity kind
pub struct Registries {
    pub channel: ChannelRegistry,
    pub device: DeviceRegistry,
    pub protocol: ProtocolRegistry,
    pub radar: RadarRegistry,
    pub firmware: FirmwareRegistry,
    pub device_ui: DeviceUiRegistry,
    pub tm_session: TmSessionRegistry,
}

impl Registries {
    pub fn new(sessions_dir: &Path) -> Self {
        Self {
            channel: ChannelRegistry::with_defaults(),
            device: DeviceRegistry::with_defaults(),
            protocol: ProtocolRegistry::with_defaults(),
            radar: RadarRegistry::with_defaults(),
            firmware: FirmwareRegistry::with_defaults(),
            device_ui: DeviceUiRegistry::with_defaults(),
            tm_session: TmSessionRegistry::with_sessions_dir(sessions_dir),
        }
    }
}

pub struct RegistryHub {
    store: RelationalStore,
    notifier: Notifier,
    registries: Registries,
}

impl RegistryHub {
    /// Open the configured database, register configured protocols and
    /// reconcile sessions with the sessions directory.
    ///
    /// Schema problems are returned as fatal [`crate::StoreError`]s; nothing is
    /// written in that case.
    pub fn open(config: &RegistryConfig) -> StoreResult<Self> {
        ensure_db_dir(&config.database)?;
        std::fs::create_dir_all(&config.sessions_dir)?;

        let store = match &config.schema {
            Some(schema) => RelationalStore::open(&config.database, schema)?,
            None => RelationalStore::open_with_schema(&config.database, BUNDLED_SCHEMA)?,
        };
        tracing::info!("Opened {} (schema {})", config.database.display(), short_hash(store.schema_hash()));

        let mut hub = Self::with_store(store, Notifier::new(config.notification_capacity), &config.sessions_dir);
        if !config.protocols.is_empty() {
            hub.update_plugins(Arc::new(StaticProtocols::new(config.protocols.clone())));
        }
        hub.startup_sync();
        Ok(hub)
    }

    /// In-memory store with the bundled schema (for testing)
    pub fn open_in_memory(sessions_dir: &Path) -> StoreResult<Self> {
        let store = RelationalStore::open_in_memory(BUNDLED_SCHEMA)?;
        let mut hub = Self::with_store(store, Notifier::default(), sessions_dir);
        hub.startup_sync();
        Ok(hub)
    }

    fn with_store(store: RelationalStore, notifier: Notifier, sessions_dir: &Path) -> Self {
        Self {
            store,
            notifier,
            registries: Registries::new(sessions_dir),
        }
    }

    fn startup_sync(&mut self) {
        if let Err(e) = self.sync_sessions() {
            tracing::warn!("session sync failed: {}", e);
        }
    }

    pub fn store(&self) -> &RelationalStore {
        &self.store
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }

    /// Lend the store and notifier alongside mutable registries
    pub fn split(&mut self) -> (Ctx<'_>, &mut Registries) {
        (Ctx::new(&self.store, &self.notifier), &mut self.registries)
    }

    // ========== Direct operations ==========

    /// Register the provider's protocols and use it for firmware checks
    pub fn update_plugins(&mut self, provider: Arc<dyn ProtocolProvider>) -> usize {
        let (ctx, regs) = self.split();
        let added = regs.protocol.update_plugins(&ctx, provider.as_ref());
        regs.firmware.set_provider(provider);
        added
    }

    pub fn sync_sessions(&mut self) -> Result<()> {
        let (ctx, regs) = self.split();
        let folders = regs.tm_session.scan_dirs()?;
        regs.tm_session.sync(&ctx, &folders)
    }

    /// Row count per entity kind
    pub fn stats(&self) -> Result<Vec<(EntityKind, usize)>> {
        EntityKind::all()
            .iter()
            .map(|kind| Ok((*kind, self.store.count(kind.table())?)))
            .collect()
    }

    // ========== Dispatch ==========

    pub fn handle(&mut self, request: Request) -> Result<Response> {
        let label = request.label();
        let result = self.dispatch(request);
        match &result {
            Ok(_) => tracing::debug!("{} ok", label),
            Err(e) => tracing::debug!("{} failed: {}", label, e),
        }
        result
    }

    fn dispatch(&mut self, request: Request) -> Result<Response> {
        let request = match request {
            Request::UpdatePlugins(provider) => return Ok(Response::PluginsUpdated(self.update_plugins(provider))),
            Request::SyncSessions => {
                self.sync_sessions()?;
                return Ok(Response::SessionsSynced);
            }
            Request::Stats => return Ok(Response::Stats(self.stats()?)),
            other => other,
        };

        let (ctx, regs) = self.split();
        let ctx = &ctx;

        match request {
            Request::Channel(r) => {
                let response = match r {
                    EntityRequest::Register(d) => EntityResponse::Description(regs.channel.register(ctx, &d)?),
                    EntityRequest::Update(d) => EntityResponse::Description(regs.channel.update(ctx, &d)?),
                    EntityRequest::UnRegister(name) => {
                        regs.channel.unregister(ctx, &mut regs.device, &name)?;
                        EntityResponse::Done
                    }
                    EntityRequest::DescriptionS(()) => return Err(Error::NotImplemented),
                    read => read_request(ctx, &mut regs.channel, read)?,
                };
                Ok(Response::Channel(response))
            }
            Request::Device(r) => {
                let response = match r {
                    EntityRequest::Register(d) => EntityResponse::Description(regs.device.register(ctx, &d)?),
                    EntityRequest::Update(u) => EntityResponse::Description(regs.device.update(ctx, &u)?),
                    EntityRequest::UnRegister(name) => {
                        regs.device.unregister(ctx, &mut regs.channel, &name)?;
                        EntityResponse::Done
                    }
                    EntityRequest::DescriptionS(()) => return Err(Error::NotImplemented),
                    read => read_request(ctx, &mut regs.device, read)?,
                };
                Ok(Response::Device(response))
            }
            Request::Protocol(r) => {
                let response = match r {
                    EntityRequest::Register(d) => EntityResponse::Description(regs.protocol.register(ctx, &d)?),
                    EntityRequest::Update(_) | EntityRequest::UnRegister(_) | EntityRequest::DescriptionS(()) => {
                        return Err(Error::NotImplemented);
                    }
                    read => read_request(ctx, &mut regs.protocol, read)?,
                };
                Ok(Response::Protocol(response))
            }
            Request::Radar(r) => {
                let response = match r {
                    EntityRequest::Register(d) => EntityResponse::Description(regs.radar.register(ctx, &d)?),
                    EntityRequest::Update(d) => EntityResponse::Description(regs.radar.update(ctx, &d)?),
                    EntityRequest::UnRegister(name) => {
                        regs.radar.unregister(ctx, &mut regs.channel, &name)?;
                        EntityResponse::Done
                    }
                    EntityRequest::DescriptionS(info) => {
                        EntityResponse::Description(regs.radar.by_local(ctx.store, &info)?)
                    }
                    read => read_request(ctx, &mut regs.radar, read)?,
                };
                Ok(Response::Radar(response))
            }
            Request::Firmware(r) => {
                let response = match r {
                    EntityRequest::Register(d) => {
                        EntityResponse::Description(regs.firmware.register_payload(ctx, &d)?)
                    }
                    EntityRequest::Update(_) => return Err(Error::NotImplemented),
                    EntityRequest::UnRegister(name) => {
                        regs.firmware.unregister_payload(ctx, &mut regs.device, &name)?;
                        EntityResponse::Done
                    }
                    EntityRequest::DescriptionS(local) => {
                        EntityResponse::Description(regs.firmware.get_by_local(ctx.store, &local)?)
                    }
                    read => read_request(ctx, &mut regs.firmware, read)?,
                };
                Ok(Response::Firmware(response))
            }
            Request::DeviceUi(r) => {
                let response = match r {
                    EntityRequest::Register(d) => {
                        EntityResponse::Description(regs.device_ui.register_payload(ctx, &d)?)
                    }
                    EntityRequest::Update(_) => return Err(Error::NotImplemented),
                    EntityRequest::UnRegister(name) => {
                        regs.device_ui.unregister_payload(ctx, &mut regs.device, &name)?;
                        EntityResponse::Done
                    }
                    EntityRequest::DescriptionS(local) => {
                        EntityResponse::Description(regs.device_ui.get_by_local(ctx.store, &local)?)
                    }
                    read => read_request(ctx, &mut regs.device_ui, read)?,
                };
                Ok(Response::DeviceUi(response))
            }
            Request::TmSession(r) => {
                let response = match r {
                    EntityRequest::Register(d) => EntityResponse::Description(regs.tm_session.open_session(ctx, &d.info)?),
                    EntityRequest::Update(d) => EntityResponse::Description(regs.tm_session.update(ctx, &d)?),
                    EntityRequest::UnRegister(name) => {
                        regs.tm_session.unregister(ctx, &name)?;
                        EntityResponse::Done
                    }
                    EntityRequest::DescriptionS(()) => return Err(Error::NotImplemented),
                    read => read_request(ctx, &mut regs.tm_session, read)?,
                };
                Ok(Response::TmSession(response))
            }
            Request::DeviceConnect { device, channel, connect } => {
                regs.device
                    .connect(ctx, &mut regs.channel, &mut regs.protocol, &device, &channel, connect)?;
                Ok(Response::Connected)
            }
            Request::RegisterChannelAndDevice { device, channel } => {
                let (protocol_id, channel) = register_channel_and_device(ctx, regs, &device, &channel)?;
                Ok(Response::ChannelAndDevice { protocol_id, channel })
            }
            Request::UpdatePlugins(_) | Request::SyncSessions | Request::Stats => Err(Error::NotImplemented),
        }
    }
}

/// Requests every kind answers the same way: List, Description, DescriptionList
fn read_request<C: EntityCodec, U, L>(
    ctx: &Ctx<'_>,
    registry: &mut CachedRegistry<C>,
    request: EntityRequest<C::Name, C::Description, U, L>,
) -> Result<EntityResponse<C::Name, Arc<C::Description>>> {
    match request {
        EntityRequest::List => Ok(EntityResponse::List(registry.get_list(ctx.store)?)),
        EntityRequest::Description(name) => Ok(EntityResponse::Description(registry.get_one(ctx.store, &name, false)?.1)),
        EntityRequest::DescriptionList => Ok(EntityResponse::DescriptionList(registry.get_all(ctx.store)?)),
        other => {
            tracing::warn!("{} request reached the read path", other.label());
            Err(Error::NotImplemented)
        }
    }
}

fn short_hash(hash: &str) -> &str {
    hash.get(..16).unwrap_or(hash)
}
