//! Registry service - single-writer worker around a [`RegistryHub`]
//!
//! - the hub lives on a dedicated OS thread (`mccdb-registry`)
//! - callers talk to it through cloneable [`RegistryHandle`]s over a bounded mailbox
//! - each request carries a oneshot reply channel
//! - notifications are broadcast and observed with [`RegistryHandle::subscribe`]
//!
//! Requests run one at a time in arrival order. The worker exits once every
//! handle has been dropped.

use crate::hub::RegistryHub;
use crate::kind::EntityKind;
use crate::name::{Channel, Device, DeviceUi, EntityName, Firmware, Protocol, Radar, TmSession};
use crate::notify::{AnyDescription, Notification, Notifier};
use crate::request::{EntityRequest, EntityResponse, Request, Response};
use crate::{Error, Result};
use std::thread::JoinHandle;
use tokio::sync::{broadcast, mpsc, oneshot};

struct Envelope {
    request: Request,
    reply: oneshot::Sender<Result<Response>>,
}

/// The running worker thread
pub struct RegistryService {
    thread: JoinHandle<()>,
}

impl RegistryService {
    /// Move `hub` onto its worker thread
    pub fn spawn(hub: RegistryHub, mailbox_capacity: usize) -> std::io::Result<(Self, RegistryHandle)> {
        let (tx, rx) = mpsc::channel(mailbox_capacity.max(1));
        let notifier = hub.notifier().clone();

        let thread = std::thread::Builder::new()
            .name("mccdb-registry".to_string())
            .spawn(move || run(hub, rx))?;

        Ok((Self { thread }, RegistryHandle { tx, notifier }))
    }

    /// Wait for the worker to drain its mailbox and exit
    pub fn join(self) {
        if self.thread.join().is_err() {
            tracing::error!("registry worker panicked");
        }
    }
}

fn run(mut hub: RegistryHub, mut rx: mpsc::Receiver<Envelope>) {
    tracing::debug!("registry worker started");
    while let Some(envelope) = rx.blocking_recv() {
        let result = hub.handle(envelope.request);
        // The caller may have given up waiting
        let _ = envelope.reply.send(result);
    }
    tracing::debug!("registry worker stopped");
}

#[derive(Clone)]
pub struct RegistryHandle {
    tx: mpsc::Sender<Envelope>,
    notifier: Notifier,
}

impl RegistryHandle {
    /// Send one request and wait for its response
    pub async fn request(&self, request: Request) -> Result<Response> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Envelope { request, reply })
            .await
            .map_err(|_| Error::ServiceStopped)?;
        rx.await.map_err(|_| Error::ServiceStopped)?
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }

    pub async fn stats(&self) -> Result<Vec<(EntityKind, usize)>> {
        match self.request(Request::Stats).await? {
            Response::Stats(stats) => Ok(stats),
            other => Err(unexpected(other)),
        }
    }

    pub async fn sync_sessions(&self) -> Result<()> {
        match self.request(Request::SyncSessions).await? {
            Response::SessionsSynced => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Every object of `kind`
    pub async fn describe_all(&self, kind: EntityKind) -> Result<Vec<AnyDescription>> {
        let request = match kind {
            EntityKind::Channel => Request::Channel(EntityRequest::DescriptionList),
            EntityKind::Device => Request::Device(EntityRequest::DescriptionList),
            EntityKind::Protocol => Request::Protocol(EntityRequest::DescriptionList),
            EntityKind::Radar => Request::Radar(EntityRequest::DescriptionList),
            EntityKind::Firmware => Request::Firmware(EntityRequest::DescriptionList),
            EntityKind::DeviceUi => Request::DeviceUi(EntityRequest::DescriptionList),
            EntityKind::TmSession => Request::TmSession(EntityRequest::DescriptionList),
        };

        let all = match self.request(request).await? {
            Response::Channel(EntityResponse::DescriptionList(v)) => v.into_iter().map(AnyDescription::Channel).collect(),
            Response::Device(EntityResponse::DescriptionList(v)) => v.into_iter().map(AnyDescription::Device).collect(),
            Response::Protocol(EntityResponse::DescriptionList(v)) => {
                v.into_iter().map(AnyDescription::Protocol).collect()
            }
            Response::Radar(EntityResponse::DescriptionList(v)) => v.into_iter().map(AnyDescription::Radar).collect(),
            Response::Firmware(EntityResponse::DescriptionList(v)) => {
                v.into_iter().map(AnyDescription::Firmware).collect()
            }
            Response::DeviceUi(EntityResponse::DescriptionList(v)) => {
                v.into_iter().map(AnyDescription::DeviceUi).collect()
            }
            Response::TmSession(EntityResponse::DescriptionList(v)) => {
                v.into_iter().map(AnyDescription::TmSession).collect()
            }
            other => return Err(unexpected(other)),
        };
        Ok(all)
    }

    /// One object of `kind` by its name text
    pub async fn describe(&self, kind: EntityKind, name: &str) -> Result<AnyDescription> {
        let request = match kind {
            EntityKind::Channel => Request::Channel(EntityRequest::Description(Channel::parse(name)?)),
            EntityKind::Device => Request::Device(EntityRequest::Description(Device::parse(name)?)),
            EntityKind::Protocol => Request::Protocol(EntityRequest::Description(Protocol::parse(name)?)),
            EntityKind::Radar => Request::Radar(EntityRequest::Description(Radar::parse(name)?)),
            EntityKind::Firmware => Request::Firmware(EntityRequest::Description(Firmware::parse(name)?)),
            EntityKind::DeviceUi => Request::DeviceUi(EntityRequest::Description(DeviceUi::parse(name)?)),
            EntityKind::TmSession => Request::TmSession(EntityRequest::Description(TmSession::parse(name)?)),
        };

        match self.request(request).await? {
            Response::Channel(EntityResponse::Description(d)) => Ok(AnyDescription::Channel(d)),
            Response::Device(EntityResponse::Description(d)) => Ok(AnyDescription::Device(d)),
            Response::Protocol(EntityResponse::Description(d)) => Ok(AnyDescription::Protocol(d)),
            Response::Radar(EntityResponse::Description(d)) => Ok(AnyDescription::Radar(d)),
            Response::Firmware(EntityResponse::Description(d)) => Ok(AnyDescription::Firmware(d)),
            Response::DeviceUi(EntityResponse::Description(d)) => Ok(AnyDescription::DeviceUi(d)),
            Response::TmSession(EntityResponse::Description(d)) => Ok(AnyDescription::TmSession(d)),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(response: Response) -> Error {
    Error::InconsistentData(format!("unexpected response {:?}", response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChannelDescription, RadarDescription};
    use crate::registry::testing;
    use crate::request::RadarRequest;

    #[tokio::test]
    async fn test_request_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let (service, handle) = RegistryService::spawn(testing::hub(dir.path()), 4).unwrap();

        let response = handle
            .request(Request::Radar(RadarRequest::Register(RadarDescription::new("north", "10.0.0.1"))))
            .await
            .unwrap();
        let Response::Radar(EntityResponse::Description(radar)) = response else {
            panic!("unexpected response");
        };

        let found = handle.describe(EntityKind::Radar, &radar.name.to_string()).await.unwrap();
        assert!(matches!(found, AnyDescription::Radar(r) if r == radar));
        assert_eq!(handle.describe_all(EntityKind::Protocol).await.unwrap().len(), 2);

        drop(handle);
        service.join();
    }

    #[tokio::test]
    async fn test_notifications_reach_subscribers() {
        let dir = tempfile::tempdir().unwrap();
        let (service, handle) = RegistryService::spawn(testing::hub(dir.path()), 4).unwrap();
        let mut rx = handle.subscribe();

        let channel = ChannelDescription::new(testing::shareable_protocol().name, "udp://:14550");
        handle
            .request(Request::Channel(EntityRequest::Register(channel)))
            .await
            .unwrap();

        let note = rx.recv().await.unwrap();
        assert!(matches!(note, Notification::Registered { kind: EntityKind::Channel, registered: true, .. }));

        drop(handle);
        service.join();
    }

    #[tokio::test]
    async fn test_requests_from_many_handles_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let (service, handle) = RegistryService::spawn(testing::hub(dir.path()), 2).unwrap();

        let mut tasks = Vec::new();
        for i in 0..16 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                handle
                    .request(Request::Radar(RadarRequest::Register(RadarDescription::new(format!("r{i}"), ""))))
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let stats = handle.stats().await.unwrap();
        assert!(stats.contains(&(EntityKind::Radar, 16)));

        drop(handle);
        service.join();
    }

    #[tokio::test]
    async fn test_errors_are_returned_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (service, handle) = RegistryService::spawn(testing::hub(dir.path()), 4).unwrap();

        let err = handle
            .describe(EntityKind::Device, &Device::generate().to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound));
        let err = handle.describe(EntityKind::Device, "not-a-uuid").await.unwrap_err();
        assert!(matches!(err, Error::InvalidName(_)));

        // The worker keeps serving after failures
        handle.sync_sessions().await.unwrap();

        drop(handle);
        service.join();
    }
}
