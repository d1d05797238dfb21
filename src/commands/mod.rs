//! Намерения, доступные слою представления.

mod call_api;
mod media_api;
mod util_api;

use crate::config::CallConfig;
use crate::peer::connection::ConnectionManager;
use crate::peer::media::{MediaDevices, MediaSink};
use crate::peer::transport::TransportFactory;
use crate::peer::types::ConnectionState;
use crate::relay::{RelayChannel, RelayInbox};
use crate::signaling::{CoordinatorInbox, Intent, SignalingCoordinator, SignalingState};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Всё, что нужно клиенту звонка извне
pub struct CallDeps {
    pub config: CallConfig,
    pub relay: Arc<dyn RelayChannel>,
    pub relay_inbox: RelayInbox,
    pub transport: Arc<dyn TransportFactory>,
    pub devices: Arc<dyn MediaDevices>,
    pub local_sink: Arc<dyn MediaSink>,
    pub remote_sink: Arc<dyn MediaSink>,
}

/// Ручка UI: четыре намерения плюс статус
#[derive(Clone)]
pub struct CallHandle {
    manager: Arc<ConnectionManager>,
    intents: mpsc::UnboundedSender<Intent>,
    status: watch::Receiver<ConnectionState>,
    signaling: watch::Receiver<SignalingState>,
    local_sink: Arc<dyn MediaSink>,
    remote_sink: Arc<dyn MediaSink>,
}

impl CallHandle {
    /// Запускает координатор в отдельной задаче
    pub fn spawn(deps: CallDeps) -> (CallHandle, JoinHandle<()>) {
        let (coordinator, handle, inbox) = Self::build(deps);
        let task = tokio::spawn(coordinator.run(inbox));
        (handle, task)
    }

    pub(crate) fn build(deps: CallDeps) -> (SignalingCoordinator, CallHandle, CoordinatorInbox) {
        let (manager, transport_rx) = ConnectionManager::new(
            deps.transport,
            deps.devices,
            deps.config.ice_servers.clone(),
            deps.config.media,
        );
        let manager = Arc::new(manager);
        let coordinator = SignalingCoordinator::new(
            deps.config.endpoint_id.clone(),
            manager.clone(),
            deps.relay,
            deps.local_sink.clone(),
            deps.remote_sink.clone(),
        );
        let (intents, intents_rx) = mpsc::unbounded_channel();

        let handle = CallHandle {
            manager,
            intents,
            status: coordinator.subscribe_status(),
            signaling: coordinator.subscribe_state(),
            local_sink: deps.local_sink,
            remote_sink: deps.remote_sink,
        };
        let inbox = CoordinatorInbox {
            intents: intents_rx,
            relay: deps.relay_inbox,
            transport: transport_rx,
        };
        (coordinator, handle, inbox)
    }
}
