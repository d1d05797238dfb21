use crate::error::TransportError;
use crate::peer::media::LocalTrack;
use crate::peer::types::{
    ConnectionState, NetworkCandidate, RemoteStream, ServerConfig, SessionDescription,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// События от транспорта (наблюдатели peer connection)
#[derive(Debug, Clone)]
pub enum TransportEventKind {
    LocalCandidate(NetworkCandidate),
    RemoteStream(RemoteStream),
    StateChanged(ConnectionState),
}

/// Событие с эпохой соединения, которое его породило
#[derive(Debug, Clone)]
pub struct TransportEvent {
    pub epoch: u64,
    pub kind: TransportEventKind,
}

/// Отправитель событий для одного соединения
#[derive(Debug, Clone)]
pub struct EventSender {
    epoch: u64,
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl EventSender {
    pub fn new(epoch: u64, tx: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self { epoch, tx }
    }

    pub fn send(&self, kind: TransportEventKind) {
        // получатель пропал только после остановки координатора
        let _ = self.tx.send(TransportEvent {
            epoch: self.epoch,
            kind,
        });
    }
}

/// Один peer connection
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn add_track(&self, track: &LocalTrack) -> Result<(), TransportError>;
    async fn create_offer(&self) -> Result<SessionDescription, TransportError>;
    async fn create_answer(&self) -> Result<SessionDescription, TransportError>;
    async fn set_local_description(&self, desc: SessionDescription)
        -> Result<(), TransportError>;
    async fn set_remote_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), TransportError>;
    async fn add_ice_candidate(&self, candidate: NetworkCandidate) -> Result<(), TransportError>;
    fn connection_state(&self) -> ConnectionState;
    async fn close(&self) -> Result<(), TransportError>;
}

/// Создаёт peer connection и подключает наблюдателей к `events`
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn connect(
        &self,
        ice_servers: &[ServerConfig],
        events: EventSender,
    ) -> Result<Arc<dyn PeerTransport>, TransportError>;
}
