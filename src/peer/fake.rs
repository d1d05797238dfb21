//! Сценарный транспорт для тестов: без сокетов, все действия записываются.

use crate::error::TransportError;
use crate::peer::media::{LocalTrack, MediaSink, RenderSource};
use crate::peer::transport::{EventSender, PeerTransport, TransportEventKind, TransportFactory};
use crate::peer::types::{
    ConnectionState, NetworkCandidate, RemoteStream, ServerConfig, SessionDescription, TrackKind,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub struct FakeTransport {
    pub id: usize,
    events: EventSender,
    tracks: Mutex<Vec<String>>,
    local: Mutex<Option<SessionDescription>>,
    remote: Mutex<Option<SessionDescription>>,
    applied: Mutex<Vec<NetworkCandidate>>,
    state: Mutex<ConnectionState>,
    close_calls: AtomicUsize,
    /// кандидаты, которые «находятся» после set_local_description
    gathered: Vec<NetworkCandidate>,
}

impl FakeTransport {
    pub fn tracks(&self) -> Vec<String> {
        self.tracks.lock().unwrap().clone()
    }

    pub fn local_description(&self) -> Option<SessionDescription> {
        self.local.lock().unwrap().clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.remote.lock().unwrap().clone()
    }

    pub fn applied_candidates(&self) -> Vec<NetworkCandidate> {
        self.applied.lock().unwrap().clone()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Транспорт сообщает новое состояние
    pub fn simulate_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap() = state;
        self.events.send(TransportEventKind::StateChanged(state));
    }

    /// Пришёл удалённый трек
    pub fn simulate_remote_track(&self, stream_id: &str, kind: TrackKind) {
        self.events
            .send(TransportEventKind::RemoteStream(RemoteStream {
                stream_id: stream_id.to_string(),
                track_id: format!("{stream_id}-{kind}"),
                kind,
                track: None,
            }));
    }

    fn describe(&self, kind: &str) -> String {
        format!(
            "v=0\r\ns=fake-{kind}-{}\r\na=tracks:{}\r\n",
            self.id,
            self.tracks.lock().unwrap().join(",")
        )
    }
}

#[async_trait]
impl PeerTransport for FakeTransport {
    async fn add_track(&self, track: &LocalTrack) -> Result<(), TransportError> {
        self.tracks.lock().unwrap().push(track.id().to_string());
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, TransportError> {
        tokio::task::yield_now().await;
        Ok(SessionDescription::offer(self.describe("offer")))
    }

    async fn create_answer(&self) -> Result<SessionDescription, TransportError> {
        if self.remote.lock().unwrap().is_none() {
            return Err(TransportError::Rejected("no remote offer".into()));
        }
        tokio::task::yield_now().await;
        Ok(SessionDescription::answer(self.describe("answer")))
    }

    async fn set_local_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), TransportError> {
        *self.local.lock().unwrap() = Some(desc);
        *self.state.lock().unwrap() = ConnectionState::Checking;
        for candidate in &self.gathered {
            self.events
                .send(TransportEventKind::LocalCandidate(candidate.clone()));
        }
        Ok(())
    }

    async fn set_remote_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), TransportError> {
        *self.remote.lock().unwrap() = Some(desc);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: NetworkCandidate) -> Result<(), TransportError> {
        // как и браузер, ранние кандидаты транспорт отвергает
        if self.remote.lock().unwrap().is_none() {
            return Err(TransportError::Rejected(
                "remote description not set".into(),
            ));
        }
        self.applied.lock().unwrap().push(candidate);
        Ok(())
    }

    fn connection_state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        *self.state.lock().unwrap() = ConnectionState::Closed;
        Ok(())
    }
}

/// Фабрика, запоминающая все созданные транспорты
#[derive(Default)]
pub struct FakeFactory {
    created: Mutex<Vec<Arc<FakeTransport>>>,
    /// сколько локальных кандидатов выдаёт каждое соединение
    candidates_per_connection: usize,
    /// кандидат, найденный ещё внутри connect()
    early_candidate: Option<NetworkCandidate>,
    /// connect() ждёт этого сигнала перед возвратом
    gate: Option<Arc<Notify>>,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_candidates(mut self, n: usize) -> Self {
        self.candidates_per_connection = n;
        self
    }

    pub fn with_gate(mut self, candidate: NetworkCandidate, gate: Arc<Notify>) -> Self {
        self.early_candidate = Some(candidate);
        self.gate = Some(gate);
        self
    }

    pub fn created(&self) -> Vec<Arc<FakeTransport>> {
        self.created.lock().unwrap().clone()
    }

    pub fn last(&self) -> Arc<FakeTransport> {
        self.created
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no transport created")
    }
}

#[async_trait]
impl TransportFactory for FakeFactory {
    async fn connect(
        &self,
        _ice_servers: &[ServerConfig],
        events: EventSender,
    ) -> Result<Arc<dyn PeerTransport>, TransportError> {
        let id = self.created.lock().unwrap().len();
        let gathered = (0..self.candidates_per_connection)
            .map(|n| {
                NetworkCandidate::new(
                    format!("candidate:{id}{n} 1 UDP 2130706431 10.0.{id}.{n} 4000{n} typ host"),
                    Some("0"),
                    Some(0),
                )
            })
            .collect();

        let transport = Arc::new(FakeTransport {
            id,
            events,
            tracks: Mutex::new(Vec::new()),
            local: Mutex::new(None),
            remote: Mutex::new(None),
            applied: Mutex::new(Vec::new()),
            state: Mutex::new(ConnectionState::New),
            close_calls: AtomicUsize::new(0),
            gathered,
        });

        if let Some(candidate) = &self.early_candidate {
            transport
                .events
                .send(TransportEventKind::LocalCandidate(candidate.clone()));
        }
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        self.created.lock().unwrap().push(transport.clone());
        Ok(transport)
    }
}

/// Sink, запоминающий всё, что ему дали отрисовать
#[derive(Default)]
pub struct RecordingSink {
    rendered: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn rendered(&self) -> Vec<String> {
        self.rendered.lock().unwrap().clone()
    }
}

impl MediaSink for RecordingSink {
    fn render(&self, source: RenderSource) {
        let label = match source {
            RenderSource::Local(media) => format!("local:{}", media.stream_id()),
            RenderSource::Remote(stream) => format!("remote:{}", stream.stream_id),
        };
        self.rendered.lock().unwrap().push(label);
    }
}
