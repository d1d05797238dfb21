use crate::error::{CallError, TransportError};
use crate::logger::dump_candidate;
use crate::peer::ice::{candidate_type, CandidateOutcome};
use crate::peer::media::{LocalMediaSource, MediaConstraints, MediaDevices, MediaSink, RenderSource};
use crate::peer::transport::{EventSender, PeerTransport, TransportEvent, TransportFactory};
use crate::peer::types::{
    ConnectionState, NetworkCandidate, RemoteStream, SdpType, ServerConfig, SessionDescription,
    TrackKind,
};
use crate::session::Session;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// Владеет единственной сессией: локальным медиа и peer connection.
///
/// Каждая асинхронная операция запоминает эпоху на старте и проверяет её
/// после каждого `await`. `terminate()` и замена соединения сдвигают эпоху,
/// так что продолжения, проснувшиеся позже, ничего не меняют.
pub struct ConnectionManager {
    factory: Arc<dyn TransportFactory>,
    devices: Arc<dyn MediaDevices>,
    ice_servers: Vec<ServerConfig>,
    constraints: MediaConstraints,
    events: mpsc::UnboundedSender<TransportEvent>,
    session: Mutex<Option<Session>>,
    epoch: AtomicU64,
    terminated: AtomicBool,
}

impl ConnectionManager {
    pub fn new(
        factory: Arc<dyn TransportFactory>,
        devices: Arc<dyn MediaDevices>,
        ice_servers: Vec<ServerConfig>,
        constraints: MediaConstraints,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let manager = Self {
            factory,
            devices,
            ice_servers,
            constraints,
            events,
            session: Mutex::new(Some(Session::new())),
            epoch: AtomicU64::new(0),
            terminated: AtomicBool::new(false),
        };
        (manager, events_rx)
    }

    pub fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Событие или продолжение относится к текущему соединению
    pub fn is_current(&self, epoch: u64) -> bool {
        !self.is_terminated() && self.current_epoch() == epoch
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    fn ensure_current(&self, epoch: u64) -> Result<(), CallError> {
        if self.is_current(epoch) {
            Ok(())
        } else {
            debug!("Operation outlived its session (epoch {epoch}), discarding result");
            Err(CallError::NoConnection)
        }
    }

    pub async fn session_id(&self) -> Option<String> {
        self.session.lock().await.as_ref().map(|s| s.id.clone())
    }

    pub async fn has_connection(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| s.connection.is_some())
    }

    pub async fn local_media(&self) -> Option<LocalMediaSource> {
        self.session
            .lock()
            .await
            .as_ref()
            .and_then(|s| s.local_media.clone())
    }

    /// Состояние текущего транспорта; `Closed`, если сессии уже нет
    pub async fn connection_state(&self) -> ConnectionState {
        match self.connection().await {
            Ok(pc) => pc.connection_state(),
            Err(CallError::NotInitialized(_)) => ConnectionState::New,
            Err(_) => ConnectionState::Closed,
        }
    }

    /// Текущее соединение или ошибка: сессии нет / соединение ещё не создано
    async fn connection(&self) -> Result<Arc<dyn PeerTransport>, CallError> {
        let guard = self.session.lock().await;
        let session = guard.as_ref().ok_or(CallError::NoConnection)?;
        session
            .connection
            .clone()
            .ok_or(CallError::NotInitialized("peer connection"))
    }

    async fn require_connection(&self, op: &'static str) -> Result<Arc<dyn PeerTransport>, CallError> {
        match self.connection().await {
            Err(CallError::NotInitialized(_)) => {
                warn!("{op}: PeerConnection is not initialized. Call create_connection() first.");
                Err(CallError::NotInitialized(op))
            }
            other => other,
        }
    }

    /// Запрашивает аудио и видео у платформы. Повторный вызов возвращает уже
    /// захваченный поток.
    pub async fn acquire_local_media(&self) -> Result<LocalMediaSource, CallError> {
        let epoch = self.current_epoch();
        {
            let guard = self.session.lock().await;
            let session = guard.as_ref().ok_or(CallError::NoConnection)?;
            if let Some(media) = &session.local_media {
                return Ok(media.clone());
            }
        }

        let media = match self.devices.get_user_media(self.constraints).await {
            Ok(media) => media,
            Err(e) => {
                warn!("Error accessing media devices: {e}");
                return Err(e.into());
            }
        };

        let mut guard = self.session.lock().await;
        match guard.as_mut() {
            Some(session) if self.is_current(epoch) => {
                if let Some(existing) = &session.local_media {
                    // параллельный захват успел раньше
                    media.stop();
                    return Ok(existing.clone());
                }
                info!(
                    "Local stream {} acquired with {} tracks",
                    media.stream_id(),
                    media.tracks().len()
                );
                session.local_media = Some(media.clone());
                Ok(media)
            }
            _ => {
                debug!("Session ended while acquiring media, releasing tracks");
                media.stop();
                Err(CallError::NoConnection)
            }
        }
    }

    /// Создаёт peer connection, если его ещё нет, и прикрепляет локальные треки.
    /// Повторный вызов возвращает существующее соединение.
    pub async fn create_connection(
        &self,
        remote_sink: Arc<dyn MediaSink>,
    ) -> Result<Arc<dyn PeerTransport>, CallError> {
        // замок держим до конца, чтобы параллельный вызов не создал второе соединение
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or(CallError::NoConnection)?;
        if let Some(pc) = &session.connection {
            debug!("Peer connection already exists, reusing it");
            return Ok(pc.clone());
        }

        let epoch = self.current_epoch();
        let pc = self.open_transport(session, epoch).await?;
        session.remote_sink = Some(remote_sink);
        session.connection = Some(pc.clone());
        info!("Peer connection created for session {}", session.id);
        Ok(pc)
    }

    async fn open_transport(
        &self,
        session: &Session,
        epoch: u64,
    ) -> Result<Arc<dyn PeerTransport>, CallError> {
        let events = EventSender::new(epoch, self.events.clone());
        let pc = self.factory.connect(&self.ice_servers, events).await?;

        if let Some(media) = &session.local_media {
            for track in media.tracks() {
                if let Err(e) = pc.add_track(track).await {
                    warn!("Failed to attach local {} track: {e}", track.kind());
                    let _ = pc.close().await;
                    return Err(e.into());
                }
            }
        }
        Ok(pc)
    }

    /// Захват медиа и создание соединения одним шагом
    pub async fn prepare(
        &self,
        local_sink: Arc<dyn MediaSink>,
        remote_sink: Arc<dyn MediaSink>,
    ) -> Result<(), CallError> {
        if self.has_connection().await {
            return Ok(());
        }
        let media = self.acquire_local_media().await?;
        local_sink.render(RenderSource::Local(media));
        self.create_connection(remote_sink).await?;
        Ok(())
    }

    /// Создаёт offer и устанавливает его как local description
    pub async fn create_offer(&self) -> Result<SessionDescription, CallError> {
        let epoch = self.current_epoch();
        let pc = self.require_connection("create_offer").await?;

        let offer = pc.create_offer().await?;
        self.ensure_current(epoch)?;
        pc.set_local_description(offer.clone()).await?;
        self.ensure_current(epoch)?;

        self.with_session(|s| s.local_offer_sent = true).await;
        info!("Created offer {}", offer.fingerprint());
        Ok(offer)
    }

    /// Принимает удалённый offer и создаёт answer
    pub async fn create_answer(
        &self,
        remote_offer: SessionDescription,
    ) -> Result<SessionDescription, CallError> {
        let epoch = self.current_epoch();
        let pc = self.require_connection("create_answer").await?;
        if remote_offer.sdp_type != SdpType::Offer {
            return Err(TransportError::Rejected(format!(
                "expected offer, got {}",
                remote_offer.sdp_type
            ))
            .into());
        }

        debug!("Applying remote offer {}", remote_offer.fingerprint());
        pc.set_remote_description(remote_offer).await?;
        self.ensure_current(epoch)?;
        self.commit_remote_description(epoch, &pc).await?;

        let answer = pc.create_answer().await?;
        self.ensure_current(epoch)?;
        pc.set_local_description(answer.clone()).await?;
        self.ensure_current(epoch)?;

        info!("Created answer {}", answer.fingerprint());
        Ok(answer)
    }

    /// Применяет answer удалённой стороны к отправленному offer
    pub async fn apply_remote_answer(&self, answer: SessionDescription) -> Result<(), CallError> {
        let epoch = self.current_epoch();
        let (pc, offer_sent) = {
            let guard = self.session.lock().await;
            match guard.as_ref() {
                Some(Session {
                    connection: Some(pc),
                    local_offer_sent,
                    ..
                }) => (pc.clone(), *local_offer_sent),
                _ => {
                    warn!("No peer connection found while setting remote answer.");
                    return Err(CallError::NoConnection);
                }
            }
        };
        if !offer_sent {
            warn!("Remote answer received but no local offer was sent");
            return Err(CallError::NotInitialized("apply_remote_answer"));
        }
        if answer.sdp_type != SdpType::Answer {
            return Err(
                TransportError::Rejected(format!("expected answer, got {}", answer.sdp_type))
                    .into(),
            );
        }

        debug!("Applying remote answer {}", answer.fingerprint());
        pc.set_remote_description(answer).await?;
        self.ensure_current(epoch)?;
        self.commit_remote_description(epoch, &pc).await
    }

    /// Отмечает remote description и сразу применяет отложенные кандидаты
    async fn commit_remote_description(
        &self,
        epoch: u64,
        pc: &Arc<dyn PeerTransport>,
    ) -> Result<(), CallError> {
        let pending = {
            let mut guard = self.session.lock().await;
            let session = guard.as_mut().ok_or(CallError::NoConnection)?;
            session.remote_description_set = true;
            session.candidates.take_pending()
        };

        for candidate in pending {
            self.ensure_current(epoch)?;
            debug!("Applying pending candidate: {}", candidate.candidate);
            if let Err(e) = pc.add_ice_candidate(candidate).await {
                warn!("Failed to apply pending candidate: {e}");
            }
        }
        Ok(())
    }

    /// Добавляет удалённый кандидат. До установки remote description кандидат
    /// откладывается, дубликаты игнорируются.
    pub async fn apply_remote_candidate(
        &self,
        candidate: NetworkCandidate,
    ) -> Result<CandidateOutcome, CallError> {
        if candidate.is_empty() {
            return Ok(CandidateOutcome::Ignored);
        }

        let pc = {
            let mut guard = self.session.lock().await;
            let Some(session) = guard.as_mut() else {
                return Ok(CandidateOutcome::Ignored);
            };
            let Some(pc) = session.connection.clone() else {
                debug!("No peer connection yet, ignoring remote candidate");
                return Ok(CandidateOutcome::Ignored);
            };
            if session.candidates.contains(&candidate) {
                return Ok(CandidateOutcome::Duplicate);
            }
            if !session.remote_description_set {
                debug!("Remote description not set yet, queuing candidate");
                session.candidates.buffer(candidate);
                return Ok(CandidateOutcome::Buffered);
            }
            session.candidates.mark_applied(&candidate);
            pc
        };

        dump_candidate("REMOTE", &candidate);
        let kind = candidate_type(&candidate);
        match pc.add_ice_candidate(candidate).await {
            Ok(()) => {
                debug!("Added remote {kind} candidate");
                Ok(CandidateOutcome::Applied)
            }
            Err(e) => {
                warn!("Error adding received ICE candidate: {e}");
                Err(e.into())
            }
        }
    }

    /// Отдаёт входящий поток в remote sink, каждый поток один раз
    pub async fn on_remote_stream(&self, epoch: u64, stream: RemoteStream) -> bool {
        let mut guard = self.session.lock().await;
        let Some(session) = guard.as_mut() else {
            return false;
        };
        if !self.is_current(epoch) || !session.rendered_streams.insert(stream.stream_id.clone()) {
            return false;
        }
        match &session.remote_sink {
            Some(sink) => {
                info!("Remote stream {} attached", stream.stream_id);
                sink.render(RenderSource::Remote(stream));
                true
            }
            None => false,
        }
    }

    /// Переключает треки вида `kind`. `None`, если медиа не захвачено.
    pub async fn toggle_track_kind(&self, kind: TrackKind) -> Option<bool> {
        let guard = self.session.lock().await;
        let media = guard.as_ref()?.local_media.as_ref()?;
        let enabled = media.toggle(kind)?;
        info!("Local {kind} tracks enabled={enabled}");
        Some(enabled)
    }

    /// Заменяет соединение новым без остановки локальных треков.
    /// Нужно стороне, уступившей при встречных offer.
    pub async fn reset_connection(&self) -> Result<Arc<dyn PeerTransport>, CallError> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or(CallError::NoConnection)?;
        let old = session
            .connection
            .take()
            .ok_or(CallError::NotInitialized("reset_connection"))?;

        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        session.reset_negotiation();
        if let Err(e) = old.close().await {
            debug!("Closing replaced connection: {e}");
        }

        let pc = self.open_transport(session, epoch).await?;
        session.connection = Some(pc.clone());
        info!("Peer connection replaced for session {}", session.id);
        Ok(pc)
    }

    /// Останавливает треки, закрывает соединение и уничтожает сессию.
    /// Повторный вызов ничего не делает; `true`, если сессия была закрыта сейчас.
    pub async fn terminate(&self) -> bool {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.epoch.fetch_add(1, Ordering::SeqCst);

        let Some(session) = self.session.lock().await.take() else {
            return false;
        };
        if let Some(media) = &session.local_media {
            let stopped = media.stop();
            debug!("Stopped {stopped} local tracks");
        }
        if let Some(pc) = &session.connection {
            if let Err(e) = pc.close().await {
                warn!("Error closing peer connection: {e}");
            }
        }
        info!("Session {} terminated", session.id);
        true
    }

    async fn with_session(&self, f: impl FnOnce(&mut Session)) {
        if let Some(session) = self.session.lock().await.as_mut() {
            f(session);
        }
    }
}
