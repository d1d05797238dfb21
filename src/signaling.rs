use crate::error::CallError;
use crate::logger::log_state;
use crate::peer::connection::ConnectionManager;
use crate::peer::ice::CandidateOutcome;
use crate::peer::media::MediaSink;
use crate::peer::transport::{TransportEvent, TransportEventKind};
use crate::peer::types::{ConnectionState, NetworkCandidate, SessionDescription};
use crate::relay::{RelayChannel, RelayEnvelope, RelayInbox, RelayMessage};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, trace, warn};

/// Состояние сигнализации одной сессии
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingState {
    Idle,
    Offering,
    AnswerPending,
    Answering,
    Connected,
    Terminated,
}

impl fmt::Display for SignalingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Что двигает автомат
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    StartCall,
    OfferSent,
    RemoteOffer,
    AnswerSent,
    RemoteAnswer,
    /// шаг не удался, звонок не разрывается
    Aborted,
    EndCall,
}

impl SignalingState {
    /// Таблица переходов. `None`: переход не разрешён.
    pub fn on(self, trigger: Trigger) -> Option<SignalingState> {
        use SignalingState::*;
        use Trigger::*;
        match (self, trigger) {
            (Terminated, _) => None,
            (_, EndCall) => Some(Terminated),
            (Idle, StartCall) => Some(Offering),
            (Offering, OfferSent) => Some(AnswerPending),
            (Offering | AnswerPending, RemoteAnswer) => Some(Connected),
            // встречный offer: сюда попадает только уступившая сторона
            (Idle | Offering | AnswerPending, RemoteOffer) => Some(Answering),
            (Answering, AnswerSent) => Some(Connected),
            (Offering | Answering, Aborted) => Some(Idle),
            _ => None,
        }
    }
}

/// Намерения от UI, которым нужен координатор
#[derive(Debug)]
pub enum Intent {
    StartCall(oneshot::Sender<Result<(), CallError>>),
    EndCall(oneshot::Sender<()>),
}

/// Входящие потоки координатора
pub struct CoordinatorInbox {
    pub intents: mpsc::UnboundedReceiver<Intent>,
    pub relay: RelayInbox,
    pub transport: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Ведёт протокол: читает relay, двигает `ConnectionManager`, отправляет
/// offer/answer/кандидаты обратно в relay.
pub struct SignalingCoordinator {
    endpoint_id: String,
    manager: Arc<ConnectionManager>,
    relay: Arc<dyn RelayChannel>,
    local_sink: Arc<dyn MediaSink>,
    remote_sink: Arc<dyn MediaSink>,
    state: SignalingState,
    state_tx: watch::Sender<SignalingState>,
    status_tx: watch::Sender<ConnectionState>,
    echo_warned: bool,
}

impl SignalingCoordinator {
    pub fn new(
        endpoint_id: String,
        manager: Arc<ConnectionManager>,
        relay: Arc<dyn RelayChannel>,
        local_sink: Arc<dyn MediaSink>,
        remote_sink: Arc<dyn MediaSink>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SignalingState::Idle);
        let (status_tx, _) = watch::channel(ConnectionState::New);
        Self {
            endpoint_id,
            manager,
            relay,
            local_sink,
            remote_sink,
            state: SignalingState::Idle,
            state_tx,
            status_tx,
            echo_warned: false,
        }
    }

    pub fn state(&self) -> SignalingState {
        self.state
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SignalingState> {
        self.state_tx.subscribe()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionState> {
        self.status_tx.subscribe()
    }

    /// Цикл обработки событий до завершения сессии
    pub async fn run(mut self, mut inbox: CoordinatorInbox) {
        info!("Signaling coordinator started for endpoint {}", self.endpoint_id);
        while self.state != SignalingState::Terminated {
            tokio::select! {
                Some(intent) = inbox.intents.recv() => self.handle_intent(intent).await,
                Some(envelope) = inbox.relay.recv() => self.handle_envelope(envelope).await,
                Some(event) = inbox.transport.recv() => self.handle_transport_event(event).await,
                else => {
                    debug!("All coordinator inputs closed");
                    break;
                }
            }
        }
        if self.state != SignalingState::Terminated {
            self.manager.terminate().await;
            self.transition(Trigger::EndCall);
        }
        info!("Signaling coordinator stopped");
    }

    fn transition(&mut self, trigger: Trigger) -> bool {
        match self.state.on(trigger) {
            Some(next) => {
                debug!("Signaling {} --{:?}--> {}", self.state, trigger, next);
                self.state = next;
                self.state_tx.send_replace(next);
                if next == SignalingState::Terminated {
                    self.status_tx.send_replace(ConnectionState::Closed);
                }
                true
            }
            None => {
                debug!("Signaling: {:?} ignored in state {}", trigger, self.state);
                false
            }
        }
    }

    async fn relay_send(&self, message: RelayMessage) {
        let event = message.event();
        let envelope = RelayEnvelope::new(&self.endpoint_id, message);
        if let Err(e) = self.relay.send(envelope).await {
            warn!("Failed to relay {event}: {e}");
        }
    }

    pub async fn handle_intent(&mut self, intent: Intent) {
        match intent {
            Intent::StartCall(reply) => {
                let result = self.start_call().await;
                let _ = reply.send(result);
            }
            Intent::EndCall(reply) => {
                self.end_call().await;
                let _ = reply.send(());
            }
        }
    }

    /// Начать звонок. Наружу возвращается только ошибка доступа к медиа.
    pub async fn start_call(&mut self) -> Result<(), CallError> {
        if !self.transition(Trigger::StartCall) {
            info!("Start call ignored: already in state {}", self.state);
            return Ok(());
        }

        let offer = async {
            self.manager
                .prepare(self.local_sink.clone(), self.remote_sink.clone())
                .await?;
            self.manager.create_offer().await
        }
        .await;

        match offer {
            Ok(offer) => {
                self.relay_send(RelayMessage::Offer(offer)).await;
                self.transition(Trigger::OfferSent);
                Ok(())
            }
            Err(e) if e.is_user_facing() => {
                self.transition(Trigger::Aborted);
                Err(e)
            }
            Err(e) => {
                warn!("Start call aborted: {e}");
                self.transition(Trigger::Aborted);
                Ok(())
            }
        }
    }

    pub async fn end_call(&mut self) {
        self.manager.terminate().await;
        self.transition(Trigger::EndCall);
    }

    pub async fn handle_envelope(&mut self, envelope: RelayEnvelope) {
        if envelope.from == self.endpoint_id {
            if !self.echo_warned {
                // эхо relay или у второй стороны тот же endpoint id
                warn!(
                    "Dropping {} carrying our own endpoint id {}; if the peer uses the same id the call cannot start",
                    envelope.message.event(),
                    self.endpoint_id
                );
                self.echo_warned = true;
            } else {
                trace!("Dropping relay echo of our own {}", envelope.message.event());
            }
            return;
        }
        if self.state == SignalingState::Terminated {
            debug!("Ignoring {} after terminate", envelope.message.event());
            return;
        }
        match envelope.message {
            RelayMessage::Offer(offer) => self.on_remote_offer(&envelope.from, offer).await,
            RelayMessage::Answer(answer) => self.on_remote_answer(answer).await,
            RelayMessage::IceCandidate(candidate) => self.on_remote_candidate(candidate).await,
        }
    }

    /// Кто сохраняет свой offer при встречных offer: меньший endpoint id
    fn wins_glare(&self, remote_id: &str) -> bool {
        self.endpoint_id.as_str() < remote_id
    }

    async fn on_remote_offer(&mut self, from: &str, offer: SessionDescription) {
        match self.state {
            SignalingState::Idle => {}
            SignalingState::Offering | SignalingState::AnswerPending => {
                if self.wins_glare(from) {
                    info!("Glare with {from}: keeping our offer");
                    return;
                }
                info!("Glare with {from}: dropping our offer and answering theirs");
                if let Err(e) = self.manager.reset_connection().await {
                    warn!("Could not reset connection for glare: {e}");
                    return;
                }
                // статус старого соединения больше не актуален
                self.status_tx
                    .send_replace(self.manager.connection_state().await);
            }
            state => {
                debug!("Ignoring offer from {from} in state {state}");
                return;
            }
        }

        self.transition(Trigger::RemoteOffer);
        match self.manager.create_answer(offer).await {
            Ok(answer) => {
                self.relay_send(RelayMessage::Answer(answer)).await;
                self.transition(Trigger::AnswerSent);
            }
            Err(e) => {
                warn!("Could not answer offer from {from}: {e}");
                self.transition(Trigger::Aborted);
            }
        }
    }

    async fn on_remote_answer(&mut self, answer: SessionDescription) {
        if !matches!(
            self.state,
            SignalingState::Offering | SignalingState::AnswerPending
        ) {
            debug!("Ignoring answer in state {}", self.state);
            return;
        }
        match self.manager.apply_remote_answer(answer).await {
            Ok(()) => {
                self.transition(Trigger::RemoteAnswer);
            }
            Err(e) => warn!("Could not apply remote answer: {e}"),
        }
    }

    async fn on_remote_candidate(&mut self, candidate: NetworkCandidate) {
        match self.manager.apply_remote_candidate(candidate).await {
            Ok(CandidateOutcome::Applied) => trace!("Remote candidate applied"),
            Ok(outcome) => debug!("Remote candidate {outcome:?}"),
            Err(e) => debug!("Remote candidate dropped: {e}"),
        }
    }

    pub async fn handle_transport_event(&mut self, event: TransportEvent) {
        if self.state == SignalingState::Terminated || !self.manager.is_current(event.epoch) {
            trace!("Dropping stale transport event from epoch {}", event.epoch);
            return;
        }
        match event.kind {
            TransportEventKind::LocalCandidate(candidate) => {
                // соединение создаётся под замком сессии: ждём его завершения
                if !self.manager.has_connection().await {
                    warn!("Local candidate without a connection, not relaying");
                    return;
                }
                debug!("Sending ICE candidate: {}", candidate.candidate);
                self.relay_send(RelayMessage::IceCandidate(candidate)).await;
            }
            TransportEventKind::RemoteStream(stream) => {
                self.manager.on_remote_stream(event.epoch, stream).await;
            }
            TransportEventKind::StateChanged(state) => {
                log_state(state);
                self.status_tx.send_replace(state);
            }
        }
    }
}
