use super::CallHandle;
use crate::peer::media::LocalMediaSource;
use crate::peer::types::ConnectionState;
use crate::signaling::SignalingState;
use tokio::sync::watch;

impl CallHandle {
    /// Поток состояний соединения; текст статуса даёт `status_text()`
    pub fn status(&self) -> watch::Receiver<ConnectionState> {
        self.status.clone()
    }

    pub fn status_text(&self) -> &'static str {
        self.status.borrow().status_text()
    }

    pub fn signaling_state(&self) -> SignalingState {
        *self.signaling.borrow()
    }

    /// проверка готовности соединения
    pub fn is_connected(&self) -> bool {
        *self.status.borrow() == ConnectionState::Connected
    }

    pub async fn session_id(&self) -> Option<String> {
        self.manager.session_id().await
    }

    /// Захваченный локальный поток, пока сессия жива
    pub async fn local_media(&self) -> Option<LocalMediaSource> {
        self.manager.local_media().await
    }
}
