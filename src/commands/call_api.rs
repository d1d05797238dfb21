use super::CallHandle;
use crate::error::CallError;
use crate::signaling::Intent;
use tokio::sync::oneshot;
use tracing::{debug, info};

impl CallHandle {
    /// Захват медиа и создание соединения. Вызывается при открытии экрана,
    /// чтобы входящий offer застал готовое соединение.
    pub async fn prepare(&self) -> Result<(), CallError> {
        self.manager
            .prepare(self.local_sink.clone(), self.remote_sink.clone())
            .await
    }

    /// Начать звонок. Ошибкой возвращается только отказ в доступе к медиа.
    pub async fn start_call(&self) -> Result<(), CallError> {
        let (tx, rx) = oneshot::channel();
        if self.intents.send(Intent::StartCall(tx)).is_err() {
            debug!("start_call: coordinator already stopped");
            return Ok(());
        }
        rx.await.unwrap_or(Ok(()))
    }

    /// Завершить звонок из любого состояния.
    /// Сессия закрывается сразу, даже если координатор занят offer/answer.
    pub async fn end_call(&self) {
        if self.manager.terminate().await {
            info!("Call ended locally");
        }
        let (tx, rx) = oneshot::channel();
        if self.intents.send(Intent::EndCall(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}
