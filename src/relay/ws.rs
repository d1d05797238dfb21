use super::{RelayChannel, RelayEnvelope, RelayInbox};
use crate::error::RelayError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// WebSocket relay: один текстовый кадр на envelope
#[derive(Debug, Clone)]
pub struct WsRelay {
    out_tx: mpsc::UnboundedSender<RelayEnvelope>,
}

impl WsRelay {
    /// Подключается к relay. Когда сервер закрывает сокет, inbox
    /// закрывается, а `send` начинает возвращать `RelayError::Closed`.
    pub async fn connect(url: &str) -> Result<(WsRelay, RelayInbox), RelayError> {
        let (stream, _) = connect_async(url).await?;
        info!("Connected to relay {}", url);

        let (mut write, mut read) = stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<RelayEnvelope>();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let writer_url = url.to_string();
        let writer = tokio::spawn(async move {
            loop {
                let envelope = tokio::select! {
                    envelope = out_rx.recv() => match envelope {
                        Some(envelope) => envelope,
                        None => break,
                    },
                    _ = &mut stop_rx => break,
                };
                let text = match envelope.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Dropping unencodable relay message: {e}");
                        continue;
                    }
                };
                if let Err(e) = write.send(Message::Text(text)).await {
                    warn!("Relay {} write error: {}", writer_url, e);
                    break;
                }
            }
            let _ = write.close().await;
        });

        let reader_url = url.to_string();
        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(Message::Text(text)) => match RelayEnvelope::from_json(&text) {
                        Ok(envelope) => {
                            if in_tx.send(envelope).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Ignoring undecodable relay frame: {e}"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Relay {} read error: {}", reader_url, e);
                        break;
                    }
                }
            }
            // inbox закрываем только после остановки writer
            let _ = stop_tx.send(());
            if let Err(e) = writer.await {
                debug!("Relay writer task failed: {e}");
            }
            info!("Relay {} disconnected", reader_url);
        });

        Ok((WsRelay { out_tx }, in_rx))
    }
}

#[async_trait]
impl RelayChannel for WsRelay {
    async fn send(&self, envelope: RelayEnvelope) -> Result<(), RelayError> {
        self.out_tx.send(envelope).map_err(|_| RelayError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::types::{NetworkCandidate, SessionDescription};
    use crate::relay::RelayMessage;
    use std::time::Duration;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::time::timeout;
    use tokio_tungstenite::{accept_async, WebSocketStream};

    /// Сервер на случайном порту; `script` обслуживает одно подключение
    async fn serve<F, Fut>(script: F) -> String
    where
        F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let ws = accept_async(socket).await.unwrap();
            script(ws).await;
        });
        format!("ws://{addr}")
    }

    fn offer() -> RelayEnvelope {
        RelayEnvelope::new("alice", RelayMessage::Offer(SessionDescription::offer("v=0\r\n")))
    }

    #[tokio::test]
    async fn envelope_round_trips_and_garbage_is_skipped() {
        let url = serve(|mut ws| async move {
            let frame = ws.next().await.unwrap().unwrap();
            let text = frame.into_text().unwrap();
            ws.send(Message::Text("not json".into())).await.unwrap();
            ws.send(Message::Text(
                r#"{"event":"bye","from":"bob","data":{}}"#.into(),
            ))
            .await
            .unwrap();
            ws.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
            ws.send(Message::Text(text)).await.unwrap();
            let candidate = RelayEnvelope::new(
                "bob",
                RelayMessage::IceCandidate(NetworkCandidate::new("candidate:1", Some("0"), Some(0))),
            );
            ws.send(Message::Text(candidate.to_json().unwrap()))
                .await
                .unwrap();
            // держим сокет открытым, пока клиент читает
            let _ = ws.next().await;
        })
        .await;

        let (relay, mut inbox) = WsRelay::connect(&url).await.unwrap();
        relay.send(offer()).await.unwrap();

        let echoed = timeout(Duration::from_secs(2), inbox.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(echoed, offer());

        let next = timeout(Duration::from_secs(2), inbox.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.from, "bob");
        assert!(matches!(next.message, RelayMessage::IceCandidate(_)));
    }

    #[tokio::test]
    async fn send_fails_after_server_closes() {
        let url = serve(|mut ws| async move {
            let _ = ws.close(None).await;
        })
        .await;

        let (relay, mut inbox) = WsRelay::connect(&url).await.unwrap();
        let end = timeout(Duration::from_secs(2), inbox.recv()).await.unwrap();
        assert!(end.is_none());

        assert!(matches!(relay.send(offer()).await, Err(RelayError::Closed)));
    }
}
