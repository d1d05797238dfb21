use super::{RelayChannel, RelayEnvelope, RelayInbox};
use crate::error::RelayError;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Строка для ручного обмена: envelope с временной меткой
#[derive(Serialize, Deserialize)]
struct PackedFrame {
    envelope: serde_json::Value,
    ts: i64,
}

/// Кодирует envelope в одну строку: gzip + base64
pub fn pack(envelope: &RelayEnvelope) -> Result<String, RelayError> {
    let frame = PackedFrame {
        envelope: envelope.to_value()?,
        ts: chrono::Utc::now().timestamp(),
    };
    let json = serde_json::to_vec(&frame)?;
    let mut gz = GzEncoder::new(Vec::new(), Compression::fast());
    gz.write_all(&json)?;
    let compressed = gz.finish()?;
    Ok(general_purpose::STANDARD.encode(compressed))
}

pub fn unpack(line: &str) -> Result<RelayEnvelope, RelayError> {
    let compressed = general_purpose::STANDARD.decode(line.trim())?;
    let mut json = Vec::new();
    GzDecoder::new(&compressed[..]).read_to_end(&mut json)?;
    let frame: PackedFrame = serde_json::from_slice(&json)?;
    debug!("Unpacked frame from ts={}", frame.ts);
    RelayEnvelope::from_value(frame.envelope)
}

/// Ручной relay: исходящие сообщения печатаются в stdout,
/// входящие вставляются пользователем в stdin, по строке на сообщение.
#[derive(Debug, Clone)]
pub struct StdioRelay {
    out_tx: mpsc::UnboundedSender<String>,
}

impl StdioRelay {
    pub fn spawn() -> (StdioRelay, RelayInbox) {
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut stdout = tokio::io::stdout();
            while let Some(line) = out_rx.recv().await {
                let written = async {
                    stdout.write_all(line.as_bytes()).await?;
                    stdout.write_all(b"\n").await?;
                    stdout.flush().await
                }
                .await;
                if let Err(e) = written {
                    warn!("stdout relay write error: {e}");
                    break;
                }
            }
        });

        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => match unpack(&line) {
                        Ok(envelope) => {
                            if in_tx.send(envelope).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Could not decode pasted message: {e}"),
                    },
                    Ok(None) => break,
                    Err(e) => {
                        warn!("stdin relay read error: {e}");
                        break;
                    }
                }
            }
            info!("stdin relay closed");
        });

        (StdioRelay { out_tx }, in_rx)
    }
}

#[async_trait]
impl RelayChannel for StdioRelay {
    async fn send(&self, envelope: RelayEnvelope) -> Result<(), RelayError> {
        let line = pack(&envelope)?;
        info!(
            "Paste this {} on the other side ({} chars)",
            envelope.message.event(),
            line.len()
        );
        self.out_tx.send(line).map_err(|_| RelayError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::types::SessionDescription;
    use crate::relay::RelayMessage;

    #[test]
    fn packed_line_is_single_line_base64() {
        let env = RelayEnvelope::new(
            "a",
            RelayMessage::Offer(SessionDescription::offer("v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\n")),
        );
        let line = pack(&env).unwrap();
        assert!(!line.contains('\n'));
        assert_eq!(unpack(&format!("  {line}\n")).unwrap(), env);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(unpack("not base64!"), Err(RelayError::Packed(_))));
        let not_gzip = general_purpose::STANDARD.encode(b"plain");
        assert!(matches!(unpack(&not_gzip), Err(RelayError::Io(_))));
    }
}
