use super::{RelayChannel, RelayEnvelope, RelayInbox};
use crate::error::RelayError;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::trace;

/// Relay внутри процесса: что отправил один конец, получает другой.
#[derive(Debug, Clone)]
pub struct MemoryRelay {
    peer_tx: mpsc::UnboundedSender<RelayEnvelope>,
}

impl MemoryRelay {
    /// Два связанных конца, у каждого свой inbox
    pub fn pair() -> ((MemoryRelay, RelayInbox), (MemoryRelay, RelayInbox)) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            (MemoryRelay { peer_tx: b_tx }, a_rx),
            (MemoryRelay { peer_tx: a_tx }, b_rx),
        )
    }
}

#[async_trait]
impl RelayChannel for MemoryRelay {
    async fn send(&self, envelope: RelayEnvelope) -> Result<(), RelayError> {
        trace!("memory relay: {} from {}", envelope.message.event(), envelope.from);
        self.peer_tx.send(envelope).map_err(|_| RelayError::Closed)
    }
}
