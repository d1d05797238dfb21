//! Relay: простая труба для сигнальных сообщений.
//!
//! Каждое сообщение это один JSON envelope:
//! `{"event":"offer"|"answer"|"ice-candidate","from":"<endpoint id>","data":{...}}`

mod memory;
mod stdio;
mod ws;

use crate::error::RelayError;
use crate::peer::types::{NetworkCandidate, SessionDescription};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub use memory::MemoryRelay;
pub use stdio::{pack, unpack, StdioRelay};
pub use ws::WsRelay;

pub const EVENT_OFFER: &str = "offer";
pub const EVENT_ANSWER: &str = "answer";
pub const EVENT_ICE_CANDIDATE: &str = "ice-candidate";

/// Входящая сторона relay
pub type RelayInbox = mpsc::UnboundedReceiver<RelayEnvelope>;

#[derive(Debug, Clone, PartialEq)]
pub enum RelayMessage {
    Offer(SessionDescription),
    Answer(SessionDescription),
    IceCandidate(NetworkCandidate),
}

impl RelayMessage {
    pub fn event(&self) -> &'static str {
        match self {
            RelayMessage::Offer(_) => EVENT_OFFER,
            RelayMessage::Answer(_) => EVENT_ANSWER,
            RelayMessage::IceCandidate(_) => EVENT_ICE_CANDIDATE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelayEnvelope {
    pub from: String,
    pub message: RelayMessage,
}

#[derive(Serialize, Deserialize)]
struct WireEnvelope {
    event: String,
    from: String,
    data: serde_json::Value,
}

impl RelayEnvelope {
    pub fn new(from: &str, message: RelayMessage) -> Self {
        Self {
            from: from.to_string(),
            message,
        }
    }

    pub fn to_value(&self) -> Result<serde_json::Value, RelayError> {
        let data = match &self.message {
            RelayMessage::Offer(desc) | RelayMessage::Answer(desc) => serde_json::to_value(desc)?,
            RelayMessage::IceCandidate(c) => serde_json::to_value(c)?,
        };
        Ok(serde_json::to_value(WireEnvelope {
            event: self.message.event().to_string(),
            from: self.from.clone(),
            data,
        })?)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, RelayError> {
        let wire: WireEnvelope = serde_json::from_value(value)?;
        let message = match wire.event.as_str() {
            EVENT_OFFER => RelayMessage::Offer(serde_json::from_value(wire.data)?),
            EVENT_ANSWER => RelayMessage::Answer(serde_json::from_value(wire.data)?),
            EVENT_ICE_CANDIDATE => RelayMessage::IceCandidate(serde_json::from_value(wire.data)?),
            other => return Err(RelayError::UnknownEvent(other.to_string())),
        };
        Ok(Self {
            from: wire.from,
            message,
        })
    }

    pub fn to_json(&self) -> Result<String, RelayError> {
        Ok(serde_json::to_string(&self.to_value()?)?)
    }

    pub fn from_json(s: &str) -> Result<Self, RelayError> {
        Self::from_value(serde_json::from_str(s)?)
    }
}

/// Исходящая сторона relay. Без подтверждений и без порядка
/// между разными типами событий.
#[async_trait]
pub trait RelayChannel: Send + Sync {
    async fn send(&self, envelope: RelayEnvelope) -> Result<(), RelayError>;
}
