use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use webrtc::track::track_remote::TrackRemote;

/// Тип описания сессии
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

impl fmt::Display for SdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdpType::Offer => write!(f, "offer"),
            SdpType::Answer => write!(f, "answer"),
        }
    }
}

/// Описание сессии (offer или answer) в формате RTCSessionDescriptionInit
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }

    /// Короткий отпечаток SDP для логов
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.sdp.as_bytes());
        hex::encode(&digest[..6])
    }
}

/// ICE кандидат в формате RTCIceCandidateInit
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct NetworkCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
    #[serde(
        rename = "usernameFragment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub username_fragment: Option<String>,
}

impl NetworkCandidate {
    pub fn new(candidate: impl Into<String>, sdp_mid: Option<&str>, sdp_mline_index: Option<u16>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: sdp_mid.map(str::to_string),
            sdp_mline_index,
            username_fragment: None,
        }
    }

    /// Пустая строка кандидата означает конец сбора
    pub fn is_empty(&self) -> bool {
        self.candidate.trim().is_empty()
    }

    /// Ключ для отсева дубликатов
    pub fn key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.candidate,
            self.sdp_mid.as_deref().unwrap_or_default(),
            self.sdp_mline_index.map(|i| i.to_string()).unwrap_or_default()
        )
    }
}

/// Вид медиа-трека
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

/// Состояние соединения, как его сообщает транспорт
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    New,
    Checking,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// Строка статуса для UI, один к одному
    pub fn status_text(&self) -> &'static str {
        match self {
            ConnectionState::New => "Waiting for peer",
            ConnectionState::Checking => "Connecting...",
            ConnectionState::Connected => "Connected",
            ConnectionState::Disconnected => "Connection interrupted",
            ConnectionState::Failed => "Connection failed",
            ConnectionState::Closed => "Call ended",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::New => "new",
            ConnectionState::Checking => "checking",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Входящий поток от удалённой стороны
#[derive(Clone)]
pub struct RemoteStream {
    pub stream_id: String,
    pub track_id: String,
    pub kind: TrackKind,
    /// RTP-трек, если поток пришёл из настоящего peer connection
    pub track: Option<Arc<TrackRemote>>,
}

impl fmt::Debug for RemoteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteStream")
            .field("stream_id", &self.stream_id)
            .field("track_id", &self.track_id)
            .field("kind", &self.kind)
            .field("has_rtp", &self.track.is_some())
            .finish()
    }
}

/// Конфигурация ICE сервера
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub id: String,
    pub r#type: String, // 'stun' or 'turn'
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub credential: Option<String>,
}

impl ServerConfig {
    pub fn stun(id: &str, url: &str) -> Self {
        Self {
            id: id.into(),
            r#type: "stun".into(),
            url: url.into(),
            username: None,
            credential: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn description_uses_browser_json_shape() {
        let offer = SessionDescription::offer("v=0\r\n");
        let json = serde_json::to_string(&offer).unwrap();
        assert_eq!(json, r#"{"type":"offer","sdp":"v=0\r\n"}"#);

        let parsed: SessionDescription =
            serde_json::from_str(r#"{"type":"answer","sdp":"v=0"}"#).unwrap();
        assert_eq!(parsed.sdp_type, SdpType::Answer);
    }

    #[test]
    fn candidate_parses_browser_field_names() {
        let raw = r#"{"candidate":"candidate:1 1 UDP 2130706431 192.168.1.1 54321 typ host","sdpMid":"0","sdpMLineIndex":0}"#;
        let c: NetworkCandidate = serde_json::from_str(raw).unwrap();
        assert_eq!(c.sdp_mid.as_deref(), Some("0"));
        assert_eq!(c.sdp_mline_index, Some(0));
        assert!(c.username_fragment.is_none());
        assert!(!c.is_empty());
    }

    #[test]
    fn end_of_candidates_is_empty() {
        assert!(NetworkCandidate::new("", Some("0"), Some(0)).is_empty());
    }

    #[test]
    fn fingerprint_is_stable() {
        let a = SessionDescription::offer("same");
        let b = SessionDescription::answer("same");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 12);
    }

    #[test]
    fn status_text_follows_state() {
        assert_eq!(ConnectionState::Connected.status_text(), "Connected");
        assert_eq!(ConnectionState::Checking.to_string(), "checking");
    }
}
