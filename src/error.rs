use thiserror::Error;

/// Отказ платформы в захвате медиа
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MediaAccessError {
    #[error("permission to capture media was denied")]
    PermissionDenied,
    #[error("no capture device available")]
    NoDevice,
}

/// Ошибка транспорта (peer connection)
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    WebRtc(#[from] webrtc::Error),
    #[error("transport rejected operation: {0}")]
    Rejected(String),
}

/// Ошибка канала ретрансляции
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("relay channel closed")]
    Closed,
    #[error("malformed relay message: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("unknown relay event `{0}`")]
    UnknownEvent(String),
    #[error("packed frame is not valid base64: {0}")]
    Packed(#[from] base64::DecodeError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("server `{0}`: URL cannot be empty")]
    EmptyUrl(String),
    #[error("server `{0}`: TURN servers require username and credential")]
    MissingTurnCredentials(String),
}

/// Ошибки звонка.
///
/// До UI доходит только `MediaAccess`, остальное логируется и поглощается
/// координатором.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("media access failed: {0}")]
    MediaAccess(#[from] MediaAccessError),
    #[error("{0} called before the peer connection was created")]
    NotInitialized(&'static str),
    #[error("no active connection")]
    NoConnection,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Relay(#[from] RelayError),
}

impl CallError {
    /// Ошибка, которую нужно показать пользователю
    pub fn is_user_facing(&self) -> bool {
        matches!(self, CallError::MediaAccess(_))
    }
}
