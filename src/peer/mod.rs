pub mod connection;
pub mod ice;
pub mod media;
pub mod rtc;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod fake;

pub use connection::ConnectionManager;
pub use ice::CandidateOutcome;
pub use media::{
    HeadlessDevices, LocalMediaSource, LocalTrack, LoggingSink, MediaConstraints, MediaDevices,
    MediaSink, RenderSource,
};
pub use rtc::RtcTransportFactory;
pub use transport::{PeerTransport, TransportEvent, TransportEventKind, TransportFactory};
pub use types::{
    ConnectionState, NetworkCandidate, RemoteStream, SdpType, ServerConfig, SessionDescription,
    TrackKind,
};
