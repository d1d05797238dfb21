use crate::peer::ice::CandidateBuffer;
use crate::peer::media::{LocalMediaSource, MediaSink};
use crate::peer::transport::PeerTransport;
use crate::utils::random_id;
use std::collections::HashSet;
use std::sync::Arc;

/// Один звонок между двумя сторонами.
///
/// Живёт внутри `ConnectionManager` от создания до `terminate()`,
/// после чего уничтожается и больше не используется.
pub struct Session {
    pub id: String,
    pub local_media: Option<LocalMediaSource>,
    pub connection: Option<Arc<dyn PeerTransport>>,
    pub remote_sink: Option<Arc<dyn MediaSink>>,
    /// Потоки, уже отданные в remote sink
    pub rendered_streams: HashSet<String>,
    pub candidates: CandidateBuffer,
    pub local_offer_sent: bool,
    pub remote_description_set: bool,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: random_id(),
            local_media: None,
            connection: None,
            remote_sink: None,
            rendered_streams: HashSet::new(),
            candidates: CandidateBuffer::default(),
            local_offer_sent: false,
            remote_description_set: false,
        }
    }

    /// Сбрасывает состояние согласования при замене соединения.
    /// Медиа, sink и отложенные кандидаты остаются.
    pub fn reset_negotiation(&mut self) {
        self.local_offer_sent = false;
        self.remote_description_set = false;
        self.rendered_streams.clear();
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
