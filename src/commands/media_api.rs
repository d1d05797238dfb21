use super::CallHandle;
use crate::peer::types::TrackKind;

impl CallHandle {
    /// mute/unmute; `None`, если микрофон не захвачен
    pub async fn toggle_audio(&self) -> Option<bool> {
        self.manager.toggle_track_kind(TrackKind::Audio).await
    }

    pub async fn toggle_video(&self) -> Option<bool> {
        self.manager.toggle_track_kind(TrackKind::Video).await
    }
}
