use crate::error::MediaAccessError;
use crate::peer::types::{RemoteStream, TrackKind};
use crate::utils::random_id;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Какие виды медиа запрашивать у платформы
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    #[serde(default = "enabled")]
    pub audio: bool,
    #[serde(default = "enabled")]
    pub video: bool,
}

fn enabled() -> bool {
    true
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

struct TrackInner {
    id: String,
    kind: TrackKind,
    stream_id: String,
    enabled: AtomicBool,
    stopped: AtomicBool,
}

/// Локальный трек захвата. Клоны разделяют одно состояние.
#[derive(Clone)]
pub struct LocalTrack {
    inner: Arc<TrackInner>,
}

impl LocalTrack {
    pub fn new(kind: TrackKind, stream_id: &str) -> Self {
        Self {
            inner: Arc::new(TrackInner {
                id: format!("{kind}-{}", random_id()),
                kind,
                stream_id: stream_id.to_string(),
                enabled: AtomicBool::new(true),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    pub fn stream_id(&self) -> &str {
        &self.inner.stream_id
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Останавливает трек; `true`, если он ещё не был остановлен
    pub fn stop(&self) -> bool {
        !self.inner.stopped.swap(true, Ordering::SeqCst)
    }
}

impl std::fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTrack")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("enabled", &self.is_enabled())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Локальный медиа-поток: упорядоченный набор треков
#[derive(Debug, Clone)]
pub struct LocalMediaSource {
    stream_id: String,
    tracks: Vec<LocalTrack>,
}

impl LocalMediaSource {
    pub fn new(stream_id: String, tracks: Vec<LocalTrack>) -> Self {
        Self { stream_id, tracks }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn tracks(&self) -> &[LocalTrack] {
        &self.tracks
    }

    pub fn tracks_of(&self, kind: TrackKind) -> impl Iterator<Item = &LocalTrack> {
        self.tracks.iter().filter(move |t| t.kind() == kind)
    }

    /// Переключает `enabled` у всех треков вида `kind`.
    /// Возвращает новое состояние или `None`, если таких треков нет.
    pub fn toggle(&self, kind: TrackKind) -> Option<bool> {
        let current = self.tracks_of(kind).next()?.is_enabled();
        let next = !current;
        for track in self.tracks_of(kind) {
            track.set_enabled(next);
        }
        Some(next)
    }

    /// Останавливает все треки, возвращает число реально остановленных
    pub fn stop(&self) -> usize {
        self.tracks.iter().filter(|t| t.stop()).count()
    }
}

/// Что отрисовать на поверхности UI
#[derive(Debug, Clone)]
pub enum RenderSource {
    Local(LocalMediaSource),
    Remote(RemoteStream),
}

/// Поверхность отрисовки, которую предоставляет UI
pub trait MediaSink: Send + Sync {
    fn render(&self, source: RenderSource);
}

/// Sink без UI: только пишет в лог
pub struct LoggingSink {
    label: &'static str,
}

impl LoggingSink {
    pub fn new(label: &'static str) -> Self {
        Self { label }
    }
}

impl MediaSink for LoggingSink {
    fn render(&self, source: RenderSource) {
        match source {
            RenderSource::Local(media) => info!(
                "[{}] rendering local stream {} ({} tracks)",
                self.label,
                media.stream_id(),
                media.tracks().len()
            ),
            RenderSource::Remote(stream) => info!(
                "[{}] rendering remote stream {} ({} track {})",
                self.label, stream.stream_id, stream.kind, stream.track_id
            ),
        }
    }
}

/// Доступ к устройствам захвата
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn get_user_media(
        &self,
        constraints: MediaConstraints,
    ) -> Result<LocalMediaSource, MediaAccessError>;
}

/// Устройства без реального захвата: выдают треки для каждого доступного вида.
/// Кодирование кадров вне нашей зоны, треки только согласуются в SDP.
#[derive(Debug, Clone)]
pub struct HeadlessDevices {
    available: MediaConstraints,
    permission_granted: bool,
}

impl HeadlessDevices {
    pub fn new(available: MediaConstraints) -> Self {
        Self {
            available,
            permission_granted: true,
        }
    }

    /// Пользователь отклонил запрос доступа
    pub fn denied() -> Self {
        Self {
            available: MediaConstraints::default(),
            permission_granted: false,
        }
    }
}

impl Default for HeadlessDevices {
    fn default() -> Self {
        Self::new(MediaConstraints::default())
    }
}

#[async_trait]
impl MediaDevices for HeadlessDevices {
    async fn get_user_media(
        &self,
        constraints: MediaConstraints,
    ) -> Result<LocalMediaSource, MediaAccessError> {
        if !self.permission_granted {
            return Err(MediaAccessError::PermissionDenied);
        }

        let stream_id = format!("local-{}", random_id());
        let mut tracks = Vec::new();
        if constraints.audio && self.available.audio {
            tracks.push(LocalTrack::new(TrackKind::Audio, &stream_id));
        }
        if constraints.video && self.available.video {
            tracks.push(LocalTrack::new(TrackKind::Video, &stream_id));
        }
        if tracks.is_empty() {
            return Err(MediaAccessError::NoDevice);
        }

        debug!("Acquired {} local tracks for {}", tracks.len(), stream_id);
        Ok(LocalMediaSource::new(stream_id, tracks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn toggle_flips_every_track_of_kind() {
        let stream = "s";
        let media = LocalMediaSource::new(
            stream.into(),
            vec![
                LocalTrack::new(TrackKind::Audio, stream),
                LocalTrack::new(TrackKind::Video, stream),
                LocalTrack::new(TrackKind::Audio, stream),
            ],
        );

        assert_eq!(media.toggle(TrackKind::Audio), Some(false));
        assert!(media.tracks_of(TrackKind::Audio).all(|t| !t.is_enabled()));
        assert!(media.tracks_of(TrackKind::Video).all(|t| t.is_enabled()));

        assert_eq!(media.toggle(TrackKind::Audio), Some(true));
        assert!(media.tracks_of(TrackKind::Audio).all(|t| t.is_enabled()));
        assert_eq!(media.tracks().len(), 3);
        assert!(media.tracks().iter().all(|t| !t.is_stopped()));
    }

    #[tokio::test]
    async fn toggle_without_tracks_of_kind_is_noop() {
        let devices = HeadlessDevices::new(MediaConstraints {
            audio: true,
            video: false,
        });
        let media = devices
            .get_user_media(MediaConstraints::default())
            .await
            .unwrap();
        assert_eq!(media.toggle(TrackKind::Video), None);
    }

    #[tokio::test]
    async fn headless_devices_report_denial_and_missing_hardware() {
        let denied = HeadlessDevices::denied()
            .get_user_media(MediaConstraints::default())
            .await;
        assert_eq!(denied.unwrap_err(), MediaAccessError::PermissionDenied);

        let none = HeadlessDevices::new(MediaConstraints {
            audio: false,
            video: false,
        })
        .get_user_media(MediaConstraints::default())
        .await;
        assert_eq!(none.unwrap_err(), MediaAccessError::NoDevice);
    }

    #[test]
    fn stop_counts_only_first_time() {
        let media = LocalMediaSource::new(
            "s".into(),
            vec![LocalTrack::new(TrackKind::Audio, "s")],
        );
        assert_eq!(media.stop(), 1);
        assert_eq!(media.stop(), 0);
    }
}
