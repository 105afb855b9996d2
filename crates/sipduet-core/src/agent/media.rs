//! Media options and stream acquisition strategies

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::DuetResult;

/// Which tracks a session should send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl MediaConstraints {
    pub fn is_empty(&self) -> bool {
        !self.audio && !self.video
    }
}

/// Where remote and local video get rendered, by surface id
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RenderTargets {
    pub remote: Option<String>,
    pub local: Option<String>,
}

/// Media options passed with an invite or an accept
///
/// ```rust
/// use sipduet_core::agent::MediaOptions;
///
/// let options = MediaOptions::video_only(Some("video-of-bob".to_string()));
/// assert!(!options.constraints.audio);
/// assert!(options.constraints.video);
/// assert_eq!(options.render.remote.as_deref(), Some("video-of-bob"));
/// assert_eq!(options.render.local, None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MediaOptions {
    pub constraints: MediaConstraints,
    pub render: RenderTargets,
}

impl MediaOptions {
    pub fn new(audio: bool, video: bool, remote: Option<String>, local: Option<String>) -> Self {
        Self {
            constraints: MediaConstraints { audio, video },
            render: RenderTargets { remote, local },
        }
    }

    /// Video on, audio off, no local preview
    pub fn video_only(remote: Option<String>) -> Self {
        Self::new(false, true, remote, None)
    }
}

/// Kind of a captured track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Audio,
    Video,
}

/// A local media stream handed to a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStream {
    pub id: Uuid,
    pub kind: MediaKind,
    pub label: String,
}

impl MediaStream {
    pub fn new(kind: MediaKind, label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            label: label.into(),
        }
    }
}

/// Strategy an endpoint uses to get local media for a session
#[async_trait]
pub trait MediaStreamManager: Send + Sync + std::fmt::Debug {
    /// Acquire local streams matching `hint`
    async fn acquire(&self, hint: &MediaConstraints) -> DuetResult<Vec<MediaStream>>;

    /// Give streams back once the session is over
    fn release(&self, streams: &[MediaStream]);
}

/// Never touches capture hardware: acquiring yields nothing, releasing does
/// nothing. Installed on data-only endpoints.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStreamManager;

#[async_trait]
impl MediaStreamManager for NullStreamManager {
    async fn acquire(&self, _hint: &MediaConstraints) -> DuetResult<Vec<MediaStream>> {
        Ok(Vec::new())
    }

    fn release(&self, _streams: &[MediaStream]) {}
}

/// Default strategy for media endpoints: one stream per requested track.
///
/// Devices are simulated; the manager only keeps count of streams that are
/// currently held so callers can check nothing leaks.
#[derive(Debug, Default)]
pub struct CaptureStreamManager {
    live: AtomicUsize,
}

impl CaptureStreamManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Streams acquired and not yet released
    pub fn live_streams(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaStreamManager for CaptureStreamManager {
    async fn acquire(&self, hint: &MediaConstraints) -> DuetResult<Vec<MediaStream>> {
        let mut streams = Vec::new();
        if hint.audio {
            streams.push(MediaStream::new(MediaKind::Audio, "microphone"));
        }
        if hint.video {
            streams.push(MediaStream::new(MediaKind::Video, "camera"));
        }
        self.live.fetch_add(streams.len(), Ordering::SeqCst);
        debug!("Acquired {} local stream(s)", streams.len());
        Ok(streams)
    }

    fn release(&self, streams: &[MediaStream]) {
        // saturating: releasing foreign streams must not wrap the counter
        let _ = self
            .live
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                Some(n.saturating_sub(streams.len()))
            });
        debug!("Released {} local stream(s)", streams.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_null_manager_yields_nothing() {
        let manager = NullStreamManager;
        let streams = manager
            .acquire(&MediaConstraints { audio: true, video: true })
            .await
            .unwrap();
        assert!(streams.is_empty());
        manager.release(&streams);
    }

    #[tokio::test]
    async fn test_capture_manager_follows_constraints() {
        let manager = CaptureStreamManager::new();
        let streams = manager
            .acquire(&MediaConstraints { audio: false, video: true })
            .await
            .unwrap();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].kind, MediaKind::Video);
        assert_eq!(manager.live_streams(), 1);

        manager.release(&streams);
        assert_eq!(manager.live_streams(), 0);

        manager.release(&streams);
        assert_eq!(manager.live_streams(), 0);
    }
}
