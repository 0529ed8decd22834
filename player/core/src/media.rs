//! Media Device Contract
//!
//! The underlying audio/video element, as seen by the core. Hosts implement
//! [`MediaDevice`] over whatever actually plays the media; the core only
//! issues commands and reads position, duration and buffered ranges.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DeviceError;

/// Kind of media element behind a surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Video element
    Video,
    /// Audio element; never auto-hides controls, no settings or cinematic
    Audio,
}

/// A candidate media source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSource {
    /// URL of the resource
    pub src: String,
    /// Declared MIME type
    pub mime_type: Option<String>,
}

impl MediaSource {
    /// Source without a declared type
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            mime_type: None,
        }
    }

    /// Source with a declared type
    pub fn with_type(src: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            mime_type: Some(mime_type.into()),
        }
    }

    /// Declared type, or `video/<extension>` guessed from the URL
    #[must_use]
    pub fn resolved_type(&self) -> Option<String> {
        if let Some(ref t) = self.mime_type {
            return Some(t.clone());
        }
        let path = self.src.split(['?', '#']).next().unwrap_or_default();
        let file = path.rsplit('/').next().unwrap_or_default();
        file.rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty())
            .map(|ext| format!("video/{}", ext.to_ascii_lowercase()))
    }
}

/// A buffered span of the media timeline, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start of the span
    pub start: f64,
    /// End of the span
    pub end: f64,
}

impl TimeRange {
    /// Create a range
    #[must_use]
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }
}

/// The playable media element behind a surface
///
/// `duration()` returns `NaN` (or infinity for live streams) until metadata
/// is known.
#[async_trait]
pub trait MediaDevice: Send + Sync {
    /// Element kind
    fn kind(&self) -> MediaKind;

    /// Start playback; may be rejected asynchronously
    async fn play(&self) -> Result<(), DeviceError>;

    /// Pause playback
    fn pause(&self);

    /// Whether the element is paused
    fn is_paused(&self) -> bool;

    /// Whether the element reached the end
    fn has_ended(&self) -> bool;

    /// Position in seconds
    fn current_time(&self) -> f64;

    /// Move to a position in seconds
    fn set_current_time(&self, seconds: f64);

    /// Duration in seconds
    fn duration(&self) -> f64;

    /// Volume in `[0, 1]`
    fn volume(&self) -> f64;

    /// Set the volume in `[0, 1]`
    fn set_volume(&self, level: f64);

    /// Whether the element is muted
    fn is_muted(&self) -> bool;

    /// Mute or unmute
    fn set_muted(&self, muted: bool);

    /// Buffered spans, ordered by start
    fn buffered(&self) -> Vec<TimeRange>;

    /// Assign a source directly
    fn set_source(&self, source: &MediaSource);

    /// Whether picture-in-picture is available
    fn supports_picture_in_picture(&self) -> bool {
        false
    }

    /// Enter or leave picture-in-picture
    async fn set_picture_in_picture(&self, _enabled: bool) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported("picture-in-picture"))
    }
}

/// Duration if finite and positive
#[must_use]
pub fn known_duration(duration: f64) -> Option<f64> {
    (duration.is_finite() && duration > 0.0).then_some(duration)
}

/// Percentage of the timeline that is buffered
///
/// Uses the end of the last range; snaps to 100 when within 0.1 s of the end.
#[must_use]
pub fn buffered_percent(ranges: &[TimeRange], duration: f64) -> f64 {
    let (Some(duration), Some(last)) = (known_duration(duration), ranges.last()) else {
        return 0.0;
    };
    if duration - last.end < 0.1 {
        return 100.0;
    }
    (last.end * 100.0 / duration).clamp(0.0, 100.0)
}

/// Position as a percentage of duration, 0 when duration is unknown
#[must_use]
pub fn position_percent(current: f64, duration: f64) -> f64 {
    match known_duration(duration) {
        Some(d) if current.is_finite() => (current * 100.0 / d).clamp(0.0, 100.0),
        _ => 0.0,
    }
}
