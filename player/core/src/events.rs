//! Event Types
//!
//! Everything that reaches an orchestrator: signals from the media device and
//! user input routed by the host. Events are plain data so hosts can script
//! them (and tests can replay them) as JSON.

use serde::{Deserialize, Serialize};

use crate::controls::ControlRegion;
use crate::error::MediaErrorCode;

/// Any event delivered to a surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", content = "event", rename_all = "snake_case")]
pub enum PlayerEvent {
    /// Signal from the media device
    Media(MediaEvent),
    /// User input on the surface or its controls
    Input(InputEvent),
}

impl From<MediaEvent> for PlayerEvent {
    fn from(event: MediaEvent) -> Self {
        Self::Media(event)
    }
}

impl From<InputEvent> for PlayerEvent {
    fn from(event: InputEvent) -> Self {
        Self::Input(event)
    }
}

/// Signals raised by the media device
///
/// The device may raise these in any order, and interleaved with user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaEvent {
    /// Device fault
    Error(MediaErrorCode),
    /// A new load cycle began
    LoadStart,
    /// Duration and dimensions are known
    LoadedMetadata,
    /// First frame is available
    LoadedData,
    /// Enough data to start playing
    CanPlay,
    /// Playback started or resumed
    Playing,
    /// Playback paused
    Paused,
    /// Playback is waiting for data
    Waiting,
    /// Fetching stalled
    Stalled,
    /// Reached the end of the media
    Ended,
    /// Position advanced
    TimeUpdate,
    /// Buffered ranges grew
    Progress,
    /// Host fullscreen state changed
    FullscreenChange,
    /// Media was reset to an empty state
    Emptied,
}

impl MediaEvent {
    /// DOM event name
    #[must_use]
    pub fn dom_name(&self) -> &'static str {
        match self {
            Self::Error(_) => "error",
            Self::LoadStart => "loadstart",
            Self::LoadedMetadata => "loadedmetadata",
            Self::LoadedData => "loadeddata",
            Self::CanPlay => "canplay",
            Self::Playing => "playing",
            Self::Paused => "pause",
            Self::Waiting => "waiting",
            Self::Stalled => "stalled",
            Self::Ended => "ended",
            Self::TimeUpdate => "timeupdate",
            Self::Progress => "progress",
            Self::FullscreenChange => "fullscreenchange",
            Self::Emptied => "emptied",
        }
    }

    /// Parse a DOM event name; `error` needs a code and is not accepted here
    #[must_use]
    pub fn from_dom_name(name: &str) -> Option<Self> {
        let event = match name {
            "loadstart" => Self::LoadStart,
            "loadedmetadata" => Self::LoadedMetadata,
            "loadeddata" => Self::LoadedData,
            "canplay" => Self::CanPlay,
            "playing" => Self::Playing,
            "pause" => Self::Paused,
            "waiting" => Self::Waiting,
            "stalled" => Self::Stalled,
            "ended" => Self::Ended,
            "timeupdate" => Self::TimeUpdate,
            "progress" => Self::Progress,
            "fullscreenchange" => Self::FullscreenChange,
            "emptied" => Self::Emptied,
            _ => return None,
        };
        Some(event)
    }
}

/// User input routed by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputEvent {
    /// Click on the media area itself
    SurfaceClicked,
    /// Click on a control region
    ControlClicked(ControlRegion),
    /// Key press with the element that had focus
    Key {
        /// Pressed key
        key: Key,
        /// Element holding focus
        focus: FocusTarget,
    },
    /// Pointer went down on the seek range
    SeekBegin,
    /// Seek range dragged to a position
    SeekInput {
        /// Position as a percentage of duration
        percent: f64,
    },
    /// Pointer released anywhere on the page
    SeekEnd,
    /// Volume range dragged
    VolumeInput {
        /// Volume in `[0, 1]`
        level: f64,
    },
    /// Pointer moved over the surface
    PointerMoved,
    /// Pointer entered the control bar
    PointerEnteredControls,
    /// Pointer left the control bar
    PointerLeftControls,
    /// Context menu "loop" entry
    ToggleLoop,
    /// Context menu "picture in picture" entry
    TogglePictureInPicture,
}

/// Keys the shortcut map understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    /// Space bar
    Space,
    /// Up arrow
    ArrowUp,
    /// Down arrow
    ArrowDown,
    /// Left arrow
    ArrowLeft,
    /// Right arrow
    ArrowRight,
    /// Printable character, lower-cased
    Char(char),
    /// Anything else
    Other,
}

impl Key {
    /// Map a DOM `KeyboardEvent.key` value
    #[must_use]
    pub fn from_dom_key(key: &str) -> Self {
        match key {
            " " | "Spacebar" | "Space" => Self::Space,
            "ArrowUp" => Self::ArrowUp,
            "ArrowDown" => Self::ArrowDown,
            "ArrowLeft" => Self::ArrowLeft,
            "ArrowRight" => Self::ArrowRight,
            other => {
                let mut chars = other.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Self::Char(c.to_ascii_lowercase()),
                    _ => Self::Other,
                }
            }
        }
    }
}

/// Element holding input focus when a key was pressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusTarget {
    /// The surface container
    Surface,
    /// A region inside the surface
    Region(ControlRegion),
    /// A free-text input anywhere on the page
    TextInput,
    /// Something outside this surface
    Outside,
}

impl FocusTarget {
    /// Whether shortcuts apply with this focus
    #[must_use]
    pub fn accepts_shortcuts(&self) -> bool {
        matches!(self, Self::Surface | Self::Region(_))
    }
}

/// Action bound to a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortcut {
    /// Play or pause
    TogglePlay,
    /// Raise volume one step
    VolumeUp,
    /// Lower volume one step
    VolumeDown,
    /// Skip backward one step
    SeekBackward,
    /// Skip forward one step
    SeekForward,
    /// Enter or leave fullscreen
    ToggleFullscreen,
    /// Mute or unmute
    ToggleMute,
    /// Cinematic dimming
    ToggleCinematic,
    /// Subtitle track
    ToggleSubtitles,
    /// Settings menu
    ToggleSettings,
}

impl Shortcut {
    /// Resolve a key press; `None` when the key is unbound or focus rejects it
    #[must_use]
    pub fn for_key(key: Key, focus: FocusTarget) -> Option<Self> {
        if !focus.accepts_shortcuts() {
            return None;
        }
        let on_seek_range = focus == FocusTarget::Region(ControlRegion::SeekRange);
        let shortcut = match key {
            Key::Space => Self::TogglePlay,
            Key::ArrowUp | Key::ArrowDown if on_seek_range => return None,
            Key::ArrowUp => Self::VolumeUp,
            Key::ArrowDown => Self::VolumeDown,
            Key::ArrowLeft => Self::SeekBackward,
            Key::ArrowRight => Self::SeekForward,
            Key::Char('f') => Self::ToggleFullscreen,
            Key::Char('m') => Self::ToggleMute,
            Key::Char('c') => Self::ToggleCinematic,
            Key::Char('s') => Self::ToggleSubtitles,
            Key::Char('t') => Self::ToggleSettings,
            Key::Char(_) | Key::Other => return None,
        };
        Some(shortcut)
    }
}
