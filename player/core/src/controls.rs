//! Controls and Host Contracts
//!
//! The controls bundle is a flat record of named regions plus a view that
//! accepts visual updates. The core never builds markup: a
//! [`ControlsProvider`] wires a bundle for a surface, and the core only calls
//! the documented [`ControlsView`] operations on it.
//!
//! [`SurfaceHost`] is the container around the media element: loading
//! indicator, message overlay, fullscreen and page-level dimming.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DeviceError;
use crate::instance::SurfaceId;
use crate::media::MediaKind;

/// Named interactive regions of a controls bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlRegion {
    /// Control bar container
    Container,
    /// Play/pause button
    PlayPause,
    /// Mute button
    Mute,
    /// Fullscreen button
    Fullscreen,
    /// Cinematic mode button
    Cinematic,
    /// Subtitle button
    Subtitle,
    /// Settings button
    Settings,
    /// Settings popup
    SettingsMenu,
    /// Fast-forward button
    FastForward,
    /// Volume slider
    VolumeRange,
    /// Seek slider
    SeekRange,
    /// Elapsed time text
    ElapsedText,
    /// Duration text
    LengthText,
}

impl ControlRegion {
    /// Regions every bundle must provide
    pub const REQUIRED: [ControlRegion; 8] = [
        ControlRegion::Container,
        ControlRegion::PlayPause,
        ControlRegion::Mute,
        ControlRegion::Fullscreen,
        ControlRegion::VolumeRange,
        ControlRegion::SeekRange,
        ControlRegion::ElapsedText,
        ControlRegion::LengthText,
    ];

    /// Every region
    pub const ALL: [ControlRegion; 13] = [
        ControlRegion::Container,
        ControlRegion::PlayPause,
        ControlRegion::Mute,
        ControlRegion::Fullscreen,
        ControlRegion::Cinematic,
        ControlRegion::Subtitle,
        ControlRegion::Settings,
        ControlRegion::SettingsMenu,
        ControlRegion::FastForward,
        ControlRegion::VolumeRange,
        ControlRegion::SeekRange,
        ControlRegion::ElapsedText,
        ControlRegion::LengthText,
    ];
}

/// Icons the core asks the view to show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IconId {
    /// Media is not playing
    Play,
    /// Media is playing
    Pause,
    /// Audible
    VolumeUp,
    /// Muted or volume zero
    Mute,
    /// Windowed
    Fullscreen,
    /// Fullscreen
    FullscreenExit,
    /// Cinematic mode off
    CinemaMode,
    /// Cinematic mode on
    CinemaModeActive,
}

impl IconId {
    /// Sprite fragment name
    #[must_use]
    pub fn fragment(&self) -> &'static str {
        match self {
            Self::Play => "icon-play",
            Self::Pause => "icon-pause",
            Self::VolumeUp => "icon-volume-up",
            Self::Mute => "icon-mute",
            Self::Fullscreen => "icon-fullscreen",
            Self::FullscreenExit => "icon-fullscreen-exit",
            Self::CinemaMode => "icon-cinema-mode",
            Self::CinemaModeActive => "icon-cinema-mode-active",
        }
    }
}

/// Visual update operations on a controls bundle
pub trait ControlsView: Send + Sync {
    /// Show an icon in a button region
    fn set_icon(&self, region: ControlRegion, icon: IconId);

    /// Replace the text of a text region
    fn set_text(&self, region: ControlRegion, text: &str);

    /// Move a range region, as a percentage
    fn set_range(&self, region: ControlRegion, percent: f64);

    /// Buffered portion of the seek range, as a percentage
    fn set_buffered(&self, percent: f64);

    /// Show or hide one region
    fn set_region_visible(&self, region: ControlRegion, visible: bool);

    /// Enable or grey out the whole bundle
    fn set_enabled(&self, enabled: bool);

    /// Show or hide the control bar
    fn set_controls_visible(&self, visible: bool);
}

/// Regions wired for one surface plus the view that renders them
#[derive(Clone)]
pub struct ControlsBundle {
    regions: BTreeSet<ControlRegion>,
    view: Arc<dyn ControlsView>,
}

impl ControlsBundle {
    /// Bundle exposing `regions`
    pub fn new(view: Arc<dyn ControlsView>, regions: impl IntoIterator<Item = ControlRegion>) -> Self {
        Self {
            regions: regions.into_iter().collect(),
            view,
        }
    }

    /// Bundle exposing every region
    pub fn complete(view: Arc<dyn ControlsView>) -> Self {
        Self::new(view, ControlRegion::ALL)
    }

    /// Whether `region` was wired
    #[must_use]
    pub fn has(&self, region: ControlRegion) -> bool {
        self.regions.contains(&region)
    }

    /// Required regions that are absent
    #[must_use]
    pub fn missing_required(&self) -> Vec<ControlRegion> {
        ControlRegion::REQUIRED
            .into_iter()
            .filter(|r| !self.has(*r))
            .collect()
    }

    /// The view itself
    #[must_use]
    pub fn view(&self) -> &dyn ControlsView {
        self.view.as_ref()
    }

    pub(crate) fn icon(&self, region: ControlRegion, icon: IconId) {
        if self.has(region) {
            self.view.set_icon(region, icon);
        }
    }

    pub(crate) fn text(&self, region: ControlRegion, text: &str) {
        if self.has(region) {
            self.view.set_text(region, text);
        }
    }

    pub(crate) fn range(&self, region: ControlRegion, percent: f64) {
        if self.has(region) {
            self.view.set_range(region, percent);
        }
    }

    pub(crate) fn show(&self, region: ControlRegion, visible: bool) {
        if self.has(region) {
            self.view.set_region_visible(region, visible);
        }
    }
}

impl fmt::Debug for ControlsBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlsBundle")
            .field("regions", &self.regions)
            .finish_non_exhaustive()
    }
}

/// Builds and removes controls bundles
#[async_trait]
pub trait ControlsProvider: Send + Sync {
    /// Wire controls for a surface
    async fn wire(&self, surface: &SurfaceId, kind: MediaKind) -> anyhow::Result<ControlsBundle>;

    /// Remove the controls of a surface
    fn remove(&self, surface: &SurfaceId);
}

/// Container around the media element
pub trait SurfaceHost: Send + Sync {
    /// Show a message over the media
    fn show_message(&self, message: &str);

    /// Remove the message overlay
    fn clear_message(&self);

    /// Show or hide the loading indicator
    fn set_loading(&self, visible: bool);

    /// Whether the container is fullscreen
    fn is_fullscreen(&self) -> bool;

    /// Enter fullscreen
    fn request_fullscreen(&self) -> Result<(), DeviceError>;

    /// Leave fullscreen
    fn exit_fullscreen(&self) -> Result<(), DeviceError>;

    /// Dim or restore the page around the surface
    fn set_cinematic(&self, active: bool);

    /// Remove the surface from the page
    fn detach(&self);
}
