//! Optional Feature Collaborators
//!
//! Subtitles, adaptive streaming, interstitial overlays and the context menu
//! live outside the core. Each one is optional; a failure disables the feature
//! for that surface only, except the interstitial, whose failure aborts
//! activation.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::controls::{ControlsBundle, ControlsProvider, SurfaceHost};
use crate::instance::SurfaceId;
use crate::media::{MediaDevice, MediaSource};

/// Loads a subtitle track for a media element
#[async_trait]
pub trait SubtitleLoader: Send + Sync {
    /// Returns whether a track was attached
    async fn load(&self, media: Arc<dyn MediaDevice>, path: &str) -> bool;
}

/// Adaptive streaming setup
#[async_trait]
pub trait AdaptiveSource: Send + Sync {
    /// Attach `source` through the streaming engine
    ///
    /// On error the core assigns the source directly.
    async fn attach(&self, media: Arc<dyn MediaDevice>, source: &MediaSource) -> anyhow::Result<()>;
}

/// Overlay shown before playback
#[async_trait]
pub trait Interstitial: Send + Sync {
    /// Returns `true` once the overlay completed; `false` or an error aborts
    /// activation
    async fn present(&self, media: Arc<dyn MediaDevice>, surface: &SurfaceId) -> anyhow::Result<bool>;
}

/// Context menu initializer
pub trait ContextMenu: Send + Sync {
    /// Fire-and-forget setup
    fn initialize(
        &self,
        media: Arc<dyn MediaDevice>,
        host: Arc<dyn SurfaceHost>,
        controls: &ControlsBundle,
    );
}

/// Every collaborator a registry hands to its surfaces
#[derive(Clone)]
pub struct Collaborators {
    /// Controls wiring, always present
    pub controls: Arc<dyn ControlsProvider>,
    /// Subtitle loader
    pub subtitles: Option<Arc<dyn SubtitleLoader>>,
    /// Adaptive streaming
    pub adaptive: Option<Arc<dyn AdaptiveSource>>,
    /// Interstitial overlay
    pub interstitial: Option<Arc<dyn Interstitial>>,
    /// Context menu
    pub context_menu: Option<Arc<dyn ContextMenu>>,
}

impl Collaborators {
    /// Only the controls provider; every optional feature absent
    pub fn new(controls: Arc<dyn ControlsProvider>) -> Self {
        Self {
            controls,
            subtitles: None,
            adaptive: None,
            interstitial: None,
            context_menu: None,
        }
    }

    /// Add a subtitle loader
    #[must_use]
    pub fn with_subtitles(mut self, loader: Arc<dyn SubtitleLoader>) -> Self {
        self.subtitles = Some(loader);
        self
    }

    /// Add an adaptive streaming collaborator
    #[must_use]
    pub fn with_adaptive(mut self, adaptive: Arc<dyn AdaptiveSource>) -> Self {
        self.adaptive = Some(adaptive);
        self
    }

    /// Add an interstitial overlay
    #[must_use]
    pub fn with_interstitial(mut self, interstitial: Arc<dyn Interstitial>) -> Self {
        self.interstitial = Some(interstitial);
        self
    }

    /// Add a context menu initializer
    #[must_use]
    pub fn with_context_menu(mut self, menu: Arc<dyn ContextMenu>) -> Self {
        self.context_menu = Some(menu);
        self
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("subtitles", &self.subtitles.is_some())
            .field("adaptive", &self.adaptive.is_some())
            .field("interstitial", &self.interstitial.is_some())
            .field("context_menu", &self.context_menu.is_some())
            .finish_non_exhaustive()
    }
}
