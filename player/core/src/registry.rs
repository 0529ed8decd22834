//! Player Registry - Multi-Surface Lifecycle
//!
//! Owns every playback surface on a page: activates candidates found by a
//! scan, hands activated instances to an [`EventOrchestrator`], routes events
//! by identity and tears surfaces down exactly once.
//!
//! # Architecture
//!
//! ```text
//!                       PlayerRegistry
//!                  ┌────────────────────────────────────────┐
//!                  │ HashMap<SurfaceId, RegistryEntry>      │
//!                  │   - wrapped in Arc<RwLock<>>           │
//!                  │ UpdateScheduler (shared frame loops)   │
//!                  │ VolumeMemory    (shared last volume)   │
//!                  └───────────────┬────────────────────────┘
//!                                  │
//!            ┌─────────────────────┼─────────────────────┐
//!            │                     │                     │
//!     ┌──────▼──────┐       ┌──────▼──────┐       ┌──────▼──────┐
//!     │ osp-1a2b..  │       │ osp-9f3c..  │       │ hero-video  │
//!     │ instance +  │       │ instance +  │       │ instance    │
//!     │ orchestrator│       │ orchestrator│       │ (failed)    │
//!     └─────────────┘       └─────────────┘       └─────────────┘
//! ```
//!
//! # Activation
//!
//! A candidate is registered as soon as it has a media device, so a
//! `destroy` issued while activation is still awaiting a collaborator is
//! seen: activation re-checks registration after every await and returns
//! [`SetupError::Cancelled`]. Surfaces that fail activation stay registered
//! in `playback = error` so hosts can inspect and destroy them.
//!
//! Registries are plain values; nothing here is process-wide.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::collaborators::Collaborators;
use crate::config::PlayerConfig;
use crate::controls::{ControlRegion, ControlsBundle, SurfaceHost};
use crate::error::{SetupError, NO_SOURCE_MESSAGE};
use crate::events::PlayerEvent;
use crate::instance::{PlayerInstance, SurfaceId, VolumeMemory};
use crate::media::{MediaDevice, MediaKind, MediaSource};
use crate::orchestrator::EventOrchestrator;
use crate::scheduler::UpdateScheduler;
use crate::state::{Category, StateValue};

/// A surface discovered by a scan, not yet activated
pub struct SurfaceCandidate {
    /// Identity; generated when absent
    pub id: Option<SurfaceId>,
    /// Underlying media element
    pub media: Option<Arc<dyn MediaDevice>>,
    /// Container the surface lives in
    pub host: Arc<dyn SurfaceHost>,
    /// Declared sources, in document order
    pub sources: Vec<MediaSource>,
    /// Source attribute on the element itself; wins over `sources`
    pub src: Option<String>,
    /// Subtitle track path
    pub subtitle_src: Option<String>,
    /// Interstitial overlay id
    pub interstitial: Option<String>,
    /// Device and input events for this surface
    pub events: Option<mpsc::Receiver<PlayerEvent>>,
}

impl SurfaceCandidate {
    /// Candidate driving `media` inside `host`
    pub fn new(media: Arc<dyn MediaDevice>, host: Arc<dyn SurfaceHost>) -> Self {
        Self {
            media: Some(media),
            ..Self::without_media(host)
        }
    }

    /// Candidate with no media element
    pub fn without_media(host: Arc<dyn SurfaceHost>) -> Self {
        Self {
            id: None,
            media: None,
            host,
            sources: Vec::new(),
            src: None,
            subtitle_src: None,
            interstitial: None,
            events: None,
        }
    }

    /// Use a host-supplied identity
    #[must_use]
    pub fn with_id(mut self, id: SurfaceId) -> Self {
        self.id = Some(id);
        self
    }

    /// Add a declared source
    #[must_use]
    pub fn with_source(mut self, source: MediaSource) -> Self {
        self.sources.push(source);
        self
    }

    /// Set the element's own source attribute
    #[must_use]
    pub fn with_src(mut self, src: impl Into<String>) -> Self {
        self.src = Some(src.into());
        self
    }

    /// Attach a subtitle track path
    #[must_use]
    pub fn with_subtitles(mut self, path: impl Into<String>) -> Self {
        self.subtitle_src = Some(path.into());
        self
    }

    /// Show an interstitial before playback
    #[must_use]
    pub fn with_interstitial(mut self, id: impl Into<String>) -> Self {
        self.interstitial = Some(id.into());
        self
    }

    /// Feed events from `rx`
    #[must_use]
    pub fn with_events(mut self, rx: mpsc::Receiver<PlayerEvent>) -> Self {
        self.events = Some(rx);
        self
    }

    /// The element's source attribute first, otherwise the first declared
    /// source; empty strings count as absent
    fn resolve_source(&self) -> Option<MediaSource> {
        if let Some(src) = self.src.as_deref().filter(|s| !s.trim().is_empty()) {
            return Some(MediaSource::new(src));
        }
        self.sources
            .iter()
            .find(|s| !s.src.trim().is_empty())
            .cloned()
    }
}

impl fmt::Debug for SurfaceCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfaceCandidate")
            .field("id", &self.id)
            .field("has_media", &self.media.is_some())
            .field("sources", &self.sources)
            .field("src", &self.src)
            .finish_non_exhaustive()
    }
}

/// Outcome of a bulk activation
#[derive(Debug, Default)]
pub struct ActivationReport {
    /// Surfaces now active
    pub activated: Vec<SurfaceId>,
    /// Per-surface failures
    pub failed: Vec<SetupError>,
}

impl ActivationReport {
    /// Whether every candidate activated
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

struct RegistryEntry {
    instance: Arc<PlayerInstance>,
    orchestrator: Option<EventOrchestrator>,
}

/// Registry of playback surfaces
#[derive(Clone)]
pub struct PlayerRegistry {
    inner: Arc<RwLock<HashMap<SurfaceId, RegistryEntry>>>,
    config: Arc<PlayerConfig>,
    collaborators: Collaborators,
    scheduler: UpdateScheduler,
    volume_memory: VolumeMemory,
}

impl PlayerRegistry {
    /// Empty registry
    pub fn new(config: PlayerConfig, collaborators: Collaborators) -> Self {
        let scheduler = UpdateScheduler::new(config.timing.frame_interval);
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            config: Arc::new(config),
            collaborators,
            scheduler,
            volume_memory: VolumeMemory::default(),
        }
    }

    /// Shared configuration
    #[must_use]
    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    /// Frame scheduler shared by every surface
    #[must_use]
    pub fn scheduler(&self) -> &UpdateScheduler {
        &self.scheduler
    }

    // =========================================================================
    // Activation
    // =========================================================================

    /// Activate every candidate concurrently
    ///
    /// A failure, or a panic, in one surface never affects the others.
    pub async fn activate(&self, candidates: Vec<SurfaceCandidate>) -> ActivationReport {
        let tasks = candidates.into_iter().map(|candidate| {
            let registry = self.clone();
            tokio::spawn(async move { registry.activate_one(candidate).await })
        });

        let mut report = ActivationReport::default();
        for result in join_all(tasks).await {
            match result {
                Ok(Ok(id)) => report.activated.push(id),
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "Surface activation failed");
                    report.failed.push(e);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Surface activation crashed");
                    report.failed.push(SetupError::Crashed(e.to_string()));
                }
            }
        }

        tracing::info!(
            activated = report.activated.len(),
            failed = report.failed.len(),
            "Activation scan complete"
        );
        report
    }

    /// Activate one candidate
    ///
    /// An identity that is already registered is left untouched.
    pub async fn activate_one(&self, mut candidate: SurfaceCandidate) -> Result<SurfaceId, SetupError> {
        let id = candidate.id.take().unwrap_or_else(SurfaceId::generate);
        if self.contains(&id) {
            tracing::debug!(surface_id = %id, "Surface already registered");
            return Ok(id);
        }
        let Some(media) = candidate.media.take() else {
            return Err(SetupError::NoMediaCapability(id));
        };

        let instance = Arc::new(PlayerInstance::new(
            id.clone(),
            Arc::clone(&media),
            Arc::clone(&candidate.host),
            Arc::clone(&self.config),
            self.volume_memory.clone(),
        ));
        {
            let mut surfaces = self.inner.write();
            if surfaces.contains_key(&id) {
                return Ok(id);
            }
            surfaces.insert(
                id.clone(),
                RegistryEntry {
                    instance: Arc::clone(&instance),
                    orchestrator: None,
                },
            );
        }
        instance.state().set_state(Category::Playback, StateValue::Loading);
        tracing::info!(surface_id = %id, kind = ?instance.kind(), "Surface registered");

        self.wire_controls(&instance).await?;

        let Some(source) = candidate.resolve_source() else {
            self.fail(&instance);
            instance.host().show_message(NO_SOURCE_MESSAGE);
            return Err(SetupError::NoSource(id));
        };

        self.run_interstitial(&instance, candidate.interstitial.as_deref())
            .await?;

        let features = &self.config.features;
        if let (Some(menu), true) = (&self.collaborators.context_menu, features.context_menu) {
            if instance.kind() == MediaKind::Video {
                if let Some(controls) = instance.controls() {
                    menu.initialize(Arc::clone(&media), Arc::clone(instance.host()), &controls);
                }
            }
        }

        self.attach_source(&instance, &source).await;
        self.ensure_registered(&instance)?;

        if let Some(path) = candidate.subtitle_src.take() {
            self.spawn_subtitle_load(&instance, path);
        }

        instance.set_active(true);
        let orchestrator = EventOrchestrator::wire(
            Arc::clone(&instance),
            self.scheduler.clone(),
            self.collaborators.clone(),
            candidate.events.take(),
        );
        if let Some(entry) = self.inner.write().get_mut(&id) {
            entry.orchestrator = Some(orchestrator);
        }

        tracing::info!(surface_id = %id, src = %source.src, "Surface activated");
        Ok(id)
    }

    async fn wire_controls(&self, instance: &Arc<PlayerInstance>) -> Result<(), SetupError> {
        let id = instance.id();
        let provider = &self.collaborators.controls;

        let bundle = match provider.wire(id, instance.kind()).await {
            Ok(bundle) => bundle,
            Err(e) => {
                self.ensure_registered(instance)?;
                self.fail(instance);
                return Err(SetupError::ControlsFailed {
                    surface: id.clone(),
                    reason: format!("{e:#}"),
                });
            }
        };
        if let Err(e) = self.ensure_registered(instance) {
            provider.remove(id);
            return Err(e);
        }

        let missing = bundle.missing_required();
        if !missing.is_empty() {
            provider.remove(id);
            self.fail(instance);
            return Err(SetupError::ControlsIncomplete {
                surface: id.clone(),
                missing,
            });
        }

        self.apply_region_visibility(instance.kind(), &bundle);
        instance.attach_controls(bundle);
        Ok(())
    }

    fn apply_region_visibility(&self, kind: MediaKind, controls: &ControlsBundle) {
        let features = &self.config.features;
        let video = kind == MediaKind::Video;
        controls.show(ControlRegion::FastForward, features.fast_forward);
        controls.show(ControlRegion::Cinematic, video && features.cinematic_mode);
        controls.show(ControlRegion::Settings, video && features.settings_menu);
        controls.show(ControlRegion::SettingsMenu, false);
        // Shown once a track actually loads
        controls.show(ControlRegion::Subtitle, false);
    }

    async fn run_interstitial(
        &self,
        instance: &Arc<PlayerInstance>,
        overlay: Option<&str>,
    ) -> Result<(), SetupError> {
        let Some(overlay) = overlay else {
            return Ok(());
        };
        let Some(interstitial) = self.collaborators.interstitial.as_ref() else {
            return Ok(());
        };
        if !self.config.features.interstitial || instance.kind() != MediaKind::Video {
            return Ok(());
        }

        let id = instance.id();
        tracing::debug!(surface_id = %id, overlay, "Presenting interstitial");
        let completed = match interstitial.present(Arc::clone(instance.media()), id).await {
            Ok(completed) => completed,
            Err(e) => {
                tracing::warn!(surface_id = %id, error = %e, "Interstitial failed");
                false
            }
        };
        self.ensure_registered(instance)?;
        if !completed {
            self.fail(instance);
            return Err(SetupError::InterstitialRejected(id.clone()));
        }
        Ok(())
    }

    async fn attach_source(&self, instance: &Arc<PlayerInstance>, source: &MediaSource) {
        let media = instance.media();
        let adaptive = self
            .collaborators
            .adaptive
            .as_ref()
            .filter(|_| self.config.features.adaptive_source && instance.kind() == MediaKind::Video);

        if let Some(adaptive) = adaptive {
            match adaptive.attach(Arc::clone(media), source).await {
                Ok(()) => return,
                Err(e) => {
                    tracing::warn!(
                        surface_id = %instance.id(),
                        error = %e,
                        "Adaptive source setup failed, assigning source directly"
                    );
                }
            }
        }
        media.set_source(source);
    }

    fn spawn_subtitle_load(&self, instance: &Arc<PlayerInstance>, path: String) {
        let Some(loader) = self.collaborators.subtitles.clone() else {
            return;
        };
        if !self.config.features.subtitles {
            return;
        }
        let weak = Arc::downgrade(instance);
        let media = Arc::clone(instance.media());
        tokio::spawn(async move {
            let loaded = loader.load(media, &path).await;
            let Some(instance) = weak.upgrade() else {
                return;
            };
            if !instance.is_active() {
                return;
            }
            if loaded {
                instance.set_subtitles_available(true);
                if let Some(controls) = instance.controls() {
                    controls.show(ControlRegion::Subtitle, true);
                }
                tracing::debug!(surface_id = %instance.id(), path, "Subtitles loaded");
            } else {
                tracing::warn!(surface_id = %instance.id(), path, "Subtitles failed to load");
            }
        });
    }

    /// Activation aborted: error state, controls gone
    fn fail(&self, instance: &PlayerInstance) {
        instance.state().set_state(Category::Playback, StateValue::Error);
        instance.teardown_controls(self.collaborators.controls.as_ref());
    }

    fn ensure_registered(&self, instance: &Arc<PlayerInstance>) -> Result<(), SetupError> {
        let registered = self
            .inner
            .read()
            .get(instance.id())
            .is_some_and(|entry| Arc::ptr_eq(&entry.instance, instance));
        if registered {
            Ok(())
        } else {
            tracing::debug!(surface_id = %instance.id(), "Surface destroyed during activation");
            Err(SetupError::Cancelled(instance.id().clone()))
        }
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Destroy a surface
    ///
    /// Unknown identities are a no-op; returns whether anything was torn down.
    pub fn destroy(&self, id: &SurfaceId) -> bool {
        let Some(entry) = self.inner.write().remove(id) else {
            tracing::debug!(surface_id = %id, "Destroy of unknown surface ignored");
            return false;
        };
        let instance = entry.instance;

        instance.set_active(false);
        instance.state().clear_listeners();
        self.scheduler.cancel(id);
        instance.stall_watchdog().clear();
        instance.inactivity_timer().clear();
        instance.abort_event_pump();
        instance.teardown_controls(self.collaborators.controls.as_ref());
        instance.host().detach();

        tracing::info!(surface_id = %id, "Surface destroyed");
        true
    }

    /// Destroy every surface; returns how many were torn down
    pub fn destroy_all(&self) -> usize {
        let destroyed = self
            .ids()
            .iter()
            .filter(|id| self.destroy(id))
            .count();
        tracing::info!(destroyed, "All surfaces destroyed");
        destroyed
    }

    // =========================================================================
    // Routing and lookup
    // =========================================================================

    /// Deliver an event to one surface
    ///
    /// Returns `false` when the surface is unknown or not yet active.
    pub fn dispatch(&self, id: &SurfaceId, event: PlayerEvent) -> bool {
        let Some(orchestrator) = self.orchestrator(id) else {
            tracing::trace!(surface_id = %id, "No active surface for event");
            return false;
        };
        orchestrator.handle(event);
        true
    }

    /// Instance for `id`
    #[must_use]
    pub fn get(&self, id: &SurfaceId) -> Option<Arc<PlayerInstance>> {
        self.inner.read().get(id).map(|e| Arc::clone(&e.instance))
    }

    /// Orchestrator for `id`, present once activation completed
    #[must_use]
    pub fn orchestrator(&self, id: &SurfaceId) -> Option<EventOrchestrator> {
        self.inner.read().get(id).and_then(|e| e.orchestrator.clone())
    }

    /// Whether `id` is registered
    #[must_use]
    pub fn contains(&self, id: &SurfaceId) -> bool {
        self.inner.read().contains_key(id)
    }

    /// Number of registered surfaces
    #[must_use]
    pub fn count(&self) -> usize {
        self.inner.read().len()
    }

    /// Registered identities, sorted
    #[must_use]
    pub fn ids(&self) -> Vec<SurfaceId> {
        let mut ids: Vec<_> = self.inner.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Surface count per playback value
    #[must_use]
    pub fn summary(&self) -> BTreeMap<StateValue, usize> {
        let mut summary = BTreeMap::new();
        for entry in self.inner.read().values() {
            *summary.entry(entry.instance.playback()).or_insert(0) += 1;
        }
        summary
    }
}

impl fmt::Debug for PlayerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayerRegistry")
            .field("surfaces", &self.ids())
            .field("collaborators", &self.collaborators)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}
