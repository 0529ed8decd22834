//! Player Instance
//!
//! One playback surface: identity, media device, host container, controls
//! bundle, state machine and the two per-surface timers. The instance owns
//! the UI refresh routines; deciding *when* to call them is the
//! orchestrator's job.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::PlayerConfig;
use crate::controls::{ControlRegion, ControlsBundle, ControlsProvider, IconId, SurfaceHost};
use crate::media::{buffered_percent, known_duration, position_percent, MediaDevice, MediaKind};
use crate::scheduler::FrameTarget;
use crate::state::{Category, StateMachine, StateValue};
use crate::watchdog::Watchdog;

/// Opaque, stable identity of a surface
///
/// Hosts may supply their own token; generated ones look like
/// `osp-3f2a...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SurfaceId(String);

impl SurfaceId {
    /// Wrap an existing token
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh unique identity
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("osp-{}", Uuid::new_v4().simple()))
    }

    /// Raw token
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Last audible volume, shared by every surface of a registry
#[derive(Debug, Clone, Default)]
pub struct VolumeMemory {
    last: Arc<Mutex<Option<f64>>>,
}

impl VolumeMemory {
    /// Remember `level` if it is audible
    pub fn remember(&self, level: f64) {
        if level > 0.0 && level.is_finite() {
            *self.last.lock() = Some(level.min(1.0));
        }
    }

    /// Last remembered audible level
    #[must_use]
    pub fn recall(&self) -> Option<f64> {
        *self.last.lock()
    }
}

/// `m:ss`, e.g. `0:07`, `12:34`, `75:00`
#[must_use]
pub fn format_time(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "0:00".to_string();
    }
    let minutes = (seconds / 60.0).floor() as u64;
    let secs = (seconds % 60.0).floor() as u64;
    format!("{minutes}:{secs:02}")
}

/// A single playback surface
pub struct PlayerInstance {
    id: SurfaceId,
    kind: MediaKind,
    media: Arc<dyn MediaDevice>,
    host: Arc<dyn SurfaceHost>,
    controls: RwLock<Option<ControlsBundle>>,
    state: StateMachine,
    config: Arc<PlayerConfig>,
    volume_memory: VolumeMemory,
    stall_watchdog: Watchdog,
    inactivity: Watchdog,
    active: AtomicBool,
    ready_check_armed: AtomicBool,
    resume_after_seek: AtomicBool,
    subtitles_available: AtomicBool,
    refresh_pending: AtomicBool,
    event_pump: Mutex<Option<JoinHandle<()>>>,
}

impl PlayerInstance {
    /// Create an inactive instance with default state
    pub fn new(
        id: SurfaceId,
        media: Arc<dyn MediaDevice>,
        host: Arc<dyn SurfaceHost>,
        config: Arc<PlayerConfig>,
        volume_memory: VolumeMemory,
    ) -> Self {
        Self {
            id,
            kind: media.kind(),
            media,
            host,
            controls: RwLock::new(None),
            state: StateMachine::new(),
            config,
            volume_memory,
            stall_watchdog: Watchdog::new("stall"),
            inactivity: Watchdog::new("inactivity"),
            active: AtomicBool::new(false),
            ready_check_armed: AtomicBool::new(true),
            resume_after_seek: AtomicBool::new(false),
            subtitles_available: AtomicBool::new(false),
            refresh_pending: AtomicBool::new(false),
            event_pump: Mutex::new(None),
        }
    }

    /// Surface identity
    #[must_use]
    pub fn id(&self) -> &SurfaceId {
        &self.id
    }

    /// Media kind
    #[must_use]
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Media device
    #[must_use]
    pub fn media(&self) -> &Arc<dyn MediaDevice> {
        &self.media
    }

    /// Host container
    #[must_use]
    pub fn host(&self) -> &Arc<dyn SurfaceHost> {
        &self.host
    }

    /// State machine
    #[must_use]
    pub fn state(&self) -> &StateMachine {
        &self.state
    }

    /// Shared configuration
    #[must_use]
    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    /// Current playback value
    #[must_use]
    pub fn playback(&self) -> StateValue {
        self.state.get_state(Category::Playback)
    }

    /// Whether the user is dragging the seek range
    #[must_use]
    pub fn is_seeking(&self) -> bool {
        self.state.is(Category::Seeking, StateValue::Seeking)
    }

    /// Whether activation completed and the surface was not destroyed
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    /// Controls bundle, if still attached
    #[must_use]
    pub fn controls(&self) -> Option<ControlsBundle> {
        self.controls.read().clone()
    }

    /// Whether a controls bundle is attached
    #[must_use]
    pub fn has_controls(&self) -> bool {
        self.controls.read().is_some()
    }

    pub(crate) fn attach_controls(&self, bundle: ControlsBundle) {
        *self.controls.write() = Some(bundle);
    }

    pub(crate) fn take_controls(&self) -> Option<ControlsBundle> {
        self.controls.write().take()
    }

    /// Grey out and remove the controls bundle
    ///
    /// Returns whether a bundle was still attached.
    pub(crate) fn teardown_controls(&self, provider: &dyn ControlsProvider) -> bool {
        let Some(bundle) = self.take_controls() else {
            return false;
        };
        bundle.view().set_enabled(false);
        provider.remove(&self.id);
        tracing::debug!(surface_id = %self.id, "Controls removed");
        true
    }

    /// Stall watchdog
    #[must_use]
    pub fn stall_watchdog(&self) -> &Watchdog {
        &self.stall_watchdog
    }

    /// Controls auto-hide timer
    #[must_use]
    pub fn inactivity_timer(&self) -> &Watchdog {
        &self.inactivity
    }

    /// Registry-wide volume memory
    #[must_use]
    pub fn volume_memory(&self) -> &VolumeMemory {
        &self.volume_memory
    }

    /// Whether the subtitle loader attached a track
    #[must_use]
    pub fn subtitles_available(&self) -> bool {
        self.subtitles_available.load(Ordering::Acquire)
    }

    pub(crate) fn set_subtitles_available(&self, available: bool) {
        self.subtitles_available.store(available, Ordering::Release);
    }

    pub(crate) fn arm_ready_check(&self) {
        self.ready_check_armed.store(true, Ordering::Release);
    }

    pub(crate) fn ready_check_armed(&self) -> bool {
        self.ready_check_armed.load(Ordering::Acquire)
    }

    /// Disarm the ready check; returns whether this call disarmed it
    pub(crate) fn disarm_ready_check(&self) -> bool {
        self.ready_check_armed.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn set_resume_after_seek(&self, resume: bool) {
        self.resume_after_seek.store(resume, Ordering::Release);
    }

    pub(crate) fn take_resume_after_seek(&self) -> bool {
        self.resume_after_seek.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn set_event_pump(&self, task: JoinHandle<()>) {
        if let Some(previous) = self.event_pump.lock().replace(task) {
            previous.abort();
        }
    }

    pub(crate) fn abort_event_pump(&self) {
        if let Some(task) = self.event_pump.lock().take() {
            task.abort();
        }
    }

    // -------------------------------------------------------------------------
    // UI refresh
    // -------------------------------------------------------------------------

    /// Icons, volume slider and settings menu visibility
    ///
    /// Runs on every state notification.
    pub fn render_static(&self) {
        let Some(controls) = self.controls() else {
            return;
        };
        let snapshot = self.state.snapshot();

        let play_icon = if snapshot.get(Category::Playback) == StateValue::Playing {
            IconId::Pause
        } else {
            IconId::Play
        };
        controls.icon(ControlRegion::PlayPause, play_icon);

        let volume = self.media.volume();
        let silent = self.media.is_muted() || volume == 0.0;
        controls.icon(
            ControlRegion::Mute,
            if silent { IconId::Mute } else { IconId::VolumeUp },
        );
        controls.range(
            ControlRegion::VolumeRange,
            if silent { 0.0 } else { volume * 100.0 },
        );

        let fullscreen_icon = if snapshot.get(Category::Display) == StateValue::Fullscreen {
            IconId::FullscreenExit
        } else {
            IconId::Fullscreen
        };
        controls.icon(ControlRegion::Fullscreen, fullscreen_icon);

        let cinema_icon = if snapshot.get(Category::VisualMode) == StateValue::Cinematic {
            IconId::CinemaModeActive
        } else {
            IconId::CinemaMode
        };
        controls.icon(ControlRegion::Cinematic, cinema_icon);

        controls.show(
            ControlRegion::SettingsMenu,
            snapshot.get(Category::Settings) == StateValue::Open,
        );
    }

    /// Seek slider position and buffered fraction
    pub fn refresh_position(&self) {
        let Some(controls) = self.controls() else {
            return;
        };
        let percent = position_percent(self.media.current_time(), self.media.duration());
        controls.range(ControlRegion::SeekRange, percent);
        controls
            .view()
            .set_buffered(buffered_percent(&self.media.buffered(), self.media.duration()));
    }

    /// Buffered fraction only
    pub fn refresh_buffered(&self) {
        if let Some(controls) = self.controls() {
            controls
                .view()
                .set_buffered(buffered_percent(&self.media.buffered(), self.media.duration()));
        }
    }

    /// Elapsed and length text
    pub fn refresh_timestamps(&self) {
        let Some(controls) = self.controls() else {
            return;
        };
        let current = self.media.current_time();
        let elapsed = if current.is_nan() {
            String::new()
        } else {
            format_time(current)
        };
        let length = known_duration(self.media.duration())
            .map_or_else(|| "00:00".to_string(), format_time);
        controls.text(ControlRegion::ElapsedText, &elapsed);
        controls.text(ControlRegion::LengthText, &length);
    }

    /// Every visible element; the slider is left alone while seeking
    pub fn refresh_all(&self) {
        self.render_static();
        self.refresh_timestamps();
        if self.is_seeking() {
            self.refresh_buffered();
        } else {
            self.refresh_position();
        }
    }

    /// Schedule [`refresh_all`](Self::refresh_all) one frame from now
    ///
    /// Requests made before the refresh runs are coalesced.
    pub fn request_refresh(self: &Arc<Self>) {
        if self.refresh_pending.swap(true, Ordering::AcqRel) {
            return;
        }
        let weak = Arc::downgrade(self);
        let deadline = tokio::time::Instant::now() + self.config.timing.frame_interval;
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(instance) = weak.upgrade() {
                instance.refresh_pending.store(false, Ordering::Release);
                instance.refresh_all();
            }
        });
    }
}

impl FrameTarget for PlayerInstance {
    fn is_playing(&self) -> bool {
        self.playback() == StateValue::Playing
    }

    fn render_frame(&self) {
        if !self.is_seeking() {
            self.refresh_position();
        }
        self.refresh_timestamps();
    }
}

impl fmt::Debug for PlayerInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayerInstance")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("active", &self.is_active())
            .field("state", &self.state)
            .field("controls", &self.has_controls())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{HeadlessDevice, RecordingControls, RecordingHost};

    fn instance() -> (Arc<PlayerInstance>, Arc<HeadlessDevice>, Arc<RecordingControls>) {
        let device = Arc::new(HeadlessDevice::video());
        let view = Arc::new(RecordingControls::new());
        let instance = Arc::new(PlayerInstance::new(
            SurfaceId::new("osp-test"),
            device.clone(),
            Arc::new(RecordingHost::new()),
            Arc::new(PlayerConfig::default()),
            VolumeMemory::default(),
        ));
        instance.attach_controls(ControlsBundle::complete(view.clone()));
        (instance, device, view)
    }

    #[test]
    fn test_generated_ids_are_unique_and_prefixed() {
        let a = SurfaceId::generate();
        let b = SurfaceId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("osp-"));
        assert_eq!(a.as_str().len(), 4 + 32);
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0.0), "0:00");
        assert_eq!(format_time(7.9), "0:07");
        assert_eq!(format_time(754.2), "12:34");
        assert_eq!(format_time(4500.0), "75:00");
        assert_eq!(format_time(f64::NAN), "0:00");
    }

    #[test]
    fn test_volume_memory_ignores_silence() {
        let memory = VolumeMemory::default();
        assert_eq!(memory.recall(), None);
        memory.remember(0.6);
        memory.remember(0.0);
        assert_eq!(memory.recall(), Some(0.6));
    }

    #[test]
    fn test_render_static_reflects_state() {
        let (instance, device, view) = instance();
        instance.state().set_state(Category::Playback, StateValue::Playing);
        instance.state().set_state(Category::Display, StateValue::Fullscreen);
        device.set_volume(0.0);

        instance.render_static();

        assert_eq!(view.icon(ControlRegion::PlayPause), Some(IconId::Pause));
        assert_eq!(view.icon(ControlRegion::Fullscreen), Some(IconId::FullscreenExit));
        assert_eq!(view.icon(ControlRegion::Mute), Some(IconId::Mute));
        assert_eq!(view.range(ControlRegion::VolumeRange), Some(0.0));
    }

    #[test]
    fn test_timestamps_with_unknown_duration() {
        let (instance, _device, view) = instance();
        instance.refresh_timestamps();
        assert_eq!(view.text(ControlRegion::LengthText).as_deref(), Some("00:00"));
        assert_eq!(view.text(ControlRegion::ElapsedText).as_deref(), Some("0:00"));
    }

    #[test]
    fn test_timestamps_and_position_with_known_duration() {
        let (instance, device, view) = instance();
        device.load_metadata(125.0);
        device.set_current_time(25.0);

        instance.refresh_timestamps();
        instance.refresh_position();

        assert_eq!(view.text(ControlRegion::LengthText).as_deref(), Some("2:05"));
        assert_eq!(view.text(ControlRegion::ElapsedText).as_deref(), Some("0:25"));
        assert_eq!(view.range(ControlRegion::SeekRange), Some(20.0));
    }

    #[test]
    fn test_detached_controls_make_refresh_a_noop() {
        let (instance, _device, view) = instance();
        instance.take_controls();
        instance.refresh_all();
        assert_eq!(view.call_count(), 0);
    }
}
