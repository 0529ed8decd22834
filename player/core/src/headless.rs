//! Headless Collaborators
//!
//! In-memory implementations of every external contract: a scripted media
//! device, a controls view and host that record what they were asked to do,
//! and scripted optional collaborators. Used by the `player-sim` binary and
//! by tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::collaborators::{AdaptiveSource, ContextMenu, Interstitial, SubtitleLoader};
use crate::controls::{
    ControlRegion, ControlsBundle, ControlsProvider, ControlsView, IconId, SurfaceHost,
};
use crate::error::DeviceError;
use crate::events::{MediaEvent, PlayerEvent};
use crate::instance::SurfaceId;
use crate::media::{MediaDevice, MediaKind, MediaSource, TimeRange};

// =============================================================================
// Media device
// =============================================================================

#[derive(Debug)]
struct DeviceState {
    paused: bool,
    ended: bool,
    current_time: f64,
    duration: f64,
    volume: f64,
    muted: bool,
    buffered: Vec<TimeRange>,
    source: Option<MediaSource>,
    supports_pip: bool,
    in_pip: bool,
    play_failures: VecDeque<DeviceError>,
    play_calls: usize,
    pause_calls: usize,
    seeks: Vec<f64>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            paused: true,
            ended: false,
            current_time: 0.0,
            duration: f64::NAN,
            volume: 1.0,
            muted: false,
            buffered: Vec::new(),
            source: None,
            supports_pip: false,
            in_pip: false,
            play_failures: VecDeque::new(),
            play_calls: 0,
            pause_calls: 0,
            seeks: Vec::new(),
        }
    }
}

/// Scripted media element
///
/// Starts paused with an unknown duration. When an event sender is attached,
/// `play()` and `pause()` raise `Playing`/`Paused` on it the way a real
/// element would.
pub struct HeadlessDevice {
    kind: MediaKind,
    state: Mutex<DeviceState>,
    events: Mutex<Option<mpsc::Sender<PlayerEvent>>>,
}

impl HeadlessDevice {
    /// Device of the given kind
    #[must_use]
    pub fn new(kind: MediaKind) -> Self {
        Self {
            kind,
            state: Mutex::new(DeviceState::default()),
            events: Mutex::new(None),
        }
    }

    /// Video device
    #[must_use]
    pub fn video() -> Self {
        Self::new(MediaKind::Video)
    }

    /// Audio device
    #[must_use]
    pub fn audio() -> Self {
        Self::new(MediaKind::Audio)
    }

    /// Raise device events on `tx`
    #[must_use]
    pub fn with_events(self, tx: mpsc::Sender<PlayerEvent>) -> Self {
        *self.events.lock() = Some(tx);
        self
    }

    /// Report picture-in-picture support
    #[must_use]
    pub fn with_picture_in_picture(self) -> Self {
        self.state.lock().supports_pip = true;
        self
    }

    /// Make the duration known
    pub fn load_metadata(&self, duration: f64) {
        self.state.lock().duration = duration;
    }

    /// Replace the buffered ranges
    pub fn set_buffered(&self, ranges: Vec<TimeRange>) {
        self.state.lock().buffered = ranges;
    }

    /// Advance the position as if playback progressed
    pub fn advance(&self, seconds: f64) {
        let mut s = self.state.lock();
        s.current_time += seconds;
        if s.duration.is_finite() {
            s.current_time = s.current_time.min(s.duration);
        }
    }

    /// Reach the end of the media
    pub fn finish(&self) {
        let mut s = self.state.lock();
        if s.duration.is_finite() {
            s.current_time = s.duration;
        }
        s.ended = true;
        s.paused = true;
    }

    /// Reject the next `play()` with `reason`
    pub fn fail_next_play(&self, reason: impl Into<String>) {
        self.state
            .lock()
            .play_failures
            .push_back(DeviceError::PlayRejected(reason.into()));
    }

    /// Number of `play()` calls
    #[must_use]
    pub fn play_calls(&self) -> usize {
        self.state.lock().play_calls
    }

    /// Number of `pause()` calls
    #[must_use]
    pub fn pause_calls(&self) -> usize {
        self.state.lock().pause_calls
    }

    /// Positions assigned through `set_current_time`
    #[must_use]
    pub fn seeks(&self) -> Vec<f64> {
        self.state.lock().seeks.clone()
    }

    /// Source assigned directly
    #[must_use]
    pub fn source(&self) -> Option<MediaSource> {
        self.state.lock().source.clone()
    }

    /// Whether picture-in-picture is active
    #[must_use]
    pub fn in_picture_in_picture(&self) -> bool {
        self.state.lock().in_pip
    }

    fn emit(&self, event: MediaEvent) {
        if let Some(tx) = self.events.lock().as_ref() {
            if tx.try_send(event.into()).is_err() {
                tracing::trace!(event = event.dom_name(), "Device event dropped");
            }
        }
    }
}

#[async_trait]
impl MediaDevice for HeadlessDevice {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    async fn play(&self) -> Result<(), DeviceError> {
        {
            let mut s = self.state.lock();
            s.play_calls += 1;
            if let Some(err) = s.play_failures.pop_front() {
                return Err(err);
            }
            s.paused = false;
            s.ended = false;
        }
        self.emit(MediaEvent::Playing);
        Ok(())
    }

    fn pause(&self) {
        let was_paused = {
            let mut s = self.state.lock();
            s.pause_calls += 1;
            std::mem::replace(&mut s.paused, true)
        };
        if !was_paused {
            self.emit(MediaEvent::Paused);
        }
    }

    fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    fn has_ended(&self) -> bool {
        self.state.lock().ended
    }

    fn current_time(&self) -> f64 {
        self.state.lock().current_time
    }

    fn set_current_time(&self, seconds: f64) {
        let mut s = self.state.lock();
        s.current_time = seconds;
        s.ended = false;
        s.seeks.push(seconds);
    }

    fn duration(&self) -> f64 {
        self.state.lock().duration
    }

    fn volume(&self) -> f64 {
        self.state.lock().volume
    }

    fn set_volume(&self, level: f64) {
        self.state.lock().volume = level.clamp(0.0, 1.0);
    }

    fn is_muted(&self) -> bool {
        self.state.lock().muted
    }

    fn set_muted(&self, muted: bool) {
        self.state.lock().muted = muted;
    }

    fn buffered(&self) -> Vec<TimeRange> {
        self.state.lock().buffered.clone()
    }

    fn set_source(&self, source: &MediaSource) {
        self.state.lock().source = Some(source.clone());
    }

    fn supports_picture_in_picture(&self) -> bool {
        self.state.lock().supports_pip
    }

    async fn set_picture_in_picture(&self, enabled: bool) -> Result<(), DeviceError> {
        let mut s = self.state.lock();
        if !s.supports_pip {
            return Err(DeviceError::Unsupported("picture-in-picture"));
        }
        s.in_pip = enabled;
        Ok(())
    }
}

// =============================================================================
// Controls
// =============================================================================

/// One call made on a [`RecordingControls`]
#[derive(Debug, Clone, PartialEq)]
pub enum ControlsCall {
    /// `set_icon`
    Icon(ControlRegion, IconId),
    /// `set_text`
    Text(ControlRegion, String),
    /// `set_range`
    Range(ControlRegion, f64),
    /// `set_buffered`
    Buffered(f64),
    /// `set_region_visible`
    RegionVisible(ControlRegion, bool),
    /// `set_enabled`
    Enabled(bool),
    /// `set_controls_visible`
    ControlsVisible(bool),
}

/// Controls view that records every call
#[derive(Debug, Default)]
pub struct RecordingControls {
    calls: Mutex<Vec<ControlsCall>>,
}

impl RecordingControls {
    /// Empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call so far
    #[must_use]
    pub fn calls(&self) -> Vec<ControlsCall> {
        self.calls.lock().clone()
    }

    /// Number of calls so far
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Number of calls matching `pred`
    pub fn count(&self, pred: impl Fn(&ControlsCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    /// Number of `set_range` calls on `region`
    #[must_use]
    pub fn range_updates(&self, region: ControlRegion) -> usize {
        self.count(|c| matches!(c, ControlsCall::Range(r, _) if *r == region))
    }

    /// Number of `set_text` calls on `region`
    #[must_use]
    pub fn text_updates(&self, region: ControlRegion) -> usize {
        self.count(|c| matches!(c, ControlsCall::Text(r, _) if *r == region))
    }

    fn last<T>(&self, pick: impl Fn(&ControlsCall) -> Option<T>) -> Option<T> {
        self.calls.lock().iter().rev().find_map(pick)
    }

    /// Latest icon shown in `region`
    #[must_use]
    pub fn icon(&self, region: ControlRegion) -> Option<IconId> {
        self.last(|c| match c {
            ControlsCall::Icon(r, icon) if *r == region => Some(*icon),
            _ => None,
        })
    }

    /// Latest text of `region`
    #[must_use]
    pub fn text(&self, region: ControlRegion) -> Option<String> {
        self.last(|c| match c {
            ControlsCall::Text(r, text) if *r == region => Some(text.clone()),
            _ => None,
        })
    }

    /// Latest value of range `region`
    #[must_use]
    pub fn range(&self, region: ControlRegion) -> Option<f64> {
        self.last(|c| match c {
            ControlsCall::Range(r, v) if *r == region => Some(*v),
            _ => None,
        })
    }

    /// Latest buffered percentage
    #[must_use]
    pub fn buffered(&self) -> Option<f64> {
        self.last(|c| match c {
            ControlsCall::Buffered(v) => Some(*v),
            _ => None,
        })
    }

    /// Latest visibility of `region`
    #[must_use]
    pub fn region_visible(&self, region: ControlRegion) -> Option<bool> {
        self.last(|c| match c {
            ControlsCall::RegionVisible(r, v) if *r == region => Some(*v),
            _ => None,
        })
    }

    /// Latest enabled flag
    #[must_use]
    pub fn enabled(&self) -> Option<bool> {
        self.last(|c| match c {
            ControlsCall::Enabled(v) => Some(*v),
            _ => None,
        })
    }

    /// Latest control bar visibility
    #[must_use]
    pub fn controls_visible(&self) -> Option<bool> {
        self.last(|c| match c {
            ControlsCall::ControlsVisible(v) => Some(*v),
            _ => None,
        })
    }

    fn record(&self, call: ControlsCall) {
        self.calls.lock().push(call);
    }
}

impl ControlsView for RecordingControls {
    fn set_icon(&self, region: ControlRegion, icon: IconId) {
        self.record(ControlsCall::Icon(region, icon));
    }

    fn set_text(&self, region: ControlRegion, text: &str) {
        self.record(ControlsCall::Text(region, text.to_string()));
    }

    fn set_range(&self, region: ControlRegion, percent: f64) {
        self.record(ControlsCall::Range(region, percent));
    }

    fn set_buffered(&self, percent: f64) {
        self.record(ControlsCall::Buffered(percent));
    }

    fn set_region_visible(&self, region: ControlRegion, visible: bool) {
        self.record(ControlsCall::RegionVisible(region, visible));
    }

    fn set_enabled(&self, enabled: bool) {
        self.record(ControlsCall::Enabled(enabled));
    }

    fn set_controls_visible(&self, visible: bool) {
        self.record(ControlsCall::ControlsVisible(visible));
    }
}

/// Controls provider handing out [`RecordingControls`]
pub struct HeadlessControlsProvider {
    regions: Vec<ControlRegion>,
    failure: Option<String>,
    views: DashMap<SurfaceId, Arc<RecordingControls>>,
    removed: Mutex<Vec<SurfaceId>>,
}

impl Default for HeadlessControlsProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessControlsProvider {
    /// Provider wiring every region
    #[must_use]
    pub fn new() -> Self {
        Self {
            regions: ControlRegion::ALL.to_vec(),
            failure: None,
            views: DashMap::new(),
            removed: Mutex::new(Vec::new()),
        }
    }

    /// Provider wiring only `regions`
    #[must_use]
    pub fn with_regions(regions: impl IntoIterator<Item = ControlRegion>) -> Self {
        Self {
            regions: regions.into_iter().collect(),
            ..Self::new()
        }
    }

    /// Provider that always fails with `reason`
    #[must_use]
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::new()
        }
    }

    /// View currently wired for `id`
    #[must_use]
    pub fn view(&self, id: &SurfaceId) -> Option<Arc<RecordingControls>> {
        self.views.get(id).map(|v| Arc::clone(v.value()))
    }

    /// Whether `id` has wired controls
    #[must_use]
    pub fn is_wired(&self, id: &SurfaceId) -> bool {
        self.views.contains_key(id)
    }

    /// Surfaces whose controls were removed, in order
    #[must_use]
    pub fn removed(&self) -> Vec<SurfaceId> {
        self.removed.lock().clone()
    }
}

#[async_trait]
impl ControlsProvider for HeadlessControlsProvider {
    async fn wire(&self, surface: &SurfaceId, _kind: MediaKind) -> anyhow::Result<ControlsBundle> {
        if let Some(ref reason) = self.failure {
            anyhow::bail!("{reason}");
        }
        let view = Arc::new(RecordingControls::new());
        self.views.insert(surface.clone(), Arc::clone(&view));
        Ok(ControlsBundle::new(view, self.regions.iter().copied()))
    }

    fn remove(&self, surface: &SurfaceId) {
        if self.views.remove(surface).is_some() {
            self.removed.lock().push(surface.clone());
        }
    }
}

// =============================================================================
// Host
// =============================================================================

#[derive(Debug, Default)]
struct HostState {
    message: Option<String>,
    messages: Vec<String>,
    loading: bool,
    loading_hidden: usize,
    fullscreen: bool,
    cinematic: bool,
    detached: usize,
}

/// Host container that records what it was asked to show
#[derive(Debug, Default)]
pub struct RecordingHost {
    state: Mutex<HostState>,
}

impl RecordingHost {
    /// Fresh host
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Message currently shown
    #[must_use]
    pub fn message(&self) -> Option<String> {
        self.state.lock().message.clone()
    }

    /// Every message shown, in order
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.state.lock().messages.clone()
    }

    /// Whether the loading indicator is visible
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.lock().loading
    }

    /// How many times the loading indicator was hidden
    #[must_use]
    pub fn loading_hidden_count(&self) -> usize {
        self.state.lock().loading_hidden
    }

    /// Whether page dimming is active
    #[must_use]
    pub fn is_cinematic(&self) -> bool {
        self.state.lock().cinematic
    }

    /// How many times the surface was detached
    #[must_use]
    pub fn detach_count(&self) -> usize {
        self.state.lock().detached
    }

    /// Change fullscreen from outside the player (e.g. the Escape key)
    pub fn set_fullscreen_externally(&self, fullscreen: bool) {
        self.state.lock().fullscreen = fullscreen;
    }
}

impl SurfaceHost for RecordingHost {
    fn show_message(&self, message: &str) {
        let mut s = self.state.lock();
        s.message = Some(message.to_string());
        s.messages.push(message.to_string());
    }

    fn clear_message(&self) {
        self.state.lock().message = None;
    }

    fn set_loading(&self, visible: bool) {
        let mut s = self.state.lock();
        s.loading = visible;
        if !visible {
            s.loading_hidden += 1;
        }
    }

    fn is_fullscreen(&self) -> bool {
        self.state.lock().fullscreen
    }

    fn request_fullscreen(&self) -> Result<(), DeviceError> {
        self.state.lock().fullscreen = true;
        Ok(())
    }

    fn exit_fullscreen(&self) -> Result<(), DeviceError> {
        self.state.lock().fullscreen = false;
        Ok(())
    }

    fn set_cinematic(&self, active: bool) {
        self.state.lock().cinematic = active;
    }

    fn detach(&self) {
        self.state.lock().detached += 1;
    }
}

// =============================================================================
// Optional collaborators
// =============================================================================

/// Subtitle loader that answers from a fixed table; unknown paths fail
#[derive(Debug, Default)]
pub struct ScriptedSubtitles {
    tracks: HashMap<String, bool>,
    loads: AtomicUsize,
}

impl ScriptedSubtitles {
    /// Loader where every path in `available` succeeds
    pub fn new<I, S>(available: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tracks: available.into_iter().map(|p| (p.into(), true)).collect(),
            loads: AtomicUsize::new(0),
        }
    }

    /// Number of load requests
    #[must_use]
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubtitleLoader for ScriptedSubtitles {
    async fn load(&self, _media: Arc<dyn MediaDevice>, path: &str) -> bool {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.tracks.get(path).copied().unwrap_or(false)
    }
}

/// Interstitial overlay with a fixed outcome
#[derive(Debug)]
pub struct ScriptedInterstitial {
    outcome: Result<bool, String>,
    presented: AtomicUsize,
}

impl ScriptedInterstitial {
    /// Overlay that completes (`true`) or is skipped (`false`)
    #[must_use]
    pub fn completing(completed: bool) -> Self {
        Self {
            outcome: Ok(completed),
            presented: AtomicUsize::new(0),
        }
    }

    /// Overlay that errors
    #[must_use]
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            outcome: Err(reason.into()),
            presented: AtomicUsize::new(0),
        }
    }

    /// Number of presentations
    #[must_use]
    pub fn presented(&self) -> usize {
        self.presented.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Interstitial for ScriptedInterstitial {
    async fn present(&self, _media: Arc<dyn MediaDevice>, _surface: &SurfaceId) -> anyhow::Result<bool> {
        self.presented.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone().map_err(anyhow::Error::msg)
    }
}

/// Adaptive streaming stand-in
#[derive(Debug, Default)]
pub struct ScriptedAdaptive {
    fail: bool,
    attached: Mutex<Vec<MediaSource>>,
}

impl ScriptedAdaptive {
    /// Engine that accepts every source
    #[must_use]
    pub fn accepting() -> Self {
        Self::default()
    }

    /// Engine that rejects every source
    #[must_use]
    pub fn rejecting() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Sources attached successfully
    #[must_use]
    pub fn attached(&self) -> Vec<MediaSource> {
        self.attached.lock().clone()
    }
}

#[async_trait]
impl AdaptiveSource for ScriptedAdaptive {
    async fn attach(&self, _media: Arc<dyn MediaDevice>, source: &MediaSource) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("streaming engine unavailable for {}", source.src);
        }
        self.attached.lock().push(source.clone());
        Ok(())
    }
}

/// Context menu initializer that only counts calls
#[derive(Debug, Default)]
pub struct RecordingContextMenu {
    initialized: AtomicUsize,
}

impl RecordingContextMenu {
    /// Fresh recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of initialisations
    #[must_use]
    pub fn initialized(&self) -> usize {
        self.initialized.load(Ordering::SeqCst)
    }
}

impl ContextMenu for RecordingContextMenu {
    fn initialize(
        &self,
        _media: Arc<dyn MediaDevice>,
        _host: Arc<dyn SurfaceHost>,
        _controls: &ControlsBundle,
    ) {
        self.initialized.fetch_add(1, Ordering::SeqCst);
    }
}
