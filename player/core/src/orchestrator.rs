//! Event Orchestrator
//!
//! Interprets device signals and user input for one surface and turns them
//! into state transitions, device commands and collaborator calls.
//!
//! # Ordering
//!
//! Device signals arrive in no particular order relative to each other or to
//! user input. Handlers never assume a sequence; they re-check current state
//! and rely on the state machine ignoring writes of the current value. For
//! example, three ready signals in a row pass the ready check once, and a
//! device `playing` that races a seek release does not start a second frame
//! loop.
//!
//! # Wiring
//!
//! ```text
//!   device / host ──mpsc──▶ event pump ──▶ handle()
//!                                            │
//!                        ┌───────────────────┼───────────────────┐
//!                        ▼                   ▼                   ▼
//!                  StateMachine         MediaDevice          SurfaceHost
//!                        │
//!                  listener: render_static()
//!                            playback == playing ? scheduler.start : scheduler.stop
//! ```

use std::sync::{Arc, Weak};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::collaborators::Collaborators;
use crate::controls::{ControlRegion, ControlsProvider};
use crate::error::{MediaErrorCode, STALL_MESSAGE};
use crate::events::{FocusTarget, InputEvent, Key, MediaEvent, PlayerEvent, Shortcut};
use crate::instance::PlayerInstance;
use crate::media::{known_duration, MediaKind};
use crate::scheduler::UpdateScheduler;
use crate::state::{Category, StateValue};

/// Why a `play()` is being issued; decides what a rejection means
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlayIntent {
    /// User pressed play; rejection puts the surface in error
    User,
    /// Resuming after a seek; rejection is logged
    Resume,
    /// Restarting a looping surface; rejection is logged, never retried
    LoopRestart,
}

/// Event handling for one surface
#[derive(Clone)]
pub struct EventOrchestrator {
    instance: Arc<PlayerInstance>,
    scheduler: UpdateScheduler,
    collaborators: Collaborators,
}

impl EventOrchestrator {
    /// Attach to an instance
    ///
    /// Installs the state listener, arms the ready check, paints the initial
    /// UI and, when `events` is given, spawns a task feeding them to
    /// [`handle`](Self::handle).
    pub fn wire(
        instance: Arc<PlayerInstance>,
        scheduler: UpdateScheduler,
        collaborators: Collaborators,
        events: Option<mpsc::Receiver<PlayerEvent>>,
    ) -> Self {
        let orchestrator = Self {
            instance,
            scheduler,
            collaborators,
        };
        orchestrator.install_listener();
        orchestrator.instance.arm_ready_check();
        orchestrator.instance.refresh_all();

        if let Some(rx) = events {
            let pump = orchestrator.spawn_event_pump(rx);
            orchestrator.instance.set_event_pump(pump);
        }

        tracing::debug!(surface_id = %orchestrator.instance.id(), "Events wired");
        orchestrator
    }

    /// The instance being driven
    #[must_use]
    pub fn instance(&self) -> &Arc<PlayerInstance> {
        &self.instance
    }

    fn install_listener(&self) {
        let weak: Weak<PlayerInstance> = Arc::downgrade(&self.instance);
        let scheduler = self.scheduler.clone();
        self.instance.state().add_listener(move |change| {
            let Some(instance) = weak.upgrade() else {
                return;
            };
            instance.render_static();
            if change.category == Category::Playback {
                if change.value == StateValue::Playing {
                    scheduler.start(instance.id(), Arc::downgrade(&instance));
                } else {
                    scheduler.stop(instance.id());
                }
            }
        });
    }

    fn spawn_event_pump(&self, events: mpsc::Receiver<PlayerEvent>) -> JoinHandle<()> {
        let orchestrator = self.clone();
        tokio::spawn(async move {
            let mut stream = ReceiverStream::new(events);
            while let Some(event) = stream.next().await {
                orchestrator.handle(event);
            }
            tracing::debug!(
                surface_id = %orchestrator.instance.id(),
                "Event stream closed"
            );
        })
    }

    /// Handle one event; inactive surfaces ignore everything
    pub fn handle(&self, event: PlayerEvent) {
        if !self.instance.is_active() {
            tracing::trace!(surface_id = %self.instance.id(), ?event, "Surface inactive, event dropped");
            return;
        }
        match event {
            PlayerEvent::Media(e) => self.handle_media(e),
            PlayerEvent::Input(e) => self.handle_input(e),
        }
    }

    // =========================================================================
    // Device signals
    // =========================================================================

    /// Handle a device signal
    pub fn handle_media(&self, event: MediaEvent) {
        let instance = &self.instance;
        if instance.playback() == StateValue::Error {
            tracing::trace!(
                surface_id = %instance.id(),
                event = event.dom_name(),
                "Surface in error, device signal ignored"
            );
            return;
        }

        match event {
            MediaEvent::Error(code) => self.on_device_fault(code),
            MediaEvent::LoadedMetadata | MediaEvent::LoadedData | MediaEvent::CanPlay => {
                instance.stall_watchdog().clear();
                self.check_ready();
            }
            MediaEvent::LoadStart => {
                instance.arm_ready_check();
                self.on_stall_signal(event);
            }
            MediaEvent::Waiting | MediaEvent::Stalled => self.on_stall_signal(event),
            MediaEvent::Playing => {
                instance.state().set_state(Category::Playback, StateValue::Playing);
                self.on_media_loaded();
                instance.request_refresh();
            }
            MediaEvent::Paused => self.on_paused(),
            MediaEvent::Ended => self.on_ended(),
            MediaEvent::TimeUpdate => {
                if !instance.is_seeking() && known_duration(instance.media().duration()).is_some() {
                    instance.refresh_position();
                }
                instance.refresh_timestamps();
            }
            MediaEvent::Progress => instance.refresh_buffered(),
            MediaEvent::FullscreenChange => {
                let display = if instance.host().is_fullscreen() {
                    StateValue::Fullscreen
                } else {
                    StateValue::Windowed
                };
                instance.state().set_state(Category::Display, display);
                instance.request_refresh();
            }
            MediaEvent::Emptied => instance.media().pause(),
        }
    }

    fn check_ready(&self) {
        let instance = &self.instance;
        if !instance.ready_check_armed() {
            return;
        }
        if !matches!(instance.playback(), StateValue::Loading | StateValue::Idle) {
            return;
        }
        let Some(duration) = known_duration(instance.media().duration()) else {
            return;
        };
        // Only one signal of the cycle gets past here
        if !instance.disarm_ready_check() {
            return;
        }

        instance.state().set_state(Category::Playback, StateValue::Ready);
        self.on_media_loaded();
        instance.request_refresh();
        tracing::info!(surface_id = %instance.id(), duration, "Surface ready");
    }

    fn on_media_loaded(&self) {
        let instance = &self.instance;
        instance.stall_watchdog().clear();
        instance.host().set_loading(false);
        instance.host().clear_message();
        instance.refresh_timestamps();
    }

    fn on_stall_signal(&self, event: MediaEvent) {
        let instance = &self.instance;
        if !matches!(
            instance.playback(),
            StateValue::Playing | StateValue::Seeking | StateValue::Loading
        ) {
            return;
        }

        instance.host().clear_message();
        if instance.kind() == MediaKind::Video {
            instance.host().set_loading(true);
        }

        let weak = Arc::downgrade(instance);
        instance
            .stall_watchdog()
            .arm(instance.config().timing.stall_timeout, move || {
                if let Some(instance) = weak.upgrade() {
                    if instance.is_active() {
                        tracing::warn!(surface_id = %instance.id(), "Loading stalled");
                        instance.host().set_loading(false);
                        instance.host().show_message(STALL_MESSAGE);
                    }
                }
            });
        tracing::debug!(
            surface_id = %instance.id(),
            signal = event.dom_name(),
            "Stall watchdog armed"
        );
    }

    fn on_device_fault(&self, code: MediaErrorCode) {
        let instance = &self.instance;
        let message = code.display_message(instance.config().features.debug_logging);
        enter_error(instance, self.collaborators.controls.as_ref(), &message);
        tracing::error!(surface_id = %instance.id(), %code, message, "Media device fault");
    }

    fn on_paused(&self) {
        let instance = &self.instance;
        if instance.playback() == StateValue::Ended || instance.is_seeking() {
            return;
        }
        instance.state().set_state(Category::Playback, StateValue::Paused);
        self.pin_controls();
        instance.request_refresh();
    }

    fn on_ended(&self) {
        let instance = &self.instance;
        if instance.state().is(Category::Loop, StateValue::Looping) {
            instance
                .media()
                .set_current_time(instance.config().timing.loop_restart_offset_secs);
            self.spawn_play(PlayIntent::LoopRestart);
            tracing::debug!(surface_id = %instance.id(), "Looping to start");
            return;
        }
        instance.state().set_state(Category::Playback, StateValue::Ended);
        self.pin_controls();
        instance.request_refresh();
    }

    fn spawn_play(&self, intent: PlayIntent) {
        let media = Arc::clone(self.instance.media());
        let weak = Arc::downgrade(&self.instance);
        let provider = Arc::clone(&self.collaborators.controls);
        tokio::spawn(async move {
            let Err(e) = media.play().await else {
                return;
            };
            let Some(instance) = weak.upgrade() else {
                return;
            };
            if intent == PlayIntent::User && instance.is_active() {
                tracing::warn!(surface_id = %instance.id(), error = %e, "Play request rejected");
                enter_error(&instance, provider.as_ref(), STALL_MESSAGE);
            } else {
                tracing::warn!(surface_id = %instance.id(), error = %e, ?intent, "Play failed");
            }
        });
    }

    // =========================================================================
    // User input
    // =========================================================================

    /// Handle user input; ignored while the surface is in error
    pub fn handle_input(&self, event: InputEvent) {
        if self.instance.playback() == StateValue::Error {
            return;
        }
        match event {
            InputEvent::SurfaceClicked => self.toggle_play_pause(),
            InputEvent::ControlClicked(region) => self.on_control_clicked(region),
            InputEvent::Key { key, focus } => {
                self.handle_key(key, focus);
            }
            InputEvent::SeekBegin => self.begin_seek(),
            InputEvent::SeekInput { percent } => self.seek_to_percent(percent),
            InputEvent::SeekEnd => self.end_seek(),
            InputEvent::VolumeInput { level } => self.set_volume(level),
            InputEvent::PointerMoved | InputEvent::PointerLeftControls => self.nudge_controls(),
            InputEvent::PointerEnteredControls => self.pin_controls(),
            InputEvent::ToggleLoop => self.toggle_loop(),
            InputEvent::TogglePictureInPicture => self.toggle_picture_in_picture(),
        }
    }

    /// Apply a keyboard shortcut
    ///
    /// Returns whether the key was consumed, so hosts know to suppress the
    /// default action.
    pub fn handle_key(&self, key: Key, focus: FocusTarget) -> bool {
        if self.instance.playback() == StateValue::Error {
            return false;
        }
        let Some(shortcut) = Shortcut::for_key(key, focus) else {
            return false;
        };

        self.nudge_controls();
        let step = self.instance.config().timing.seek_step_secs;
        match shortcut {
            Shortcut::TogglePlay => self.toggle_play_pause(),
            Shortcut::VolumeUp => self.step_volume(true),
            Shortcut::VolumeDown => self.step_volume(false),
            Shortcut::SeekBackward => self.skip(-step),
            Shortcut::SeekForward => self.skip(step),
            Shortcut::ToggleFullscreen => self.toggle_fullscreen(),
            Shortcut::ToggleMute => self.toggle_mute(),
            Shortcut::ToggleCinematic => self.toggle_cinematic(),
            Shortcut::ToggleSubtitles => self.toggle_subtitles(),
            Shortcut::ToggleSettings => self.toggle_settings(),
        }
        self.instance.request_refresh();
        true
    }

    fn on_control_clicked(&self, region: ControlRegion) {
        let features = &self.instance.config().features;
        match region {
            ControlRegion::PlayPause => self.toggle_play_pause(),
            ControlRegion::Mute => self.toggle_mute(),
            ControlRegion::Fullscreen => self.toggle_fullscreen(),
            ControlRegion::Cinematic => self.toggle_cinematic(),
            ControlRegion::Subtitle => self.toggle_subtitles(),
            ControlRegion::Settings => self.toggle_settings(),
            ControlRegion::FastForward if features.fast_forward => {
                self.skip(self.instance.config().timing.seek_step_secs);
            }
            _ => return,
        }
        self.instance.request_refresh();
    }

    fn toggle_play_pause(&self) {
        let media = self.instance.media();
        if media.is_paused() || media.has_ended() {
            self.spawn_play(PlayIntent::User);
        } else {
            media.pause();
        }
    }

    fn skip(&self, delta: f64) {
        let instance = &self.instance;
        let media = instance.media();
        let Some(duration) = known_duration(media.duration()) else {
            return;
        };
        let target = (media.current_time() + delta).clamp(0.0, duration);
        media.set_current_time(target);
        instance.refresh_timestamps();
        if !instance.is_seeking() {
            instance.refresh_position();
        }
    }

    // -------------------------------------------------------------------------
    // Volume
    // -------------------------------------------------------------------------

    fn step_volume(&self, up: bool) {
        let media = self.instance.media();
        let step = self.instance.config().timing.volume_step;
        if up {
            if media.is_muted() {
                media.set_muted(false);
            }
            media.set_volume(round_volume(media.volume() + step));
        } else if !media.is_muted() {
            media.set_volume(round_volume(media.volume() - step));
        }
        self.sync_volume_state();
    }

    fn set_volume(&self, level: f64) {
        let media = self.instance.media();
        let level = round_volume(level);
        media.set_volume(level);
        media.set_muted(level == 0.0);
        self.sync_volume_state();
    }

    fn toggle_mute(&self) {
        let instance = &self.instance;
        let media = instance.media();
        if media.is_muted() || media.volume() == 0.0 {
            let restore = instance
                .volume_memory()
                .recall()
                .unwrap_or(instance.config().timing.unmute_volume);
            media.set_muted(false);
            media.set_volume(restore);
        } else {
            instance.volume_memory().remember(media.volume());
            media.set_muted(true);
            media.set_volume(0.0);
        }
        self.sync_volume_state();
    }

    fn sync_volume_state(&self) {
        let instance = &self.instance;
        let media = instance.media();
        let volume = media.volume();
        let silent = media.is_muted() || volume == 0.0;
        instance.state().set_state(
            Category::Volume,
            if silent {
                StateValue::Muted
            } else {
                StateValue::Unmuted
            },
        );
        if !silent {
            instance.volume_memory().remember(volume);
        }
        instance.render_static();
    }

    // -------------------------------------------------------------------------
    // Modes
    // -------------------------------------------------------------------------

    fn toggle_fullscreen(&self) {
        let instance = &self.instance;
        let host = instance.host();
        let result = if host.is_fullscreen() {
            host.exit_fullscreen().map(|()| StateValue::Windowed)
        } else {
            host.request_fullscreen().map(|()| StateValue::Fullscreen)
        };
        match result {
            Ok(display) => {
                instance.state().set_state(Category::Display, display);
            }
            Err(e) => {
                tracing::warn!(surface_id = %instance.id(), error = %e, "Fullscreen request failed");
            }
        }
    }

    fn toggle_cinematic(&self) {
        let instance = &self.instance;
        if !instance.config().features.cinematic_mode || instance.kind() == MediaKind::Audio {
            tracing::debug!(surface_id = %instance.id(), "Cinematic mode disabled");
            return;
        }
        instance.state().toggle_state(
            Category::VisualMode,
            StateValue::Cinematic,
            StateValue::Normal,
        );
        instance
            .host()
            .set_cinematic(instance.state().is(Category::VisualMode, StateValue::Cinematic));
    }

    fn toggle_subtitles(&self) {
        let instance = &self.instance;
        if !instance.config().features.subtitles || !instance.subtitles_available() {
            tracing::debug!(surface_id = %instance.id(), "No subtitles available");
            return;
        }
        instance
            .state()
            .toggle_state(Category::Subtitles, StateValue::On, StateValue::Off);
    }

    fn toggle_settings(&self) {
        let instance = &self.instance;
        let features = &instance.config().features;
        let has_content = instance.subtitles_available() || features.cinematic_mode;
        if !features.settings_menu || instance.kind() == MediaKind::Audio || !has_content {
            return;
        }
        instance
            .state()
            .toggle_state(Category::Settings, StateValue::Open, StateValue::Closed);
    }

    fn toggle_loop(&self) {
        self.instance
            .state()
            .toggle_state(Category::Loop, StateValue::Looping, StateValue::NotLooping);
    }

    fn toggle_picture_in_picture(&self) {
        let instance = &self.instance;
        let media = Arc::clone(instance.media());
        if !media.supports_picture_in_picture() {
            tracing::debug!(surface_id = %instance.id(), "Picture-in-picture unsupported");
            return;
        }
        let enable = !instance.state().is(Category::Pip, StateValue::Enabled);
        let weak = Arc::downgrade(instance);
        tokio::spawn(async move {
            let result = media.set_picture_in_picture(enable).await;
            let Some(instance) = weak.upgrade() else {
                return;
            };
            match result {
                Ok(()) => {
                    let value = if enable {
                        StateValue::Enabled
                    } else {
                        StateValue::Disabled
                    };
                    instance.state().set_state(Category::Pip, value);
                }
                Err(e) => {
                    tracing::warn!(surface_id = %instance.id(), error = %e, "Picture-in-picture failed");
                }
            }
        });
    }

    // -------------------------------------------------------------------------
    // Seeking
    // -------------------------------------------------------------------------

    fn begin_seek(&self) {
        let instance = &self.instance;
        if known_duration(instance.media().duration()).is_none() {
            tracing::trace!(surface_id = %instance.id(), "Duration unknown, seek not started");
            return;
        }
        if !instance
            .state()
            .set_state(Category::Seeking, StateValue::Seeking)
        {
            return;
        }
        let resume = instance.playback() == StateValue::Playing;
        instance.set_resume_after_seek(resume);
        if resume {
            instance.media().pause();
        }
    }

    fn seek_to_percent(&self, percent: f64) {
        let instance = &self.instance;
        let percent = if percent.is_finite() {
            percent.clamp(0.0, 100.0)
        } else {
            0.0
        };
        if let Some(duration) = known_duration(instance.media().duration()) {
            instance.media().set_current_time(duration * percent / 100.0);
        }
        if let Some(controls) = instance.controls() {
            controls.range(ControlRegion::SeekRange, percent);
        }
        instance.refresh_timestamps();
    }

    fn end_seek(&self) {
        let instance = &self.instance;
        // Released outside a seek; nothing to do
        if !instance.state().set_state(Category::Seeking, StateValue::Idle) {
            return;
        }
        let resume = instance.take_resume_after_seek();
        let media = instance.media();
        if resume && media.is_paused() && !media.has_ended() {
            self.spawn_play(PlayIntent::Resume);
        }
        instance.request_refresh();
    }

    // -------------------------------------------------------------------------
    // Auto-hide
    // -------------------------------------------------------------------------

    fn nudge_controls(&self) {
        let instance = &self.instance;
        if !instance.config().features.auto_hide_controls || instance.kind() == MediaKind::Audio {
            return;
        }
        let Some(controls) = instance.controls() else {
            return;
        };
        controls.view().set_controls_visible(true);

        let weak = Arc::downgrade(instance);
        instance
            .inactivity_timer()
            .arm(instance.config().timing.auto_hide_delay, move || {
                let Some(instance) = weak.upgrade() else {
                    return;
                };
                if instance.media().is_paused() {
                    return;
                }
                if let Some(controls) = instance.controls() {
                    controls.view().set_controls_visible(false);
                }
            });
    }

    fn pin_controls(&self) {
        let instance = &self.instance;
        instance.inactivity_timer().clear();
        if let Some(controls) = instance.controls() {
            controls.view().set_controls_visible(true);
        }
    }
}

/// Terminal error for the current load cycle: stop timers, detach the
/// controls and surface `message`
fn enter_error(instance: &PlayerInstance, provider: &dyn ControlsProvider, message: &str) {
    instance.state().set_state(Category::Playback, StateValue::Error);
    instance.stall_watchdog().clear();
    instance.inactivity_timer().clear();
    instance.teardown_controls(provider);
    instance.host().set_loading(false);
    instance.host().show_message(message);
}

/// Clamp to `[0, 1]` and drop float noise from repeated steps
fn round_volume(level: f64) -> f64 {
    if !level.is_finite() {
        return 0.0;
    }
    ((level * 100.0).round() / 100.0).clamp(0.0, 1.0)
}
