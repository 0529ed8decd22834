//! Player Core - Headless Playback-Surface Orchestration
//!
//! This crate drives any number of media playback surfaces on a page without
//! depending on a rendering toolkit. The host supplies the media element, the
//! controls view and the container; the core owns per-surface state, timers
//! and the rules that tie device signals and user input together.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                             Host                                 │
//! │  ┌─────────────┐  ┌───────────────┐  ┌─────────────┐  ┌────────┐ │
//! │  │ MediaDevice │  │ ControlsView  │  │ SurfaceHost │  │ Subs / │ │
//! │  │ (element)   │  │ (button bar)  │  │ (container) │  │ ads .. │ │
//! │  └──────┬──────┘  └───────▲───────┘  └──────▲──────┘  └───▲────┘ │
//! │         │ MediaEvent      │ icons/text      │ messages    │      │
//! │         │ InputEvent      │ ranges          │ loading     │      │
//! └─────────┼─────────────────┼─────────────────┼─────────────┼──────┘
//!           │                 │                 │             │
//! ┌─────────┼─────────────────┼─────────────────┼─────────────┼──────┐
//! │         ▼            PLAYER CORE            │             │      │
//! │  ┌────────────────────────────────────────────────────────┴───┐  │
//! │  │                     PlayerRegistry                         │  │
//! │  │  activate / destroy / dispatch by SurfaceId                │  │
//! │  └──────────────┬─────────────────────────────────────────────┘  │
//! │                 │ one per surface                                │
//! │  ┌──────────────▼──────────┐   ┌──────────────────────────────┐  │
//! │  │   EventOrchestrator     │──▶│ PlayerInstance               │  │
//! │  │   signals -> rules      │   │  StateMachine  Watchdog x2   │  │
//! │  └─────────────────────────┘   └──────────────┬───────────────┘  │
//! │                                               │ playing          │
//! │                                 ┌─────────────▼───────────────┐  │
//! │                                 │ UpdateScheduler (frames)    │  │
//! │                                 └─────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`PlayerRegistry`]: owns every surface, activation and teardown
//! - [`PlayerInstance`]: one surface and its UI refresh routines
//! - [`StateMachine`]: the nine-category state record with listeners
//! - [`EventOrchestrator`]: device signals and input to state transitions
//! - [`UpdateScheduler`]: per-surface frame loops while playing
//! - [`Watchdog`]: single-shot cancellable timers
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use player_core::{
//!     headless::{HeadlessControlsProvider, HeadlessDevice, RecordingHost},
//!     Collaborators, MediaEvent, PlayerConfig, PlayerRegistry, SurfaceCandidate,
//! };
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = PlayerRegistry::new(
//!         PlayerConfig::default(),
//!         Collaborators::new(Arc::new(HeadlessControlsProvider::new())),
//!     );
//!
//!     let (tx, rx) = mpsc::channel(64);
//!     let device = Arc::new(HeadlessDevice::video().with_events(tx.clone()));
//!     let candidate = SurfaceCandidate::new(device.clone(), Arc::new(RecordingHost::new()))
//!         .with_src("https://cdn.example/clip.mp4")
//!         .with_events(rx);
//!
//!     let report = registry.activate(vec![candidate]).await;
//!
//!     device.load_metadata(42.0);
//!     tx.send(MediaEvent::LoadedMetadata.into()).await.unwrap();
//!
//!     registry.destroy_all();
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`state`]: categories, values and the state machine
//! - [`registry`]: surface lifecycle and routing
//! - [`orchestrator`]: per-surface event rules
//! - [`instance`]: surface identity and UI refresh
//! - [`scheduler`]: frame loops
//! - [`watchdog`]: stall and inactivity timers
//! - [`events`]: device signals, user input and shortcuts
//! - [`media`], [`controls`], [`collaborators`]: host contracts
//! - [`config`]: feature toggles and timing, from file and environment
//! - [`headless`]: in-memory host for tests and the simulator

#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod collaborators;
pub mod config;
pub mod controls;
pub mod error;
pub mod events;
pub mod headless;
pub mod instance;
pub mod media;
pub mod orchestrator;
pub mod registry;
pub mod scheduler;
pub mod state;
pub mod watchdog;

// Re-exports for convenience
pub use collaborators::{AdaptiveSource, Collaborators, ContextMenu, Interstitial, SubtitleLoader};
pub use controls::{
    ControlRegion, ControlsBundle, ControlsProvider, ControlsView, IconId, SurfaceHost,
};
pub use error::{DeviceError, MediaErrorCode, SetupError, StateError};
pub use events::{FocusTarget, InputEvent, Key, MediaEvent, PlayerEvent, Shortcut};
pub use instance::{format_time, PlayerInstance, SurfaceId, VolumeMemory};
pub use media::{buffered_percent, MediaDevice, MediaKind, MediaSource, TimeRange};
pub use orchestrator::EventOrchestrator;
pub use registry::{ActivationReport, PlayerRegistry, SurfaceCandidate};
pub use scheduler::{FrameTarget, SchedulerStats, UpdateScheduler};
pub use state::{Category, ListenerId, StateChange, StateMachine, StateSnapshot, StateValue};
pub use watchdog::Watchdog;

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigSource,
    FeatureToggles, PlayerConfig, PlayerToml, TimingConfig,
};
