//! Shared harness for the integration tests
//!
//! Every test runs on tokio's paused clock; `frames(n)` advances virtual time
//! by `n` frame intervals and lets spawned tasks run in between.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use player_core::headless::{HeadlessControlsProvider, HeadlessDevice, RecordingControls, RecordingHost};
use player_core::{
    Category, Collaborators, InputEvent, MediaEvent, PlayerConfig, PlayerInstance, PlayerRegistry,
    StateValue, SurfaceCandidate, SurfaceId,
};

pub const FRAME: Duration = Duration::from_millis(16);

/// Let spawned tasks run without moving the clock
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

/// Advance virtual time by `n` frames
pub async fn frames(n: usize) {
    for _ in 0..n {
        tokio::time::advance(FRAME).await;
        settle().await;
    }
}

/// Advance virtual time by `duration`, one frame at a time
pub async fn elapse(duration: Duration) {
    let n = duration.as_millis().div_ceil(FRAME.as_millis());
    frames(usize::try_from(n).unwrap_or(usize::MAX)).await;
}

/// One activated video surface and everything it talks to
pub struct Harness {
    pub registry: PlayerRegistry,
    pub provider: Arc<HeadlessControlsProvider>,
    pub device: Arc<HeadlessDevice>,
    pub host: Arc<RecordingHost>,
    pub id: SurfaceId,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with(PlayerConfig::default(), HeadlessDevice::video(), |c| c).await
    }

    pub async fn with(
        config: PlayerConfig,
        device: HeadlessDevice,
        collaborators: impl FnOnce(Collaborators) -> Collaborators,
    ) -> Self {
        let provider = Arc::new(HeadlessControlsProvider::new());
        let registry = PlayerRegistry::new(config, collaborators(Collaborators::new(provider.clone())));
        let (tx, rx) = mpsc::channel(64);
        let device = Arc::new(device.with_events(tx));
        let host = Arc::new(RecordingHost::new());
        let id = SurfaceId::new("osp-harness");

        let candidate = SurfaceCandidate::new(device.clone(), host.clone())
            .with_id(id.clone())
            .with_src("https://cdn.test/clip.mp4")
            .with_subtitles("captions/en.vtt")
            .with_events(rx);
        registry
            .activate_one(candidate)
            .await
            .expect("harness surface activates");
        settle().await;

        Self {
            registry,
            provider,
            device,
            host,
            id,
        }
    }

    pub fn instance(&self) -> Arc<PlayerInstance> {
        self.registry.get(&self.id).expect("surface registered")
    }

    pub fn view(&self) -> Arc<RecordingControls> {
        self.provider.view(&self.id).expect("controls wired")
    }

    pub fn state(&self, category: Category) -> StateValue {
        self.instance().state().get_state(category)
    }

    pub fn media(&self, event: MediaEvent) {
        assert!(self.registry.dispatch(&self.id, event.into()));
    }

    pub fn input(&self, event: InputEvent) {
        assert!(self.registry.dispatch(&self.id, event.into()));
    }

    /// Load metadata of `duration` seconds and signal it
    pub fn load(&self, duration: f64) {
        self.device.load_metadata(duration);
        self.media(MediaEvent::LoadedMetadata);
    }

    /// Click play and let the device report playing
    pub async fn play(&self) {
        self.input(InputEvent::SurfaceClicked);
        settle().await;
    }
}
