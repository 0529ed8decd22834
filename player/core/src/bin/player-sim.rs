//! Player Simulator
//!
//! Runs the core against the headless host: activates a video surface and a
//! surface with no usable source, plays a scripted session on the first one
//! and prints the final state snapshot as JSON.
//!
//! # Usage
//!
//! ```bash
//! # Defaults, or ~/.config/open-source-player/player.toml when present
//! player-sim
//!
//! # With verbose logging
//! OSP_DEBUG=1 player-sim
//! RUST_LOG=player_core=trace player-sim
//! ```
//!
//! # Signals
//!
//! - SIGINT: stop the session early and tear every surface down

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};

use player_core::{
    headless::{
        HeadlessControlsProvider, HeadlessDevice, RecordingContextMenu, RecordingHost,
        ScriptedSubtitles,
    },
    Collaborators, FocusTarget, InputEvent, Key, MediaDevice, MediaEvent, MediaSource,
    PlayerEvent, PlayerRegistry, SurfaceCandidate, SurfaceId,
};

const STEP: Duration = Duration::from_millis(100);
const CAPTIONS: &str = "captions/en.vtt";

struct Session {
    registry: PlayerRegistry,
    id: SurfaceId,
    device: Arc<HeadlessDevice>,
    events: mpsc::Sender<PlayerEvent>,
    pace: tokio::time::Interval,
}

impl Session {
    async fn signal(&mut self, event: MediaEvent) -> anyhow::Result<()> {
        self.events.send(event.into()).await?;
        self.pace.tick().await;
        Ok(())
    }

    async fn input(&mut self, event: InputEvent) {
        if !self.registry.dispatch(&self.id, event.into()) {
            warn!(surface_id = %self.id, "Surface not active, input dropped");
        }
        self.pace.tick().await;
    }

    async fn run(&mut self) -> anyhow::Result<()> {
        info!("Loading media");
        self.signal(MediaEvent::LoadStart).await?;
        self.device.load_metadata(12.0);
        self.signal(MediaEvent::LoadedMetadata).await?;
        self.signal(MediaEvent::CanPlay).await?;

        info!("Playing");
        self.input(InputEvent::SurfaceClicked).await;
        for _ in 0..4 {
            self.device.advance(1.0);
            self.signal(MediaEvent::TimeUpdate).await?;
        }

        info!("Seeking to the middle");
        self.input(InputEvent::SeekBegin).await;
        self.input(InputEvent::SeekInput { percent: 50.0 }).await;
        self.input(InputEvent::SeekEnd).await;

        info!("Looping past the end");
        self.input(InputEvent::ToggleLoop).await;
        self.device.finish();
        self.signal(MediaEvent::Ended).await?;

        info!("Muting from the keyboard");
        self.input(InputEvent::Key {
            key: Key::Char('m'),
            focus: FocusTarget::Surface,
        })
        .await;

        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = player_core::load_config()?;

    let default_level = if config.features.debug_logging {
        "player_core=debug"
    } else {
        "player_core=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("player_sim=info".parse()?)
                .add_directive(default_level.parse()?),
        )
        .with_target(true)
        .init();

    info!(source = ?config.source(), "Starting player simulator");

    let collaborators = Collaborators::new(Arc::new(HeadlessControlsProvider::new()))
        .with_subtitles(Arc::new(ScriptedSubtitles::new([CAPTIONS])))
        .with_context_menu(Arc::new(RecordingContextMenu::new()));
    let registry = PlayerRegistry::new(config, collaborators);

    let (tx, rx) = mpsc::channel(64);
    let device = Arc::new(HeadlessDevice::video().with_events(tx.clone()));
    let id = SurfaceId::new("sim-video");

    let candidates = vec![
        SurfaceCandidate::new(device.clone(), Arc::new(RecordingHost::new()))
            .with_id(id.clone())
            .with_source(MediaSource::with_type("media/intro.mp4", "video/mp4"))
            .with_subtitles(CAPTIONS)
            .with_events(rx),
        SurfaceCandidate::new(
            Arc::new(HeadlessDevice::video()),
            Arc::new(RecordingHost::new()),
        )
        .with_id(SurfaceId::new("sim-broken")),
    ];

    let report = registry.activate(candidates).await;
    for failure in &report.failed {
        warn!(error = %failure, "Surface failed to activate");
    }

    let mut session = Session {
        registry: registry.clone(),
        id: id.clone(),
        device: device.clone(),
        events: tx,
        pace: tokio::time::interval(STEP),
    };

    tokio::select! {
        result = session.run() => {
            result?;
            info!("Session complete");
        }
        _ = signal::ctrl_c() => {
            info!("Interrupted");
        }
    }

    if let Some(instance) = registry.get(&id) {
        let snapshot = serde_json::to_string_pretty(&instance.state().snapshot())?;
        println!("{snapshot}");
        info!(
            position = device.current_time(),
            volume = device.volume(),
            "Final device state"
        );
    }
    info!(summary = ?registry.summary(), "Surfaces");

    let destroyed = registry.destroy_all();
    info!(destroyed, "Shutdown complete");
    Ok(())
}
