//! Lifecycle Tests
//!
//! Activation and teardown through the public registry API: setup failures,
//! optional collaborators, concurrent scans and idempotent destroy.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tokio::sync::Notify;

use common::{frames, settle, Harness};
use player_core::error::NO_SOURCE_MESSAGE;
use player_core::headless::{
    HeadlessControlsProvider, HeadlessDevice, RecordingContextMenu, RecordingHost, ScriptedAdaptive,
    ScriptedInterstitial, ScriptedSubtitles,
};
use player_core::{
    Category, Collaborators, ControlRegion, FeatureToggles, InputEvent, Interstitial, MediaDevice,
    MediaSource, PlayerConfig, PlayerRegistry, SetupError, StateSnapshot, StateValue,
    SurfaceCandidate, SurfaceId,
};

fn registry_with(provider: Arc<HeadlessControlsProvider>) -> PlayerRegistry {
    PlayerRegistry::new(PlayerConfig::default(), Collaborators::new(provider))
}

fn video_candidate(id: &str) -> SurfaceCandidate {
    SurfaceCandidate::new(Arc::new(HeadlessDevice::video()), Arc::new(RecordingHost::new()))
        .with_id(SurfaceId::new(id))
}

// =============================================================================
// Activation
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_fresh_surface_starts_loading_with_defaults() {
    let h = Harness::new().await;
    let snapshot = h.instance().state().snapshot();

    let expected = StateSnapshot::default();
    for category in Category::ALL {
        if category == Category::Playback {
            assert_eq!(snapshot.get(category), StateValue::Loading);
        } else {
            assert_eq!(snapshot.get(category), expected.get(category), "{category}");
        }
    }
    assert!(h.instance().is_active());
    assert_eq!(h.device.source().unwrap().src, "https://cdn.test/clip.mp4");
}

#[tokio::test]
async fn test_zero_sources_fails_with_message() {
    let provider = Arc::new(HeadlessControlsProvider::new());
    let registry = registry_with(provider.clone());
    let host = Arc::new(RecordingHost::new());
    let id = SurfaceId::new("no-source");

    let result = registry
        .activate_one(
            SurfaceCandidate::new(Arc::new(HeadlessDevice::video()), host.clone())
                .with_id(id.clone())
                .with_source(MediaSource::new("")),
        )
        .await;

    assert!(matches!(result, Err(SetupError::NoSource(ref s)) if *s == id));
    let instance = registry.get(&id).unwrap();
    assert_eq!(instance.playback(), StateValue::Error);
    assert!(!instance.is_active());
    assert_eq!(host.message().as_deref(), Some(NO_SOURCE_MESSAGE));
    assert!(!provider.is_wired(&id));
    assert_eq!(provider.removed(), vec![id]);
}

#[tokio::test]
async fn test_failed_controls_abort_activation() {
    let registry = registry_with(Arc::new(HeadlessControlsProvider::failing("template missing")));
    let id = SurfaceId::new("broken-controls");

    let result = registry
        .activate_one(video_candidate("broken-controls").with_src("a.mp4"))
        .await;

    match result {
        Err(SetupError::ControlsFailed { surface, reason }) => {
            assert_eq!(surface, id);
            assert!(reason.contains("template missing"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(registry.get(&id).unwrap().playback(), StateValue::Error);
}

#[tokio::test]
async fn test_incomplete_controls_abort_activation() {
    let provider = Arc::new(HeadlessControlsProvider::with_regions([
        ControlRegion::Container,
        ControlRegion::PlayPause,
    ]));
    let registry = registry_with(provider.clone());
    let id = SurfaceId::new("partial");

    let result = registry
        .activate_one(video_candidate("partial").with_src("a.mp4"))
        .await;

    let Err(SetupError::ControlsIncomplete { missing, .. }) = result else {
        panic!("expected incomplete controls");
    };
    assert!(missing.contains(&ControlRegion::SeekRange));
    assert!(!provider.is_wired(&id));
}

#[tokio::test]
async fn test_bulk_activation_isolates_failures() {
    let registry = registry_with(Arc::new(HeadlessControlsProvider::new()));
    let host = Arc::new(RecordingHost::new());

    let report = registry
        .activate(vec![
            video_candidate("a").with_src("a.mp4"),
            SurfaceCandidate::without_media(host),
            video_candidate("b"),
            video_candidate("c").with_source(MediaSource::with_type("c.webm", "video/webm")),
        ])
        .await;

    let mut activated = report.activated.clone();
    activated.sort();
    assert_eq!(activated, vec![SurfaceId::new("a"), SurfaceId::new("c")]);
    assert_eq!(report.failed.len(), 2);
    assert!(!report.is_complete());
    // The surface without media never registers
    assert_eq!(registry.count(), 3);
}

#[tokio::test]
async fn test_generated_identities_are_distinct() {
    let registry = registry_with(Arc::new(HeadlessControlsProvider::new()));
    let candidate = || {
        SurfaceCandidate::new(Arc::new(HeadlessDevice::audio()), Arc::new(RecordingHost::new()))
            .with_src("track.mp3")
    };

    let a = registry.activate_one(candidate()).await.unwrap();
    let b = registry.activate_one(candidate()).await.unwrap();

    assert_ne!(a, b);
    assert!(a.as_str().starts_with("osp-"));
    assert_eq!(registry.ids().len(), 2);
}

// =============================================================================
// Optional collaborators
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_subtitles_enable_the_subtitle_control() {
    let subtitles = Arc::new(ScriptedSubtitles::new(["captions/en.vtt"]));
    let features = FeatureToggles {
        subtitles: true,
        ..FeatureToggles::default()
    };
    let h = Harness::with(
        PlayerConfig::default().with_features(features),
        HeadlessDevice::video(),
        |c| c.with_subtitles(subtitles.clone()),
    )
    .await;

    assert_eq!(subtitles.load_count(), 1);
    assert!(h.instance().subtitles_available());
    assert_eq!(h.view().region_visible(ControlRegion::Subtitle), Some(true));

    h.input(InputEvent::ControlClicked(ControlRegion::Subtitle));
    assert_eq!(h.state(Category::Subtitles), StateValue::On);
}

#[tokio::test(start_paused = true)]
async fn test_subtitles_disabled_by_config_are_not_loaded() {
    let subtitles = Arc::new(ScriptedSubtitles::new(["captions/en.vtt"]));
    let h = Harness::with(PlayerConfig::default(), HeadlessDevice::video(), |c| {
        c.with_subtitles(subtitles.clone())
    })
    .await;

    assert_eq!(subtitles.load_count(), 0);
    assert!(!h.instance().subtitles_available());
}

#[tokio::test]
async fn test_rejected_interstitial_aborts_activation() {
    let features = FeatureToggles {
        interstitial: true,
        ..FeatureToggles::default()
    };
    let interstitial = Arc::new(ScriptedInterstitial::completing(false));
    let provider = Arc::new(HeadlessControlsProvider::new());
    let registry = PlayerRegistry::new(
        PlayerConfig::default().with_features(features),
        Collaborators::new(provider.clone()).with_interstitial(interstitial.clone()),
    );

    let result = registry
        .activate_one(video_candidate("ad").with_src("a.mp4").with_interstitial("preroll"))
        .await;

    assert!(matches!(result, Err(SetupError::InterstitialRejected(_))));
    assert_eq!(interstitial.presented(), 1);
    assert!(!provider.is_wired(&SurfaceId::new("ad")));
}

#[tokio::test]
async fn test_failing_interstitial_aborts_activation() {
    let features = FeatureToggles {
        interstitial: true,
        ..FeatureToggles::default()
    };
    let registry = PlayerRegistry::new(
        PlayerConfig::default().with_features(features),
        Collaborators::new(Arc::new(HeadlessControlsProvider::new()))
            .with_interstitial(Arc::new(ScriptedInterstitial::failing("ad server down"))),
    );

    let result = registry
        .activate_one(video_candidate("ad").with_src("a.mp4").with_interstitial("preroll"))
        .await;
    assert!(matches!(result, Err(SetupError::InterstitialRejected(_))));
}

#[tokio::test]
async fn test_adaptive_failure_falls_back_to_direct_source() {
    let features = FeatureToggles {
        adaptive_source: true,
        ..FeatureToggles::default()
    };
    let registry = PlayerRegistry::new(
        PlayerConfig::default().with_features(features),
        Collaborators::new(Arc::new(HeadlessControlsProvider::new()))
            .with_adaptive(Arc::new(ScriptedAdaptive::rejecting())),
    );
    let device = Arc::new(HeadlessDevice::video());

    registry
        .activate_one(
            SurfaceCandidate::new(device.clone(), Arc::new(RecordingHost::new()))
                .with_src("stream.m3u8"),
        )
        .await
        .unwrap();

    assert_eq!(device.source().unwrap().src, "stream.m3u8");
}

#[tokio::test]
async fn test_adaptive_success_skips_direct_source() {
    let features = FeatureToggles {
        adaptive_source: true,
        ..FeatureToggles::default()
    };
    let adaptive = Arc::new(ScriptedAdaptive::accepting());
    let registry = PlayerRegistry::new(
        PlayerConfig::default().with_features(features),
        Collaborators::new(Arc::new(HeadlessControlsProvider::new())).with_adaptive(adaptive.clone()),
    );
    let device = Arc::new(HeadlessDevice::video());

    registry
        .activate_one(
            SurfaceCandidate::new(device.clone(), Arc::new(RecordingHost::new()))
                .with_src("stream.m3u8"),
        )
        .await
        .unwrap();

    assert_eq!(adaptive.attached().len(), 1);
    assert!(device.source().is_none());
}

#[tokio::test]
async fn test_context_menu_only_for_video() {
    let menu = Arc::new(RecordingContextMenu::new());
    let registry = PlayerRegistry::new(
        PlayerConfig::default(),
        Collaborators::new(Arc::new(HeadlessControlsProvider::new())).with_context_menu(menu.clone()),
    );

    registry
        .activate_one(video_candidate("v").with_src("a.mp4"))
        .await
        .unwrap();
    registry
        .activate_one(
            SurfaceCandidate::new(Arc::new(HeadlessDevice::audio()), Arc::new(RecordingHost::new()))
                .with_src("a.mp3"),
        )
        .await
        .unwrap();

    assert_eq!(menu.initialized(), 1);
}

// =============================================================================
// Teardown
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_destroy_is_idempotent() {
    let h = Harness::new().await;
    let instance = h.instance();
    assert!(instance.state().listener_count() > 0);

    assert!(h.registry.destroy(&h.id));
    assert_eq!(instance.state().listener_count(), 0);
    assert!(!instance.is_active());
    assert!(!h.registry.contains(&h.id));
    assert_eq!(h.host.detach_count(), 1);
    assert!(!h.provider.is_wired(&h.id));

    assert!(!h.registry.destroy(&h.id));
    assert_eq!(h.host.detach_count(), 1);
    assert_eq!(h.provider.removed().len(), 1);
}

#[tokio::test]
async fn test_destroy_unknown_is_noop() {
    let registry = registry_with(Arc::new(HeadlessControlsProvider::new()));
    assert!(!registry.destroy(&SurfaceId::new("never-seen")));
}

#[tokio::test(start_paused = true)]
async fn test_destroy_stops_frame_loop_and_timers() {
    let h = Harness::new().await;
    h.load(30.0);
    h.play().await;
    h.media(player_core::MediaEvent::Waiting);
    assert!(h.registry.scheduler().is_scheduled(&h.id));
    let instance = h.instance();
    assert!(instance.stall_watchdog().is_armed());

    h.registry.destroy(&h.id);
    frames(3).await;

    assert!(!h.registry.scheduler().is_scheduled(&h.id));
    assert!(!instance.stall_watchdog().is_armed());
    assert!(!h.registry.dispatch(&h.id, InputEvent::SurfaceClicked.into()));
}

#[tokio::test(start_paused = true)]
async fn test_events_after_destroy_are_ignored() {
    let h = Harness::new().await;
    let orchestrator = h.registry.orchestrator(&h.id).unwrap();
    h.registry.destroy(&h.id);

    orchestrator.handle(InputEvent::ToggleLoop.into());
    assert_eq!(
        orchestrator.instance().state().get_state(Category::Loop),
        StateValue::NotLooping
    );
}

#[tokio::test(start_paused = true)]
async fn test_destroy_all_tears_down_each_surface_once() {
    let registry = registry_with(Arc::new(HeadlessControlsProvider::new()));
    let hosts: Vec<_> = (0..3).map(|_| Arc::new(RecordingHost::new())).collect();
    for (i, host) in hosts.iter().enumerate() {
        registry
            .activate_one(
                SurfaceCandidate::new(Arc::new(HeadlessDevice::video()), host.clone())
                    .with_id(SurfaceId::new(format!("s{i}")))
                    .with_src("a.mp4"),
            )
            .await
            .unwrap();
    }

    assert_eq!(registry.destroy_all(), 3);
    assert_eq!(registry.destroy_all(), 0);
    assert_eq!(registry.count(), 0);
    assert!(hosts.iter().all(|h| h.detach_count() == 1));
}

/// Interstitial that waits until released
struct GatedInterstitial {
    release: Notify,
}

#[async_trait]
impl Interstitial for GatedInterstitial {
    async fn present(&self, _media: Arc<dyn MediaDevice>, _surface: &SurfaceId) -> anyhow::Result<bool> {
        self.release.notified().await;
        Ok(true)
    }
}

#[tokio::test(start_paused = true)]
async fn test_destroy_during_activation_cancels_it() {
    let features = FeatureToggles {
        interstitial: true,
        ..FeatureToggles::default()
    };
    let gate = Arc::new(GatedInterstitial {
        release: Notify::new(),
    });
    let host = Arc::new(RecordingHost::new());
    let registry = PlayerRegistry::new(
        PlayerConfig::default().with_features(features),
        Collaborators::new(Arc::new(HeadlessControlsProvider::new())).with_interstitial(gate.clone()),
    );
    let id = SurfaceId::new("slow");

    let activation = tokio::spawn({
        let registry = registry.clone();
        let candidate = SurfaceCandidate::new(Arc::new(HeadlessDevice::video()), host.clone())
            .with_id(id.clone())
            .with_src("a.mp4")
            .with_interstitial("preroll");
        async move { registry.activate_one(candidate).await }
    });
    settle().await;
    assert!(registry.contains(&id));

    assert!(registry.destroy(&id));
    gate.release.notify_one();
    let result = activation.await.unwrap();

    assert!(matches!(result, Err(SetupError::Cancelled(_))));
    assert!(!registry.contains(&id));
    assert_eq!(host.detach_count(), 1);
}
