mod support;

use std::sync::Arc;
use std::time::{Duration, Instant};

use framecast_capture_engine::{
    CaptureConfig, CaptureSession, FilterProfile, LifecycleController, MediaKind, MuxSink,
    SelectionToken, Selector, SessionState, SinkSettings, StopOutcome, SurfaceCatalog,
};
use framecast_common::clock::SessionClock;
use framecast_common::config::{CatalogFilter, RecordingDefaults};
use framecast_common::error::FramecastError;

use support::*;

fn settings(audio: bool, depth: usize) -> SinkSettings {
    SinkSettings {
        video_queue_depth: depth,
        audio_queue_depth: depth,
        audio,
        finalize_timeout: Duration::from_secs(10),
    }
}

fn file_sink(name: &str, audio: bool, depth: usize) -> (MuxSink, std::path::PathBuf) {
    let path = temp_artifact(name);
    let muxer = FileMuxer::create(&path, audio);
    let sink = MuxSink::new(
        Box::new(muxer),
        settings(audio, depth),
        Arc::new(SessionClock::new()),
    )
    .unwrap();
    (sink, path)
}

#[tokio::test]
async fn records_selected_window_with_both_tracks() {
    let backend = Arc::new(FakeBackend::standard());
    let catalog = SurfaceCatalog::new(backend.clone(), CatalogFilter::default());
    assert_eq!(catalog.enumerate(FilterProfile::List).unwrap().len(), 3);

    let surface = Selector::new(&catalog)
        .resolve(SelectionToken::Index(2))
        .unwrap();
    assert_eq!(surface.id, 0x300);

    let config = CaptureConfig::for_surface(surface, &RecordingDefaults::default()).unwrap();
    let (sink, path) = file_sink("happy", true, 256);

    let mut controller =
        LifecycleController::new(backend.clone(), Duration::from_secs(5), Duration::from_secs(10));
    let handle = controller.stop_handle();

    let feeder = async {
        backend.wait_for_streams(2).await;
        for i in 0..100 {
            assert!(backend.deliver(video_frame(i)));
            if i < 50 {
                assert!(backend.deliver(audio_block(i)));
            }
        }
        handle.request_stop();
    };

    let (report, ()) = tokio::join!(
        controller.run(config, sink, std::future::pending::<()>()),
        feeder
    );
    let report = report.unwrap();

    let artifact = Artifact::read(&path);
    assert!(artifact.is_finalized());
    assert_eq!(artifact.video.len(), 100);
    assert_eq!(artifact.audio.len(), 50);
    assert_eq!(artifact.video[0], 0);
    assert_eq!(artifact.duration_ns, Some(99 * FRAME_NS));

    assert_eq!(report.mux.duration_ns, 99 * FRAME_NS);
    assert!(report.mux.has_track(MediaKind::Video));
    assert!(report.mux.has_track(MediaKind::Audio));
    assert_eq!(report.mux.stats.video.dropped, 0);
    assert_eq!(report.surface, "Code - main.rs - framecast");
    assert_eq!(controller.state(), SessionState::Finalized);
    assert_eq!(backend.running_streams(), 0);

    std::fs::remove_file(&path).ok();
}

#[tokio::test]
async fn desktop_token_records_primary_display() {
    let backend = Arc::new(FakeBackend::standard());
    let catalog = SurfaceCatalog::new(backend.clone(), CatalogFilter::default());
    let surface = Selector::new(&catalog)
        .resolve(SelectionToken::Desktop)
        .unwrap();
    assert!(surface.is_desktop());
    assert_eq!(surface.bounds().width, 1920);

    let defaults = RecordingDefaults {
        capture_audio: false,
        ..RecordingDefaults::default()
    };
    let config = CaptureConfig::for_surface(surface, &defaults).unwrap();
    assert_eq!((config.width, config.height), (1920, 1080));

    let (sink, path) = file_sink("desktop", false, 64);
    let mut session = CaptureSession::new(backend.clone(), Duration::from_secs(5));
    session.start(config, sink).await.unwrap();
    for i in 0..10 {
        backend.deliver(video_frame(i));
    }
    let report = session.stop().await.unwrap();

    assert_eq!(report.surface, "Desktop (Entire Screen)");
    assert_eq!(Artifact::read(&path).video.len(), 10);
    std::fs::remove_file(&path).ok();
}

#[tokio::test]
async fn stop_is_idempotent() {
    let backend = Arc::new(FakeBackend::standard());
    let surface = sample_windows().remove(1);
    let config = CaptureConfig::for_surface(surface, &RecordingDefaults::default()).unwrap();
    let (sink, path) = file_sink("idempotent", true, 64);

    let mut session = CaptureSession::new(backend.clone(), Duration::from_secs(5));
    session.start(config, sink).await.unwrap();
    for i in 0..5 {
        backend.deliver(video_frame(i));
    }

    let first = session.stop().await.unwrap();
    let second = session.stop().await.unwrap();
    assert_eq!(first.path, second.path);
    assert_eq!(first.mux.duration_ns, second.mux.duration_ns);
    assert_eq!(backend.stop_calls(), 2);

    let artifact = Artifact::read(&path);
    assert_eq!(artifact.trailers, 1);
    assert_eq!(artifact.eos.len(), 2);
    std::fs::remove_file(&path).ok();
}

#[tokio::test]
async fn no_audio_opens_video_only() {
    let backend = Arc::new(FakeBackend::standard());
    let defaults = RecordingDefaults {
        capture_audio: false,
        ..RecordingDefaults::default()
    };
    let config = CaptureConfig::for_surface(sample_windows().remove(2), &defaults).unwrap();
    let (sink, path) = file_sink("no-audio", false, 64);

    let mut session = CaptureSession::new(backend.clone(), Duration::from_secs(5));
    session.start(config, sink).await.unwrap();
    assert_eq!(backend.opened(), vec![MediaKind::Video]);

    for i in 0..20 {
        backend.deliver(video_frame(i));
    }
    assert!(!backend.deliver(audio_block(0)));
    let report = session.stop().await.unwrap();

    assert!(!report.mux.has_track(MediaKind::Audio));
    assert!(report.mux.stats.audio.is_none());
    let artifact = Artifact::read(&path);
    assert!(artifact.audio.is_empty());
    assert_eq!(artifact.video.len(), 20);
    assert!(artifact.is_finalized());
    std::fs::remove_file(&path).ok();
}

#[tokio::test]
async fn zero_audio_samples_still_finalizes() {
    let backend = Arc::new(FakeBackend::standard());
    let config =
        CaptureConfig::for_surface(sample_windows().remove(1), &RecordingDefaults::default())
            .unwrap();
    let (sink, path) = file_sink("silent", true, 64);

    let mut session = CaptureSession::new(backend.clone(), Duration::from_secs(5));
    session.start(config, sink).await.unwrap();
    for i in 0..3 {
        backend.deliver(video_frame(i));
    }
    let report = session.stop().await.unwrap();

    assert!(!report.mux.has_track(MediaKind::Audio));
    let artifact = Artifact::read(&path);
    assert!(artifact.is_finalized());
    assert_eq!(artifact.eos.len(), 2);
    std::fs::remove_file(&path).ok();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn interrupt_from_another_thread_finalizes_once() {
    let backend = Arc::new(FakeBackend::standard());
    let config =
        CaptureConfig::for_surface(sample_windows().remove(1), &RecordingDefaults::default())
            .unwrap();
    let (sink, path) = file_sink("interrupt", true, 256);

    let mut controller =
        LifecycleController::new(backend.clone(), Duration::from_secs(5), Duration::from_secs(10));
    let handle = controller.stop_handle();

    let interrupter = {
        let backend = backend.clone();
        std::thread::spawn(move || {
            backend.wait_for_streams_blocking(2);
            for i in 0..30 {
                backend.deliver(video_frame(i));
                backend.deliver(audio_block(i));
            }
            let outcome = handle.stop_and_wait(Duration::from_secs(20));
            // A second request after finalize changes nothing.
            handle.request_stop();
            let late = backend.deliver(video_frame(1000));
            (outcome, late)
        })
    };

    let report = controller
        .run(config, sink, std::future::pending::<()>())
        .await
        .unwrap();
    let (outcome, late_delivered) = tokio::task::spawn_blocking(move || interrupter.join().unwrap())
        .await
        .unwrap();

    match outcome {
        Some(StopOutcome::Finalized(seen)) => assert_eq!(seen.path, report.path),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(!late_delivered);

    let artifact = Artifact::read(&path);
    assert!(artifact.is_finalized());
    assert_eq!(artifact.video.len(), 30);
    assert_eq!(artifact.audio.len(), 30);
    std::fs::remove_file(&path).ok();
}

#[tokio::test]
async fn finalize_timeout_is_reported_and_artifact_kept() {
    let backend = Arc::new(FakeBackend::standard());
    let defaults = RecordingDefaults {
        capture_audio: false,
        ..RecordingDefaults::default()
    };
    let config = CaptureConfig::for_surface(sample_windows().remove(1), &defaults).unwrap();

    let path = temp_artifact("finalize-timeout");
    let gate = Gate::closed();
    let sink = MuxSink::new(
        Box::new(FileMuxer::with_gate(&path, false, gate.clone())),
        SinkSettings {
            finalize_timeout: Duration::from_millis(200),
            ..settings(false, 8)
        },
        Arc::new(SessionClock::new()),
    )
    .unwrap();

    let mut controller = LifecycleController::new(
        backend.clone(),
        Duration::from_secs(5),
        Duration::from_millis(200),
    );
    let handle = controller.stop_handle();
    let feeder = async {
        backend.wait_for_streams(1).await;
        assert!(backend.deliver(video_frame(0)));
        handle.request_stop();
    };

    let (result, ()) = tokio::join!(
        controller.run(config, sink, std::future::pending::<()>()),
        feeder
    );
    match result {
        Err(FramecastError::FinalizeTimeout { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected finalize timeout, got {other:?}"),
    }
    match controller.stop_handle().outcome() {
        Some(StopOutcome::Failed { path: failed, .. }) => assert_eq!(failed, path),
        other => panic!("unexpected outcome: {other:?}"),
    }

    // The unfinished artifact stays on disk for inspection.
    assert!(path.exists());
    assert!(!Artifact::read(&path).is_finalized());

    gate.open();
    std::fs::remove_file(&path).ok();
}

#[tokio::test]
async fn failed_start_restores_idle_and_removes_empty_file() {
    let backend = Arc::new(FakeBackend::standard().failing(MediaKind::Audio));
    let config =
        CaptureConfig::for_surface(sample_windows().remove(1), &RecordingDefaults::default())
            .unwrap();
    let (sink, path) = file_sink("failed-start", true, 64);
    assert!(path.exists());

    let mut session = CaptureSession::new(backend.clone(), Duration::from_secs(5));
    let err = session.start(config, sink).await.unwrap_err();

    assert!(matches!(err, FramecastError::CaptureStart { .. }));
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(backend.running_streams(), 0);
    assert!(!path.exists());
}

#[tokio::test]
async fn stop_before_start_is_an_error() {
    let backend = Arc::new(FakeBackend::standard());
    let mut session = CaptureSession::new(backend, Duration::from_secs(5));
    assert!(session.stop().await.is_err());
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn slow_encoder_never_blocks_submit() {
    let path = temp_artifact("backpressure");
    let gate = Gate::closed();
    let muxer = FileMuxer::with_gate(&path, false, gate.clone());
    let sink = MuxSink::new(
        Box::new(muxer),
        settings(false, 4),
        Arc::new(SessionClock::new()),
    )
    .unwrap();

    let mut slowest = Duration::ZERO;
    for i in 0..200 {
        let started = Instant::now();
        sink.submit(video_frame(i));
        slowest = slowest.max(started.elapsed());
        assert!(sink.backlog(MediaKind::Video) <= 4);
    }
    assert!(slowest < Duration::from_millis(50), "submit blocked for {slowest:?}");

    let stats = sink.stats().video;
    // One frame may be held by the blocked writer plus a full queue.
    assert!(stats.accepted <= 5, "accepted {}", stats.accepted);
    assert_eq!(stats.accepted + stats.dropped, 200);

    gate.open();
    let mut previous = sink.backlog(MediaKind::Video);
    for _ in 0..50 {
        std::thread::sleep(Duration::from_millis(2));
        let backlog = sink.backlog(MediaKind::Video);
        assert!(backlog <= previous);
        previous = backlog;
    }

    let summary = sink.finalize().unwrap();
    assert_eq!(summary.stats.video.written, stats.accepted);
    assert_eq!(Artifact::read(&path).video.len() as u64, stats.accepted);
    std::fs::remove_file(&path).ok();
}
