//! Start a recording session and run it until interrupted.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use framecast_capture_engine::{
    create_mp4_muxer, get_backend, CaptureConfig, EncodeSettings, LifecycleController, MuxSink,
    SelectionToken, Selector, ShutdownSignal, SinkSettings, SurfaceCatalog,
};
use framecast_common::clock::SessionClock;
use framecast_common::config::AppConfig;

pub struct RecordArgs {
    pub output: PathBuf,
    pub selection: Option<String>,
    pub no_audio: bool,
    pub hide_cursor: bool,
    pub fps: Option<u32>,
    pub scale: Option<f64>,
    pub thumbnails: bool,
    pub json: bool,
}

pub async fn run(args: RecordArgs, mut config: AppConfig) -> anyhow::Result<ExitCode> {
    let defaults = &mut config.recording;
    if args.no_audio {
        defaults.capture_audio = false;
    }
    if args.hide_cursor {
        defaults.show_cursor = false;
    }
    if let Some(fps) = args.fps {
        defaults.fps = fps;
    }
    if let Some(scale) = args.scale {
        defaults.hidpi_scale = scale;
    }

    let backend = get_backend();
    let catalog = SurfaceCatalog::new(backend.clone(), config.catalog.clone());

    let surface = match &args.selection {
        Some(raw) => {
            let token: SelectionToken = raw.parse()?;
            Selector::new(&catalog).resolve(token)?
        }
        None => match super::pick::choose(&catalog, args.thumbnails, &config)? {
            Some(surface) => surface,
            None => {
                eprintln!("Cancelled.");
                return Ok(ExitCode::FAILURE);
            }
        },
    };

    tracing::info!(
        surface = %surface.label(),
        token = %SelectionToken::for_surface(&surface),
        "Selected surface"
    );

    // From here on an interrupt must lead to finalize, never to process exit.
    let shutdown = ShutdownSignal::install()?;

    let defaults = &config.recording;
    let capture = CaptureConfig::for_surface(surface, defaults)?;
    let encode = EncodeSettings::from_config(&capture, defaults);
    let muxer = create_mp4_muxer(&args.output, &encode)
        .with_context(|| format!("cannot create {}", args.output.display()))?;
    let sink = MuxSink::new(
        muxer,
        SinkSettings::from_defaults(defaults, capture.audio.is_some()),
        Arc::new(SessionClock::new()),
    )?;

    eprintln!("Recording: {}", capture.surface.label());
    eprintln!("  Output: {}", args.output.display());
    eprintln!(
        "  {}x{} @ {} fps, audio: {}",
        capture.width,
        capture.height,
        capture.fps,
        if capture.audio.is_some() { "on" } else { "off" }
    );
    eprintln!("Press Ctrl+C to stop recording...");

    let mut controller = LifecycleController::new(
        backend,
        defaults.start_timeout(),
        defaults.finalize_timeout(),
    );
    let report = controller.run(capture, sink, shutdown.wait()).await?;
    tracing::info!(
        path = %report.path.display(),
        duration_secs = report.duration_secs,
        elapsed_secs = report.elapsed_secs,
        video_dropped = report.mux.stats.video.dropped,
        "Recording complete"
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Recording saved to: {}", report.path.display());
        println!("  Duration: {:.2}s", report.duration_secs);
        if let Some(size) = report.file_size {
            println!("  Size: {:.1} MiB", size as f64 / (1024.0 * 1024.0));
        }
        let video = &report.mux.stats.video;
        if video.dropped > 0 {
            println!("  Dropped video frames: {}", video.dropped);
        }
    }
    Ok(ExitCode::SUCCESS)
}
