//! Recording session management.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use framecast_common::config::RecordingDefaults;
use framecast_common::error::{FramecastError, FramecastResult};
use framecast_platform_core::Surface;
use serde::Serialize;

use crate::backend::{CaptureBackend, CaptureStream, SampleConsumer};
use crate::sample::{MediaKind, PixelFormat, Sample};
use crate::sink::{MuxSink, MuxSummary, SinkStats};

/// Audio format requested from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u32,
}

/// Everything the platform needs to open streams for one surface.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub surface: Surface,
    pub pixel_format: PixelFormat,

    /// Output frame width (even).
    pub width: u32,

    /// Output frame height (even).
    pub height: u32,

    pub fps: u32,
    pub show_cursor: bool,

    /// System audio capture; `None` records video only.
    pub audio: Option<AudioFormat>,
}

impl CaptureConfig {
    /// Derive the configuration for `surface` from recording defaults.
    ///
    /// Frame size is the surface size times the HiDPI scale, rounded up to
    /// even dimensions for the H.264 encoder.
    pub fn for_surface(surface: Surface, defaults: &RecordingDefaults) -> FramecastResult<Self> {
        let bounds = surface.bounds();
        if bounds.width == 0 || bounds.height == 0 {
            return Err(FramecastError::capture_start(format!(
                "Surface {} has no area ({}x{})",
                surface.id, bounds.width, bounds.height
            )));
        }
        if defaults.fps == 0 {
            return Err(FramecastError::config("fps must be greater than zero"));
        }
        if defaults.hidpi_scale.is_nan() || defaults.hidpi_scale <= 0.0 {
            return Err(FramecastError::config("hidpi_scale must be positive"));
        }

        let audio = defaults.capture_audio.then_some(AudioFormat {
            sample_rate: defaults.audio_sample_rate,
            channels: defaults.audio_channels,
        });

        Ok(Self {
            width: scaled_even(bounds.width, defaults.hidpi_scale),
            height: scaled_even(bounds.height, defaults.hidpi_scale),
            surface,
            pixel_format: PixelFormat::Bgrx,
            fps: defaults.fps,
            show_cursor: defaults.show_cursor,
            audio,
        })
    }

    /// Media kinds this configuration records, video first.
    pub fn media_kinds(&self) -> Vec<MediaKind> {
        let mut kinds = vec![MediaKind::Video];
        if self.audio.is_some() {
            kinds.push(MediaKind::Audio);
        }
        kinds
    }
}

fn scaled_even(len: u32, scale: f64) -> u32 {
    let scaled = (f64::from(len) * scale).round().max(2.0) as u32;
    scaled + scaled % 2
}

/// State of a recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Session created but not started.
    Idle,
    /// Streams are delivering into the sink.
    Capturing,
    /// Stop requested; no new samples are accepted.
    Stopping,
    /// The sink has been finalized.
    Finalized,
}

/// Session state shared with delivery contexts.
///
/// Forwarding a sample holds the read lock for the duration of the state
/// check plus the (non-blocking) submit, and transitions take the write
/// lock. Every sample is therefore either fully accepted before a stop
/// takes effect or rejected after it.
#[derive(Debug)]
pub struct SessionStateCell {
    state: RwLock<SessionState>,
}

impl SessionStateCell {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(SessionState::Idle),
        }
    }

    pub fn get(&self) -> SessionState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set(&self, next: SessionState) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        tracing::debug!(from = ?*state, to = ?next, "Session state change");
        *state = next;
    }

    /// Run `f` only while capturing.
    pub fn while_capturing<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        (*state == SessionState::Capturing).then(f)
    }
}

impl Default for SessionStateCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of a completed recording.
#[derive(Debug, Clone, Serialize)]
pub struct RecordingReport {
    pub path: PathBuf,
    pub surface: String,
    /// Media duration on the session time base.
    pub duration_secs: f64,
    /// Wall time between start and stop.
    pub elapsed_secs: f64,
    /// Output file size in bytes, if readable.
    pub file_size: Option<u64>,
    pub started_at: String,
    pub finished_at: String,
    pub mux: MuxSummary,
}

/// A recording session that coordinates the capture streams and the sink.
pub struct CaptureSession {
    backend: Arc<dyn CaptureBackend>,
    state: Arc<SessionStateCell>,
    start_timeout: Duration,
    streams: Vec<Box<dyn CaptureStream>>,
    sink: Option<Arc<MuxSink>>,
    surface_label: String,
    artifact: Option<PathBuf>,
    started_at: Option<Instant>,
    started_wall: String,
    report: Option<RecordingReport>,
}

impl CaptureSession {
    pub fn new(backend: Arc<dyn CaptureBackend>, start_timeout: Duration) -> Self {
        Self {
            backend,
            state: Arc::new(SessionStateCell::new()),
            start_timeout,
            streams: Vec::new(),
            sink: None,
            surface_label: String::new(),
            artifact: None,
            started_at: None,
            started_wall: String::new(),
            report: None,
        }
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// Output path once started.
    pub fn artifact(&self) -> Option<&PathBuf> {
        self.artifact.as_ref()
    }

    /// Live sink counters while capturing.
    pub fn sink_stats(&self) -> Option<SinkStats> {
        self.sink.as_ref().map(|s| s.stats())
    }

    /// Open one stream per configured media kind, all feeding `sink`.
    ///
    /// On failure every opened stream is stopped, the sink is closed (its
    /// file removed if nothing was written), and the session returns to
    /// `Idle`.
    pub async fn start(&mut self, config: CaptureConfig, sink: MuxSink) -> FramecastResult<()> {
        if self.state.get() != SessionState::Idle {
            return Err(FramecastError::capture("Session already started"));
        }

        tracing::info!(
            surface = %config.surface.label(),
            id = config.surface.id,
            width = config.width,
            height = config.height,
            fps = config.fps,
            audio = config.audio.is_some(),
            backend = self.backend.name(),
            "Starting capture session"
        );

        let sink = Arc::new(sink);
        self.state.set(SessionState::Capturing);
        let consumer = forwarder(self.state.clone(), sink.clone());

        for kind in config.media_kinds() {
            let opened = self
                .backend
                .open_stream(kind, &config, consumer.clone(), self.start_timeout);
            let result = match tokio::time::timeout(self.start_timeout, opened).await {
                Ok(result) => result,
                Err(_) => Err(FramecastError::capture_start(format!(
                    "{kind} stream did not start within {}s",
                    self.start_timeout.as_secs()
                ))),
            };

            match result {
                Ok(stream) => {
                    tracing::info!(track = %kind, "Capture stream started");
                    self.streams.push(stream);
                }
                Err(e) => {
                    tracing::error!(track = %kind, error = %e, "Failed to open capture stream");
                    self.rollback(sink).await;
                    return Err(match e {
                        FramecastError::CaptureStart { .. } => e,
                        other => FramecastError::capture_start(other.to_string()),
                    });
                }
            }
        }

        self.artifact = Some(sink.path().to_path_buf());
        self.surface_label = config.surface.label();
        self.sink = Some(sink);
        self.started_at = Some(Instant::now());
        self.started_wall = chrono::Utc::now().to_rfc3339();
        Ok(())
    }

    async fn rollback(&mut self, sink: Arc<MuxSink>) {
        self.state.set(SessionState::Stopping);
        let streams = std::mem::take(&mut self.streams);
        let joined = tokio::task::spawn_blocking(move || {
            stop_streams(streams);
            if let Err(e) = sink.abort() {
                tracing::warn!(error = %e, "Failed to close sink after start failure");
            }
        })
        .await;
        if joined.is_err() {
            tracing::error!("Start rollback panicked");
        }
        self.state.set(SessionState::Idle);
    }

    /// Stop every stream, then finalize the sink exactly once.
    ///
    /// Calling `stop` again after it completed returns the same report.
    pub async fn stop(&mut self) -> FramecastResult<RecordingReport> {
        match self.state.get() {
            SessionState::Capturing => {}
            SessionState::Finalized => {
                return self.report.clone().ok_or_else(|| FramecastError::Finalize {
                    path: self.artifact.clone().unwrap_or_default(),
                    message: "Recording was not finalized cleanly".to_string(),
                });
            }
            SessionState::Idle => return Err(FramecastError::capture("Session not started")),
            SessionState::Stopping => {
                return Err(FramecastError::capture("Stop already in progress"))
            }
        }

        // Waits for in-flight forwards; afterwards nothing new is accepted.
        self.state.set(SessionState::Stopping);
        tracing::info!("Stopping capture session");

        let streams = std::mem::take(&mut self.streams);
        let sink = self
            .sink
            .take()
            .ok_or_else(|| FramecastError::capture("Session has no sink"))?;
        let path = sink.path().to_path_buf();

        let finalized = tokio::task::spawn_blocking(move || {
            stop_streams(streams);
            sink.finalize()
        })
        .await
        .map_err(|e| FramecastError::Finalize {
            path: path.clone(),
            message: format!("Finalize task failed: {e}"),
        });
        self.state.set(SessionState::Finalized);
        let summary = finalized??;

        let report = RecordingReport {
            file_size: std::fs::metadata(&summary.path).ok().map(|m| m.len()),
            path: summary.path.clone(),
            surface: self.surface_label.clone(),
            duration_secs: summary.duration_secs(),
            elapsed_secs: self
                .started_at
                .map(|t| t.elapsed().as_secs_f64())
                .unwrap_or(0.0),
            started_at: self.started_wall.clone(),
            finished_at: chrono::Utc::now().to_rfc3339(),
            mux: summary,
        };

        self.report = Some(report.clone());
        Ok(report)
    }
}

fn forwarder(state: Arc<SessionStateCell>, sink: Arc<MuxSink>) -> SampleConsumer {
    Arc::new(move |sample: Sample| {
        state.while_capturing(|| sink.submit(sample));
    })
}

fn stop_streams(streams: Vec<Box<dyn CaptureStream>>) {
    for mut stream in streams {
        let kind = stream.kind();
        let delivered = stream.stats().samples_delivered;
        match stream.stop() {
            Ok(()) => tracing::debug!(track = %kind, delivered, "Capture stream stopped"),
            Err(e) => tracing::warn!(track = %kind, error = %e, "Failed to stop capture stream"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framecast_platform_core::Rect;

    fn surface(w: u32, h: u32) -> Surface {
        Surface::window(7, "app", "Editor", Rect::new(0, 0, w, h))
    }

    #[test]
    fn frame_size_is_scaled_and_even() {
        let defaults = RecordingDefaults {
            hidpi_scale: 2.0,
            ..RecordingDefaults::default()
        };
        let config = CaptureConfig::for_surface(surface(801, 600), &defaults).unwrap();
        assert_eq!((config.width, config.height), (1602, 1200));

        let config = CaptureConfig::for_surface(surface(801, 601), &RecordingDefaults::default())
            .unwrap();
        assert_eq!((config.width, config.height), (802, 602));
    }

    #[test]
    fn audio_follows_defaults() {
        let defaults = RecordingDefaults {
            capture_audio: false,
            ..RecordingDefaults::default()
        };
        let config = CaptureConfig::for_surface(surface(800, 600), &defaults).unwrap();
        assert!(config.audio.is_none());
        assert_eq!(config.media_kinds(), vec![MediaKind::Video]);

        let config =
            CaptureConfig::for_surface(surface(800, 600), &RecordingDefaults::default()).unwrap();
        assert_eq!(
            config.audio,
            Some(AudioFormat {
                sample_rate: 48000,
                channels: 2
            })
        );
    }

    #[test]
    fn zero_area_surface_is_rejected() {
        let err = CaptureConfig::for_surface(surface(0, 600), &RecordingDefaults::default())
            .unwrap_err();
        assert!(matches!(err, FramecastError::CaptureStart { .. }));
    }

    #[test]
    fn state_cell_gates_forwarding() {
        let cell = SessionStateCell::new();
        assert_eq!(cell.while_capturing(|| 1), None);
        cell.set(SessionState::Capturing);
        assert_eq!(cell.while_capturing(|| 1), Some(1));
        cell.set(SessionState::Stopping);
        assert_eq!(cell.while_capturing(|| 1), None);
    }
}
