//! The encoding sink: per-track bounded queues in front of one container.
//!
//! Delivery contexts call [`MuxSink::submit`], which never blocks: a sample
//! goes into its track's bounded queue or is dropped and counted. One writer
//! thread per track drains the queue into the muxer, so each track input has
//! exactly one writer. [`MuxSink::finalize`] closes the queues, lets the
//! writers drain, marks every track finished, and closes the container. It
//! runs once; later calls return the stored summary.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use framecast_common::clock::{DriftMeasurement, SessionClock};
use framecast_common::config::RecordingDefaults;
use framecast_common::error::{FramecastError, FramecastResult};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::sample::{MediaKind, Sample};
use crate::session::CaptureConfig;

/// Start offsets beyond this are logged as a sync warning.
const DRIFT_WARN_MS: f64 = 100.0;

/// How often writer threads are polled while waiting for them to drain.
const JOIN_POLL: Duration = Duration::from_millis(10);

/// One input of a muxer. Appends arrive in non-decreasing time order from a
/// single writer.
pub trait TrackInput: Send {
    /// Append one sample at `pts_ns` on the session time base.
    fn append(&mut self, pts_ns: u64, sample: Sample) -> FramecastResult<()>;

    /// No more samples will follow.
    fn mark_finished(&mut self) -> FramecastResult<()>;
}

/// A container writer with one input per media kind.
pub trait Muxer: Send {
    /// Output file path.
    fn path(&self) -> &Path;

    /// Hand out the input for `kind`. Each input is handed out once.
    fn take_track(&mut self, kind: MediaKind) -> Option<Box<dyn TrackInput>>;

    /// Close the container after every track is finished, waiting at most
    /// `timeout`.
    fn finish(&mut self, timeout: Duration) -> FramecastResult<()>;
}

/// Fixed per-session encode parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Video bitrate in bits per second.
    pub video_bitrate: u32,
    /// Frames between keyframes.
    pub keyframe_interval: u32,
    pub audio: Option<AudioEncodeSettings>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioEncodeSettings {
    pub sample_rate: u32,
    pub channels: u32,
    /// AAC bitrate in bits per second.
    pub bitrate: u32,
}

impl EncodeSettings {
    pub fn from_config(config: &CaptureConfig, defaults: &RecordingDefaults) -> Self {
        Self {
            width: config.width,
            height: config.height,
            fps: config.fps,
            video_bitrate: defaults.video_bitrate_for(config.width, config.height),
            keyframe_interval: defaults.keyframe_interval,
            audio: config.audio.map(|audio| AudioEncodeSettings {
                sample_rate: audio.sample_rate,
                channels: audio.channels,
                bitrate: defaults.audio_bitrate,
            }),
        }
    }
}

/// The MP4 muxer this build ships with.
pub fn create_mp4_muxer(path: &Path, settings: &EncodeSettings) -> FramecastResult<Box<dyn Muxer>> {
    #[cfg(feature = "gst")]
    {
        Ok(Box::new(crate::pipeline::GstMuxer::create(path, settings)?))
    }
    #[cfg(not(feature = "gst"))]
    {
        let _ = (path, settings);
        Err(FramecastError::unsupported(
            "Framecast was built without GStreamer support",
        ))
    }
}

/// Queueing and shutdown parameters for a sink.
#[derive(Debug, Clone)]
pub struct SinkSettings {
    pub video_queue_depth: usize,
    pub audio_queue_depth: usize,
    /// Whether an audio track is expected.
    pub audio: bool,
    pub finalize_timeout: Duration,
}

impl SinkSettings {
    pub fn from_defaults(defaults: &RecordingDefaults, audio: bool) -> Self {
        Self {
            video_queue_depth: defaults.video_queue_depth,
            audio_queue_depth: defaults.audio_queue_depth,
            audio,
            finalize_timeout: defaults.finalize_timeout(),
        }
    }
}

/// Counters for one track.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrackStats {
    /// Samples queued for encoding.
    pub accepted: u64,
    /// Samples discarded because the queue was full or closed.
    pub dropped: u64,
    /// Samples the muxer took.
    pub written: u64,
    /// Samples the muxer rejected.
    pub write_errors: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SinkStats {
    pub video: TrackStats,
    pub audio: Option<TrackStats>,
}

impl SinkStats {
    /// Total samples accepted across tracks.
    pub fn total_accepted(&self) -> u64 {
        self.video.accepted + self.audio.as_ref().map_or(0, |a| a.accepted)
    }
}

/// What one track contributed to the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackSummary {
    #[serde(serialize_with = "serialize_kind")]
    pub kind: MediaKind,
    pub samples_written: u64,
    pub first_pts_ns: Option<u64>,
    pub last_pts_ns: Option<u64>,
}

/// Result of a completed finalize.
#[derive(Debug, Clone, Serialize)]
pub struct MuxSummary {
    pub path: PathBuf,
    /// Session time of the last sample written on any track.
    pub duration_ns: u64,
    /// Tracks that received at least one sample.
    pub tracks: Vec<TrackSummary>,
    pub stats: SinkStats,
}

impl MuxSummary {
    pub fn duration_secs(&self) -> f64 {
        SessionClock::ns_to_secs(self.duration_ns)
    }

    pub fn has_track(&self, kind: MediaKind) -> bool {
        self.tracks.iter().any(|t| t.kind == kind)
    }
}

fn serialize_kind<S: serde::Serializer>(kind: &MediaKind, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(kind)
}

#[derive(Debug, Default)]
struct TrackCounters {
    accepted: AtomicU64,
    dropped: AtomicU64,
    written: AtomicU64,
    write_errors: AtomicU64,
}

impl TrackCounters {
    fn snapshot(&self) -> TrackStats {
        TrackStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
        }
    }
}

struct Queued {
    pts_ns: u64,
    sample: Sample,
}

struct TrackSenders {
    video: mpsc::Sender<Queued>,
    audio: Option<mpsc::Sender<Queued>>,
}

impl TrackSenders {
    fn for_kind(&self, kind: MediaKind) -> Option<&mpsc::Sender<Queued>> {
        match kind {
            MediaKind::Video => Some(&self.video),
            MediaKind::Audio => self.audio.as_ref(),
        }
    }
}

struct Running {
    muxer: Box<dyn Muxer>,
    writers: Vec<JoinHandle<TrackSummary>>,
}

/// Accepts samples from any thread and writes them into one container.
pub struct MuxSink {
    path: PathBuf,
    clock: Arc<SessionClock>,
    finalize_timeout: Duration,
    senders: RwLock<Option<TrackSenders>>,
    video: Arc<TrackCounters>,
    audio: Option<Arc<TrackCounters>>,
    running: Mutex<Option<Running>>,
    summary: Mutex<Option<MuxSummary>>,
}

impl MuxSink {
    /// Wire a muxer's track inputs to bounded queues and start the writers.
    pub fn new(
        mut muxer: Box<dyn Muxer>,
        settings: SinkSettings,
        clock: Arc<SessionClock>,
    ) -> FramecastResult<Self> {
        let path = muxer.path().to_path_buf();

        let video_input = muxer
            .take_track(MediaKind::Video)
            .ok_or_else(|| FramecastError::encode("Muxer has no video track"))?;
        let audio_input = if settings.audio {
            Some(
                muxer
                    .take_track(MediaKind::Audio)
                    .ok_or_else(|| FramecastError::encode("Muxer has no audio track"))?,
            )
        } else {
            None
        };

        let video = Arc::new(TrackCounters::default());
        let (video_tx, video_rx) = mpsc::channel(settings.video_queue_depth.max(1));
        let mut writers = vec![spawn_writer(
            MediaKind::Video,
            video_rx,
            video_input,
            video.clone(),
        )?];

        let (audio, audio_tx) = match audio_input {
            Some(input) => {
                let counters = Arc::new(TrackCounters::default());
                let (tx, rx) = mpsc::channel(settings.audio_queue_depth.max(1));
                writers.push(spawn_writer(MediaKind::Audio, rx, input, counters.clone())?);
                (Some(counters), Some(tx))
            }
            None => (None, None),
        };

        tracing::info!(
            path = %path.display(),
            video_queue = settings.video_queue_depth,
            audio_queue = settings.audio.then_some(settings.audio_queue_depth),
            "Encoding sink ready"
        );

        Ok(Self {
            path,
            clock,
            finalize_timeout: settings.finalize_timeout,
            senders: RwLock::new(Some(TrackSenders {
                video: video_tx,
                audio: audio_tx,
            })),
            video,
            audio,
            running: Mutex::new(Some(Running { muxer, writers })),
            summary: Mutex::new(None),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Offer one sample. Never blocks on the encoder: returns `false` and
    /// counts a drop when the track's queue is full, closed, or absent.
    pub fn submit(&self, sample: Sample) -> bool {
        let kind = sample.kind();
        let Some(counters) = self.counters(kind) else {
            return false;
        };

        let guard = self.senders.read().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = guard.as_ref().and_then(|s| s.for_kind(kind)) else {
            counters.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        // The first sample always finds an empty queue, so the anchor is
        // set by an accepted sample.
        let pts_ns = self.clock.session_time_ns(sample.pts_ns());
        match tx.try_send(Queued { pts_ns, sample }) {
            Ok(()) => {
                let accepted = counters.accepted.fetch_add(1, Ordering::Relaxed) + 1;
                if kind == MediaKind::Video && accepted % 60 == 0 {
                    tracing::debug!(
                        accepted,
                        dropped = counters.dropped.load(Ordering::Relaxed),
                        "Video progress"
                    );
                }
                true
            }
            Err(_) => {
                counters.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Samples waiting in `kind`'s queue.
    pub fn backlog(&self, kind: MediaKind) -> usize {
        let guard = self.senders.read().unwrap_or_else(|e| e.into_inner());
        guard
            .as_ref()
            .and_then(|s| s.for_kind(kind))
            .map_or(0, |tx| tx.max_capacity() - tx.capacity())
    }

    pub fn stats(&self) -> SinkStats {
        SinkStats {
            video: self.video.snapshot(),
            audio: self.audio.as_ref().map(|a| a.snapshot()),
        }
    }

    /// Whether finalize has already run.
    pub fn is_finalized(&self) -> bool {
        lock(&self.running).is_none()
    }

    /// Drain queued samples, finish every track, and close the container.
    ///
    /// Runs once. Later calls return the stored summary, or an error if the
    /// first attempt failed.
    pub fn finalize(&self) -> FramecastResult<MuxSummary> {
        let mut running = lock(&self.running);
        let Some(Running { mut muxer, writers }) = running.take() else {
            return lock(&self.summary).clone().ok_or_else(|| FramecastError::Finalize {
                path: self.path.clone(),
                message: "An earlier finalize attempt failed".to_string(),
            });
        };

        let deadline = Instant::now() + self.finalize_timeout;
        tracing::info!(path = %self.path.display(), "Finalizing recording");

        // Dropping the senders lets each writer drain and exit.
        self.senders.write().unwrap_or_else(|e| e.into_inner()).take();

        let mut tracks = Vec::with_capacity(writers.len());
        for writer in writers {
            while !writer.is_finished() {
                if Instant::now() >= deadline {
                    tracing::error!(path = %self.path.display(), "Track writer did not drain in time");
                    return Err(FramecastError::FinalizeTimeout {
                        path: self.path.clone(),
                        timeout: self.finalize_timeout,
                    });
                }
                std::thread::sleep(JOIN_POLL);
            }
            match writer.join() {
                Ok(summary) => tracks.push(summary),
                Err(_) => tracing::error!("Track writer panicked"),
            }
        }

        log_start_drift(&tracks);

        let remaining = deadline.saturating_duration_since(Instant::now());
        muxer.finish(remaining)?;

        let duration_ns = tracks.iter().filter_map(|t| t.last_pts_ns).max().unwrap_or(0);
        tracks.retain(|t| t.samples_written > 0);
        let summary = MuxSummary {
            path: self.path.clone(),
            duration_ns,
            tracks,
            stats: self.stats(),
        };

        tracing::info!(
            path = %summary.path.display(),
            duration_secs = summary.duration_secs(),
            video_written = summary.stats.video.written,
            video_dropped = summary.stats.video.dropped,
            audio_written = summary.stats.audio.as_ref().map(|a| a.written),
            "Recording finalized"
        );

        *lock(&self.summary) = Some(summary.clone());
        Ok(summary)
    }

    /// Close the container after a failed start. The file is removed when
    /// no sample was ever accepted.
    pub fn abort(&self) -> FramecastResult<()> {
        let accepted = self.stats().total_accepted();
        let result = self.finalize().map(|_| ());
        if accepted == 0 {
            match std::fs::remove_file(&self.path) {
                Ok(()) => tracing::debug!(path = %self.path.display(), "Removed empty artifact"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove empty artifact"),
            }
            return Ok(());
        }
        result
    }

    fn counters(&self, kind: MediaKind) -> Option<&Arc<TrackCounters>> {
        match kind {
            MediaKind::Video => Some(&self.video),
            MediaKind::Audio => self.audio.as_ref(),
        }
    }
}

impl Drop for MuxSink {
    fn drop(&mut self) {
        if self.is_finalized() {
            return;
        }
        tracing::warn!(path = %self.path.display(), "Sink dropped without finalize; finalizing now");
        if let Err(e) = self.finalize() {
            tracing::error!(error = %e, "Finalize on drop failed");
        }
    }
}

fn spawn_writer(
    kind: MediaKind,
    mut rx: mpsc::Receiver<Queued>,
    mut input: Box<dyn TrackInput>,
    counters: Arc<TrackCounters>,
) -> FramecastResult<JoinHandle<TrackSummary>> {
    let handle = std::thread::Builder::new()
        .name(format!("framecast-{kind}-writer"))
        .spawn(move || {
            let mut summary = TrackSummary {
                kind,
                samples_written: 0,
                first_pts_ns: None,
                last_pts_ns: None,
            };
            while let Some(Queued { pts_ns, sample }) = rx.blocking_recv() {
                match input.append(pts_ns, sample) {
                    Ok(()) => {
                        summary.samples_written += 1;
                        summary.first_pts_ns.get_or_insert(pts_ns);
                        summary.last_pts_ns = Some(pts_ns);
                        counters.written.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        let errors = counters.write_errors.fetch_add(1, Ordering::Relaxed);
                        if errors == 0 {
                            tracing::warn!(track = %kind, error = %e, "Track rejected sample");
                        }
                    }
                }
            }
            if let Err(e) = input.mark_finished() {
                tracing::warn!(track = %kind, error = %e, "Failed to mark track finished");
            }
            tracing::debug!(track = %kind, written = summary.samples_written, "Track writer drained");
            summary
        })?;
    Ok(handle)
}

fn log_start_drift(tracks: &[TrackSummary]) {
    let first = |kind| {
        tracks
            .iter()
            .find(|t| t.kind == kind)
            .and_then(|t| t.first_pts_ns)
    };
    let (Some(video), Some(audio)) = (first(MediaKind::Video), first(MediaKind::Audio)) else {
        return;
    };
    let drift = DriftMeasurement {
        reference_ns: video,
        measured_ns: audio,
    };
    if drift.exceeds_threshold_ms(DRIFT_WARN_MS) {
        tracing::warn!(drift_ms = drift.drift_ms(), "Audio and video tracks start far apart");
    } else {
        tracing::debug!(drift_ms = drift.drift_ms(), "Track start offset");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
