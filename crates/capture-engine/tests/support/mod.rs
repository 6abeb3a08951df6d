//! Fakes for driving sessions without a display server or GStreamer.
#![allow(dead_code)]

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use framecast_capture_engine::{
    AudioBlock, CaptureBackend, CaptureConfig, CaptureStream, MediaKind, Muxer, Sample,
    SampleConsumer, StreamStats, TrackInput, VideoFrame,
};
use framecast_common::error::{FramecastError, FramecastResult};
use framecast_platform_core::{DisplayInfo, Rect, Surface, SurfacePreview};

pub const ARTIFACT_HEADER: &str = "FRAMECAST-TEST";

/// Three recordable windows plus entries the default filter removes.
pub fn sample_windows() -> Vec<Surface> {
    vec![
        Surface::window(0x100, "Dock", "Dock", Rect::new(0, 0, 1920, 80)),
        Surface::window(0x200, "firefox", "Inbox - Mozilla Firefox", Rect::new(0, 0, 1280, 800)),
        Surface::window(0x300, "Code", "main.rs - framecast", Rect::new(100, 100, 1440, 900)),
        Surface::window(0x400, "tray", "tiny", Rect::new(0, 0, 40, 40)),
        Surface::window(0x500, "Gnome-terminal", "zsh", Rect::new(50, 50, 900, 600)),
        Surface::window(0x600, "app", "", Rect::new(0, 0, 800, 600)),
    ]
}

pub fn sample_displays() -> Vec<DisplayInfo> {
    vec![
        DisplayInfo {
            id: 1,
            name: "HDMI-1".to_string(),
            bounds: Rect::new(1920, 0, 2560, 1440),
            primary: false,
        },
        DisplayInfo {
            id: 0,
            name: "eDP-1".to_string(),
            bounds: Rect::new(0, 0, 1920, 1080),
            primary: true,
        },
    ]
}

struct OpenStream {
    kind: MediaKind,
    consumer: SampleConsumer,
    running: Arc<AtomicBool>,
    delivered: Arc<AtomicU64>,
}

/// In-memory platform. Tests play the delivery context by calling
/// [`FakeBackend::deliver`].
pub struct FakeBackend {
    windows: Vec<Surface>,
    displays: Vec<DisplayInfo>,
    fail_kind: Option<MediaKind>,
    audio_open_delay: Duration,
    streams: Mutex<Vec<OpenStream>>,
    stops: Arc<AtomicUsize>,
}

impl FakeBackend {
    pub fn new(windows: Vec<Surface>, displays: Vec<DisplayInfo>) -> Self {
        Self {
            windows,
            displays,
            fail_kind: None,
            audio_open_delay: Duration::ZERO,
            streams: Mutex::new(Vec::new()),
            stops: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn standard() -> Self {
        Self::new(sample_windows(), sample_displays())
    }

    /// Opening a stream of `kind` fails.
    pub fn failing(mut self, kind: MediaKind) -> Self {
        self.fail_kind = Some(kind);
        self
    }

    /// Opening the audio stream takes `delay`, after video is already up.
    pub fn slow_audio_open(mut self, delay: Duration) -> Self {
        self.audio_open_delay = delay;
        self
    }

    pub fn opened(&self) -> Vec<MediaKind> {
        self.streams.lock().unwrap().iter().map(|s| s.kind).collect()
    }

    pub fn running_streams(&self) -> usize {
        self.streams
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.running.load(Ordering::SeqCst))
            .count()
    }

    pub fn stop_calls(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Hand `sample` to every running stream of its kind. Returns whether
    /// any stream was running.
    pub fn deliver(&self, sample: Sample) -> bool {
        let targets: Vec<SampleConsumer> = self
            .streams
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.kind == sample.kind() && s.running.load(Ordering::SeqCst))
            .map(|s| {
                s.delivered.fetch_add(1, Ordering::Relaxed);
                s.consumer.clone()
            })
            .collect();
        let any = !targets.is_empty();
        for consumer in targets {
            consumer(sample.clone());
        }
        any
    }

    /// Wait until `n` streams are running.
    pub async fn wait_for_streams(&self, n: usize) {
        for _ in 0..500 {
            if self.running_streams() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("streams never started");
    }

    /// Blocking variant for plain threads.
    pub fn wait_for_streams_blocking(&self, n: usize) {
        for _ in 0..500 {
            if self.running_streams() >= n {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("streams never started");
    }
}

struct FakeStream {
    kind: MediaKind,
    running: Arc<AtomicBool>,
    delivered: Arc<AtomicU64>,
    stops: Arc<AtomicUsize>,
}

impl CaptureStream for FakeStream {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn stop(&mut self) -> FramecastResult<()> {
        self.running.store(false, Ordering::SeqCst);
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn stats(&self) -> StreamStats {
        StreamStats {
            samples_delivered: self.delivered.load(Ordering::Relaxed),
            last_pts_ns: None,
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn list_windows(&self) -> FramecastResult<Vec<Surface>> {
        Ok(self.windows.clone())
    }

    fn list_displays(&self) -> FramecastResult<Vec<DisplayInfo>> {
        Ok(self.displays.clone())
    }

    fn capture_preview(
        &self,
        surface: &Surface,
        width: u32,
        height: u32,
    ) -> FramecastResult<SurfacePreview> {
        if surface.id % 0x200 == 0 {
            return Err(FramecastError::capture("window is minimized"));
        }
        Ok(SurfacePreview {
            width,
            height,
            rgb: vec![200; (width * height * 3) as usize],
        })
    }

    async fn open_stream(
        &self,
        kind: MediaKind,
        _config: &CaptureConfig,
        consumer: SampleConsumer,
        _start_timeout: Duration,
    ) -> FramecastResult<Box<dyn CaptureStream>> {
        if kind == MediaKind::Audio && !self.audio_open_delay.is_zero() {
            tokio::time::sleep(self.audio_open_delay).await;
        }
        if self.fail_kind == Some(kind) {
            return Err(FramecastError::capture_start(format!("{kind} source unavailable")));
        }
        let running = Arc::new(AtomicBool::new(true));
        let delivered = Arc::new(AtomicU64::new(0));
        self.streams.lock().unwrap().push(OpenStream {
            kind,
            consumer,
            running: running.clone(),
            delivered: delivered.clone(),
        });
        Ok(Box::new(FakeStream {
            kind,
            running,
            delivered,
            stops: self.stops.clone(),
        }))
    }
}

/// Closed gate blocks every video append until opened.
#[derive(Default)]
pub struct Gate {
    open: Mutex<bool>,
    changed: Condvar,
}

impl Gate {
    pub fn closed() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn opened() -> Arc<Self> {
        let gate = Self::default();
        *gate.open.lock().unwrap() = true;
        Arc::new(gate)
    }

    pub fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.changed.notify_all();
    }

    fn pass(&self) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.changed.wait(open).unwrap();
        }
    }
}

/// Writes a line-oriented artifact: a header on creation, one line per
/// appended sample, and a trailer on finish. A file without the trailer
/// models a container that was never finalized.
pub struct FileMuxer {
    path: PathBuf,
    file: Arc<Mutex<File>>,
    last_pts: Arc<AtomicU64>,
    tracks: Vec<MediaKind>,
    video_gate: Arc<Gate>,
}

impl FileMuxer {
    pub fn create(path: &Path, audio: bool) -> Self {
        Self::with_gate(path, audio, Gate::opened())
    }

    pub fn with_gate(path: &Path, audio: bool, video_gate: Arc<Gate>) -> Self {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .unwrap();
        writeln!(file, "{ARTIFACT_HEADER}").unwrap();
        let mut tracks = vec![MediaKind::Video];
        if audio {
            tracks.push(MediaKind::Audio);
        }
        Self {
            path: path.to_path_buf(),
            file: Arc::new(Mutex::new(file)),
            last_pts: Arc::new(AtomicU64::new(0)),
            tracks,
            video_gate,
        }
    }
}

struct FileTrack {
    kind: MediaKind,
    file: Arc<Mutex<File>>,
    last_pts: Arc<AtomicU64>,
    gate: Option<Arc<Gate>>,
}

impl TrackInput for FileTrack {
    fn append(&mut self, pts_ns: u64, _sample: Sample) -> FramecastResult<()> {
        if let Some(gate) = &self.gate {
            gate.pass();
        }
        writeln!(self.file.lock().unwrap(), "{} {pts_ns}", self.kind)?;
        self.last_pts.fetch_max(pts_ns, Ordering::SeqCst);
        Ok(())
    }

    fn mark_finished(&mut self) -> FramecastResult<()> {
        writeln!(self.file.lock().unwrap(), "eos {}", self.kind)?;
        Ok(())
    }
}

impl Muxer for FileMuxer {
    fn path(&self) -> &Path {
        &self.path
    }

    fn take_track(&mut self, kind: MediaKind) -> Option<Box<dyn TrackInput>> {
        let pos = self.tracks.iter().position(|k| *k == kind)?;
        self.tracks.remove(pos);
        Some(Box::new(FileTrack {
            kind,
            file: self.file.clone(),
            last_pts: self.last_pts.clone(),
            gate: (kind == MediaKind::Video).then(|| self.video_gate.clone()),
        }))
    }

    fn finish(&mut self, _timeout: Duration) -> FramecastResult<()> {
        let mut file = self.file.lock().unwrap();
        writeln!(file, "end duration_ns={}", self.last_pts.load(Ordering::SeqCst))?;
        file.flush()?;
        Ok(())
    }
}

/// Parsed test artifact.
#[derive(Debug, Default)]
pub struct Artifact {
    pub video: Vec<u64>,
    pub audio: Vec<u64>,
    pub eos: Vec<String>,
    pub trailers: usize,
    pub duration_ns: Option<u64>,
}

impl Artifact {
    pub fn read(path: &Path) -> Self {
        let text = std::fs::read_to_string(path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(ARTIFACT_HEADER));

        let mut artifact = Artifact::default();
        for line in lines {
            let (tag, value) = line.split_once(' ').unwrap();
            match tag {
                "video" => artifact.video.push(value.parse().unwrap()),
                "audio" => artifact.audio.push(value.parse().unwrap()),
                "eos" => artifact.eos.push(value.to_string()),
                "end" => {
                    artifact.trailers += 1;
                    let ns = value.trim_start_matches("duration_ns=");
                    artifact.duration_ns = Some(ns.parse().unwrap());
                }
                other => panic!("unexpected line tag {other}"),
            }
        }
        artifact
    }

    pub fn is_finalized(&self) -> bool {
        self.trailers == 1
    }
}

/// Unique artifact path under the system temp dir.
pub fn temp_artifact(name: &str) -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!(
        "framecast-{name}-{}-{n}.rec",
        std::process::id()
    ))
}

pub const BASE_NS: u64 = 7_000_000_000;
pub const FRAME_NS: u64 = 33_333_333;
pub const BLOCK_NS: u64 = 20_000_000;

pub fn video_frame(i: u64) -> Sample {
    Sample::Video(VideoFrame {
        pts_ns: BASE_NS + i * FRAME_NS,
        width: 4,
        height: 2,
        data: vec![0; 32],
    })
}

pub fn audio_block(i: u64) -> Sample {
    Sample::Audio(AudioBlock {
        pts_ns: BASE_NS + i * BLOCK_NS,
        sample_rate: 48000,
        channels: 2,
        samples: vec![0.0; 960 * 2],
    })
}
