//! GStreamer pipelines: live capture streams, one-shot previews, and the
//! MP4 muxer behind the encoding sink.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use framecast_common::error::{FramecastError, FramecastResult};
use framecast_platform_core::SurfacePreview;
use gst::prelude::*;
use gstreamer as gst;
use gstreamer_app as gst_app;

use crate::backend::{CaptureStream, SampleConsumer, StreamStats};
use crate::sample::{AudioBlock, MediaKind, Sample, VideoFrame};
use crate::sink::{EncodeSettings, Muxer, TrackInput};

const PREVIEW_TIMEOUT: Duration = Duration::from_secs(3);

/// How raw buffers from an appsink are turned into samples.
#[derive(Debug, Clone, Copy)]
pub enum SampleShape {
    Video { width: u32, height: u32 },
    Audio { sample_rate: u32, channels: u32 },
}

impl SampleShape {
    fn kind(&self) -> MediaKind {
        match self {
            SampleShape::Video { .. } => MediaKind::Video,
            SampleShape::Audio { .. } => MediaKind::Audio,
        }
    }

    fn build(&self, pts_ns: u64, bytes: &[u8]) -> Sample {
        match *self {
            SampleShape::Video { width, height } => Sample::Video(VideoFrame {
                pts_ns,
                width,
                height,
                data: bytes.to_vec(),
            }),
            SampleShape::Audio {
                sample_rate,
                channels,
            } => Sample::Audio(AudioBlock {
                pts_ns,
                sample_rate,
                channels,
                samples: AudioBlock::samples_from_le_bytes(bytes),
            }),
        }
    }
}

/// A live capture pipeline ending in an appsink named `sink`.
///
/// Samples are handed to the consumer on GStreamer's streaming thread,
/// stamped as `base_time + pts` on the system monotonic clock so video and
/// audio pipelines share one clock domain.
pub struct GstCaptureStream {
    name: String,
    kind: MediaKind,
    pipeline: gst::Pipeline,
    running: Arc<AtomicBool>,
    delivered: Arc<AtomicU64>,
    last_pts_ns: Arc<AtomicU64>,
}

impl GstCaptureStream {
    pub fn from_launch(
        name: impl Into<String>,
        launch: &str,
        shape: SampleShape,
        consumer: SampleConsumer,
    ) -> FramecastResult<Self> {
        let name = name.into();
        let pipeline = parse_pipeline(launch).map_err(|e| {
            FramecastError::capture_start(format!("Failed to build {name} pipeline: {e}"))
        })?;
        pipeline.use_clock(Some(&gst::SystemClock::obtain()));
        let appsink = appsink_by_name(&pipeline, "sink")?;

        let running = Arc::new(AtomicBool::new(false));
        let delivered = Arc::new(AtomicU64::new(0));
        let last_pts_ns = Arc::new(AtomicU64::new(u64::MAX));

        let cb_delivered = delivered.clone();
        let cb_last_pts = last_pts_ns.clone();
        appsink.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_sample(move |sink| {
                    let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                    let Some(buffer) = sample.buffer() else {
                        return Ok(gst::FlowSuccess::Ok);
                    };
                    let Some(pts) = buffer.pts() else {
                        return Ok(gst::FlowSuccess::Ok);
                    };
                    let base = sink.base_time().map(|t| t.nseconds()).unwrap_or(0);
                    let pts_ns = base.saturating_add(pts.nseconds());

                    let produced = {
                        let map = buffer.map_readable().map_err(|_| gst::FlowError::Error)?;
                        shape.build(pts_ns, map.as_slice())
                    };
                    consumer(produced);

                    cb_delivered.fetch_add(1, Ordering::Relaxed);
                    cb_last_pts.store(pts_ns, Ordering::Relaxed);
                    Ok(gst::FlowSuccess::Ok)
                })
                .build(),
        );

        Ok(Self {
            name,
            kind: shape.kind(),
            pipeline,
            running,
            delivered,
            last_pts_ns,
        })
    }

    /// Bring the pipeline to Playing, waiting at most `timeout`.
    pub fn start(&mut self, timeout: Duration) -> FramecastResult<()> {
        self.pipeline.set_state(gst::State::Playing).map_err(|e| {
            FramecastError::capture_start(format!("Failed to start {} pipeline: {e:?}", self.name))
        })?;

        let wait = gst::ClockTime::from_nseconds(timeout.as_nanos() as u64);
        match self.pipeline.state(wait) {
            (Ok(_), gst::State::Playing, _) => {}
            (Ok(_), state, _) => {
                let _ = self.pipeline.set_state(gst::State::Null);
                return Err(FramecastError::capture_start(format!(
                    "{} pipeline stuck in {state:?} after {}s",
                    self.name,
                    timeout.as_secs()
                )));
            }
            (Err(_), _, _) => {
                let detail = pending_bus_error(&self.pipeline)
                    .unwrap_or_else(|| "state change failed".to_string());
                let _ = self.pipeline.set_state(gst::State::Null);
                return Err(FramecastError::capture_start(format!(
                    "{} pipeline failed to reach Playing state: {detail}",
                    self.name
                )));
            }
        }

        self.running.store(true, Ordering::SeqCst);
        tracing::debug!(pipeline = %self.name, "Capture stream playing");
        Ok(())
    }
}

impl CaptureStream for GstCaptureStream {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn stop(&mut self) -> FramecastResult<()> {
        // Null joins the streaming thread, so no callback runs after this.
        self.pipeline.set_state(gst::State::Null).map_err(|e| {
            FramecastError::capture(format!("Failed to stop {} pipeline: {e:?}", self.name))
        })?;
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn stats(&self) -> StreamStats {
        let last = self.last_pts_ns.load(Ordering::Relaxed);
        StreamStats {
            samples_delivered: self.delivered.load(Ordering::Relaxed),
            last_pts_ns: (last != u64::MAX).then_some(last),
        }
    }
}

impl Drop for GstCaptureStream {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

/// Grab a single RGB frame from `source` scaled to `width`x`height`.
///
/// `source` is a source element with its properties, e.g. `ximagesrc xid=…`.
pub fn capture_preview(source: &str, width: u32, height: u32) -> FramecastResult<SurfacePreview> {
    let launch = format!(
        "{source} num-buffers=1 ! videoconvert ! videoscale ! video/x-raw,format=RGB,width={width},height={height},pixel-aspect-ratio=1/1 ! appsink name=sink sync=false"
    );
    let pipeline = parse_pipeline(&launch)
        .map_err(|e| FramecastError::capture(format!("Failed to build preview pipeline: {e}")))?;
    let appsink = appsink_by_name(&pipeline, "sink")?;

    pipeline
        .set_state(gst::State::Playing)
        .map_err(|e| FramecastError::capture(format!("Failed to start preview: {e:?}")))?;
    let sample = appsink.try_pull_sample(gst::ClockTime::from_nseconds(
        PREVIEW_TIMEOUT.as_nanos() as u64,
    ));
    let _ = pipeline.set_state(gst::State::Null);

    let sample = sample.ok_or_else(|| FramecastError::capture("Preview capture timed out"))?;
    let buffer = sample
        .buffer()
        .ok_or_else(|| FramecastError::capture("Preview sample has no buffer"))?;
    let map = buffer
        .map_readable()
        .map_err(|e| FramecastError::capture(format!("Failed to map preview buffer: {e}")))?;

    let rgb = pack_rows(map.as_slice(), width, height, 3)?;
    Ok(SurfacePreview { width, height, rgb })
}

/// Strip per-row padding from a strided frame.
fn pack_rows(data: &[u8], width: u32, height: u32, bpp: usize) -> FramecastResult<Vec<u8>> {
    let rows = height as usize;
    let row_bytes = width as usize * bpp;
    if rows == 0 {
        return Ok(Vec::new());
    }
    let stride = data.len() / rows;
    if stride < row_bytes {
        return Err(FramecastError::capture(format!(
            "Frame buffer too small: {} bytes for {width}x{height}",
            data.len()
        )));
    }
    let mut packed = Vec::with_capacity(row_bytes * rows);
    for row in data.chunks(stride).take(rows) {
        packed.extend_from_slice(&row[..row_bytes]);
    }
    Ok(packed)
}

/// H.264/AAC in MP4, fed through named appsrc elements.
pub struct GstMuxer {
    path: PathBuf,
    pipeline: gst::Pipeline,
    video: Option<gst_app::AppSrc>,
    audio: Option<gst_app::AppSrc>,
    frame_size: (u32, u32),
}

impl GstMuxer {
    /// Create the output container and start the encoder pipeline.
    pub fn create(path: &Path, settings: &EncodeSettings) -> FramecastResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let launch = mux_launch(path, settings);
        tracing::debug!(%launch, "Building muxer pipeline");
        let pipeline = parse_pipeline(&launch)
            .map_err(|e| FramecastError::encode(format!("Failed to build muxer: {e}")))?;

        let video = appsrc_by_name(&pipeline, "video")?;
        let audio = match settings.audio {
            Some(_) => Some(appsrc_by_name(&pipeline, "audio")?),
            None => None,
        };

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| FramecastError::encode(format!("Failed to start muxer: {e:?}")))?;

        Ok(Self {
            path: path.to_path_buf(),
            pipeline,
            video: Some(video),
            audio,
            frame_size: (settings.width, settings.height),
        })
    }
}

impl Muxer for GstMuxer {
    fn path(&self) -> &Path {
        &self.path
    }

    fn take_track(&mut self, kind: MediaKind) -> Option<Box<dyn TrackInput>> {
        let src = match kind {
            MediaKind::Video => self.video.take()?,
            MediaKind::Audio => self.audio.take()?,
        };
        Some(Box::new(GstTrackInput {
            kind,
            src,
            frame_size: self.frame_size,
            ended: false,
        }))
    }

    fn finish(&mut self, timeout: Duration) -> FramecastResult<()> {
        // Tracks that were never handed out still need EOS for mp4mux to finish.
        for src in self.video.take().into_iter().chain(self.audio.take()) {
            let _ = src.end_of_stream();
        }

        let outcome = wait_for_eos(&self.pipeline, &self.path, timeout);
        self.pipeline.set_state(gst::State::Null).map_err(|e| FramecastError::Finalize {
            path: self.path.clone(),
            message: format!("Failed to shut down muxer: {e:?}"),
        })?;
        outcome
    }
}

impl Drop for GstMuxer {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

/// Drain the bus until EOS, an error, or the deadline.
fn wait_for_eos(pipeline: &gst::Pipeline, path: &Path, timeout: Duration) -> FramecastResult<()> {
    let Some(bus) = pipeline.bus() else {
        return Err(FramecastError::Finalize {
            path: path.to_path_buf(),
            message: "Muxer pipeline has no bus".to_string(),
        });
    };

    let start = Instant::now();
    loop {
        let elapsed = start.elapsed();
        if elapsed >= timeout {
            break;
        }
        let remaining = gst::ClockTime::from_nseconds((timeout - elapsed).as_nanos() as u64);
        match bus.timed_pop(remaining) {
            Some(msg) => match msg.view() {
                gst::MessageView::Eos(_) => {
                    tracing::debug!(path = %path.display(), "EOS received; container finalized");
                    return Ok(());
                }
                gst::MessageView::Error(e) => {
                    return Err(FramecastError::Finalize {
                        path: path.to_path_buf(),
                        message: e.error().to_string(),
                    });
                }
                _ => {}
            },
            None => break,
        }
    }

    tracing::warn!(path = %path.display(), timeout_secs = timeout.as_secs(), "EOS drain timed out");
    Err(FramecastError::FinalizeTimeout {
        path: path.to_path_buf(),
        timeout,
    })
}

struct GstTrackInput {
    kind: MediaKind,
    src: gst_app::AppSrc,
    frame_size: (u32, u32),
    ended: bool,
}

impl TrackInput for GstTrackInput {
    fn append(&mut self, pts_ns: u64, sample: Sample) -> FramecastResult<()> {
        let (bytes, duration_ns) = match sample {
            Sample::Video(frame) => {
                if (frame.width, frame.height) != self.frame_size {
                    return Err(FramecastError::encode(format!(
                        "Frame size {}x{} does not match track size {}x{}",
                        frame.width, frame.height, self.frame_size.0, self.frame_size.1
                    )));
                }
                (frame.data, None)
            }
            Sample::Audio(block) => {
                let duration = block.duration_ns();
                (block.to_le_bytes(), Some(duration))
            }
        };

        let mut buffer = gst::Buffer::from_mut_slice(bytes);
        if let Some(buf) = buffer.get_mut() {
            buf.set_pts(gst::ClockTime::from_nseconds(pts_ns));
            if let Some(duration) = duration_ns {
                buf.set_duration(gst::ClockTime::from_nseconds(duration));
            }
        }

        self.src
            .push_buffer(buffer)
            .map_err(|e| FramecastError::encode(format!("{} track rejected buffer: {e:?}", self.kind)))?;
        Ok(())
    }

    fn mark_finished(&mut self) -> FramecastResult<()> {
        if self.ended {
            return Ok(());
        }
        self.ended = true;
        self.src
            .end_of_stream()
            .map_err(|e| FramecastError::encode(format!("{} track EOS failed: {e:?}", self.kind)))?;
        Ok(())
    }
}

/// Launch string for the encoder pipeline.
///
/// Each track's appsrc blocks once a few buffers are queued so a slow
/// encoder pushes back on its writer thread rather than growing memory.
pub fn mux_launch(path: &Path, settings: &EncodeSettings) -> String {
    let location = escape_path(path);
    let (width, height, fps) = (settings.width, settings.height, settings.fps.max(1));
    let frame_bytes = u64::from(width) * u64::from(height) * 4;
    let kbps = (settings.video_bitrate / 1000).max(1);
    let keyint = settings.keyframe_interval.max(1);

    let mut launch = format!(
        "mp4mux name=mux ! filesink location=\"{location}\" \
         appsrc name=video format=time is-live=true block=true max-bytes={max_bytes} \
         caps=\"video/x-raw,format=BGRx,width={width},height={height},framerate={fps}/1\" \
         ! queue ! videoconvert ! video/x-raw,format=I420 \
         ! x264enc tune=zerolatency speed-preset=veryfast bitrate={kbps} key-int-max={keyint} \
         ! h264parse ! queue ! mux.",
        max_bytes = frame_bytes * 3,
    );

    if let Some(audio) = &settings.audio {
        launch.push_str(&format!(
            " appsrc name=audio format=time is-live=true block=true \
             caps=\"audio/x-raw,format=F32LE,layout=interleaved,rate={rate},channels={channels}\" \
             ! queue ! audioconvert ! audioresample ! avenc_aac bitrate={bitrate} \
             ! aacparse ! queue ! mux.",
            rate = audio.sample_rate,
            channels = audio.channels,
            bitrate = audio.bitrate,
        ));
    }

    launch
}

fn parse_pipeline(launch: &str) -> FramecastResult<gst::Pipeline> {
    init_gstreamer()?;

    let element = gst::parse::launch(launch)
        .map_err(|e| FramecastError::capture(format!("Failed to parse pipeline: {e}")))?;

    element
        .dynamic_cast::<gst::Pipeline>()
        .map_err(|_| FramecastError::capture("Launch string did not produce a pipeline"))
}

fn appsink_by_name(pipeline: &gst::Pipeline, name: &str) -> FramecastResult<gst_app::AppSink> {
    pipeline
        .by_name(name)
        .and_then(|e| e.downcast::<gst_app::AppSink>().ok())
        .ok_or_else(|| FramecastError::capture(format!("Pipeline has no appsink named {name}")))
}

fn appsrc_by_name(pipeline: &gst::Pipeline, name: &str) -> FramecastResult<gst_app::AppSrc> {
    pipeline
        .by_name(name)
        .and_then(|e| e.downcast::<gst_app::AppSrc>().ok())
        .ok_or_else(|| FramecastError::encode(format!("Pipeline has no appsrc named {name}")))
}

/// First error message waiting on the bus, if any.
fn pending_bus_error(pipeline: &gst::Pipeline) -> Option<String> {
    let bus = pipeline.bus()?;
    while let Some(msg) = bus.pop() {
        if let gst::MessageView::Error(e) = msg.view() {
            return Some(e.error().to_string());
        }
    }
    None
}

fn init_gstreamer() -> FramecastResult<()> {
    static GST_INIT: OnceLock<Result<(), String>> = OnceLock::new();
    let init_res = GST_INIT.get_or_init(|| gst::init().map_err(|e| e.to_string()));
    match init_res {
        Ok(()) => Ok(()),
        Err(e) => Err(FramecastError::capture(format!(
            "Failed to initialize GStreamer: {e}"
        ))),
    }
}

fn escape_path(path: &Path) -> String {
    path.to_string_lossy().replace('"', "\\\"")
}
