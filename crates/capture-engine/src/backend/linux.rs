use std::time::Duration;

use framecast_common::error::{FramecastError, FramecastResult};
use framecast_platform_core::{DisplayInfo, DisplayServer, Rect, Surface, SurfacePreview, SurfaceTarget};
use framecast_platform_linux::{detect_display_server, detect_displays, has_x_display, list_windows};

use crate::backend::{CaptureBackend, CaptureStream, SampleConsumer};
use crate::sample::MediaKind;
use crate::session::{AudioFormat, CaptureConfig};

/// X11 capture through `ximagesrc` and PulseAudio monitor capture.
///
/// Works on Xorg and on XWayland windows; native Wayland clients are not
/// visible to X11 enumeration.
pub struct X11Backend {
    display_server: DisplayServer,
}

impl X11Backend {
    pub fn new() -> Self {
        let display_server = detect_display_server();
        tracing::debug!(?display_server, "Detected display server on Linux backend");
        Self { display_server }
    }

    fn require_x_display(&self) -> FramecastResult<()> {
        if has_x_display() {
            return Ok(());
        }
        let hint = match self.display_server {
            DisplayServer::Wayland => "; native Wayland sessions need XWayland with DISPLAY set",
            _ => "",
        };
        Err(FramecastError::platform_query(format!(
            "No X display available (DISPLAY is unset){hint}"
        )))
    }
}

impl Default for X11Backend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CaptureBackend for X11Backend {
    fn name(&self) -> &'static str {
        "x11"
    }

    fn list_windows(&self) -> FramecastResult<Vec<Surface>> {
        self.require_x_display()?;
        list_windows()
    }

    fn list_displays(&self) -> FramecastResult<Vec<DisplayInfo>> {
        self.require_x_display()?;
        detect_displays()
    }

    fn capture_preview(
        &self,
        surface: &Surface,
        width: u32,
        height: u32,
    ) -> FramecastResult<SurfacePreview> {
        let source = ximagesrc_fragment(surface, false)?;
        #[cfg(feature = "gst")]
        {
            crate::pipeline::capture_preview(&source, width, height)
        }
        #[cfg(not(feature = "gst"))]
        {
            let _ = (source, width, height);
            Err(gst_disabled())
        }
    }

    async fn open_stream(
        &self,
        kind: MediaKind,
        config: &CaptureConfig,
        consumer: SampleConsumer,
        start_timeout: Duration,
    ) -> FramecastResult<Box<dyn CaptureStream>> {
        let launch = match kind {
            MediaKind::Video => video_capture_launch(config)?,
            MediaKind::Audio => {
                let audio = config.audio.ok_or_else(|| {
                    FramecastError::capture_start("Audio stream requested with audio disabled")
                })?;
                audio_capture_launch(audio)
            }
        };
        tracing::debug!(track = %kind, %launch, "Opening capture stream");

        #[cfg(feature = "gst")]
        {
            use crate::pipeline::{GstCaptureStream, SampleShape};

            let shape = match kind {
                MediaKind::Video => SampleShape::Video {
                    width: config.width,
                    height: config.height,
                },
                MediaKind::Audio => SampleShape::Audio {
                    sample_rate: config.audio.map_or(0, |a| a.sample_rate),
                    channels: config.audio.map_or(0, |a| a.channels),
                },
            };
            let name = format!("{kind}-x11");
            let stream = tokio::task::spawn_blocking(move || {
                let mut stream = GstCaptureStream::from_launch(name, &launch, shape, consumer)?;
                stream.start(start_timeout)?;
                Ok::<_, FramecastError>(stream)
            })
            .await
            .map_err(|e| FramecastError::capture_start(format!("{kind} stream setup failed: {e}")))??;
            Ok(Box::new(stream))
        }
        #[cfg(not(feature = "gst"))]
        {
            let _ = (launch, consumer, start_timeout);
            Err(gst_disabled())
        }
    }
}

#[cfg(not(feature = "gst"))]
fn gst_disabled() -> FramecastError {
    FramecastError::unsupported("Framecast was built without GStreamer support")
}

/// `ximagesrc` element for a window or a display region.
fn ximagesrc_fragment(surface: &Surface, show_cursor: bool) -> FramecastResult<String> {
    let base = format!("ximagesrc use-damage=false show-pointer={show_cursor}");
    match &surface.target {
        SurfaceTarget::Window { .. } => Ok(format!("{base} xid={}", surface.id)),
        SurfaceTarget::Display { bounds, .. } => {
            Ok(format!("{base}{}", x11_capture_region_fragment(*bounds)?))
        }
    }
}

fn x11_capture_region_fragment(region: Rect) -> FramecastResult<String> {
    let Rect {
        x,
        y,
        width,
        height,
    } = region;

    if width == 0 || height == 0 {
        return Err(FramecastError::capture_start(format!(
            "Invalid X11 capture region {width}x{height} at ({x},{y})"
        )));
    }

    let width_i32 = i32::try_from(width).map_err(|_| {
        FramecastError::capture_start(format!("X11 capture width too large: {width}"))
    })?;
    let height_i32 = i32::try_from(height).map_err(|_| {
        FramecastError::capture_start(format!("X11 capture height too large: {height}"))
    })?;

    let endx = x
        .checked_add(width_i32 - 1)
        .ok_or_else(|| FramecastError::capture_start("X11 capture region x-range overflow"))?;
    let endy = y
        .checked_add(height_i32 - 1)
        .ok_or_else(|| FramecastError::capture_start("X11 capture region y-range overflow"))?;

    Ok(format!(" startx={x} starty={y} endx={endx} endy={endy}"))
}

/// Live video capture ending in an appsink of fixed-size BGRx frames.
fn video_capture_launch(config: &CaptureConfig) -> FramecastResult<String> {
    let source = ximagesrc_fragment(&config.surface, config.show_cursor)?;
    Ok(format!(
        "{source} ! queue max-size-buffers=4 leaky=downstream ! videoconvert ! videoscale ! videorate \
         ! video/x-raw,format={format},width={w},height={h},pixel-aspect-ratio=1/1,framerate={fps}/1 \
         ! appsink name=sink max-buffers=4 drop=true sync=false",
        format = config.pixel_format.caps_name(),
        w = config.width,
        h = config.height,
        fps = config.fps,
    ))
}

/// System audio from the default PulseAudio/PipeWire monitor source.
fn audio_capture_launch(audio: AudioFormat) -> String {
    format!(
        "pulsesrc device=@DEFAULT_MONITOR@ ! audioconvert ! audioresample \
         ! audio/x-raw,format=F32LE,layout=interleaved,rate={rate},channels={channels} \
         ! appsink name=sink max-buffers=16 drop=true sync=false",
        rate = audio.sample_rate,
        channels = audio.channels,
    )
}
