use std::sync::Arc;
use std::time::Duration;

use framecast_common::error::FramecastResult;
use framecast_platform_core::{DisplayInfo, Surface, SurfacePreview};

use crate::sample::{MediaKind, Sample};
use crate::session::CaptureConfig;

/// Receives every sample a stream produces, on the stream's own delivery
/// context. Must return promptly.
pub type SampleConsumer = Arc<dyn Fn(Sample) + Send + Sync>;

/// Abstract interface for platform-specific capture capabilities.
#[async_trait::async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Enumerate top-level windows, unfiltered.
    fn list_windows(&self) -> FramecastResult<Vec<Surface>>;

    /// Enumerate connected displays.
    fn list_displays(&self) -> FramecastResult<Vec<DisplayInfo>>;

    /// Grab one still image of a surface scaled to `width`x`height`.
    fn capture_preview(
        &self,
        surface: &Surface,
        width: u32,
        height: u32,
    ) -> FramecastResult<SurfacePreview>;

    /// Open and start one media stream for the configured surface.
    ///
    /// `consumer` is invoked for every produced sample until the returned
    /// stream is stopped. Platform setup may take up to `start_timeout`.
    async fn open_stream(
        &self,
        kind: MediaKind,
        config: &CaptureConfig,
        consumer: SampleConsumer,
        start_timeout: Duration,
    ) -> FramecastResult<Box<dyn CaptureStream>>;
}

/// A running platform capture stream.
pub trait CaptureStream: Send {
    fn kind(&self) -> MediaKind;

    /// Stop producing samples. Once this returns the consumer is never
    /// invoked again by this stream.
    fn stop(&mut self) -> FramecastResult<()>;

    /// Check if the stream is currently producing.
    fn is_running(&self) -> bool;

    /// Get stream statistics.
    fn stats(&self) -> StreamStats;
}

/// Runtime statistics from a capture stream.
#[derive(Debug, Clone, Default)]
pub struct StreamStats {
    /// Samples handed to the consumer.
    pub samples_delivered: u64,

    /// Source timestamp of the most recent sample.
    pub last_pts_ns: Option<u64>,
}

#[cfg(target_os = "linux")]
pub mod linux;
pub mod unsupported;

#[cfg(target_os = "linux")]
pub use linux::X11Backend;
pub use unsupported::UnsupportedBackend;

/// Get the platform-specific backend.
pub fn get_backend() -> Arc<dyn CaptureBackend> {
    #[cfg(target_os = "linux")]
    {
        Arc::new(X11Backend::new())
    }
    #[cfg(not(target_os = "linux"))]
    {
        Arc::new(UnsupportedBackend::new(std::env::consts::OS))
    }
}
