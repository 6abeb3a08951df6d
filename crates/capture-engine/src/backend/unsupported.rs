//! Backend for platforms without a capture implementation.

use std::time::Duration;

use framecast_common::error::{FramecastError, FramecastResult};
use framecast_platform_core::{DisplayInfo, Surface, SurfacePreview};

use super::{CaptureBackend, CaptureStream, SampleConsumer};
use crate::sample::MediaKind;
use crate::session::CaptureConfig;

/// Answers every request with `Unsupported`.
pub struct UnsupportedBackend {
    platform: &'static str,
}

impl UnsupportedBackend {
    pub fn new(platform: &'static str) -> Self {
        Self { platform }
    }

    fn error(&self, what: &str) -> FramecastError {
        FramecastError::unsupported(format!("{what} is not implemented on {}", self.platform))
    }
}

#[async_trait::async_trait]
impl CaptureBackend for UnsupportedBackend {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    fn list_windows(&self) -> FramecastResult<Vec<Surface>> {
        Err(self.error("Window enumeration"))
    }

    fn list_displays(&self) -> FramecastResult<Vec<DisplayInfo>> {
        Err(self.error("Display enumeration"))
    }

    fn capture_preview(
        &self,
        _surface: &Surface,
        _width: u32,
        _height: u32,
    ) -> FramecastResult<SurfacePreview> {
        Err(self.error("Preview capture"))
    }

    async fn open_stream(
        &self,
        kind: MediaKind,
        _config: &CaptureConfig,
        _consumer: SampleConsumer,
        _start_timeout: Duration,
    ) -> FramecastResult<Box<dyn CaptureStream>> {
        Err(self.error(&format!("{kind} capture")))
    }
}
