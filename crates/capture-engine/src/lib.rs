//! Framecast Capture Engine
//!
//! Finds capturable surfaces, resolves a user's choice to one of them, and
//! records it (video plus optional system audio) into a single MP4 file.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                  LifecycleController                    │
//! │   signals / StopHandle ──► CaptureSession.stop()        │
//! │                                                         │
//! │  ┌──────────────┐          ┌──────────────┐             │
//! │  │ video stream │          │ audio stream │  (backend)  │
//! │  └──────┬───────┘          └──────┬───────┘             │
//! │         │ submit (never blocks)   │                     │
//! │         ▼                         ▼                     │
//! │  ┌──────────────────────────────────────────────────┐   │
//! │  │ MuxSink: bounded queue + writer thread per track │   │
//! │  └────────────────────────┬─────────────────────────┘   │
//! │                           ▼                             │
//! │                 Muxer (H.264 + AAC in MP4)              │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! The [`catalog`] and [`selector`] modules run before any stream is opened;
//! their errors never leave a file behind.

pub mod backend;
pub mod catalog;
pub mod lifecycle;
#[cfg(feature = "gst")]
pub mod pipeline;
pub mod sample;
pub mod selector;
pub mod session;
pub mod sink;
pub mod thumbnail;

pub use backend::{get_backend, CaptureBackend, CaptureStream, SampleConsumer, StreamStats};
pub use catalog::{FilterProfile, SurfaceCatalog};
pub use lifecycle::{LifecycleController, ShutdownSignal, StopHandle, StopOutcome};
pub use sample::{AudioBlock, MediaKind, PixelFormat, Sample, VideoFrame};
pub use selector::{ListSelector, SelectionToken, Selector, SelectorStrategy, ThumbnailSelector};
pub use session::*;
pub use sink::{
    create_mp4_muxer, EncodeSettings, MuxSink, MuxSummary, Muxer, SinkSettings, SinkStats,
    TrackInput,
};
