//! Framecast Common Utilities
//!
//! Shared infrastructure for all Framecast crates:
//! - Error taxonomy and result alias
//! - Session clock anchoring video and audio to one time base
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
