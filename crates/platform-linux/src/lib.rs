//! Framecast Linux Platform Integration
//!
//! Platform-specific implementations for Linux:
//! - **Display Detection:** display-server detection and monitor enumeration (`xrandr`)
//! - **Window Enumeration:** top-level X11 windows with owner class and geometry (`wmctrl`)
//! - **Permissions:** capability detection and user guidance

pub mod display;
pub mod permissions;
pub mod windows;

pub use display::*;
pub use windows::*;
