//! Framecast platform core contracts.
//!
//! This crate contains the platform-neutral description of what can be
//! captured: windows and whole displays (`Surface`), the displays they live
//! on, and low-resolution preview stills. Capture and selection crates use
//! these types without coupling to a concrete OS backend.

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in physical pixels of the virtual desktop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether the rectangle covers at least `min_width` x `min_height`.
    pub fn is_at_least(&self, min_width: u32, min_height: u32) -> bool {
        self.width >= min_width && self.height >= min_height
    }
}

/// Information about a connected display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisplayInfo {
    /// Platform display identifier.
    pub id: u32,
    /// Output name (e.g. "eDP-1").
    pub name: String,
    /// Geometry in the virtual desktop.
    pub bounds: Rect,
    /// Whether this display is primary.
    pub primary: bool,
}

/// What a [`Surface`] refers to.
///
/// A window is captured through its own bounds; a display is captured as a
/// whole and carries no owning application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SurfaceTarget {
    Window { owner: String, bounds: Rect },
    Display { display_id: u32, bounds: Rect },
}

/// One capturable on-screen target.
///
/// Identifiers are unique only within one enumeration snapshot: windows
/// appear and disappear between calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Surface {
    pub id: u64,
    pub title: String,
    pub target: SurfaceTarget,
}

impl Surface {
    /// A window surface.
    pub fn window(id: u64, owner: impl Into<String>, title: impl Into<String>, bounds: Rect) -> Self {
        Self {
            id,
            title: title.into(),
            target: SurfaceTarget::Window {
                owner: owner.into(),
                bounds,
            },
        }
    }

    /// The whole-desktop surface for one display.
    pub fn desktop(display: &DisplayInfo) -> Self {
        Self {
            id: display.id as u64,
            title: format!("Desktop ({})", display.name),
            target: SurfaceTarget::Display {
                display_id: display.id,
                bounds: display.bounds,
            },
        }
    }

    /// Owning application name; `None` for whole-desktop surfaces.
    pub fn owner(&self) -> Option<&str> {
        match &self.target {
            SurfaceTarget::Window { owner, .. } => Some(owner),
            SurfaceTarget::Display { .. } => None,
        }
    }

    pub fn bounds(&self) -> Rect {
        match &self.target {
            SurfaceTarget::Window { bounds, .. } | SurfaceTarget::Display { bounds, .. } => *bounds,
        }
    }

    pub fn is_desktop(&self) -> bool {
        matches!(self.target, SurfaceTarget::Display { .. })
    }

    /// Human-readable label: `App - Title`, or the desktop caption.
    pub fn label(&self) -> String {
        match &self.target {
            SurfaceTarget::Window { owner, .. } => format!("{owner} - {}", self.title),
            SurfaceTarget::Display { .. } => "Desktop (Entire Screen)".to_string(),
        }
    }
}

/// A decoded low-resolution still of a surface (packed RGB, row-major).
#[derive(Debug, Clone, PartialEq)]
pub struct SurfacePreview {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

impl SurfacePreview {
    /// Pixel at `(x, y)`, or black when out of range or the buffer is short.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        if x >= self.width || y >= self.height {
            return [0, 0, 0];
        }
        let offset = (y as usize * self.width as usize + x as usize) * 3;
        match self.rgb.get(offset..offset + 3) {
            Some(px) => [px[0], px[1], px[2]],
            None => [0, 0, 0],
        }
    }
}

/// Display server / platform family used for capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DisplayServer {
    Wayland,
    X11,
    Windows,
    MacOS,
    #[default]
    Unknown,
}
