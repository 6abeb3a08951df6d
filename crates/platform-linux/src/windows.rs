//! Top-level X11 window enumeration.
//!
//! Uses `wmctrl -lGx`, which lists every managed client with its geometry
//! and `WM_CLASS`. The owning application is the class half of `WM_CLASS`.
//! No filtering happens here; that is the surface catalog's job.

use framecast_common::error::FramecastResult;
use framecast_platform_core::{Rect, Surface};

use crate::display::run_query_tool;

/// Enumerate managed top-level windows on the current X display.
pub fn list_windows() -> FramecastResult<Vec<Surface>> {
    let stdout = run_query_tool("wmctrl", &["-lGx"], "sudo apt install wmctrl")?;
    let windows = parse_wmctrl(&stdout);
    tracing::debug!(count = windows.len(), "Enumerated X11 windows");
    Ok(windows)
}

/// Parse `wmctrl -lGx` output.
///
/// ```text
/// 0x03a00003  0 64   32   1280 800  Navigator.firefox  host Inbox - Mozilla Firefox
/// ```
///
/// Fields: window id, desktop, x, y, width, height, `instance.Class`,
/// client machine, then the title (may contain spaces or be empty).
pub fn parse_wmctrl(output: &str) -> Vec<Surface> {
    output.lines().filter_map(parse_wmctrl_line).collect()
}

fn parse_wmctrl_line(line: &str) -> Option<Surface> {
    let (fields, title) = split_fields(line, 8)?;

    let id = u64::from_str_radix(fields[0].trim_start_matches("0x"), 16).ok()?;
    let x = fields[2].parse::<i32>().ok()?;
    let y = fields[3].parse::<i32>().ok()?;
    let width = fields[4].parse::<u32>().ok()?;
    let height = fields[5].parse::<u32>().ok()?;
    let owner = owner_from_wm_class(fields[6]);

    Some(Surface::window(
        id,
        owner,
        title.trim(),
        Rect::new(x, y, width, height),
    ))
}

/// `instance.Class` -> `Class`; `N/A` (no WM_CLASS) -> empty.
fn owner_from_wm_class(wm_class: &str) -> &str {
    if wm_class == "N/A" {
        return "";
    }
    wm_class
        .rsplit_once('.')
        .map(|(_, class)| class)
        .unwrap_or(wm_class)
}

/// Split `n` whitespace-separated fields off the front of `line` and return
/// them with the untouched remainder.
fn split_fields(line: &str, n: usize) -> Option<(Vec<&str>, &str)> {
    let mut fields = Vec::with_capacity(n);
    let mut rest = line;
    for _ in 0..n {
        rest = rest.trim_start();
        if rest.is_empty() {
            return None;
        }
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        fields.push(&rest[..end]);
        rest = &rest[end..];
    }
    Some((fields, rest))
}
