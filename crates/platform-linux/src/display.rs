//! Display-server detection and monitor enumeration.

use std::process::Command;

use framecast_common::error::{FramecastError, FramecastResult};
use framecast_platform_core::{DisplayInfo, DisplayServer, Rect};

/// Detect the current display server.
pub fn detect_display_server() -> DisplayServer {
    if std::env::var("WAYLAND_DISPLAY").is_ok() {
        DisplayServer::Wayland
    } else if std::env::var("DISPLAY").is_ok() {
        DisplayServer::X11
    } else {
        DisplayServer::Unknown
    }
}

/// Whether an X server is reachable through `$DISPLAY` (including XWayland).
pub fn has_x_display() -> bool {
    std::env::var("DISPLAY").map(|d| !d.is_empty()).unwrap_or(false)
}

/// Enumerate connected displays via `xrandr --listmonitors`.
pub fn detect_displays() -> FramecastResult<Vec<DisplayInfo>> {
    tracing::debug!("Detecting displays");
    let stdout = run_query_tool("xrandr", &["--listmonitors"], "sudo apt install x11-xserver-utils")?;
    let displays = parse_listmonitors(&stdout);
    if displays.is_empty() {
        return Err(FramecastError::platform_query(
            "xrandr reported no active monitors",
        ));
    }
    Ok(displays)
}

/// Parse `xrandr --listmonitors` output.
///
/// ```text
/// Monitors: 2
///  0: +*eDP-1 1920/344x1080/194+0+0  eDP-1
///  1: +HDMI-1 2560/597x1440/336-2560+0  HDMI-1
/// ```
pub fn parse_listmonitors(output: &str) -> Vec<DisplayInfo> {
    output
        .lines()
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            let index = tokens.next()?.strip_suffix(':')?.parse::<u32>().ok()?;
            let flags = tokens.next()?;
            let geometry = tokens.next()?;
            let name = tokens.next_back().unwrap_or(flags.trim_start_matches(['+', '*']));
            let bounds = parse_monitor_geometry(geometry)?;
            Some(DisplayInfo {
                id: index,
                name: name.to_string(),
                bounds,
                primary: flags.contains('*'),
            })
        })
        .collect()
}

/// Parse `W/mmWxH/mmH±X±Y`.
fn parse_monitor_geometry(geometry: &str) -> Option<Rect> {
    let (w_part, rest) = geometry.split_once('x')?;
    let width = w_part.split('/').next()?.parse::<u32>().ok()?;

    let offset_start = rest.find(['+', '-'])?;
    let (h_part, offsets) = rest.split_at(offset_start);
    let height = h_part.split('/').next()?.parse::<u32>().ok()?;

    let (x, y) = parse_signed_pair(offsets)?;
    Some(Rect::new(x, y, width, height))
}

/// Parse `+X+Y` / `-X+Y` style offsets.
fn parse_signed_pair(s: &str) -> Option<(i32, i32)> {
    let second = s[1..].find(['+', '-'])? + 1;
    let (x, y) = s.split_at(second);
    Some((x.parse().ok()?, y.parse().ok()?))
}

/// Run an enumeration tool and return its stdout.
///
/// A missing binary or non-zero exit surfaces as `PlatformQuery` so callers
/// can report that the OS capability is unreachable.
pub(crate) fn run_query_tool(
    program: &str,
    args: &[&str],
    install_hint: &str,
) -> FramecastResult<String> {
    let output = Command::new(program).args(args).output().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            FramecastError::platform_query(format!("{program} not found. Install with: {install_hint}"))
        } else {
            FramecastError::platform_query(format!("Failed to run {program}: {e}"))
        }
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(FramecastError::platform_query(format!(
            "{program} exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_monitor_layout() {
        let output = "Monitors: 2\n 0: +*eDP-1 1920/344x1080/194+0+0  eDP-1\n 1: +HDMI-1 2560/597x1440/336+1920+0  HDMI-1\n";
        let displays = parse_listmonitors(output);
        assert_eq!(displays.len(), 2);

        assert_eq!(displays[0].name, "eDP-1");
        assert!(displays[0].primary);
        assert_eq!(displays[0].bounds, Rect::new(0, 0, 1920, 1080));

        assert_eq!(displays[1].id, 1);
        assert!(!displays[1].primary);
        assert_eq!(displays[1].bounds, Rect::new(1920, 0, 2560, 1440));
    }

    #[test]
    fn parses_negative_origin() {
        let output = "Monitors: 1\n 0: +DP-2 2560/597x1440/336-2560-200  DP-2\n";
        let displays = parse_listmonitors(output);
        assert_eq!(displays[0].bounds, Rect::new(-2560, -200, 2560, 1440));
    }

    #[test]
    fn ignores_header_and_garbage() {
        assert!(parse_listmonitors("Monitors: 0\n").is_empty());
        assert!(parse_listmonitors(" 0: +eDP-1 garbage eDP-1\n").is_empty());
    }
}
