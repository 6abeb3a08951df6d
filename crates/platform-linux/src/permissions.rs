//! Capability detection and guidance for Linux.
//!
//! Framecast needs an X display, two enumeration tools, and a handful of
//! GStreamer elements for capture and encoding.

use std::process::{Command, Stdio};

use crate::display::has_x_display;

/// A system capability that Framecast may need.
#[derive(Debug, Clone)]
pub struct Capability {
    pub name: String,
    pub description: String,
    pub available: bool,
    pub required: bool,
    pub fix_instructions: Option<String>,
}

/// GStreamer elements the capture and mux pipelines are built from.
const GST_ELEMENTS: &[(&str, &str, bool)] = &[
    ("ximagesrc", "gstreamer1.0-plugins-good", true),
    ("x264enc", "gstreamer1.0-plugins-ugly", true),
    ("mp4mux", "gstreamer1.0-plugins-good", true),
    ("pulsesrc", "gstreamer1.0-pulseaudio", false),
    ("avenc_aac", "gstreamer1.0-libav", false),
];

/// Check all capabilities and report status.
pub fn check_capabilities() -> Vec<Capability> {
    let mut caps = vec![
        check_x_display(),
        check_tool(
            "wmctrl",
            "Window enumeration for window capture",
            true,
            "sudo apt install wmctrl",
        ),
        check_tool(
            "xrandr",
            "Display enumeration for desktop capture",
            true,
            "sudo apt install x11-xserver-utils",
        ),
    ];
    caps.extend(
        GST_ELEMENTS
            .iter()
            .map(|(element, package, required)| check_gst_element(element, package, *required)),
    );
    caps
}

fn check_x_display() -> Capability {
    let available = has_x_display();
    Capability {
        name: "X Display".to_string(),
        description: "X11 (or XWayland) display for window and screen capture".to_string(),
        available,
        required: true,
        fix_instructions: if available {
            None
        } else {
            Some("Run inside a graphical X11 session (DISPLAY must be set)".to_string())
        },
    }
}

fn check_tool(program: &str, description: &str, required: bool, install: &str) -> Capability {
    // Both tools accept --help and exit quickly without a display.
    let available = Command::new(program)
        .arg("--help")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok();

    Capability {
        name: program.to_string(),
        description: description.to_string(),
        available,
        required,
        fix_instructions: if available {
            None
        } else {
            Some(format!("Install with: {install}"))
        },
    }
}

fn check_gst_element(element: &str, package: &str, required: bool) -> Capability {
    let available = Command::new("gst-inspect-1.0")
        .args(["--exists", element])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false);

    Capability {
        name: format!("GStreamer {element}"),
        description: match element {
            "pulsesrc" | "avenc_aac" => "System audio capture and AAC encoding".to_string(),
            _ => "Video capture, H.264 encoding, and MP4 muxing".to_string(),
        },
        available,
        required,
        fix_instructions: if available {
            None
        } else {
            Some(format!("Install with: sudo apt install {package}"))
        },
    }
}

/// Print a user-friendly capability report.
pub fn print_capability_report(capabilities: &[Capability]) {
    println!("Framecast System Capabilities:");
    println!("{}", "-".repeat(60));

    for cap in capabilities {
        let status = if cap.available {
            "[OK]"
        } else if cap.required {
            "[MISSING - REQUIRED]"
        } else {
            "[MISSING - OPTIONAL]"
        };

        println!("  {} {}: {}", status, cap.name, cap.description);

        if let Some(ref fix) = cap.fix_instructions {
            println!("    Fix: {fix}");
        }
    }
}
