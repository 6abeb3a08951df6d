//! Check system capabilities.

use std::process::ExitCode;

use framecast_capture_engine::get_backend;

pub fn run() -> anyhow::Result<ExitCode> {
    println!("Framecast System Check");
    println!("{}", "=".repeat(50));
    println!("[OK] Capture backend: {}", get_backend().name());

    #[cfg(target_os = "linux")]
    {
        use framecast_platform_core::DisplayServer;
        use framecast_platform_linux::{detect_display_server, detect_displays, permissions};

        match detect_display_server() {
            DisplayServer::X11 => println!("[OK] Display server: X11"),
            DisplayServer::Wayland => {
                println!("[WARN] Display server: Wayland (only XWayland windows are visible)")
            }
            _ => println!("[WARN] Display server: Unknown"),
        }

        match detect_displays() {
            Ok(displays) => {
                println!("[OK] Displays detected: {}", displays.len());
                for d in &displays {
                    println!(
                        "     {} {}x{} at ({}, {}) {}",
                        d.name,
                        d.bounds.width,
                        d.bounds.height,
                        d.bounds.x,
                        d.bounds.y,
                        if d.primary { "(primary)" } else { "" }
                    );
                }
            }
            Err(e) => println!("[FAIL] Displays: {e}"),
        }

        let capabilities = permissions::check_capabilities();
        println!();
        permissions::print_capability_report(&capabilities);

        let all_required_ok = capabilities
            .iter()
            .filter(|c| c.required)
            .all(|c| c.available);

        println!();
        if all_required_ok {
            println!("All required capabilities are available. Framecast is ready.");
            return Ok(ExitCode::SUCCESS);
        }
        println!("Some required capabilities are missing. See above for fixes.");
        Ok(ExitCode::FAILURE)
    }

    #[cfg(not(target_os = "linux"))]
    {
        println!("[FAIL] No capture backend for {}", std::env::consts::OS);
        Ok(ExitCode::FAILURE)
    }
}
