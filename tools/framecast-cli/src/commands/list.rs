//! List recordable windows.

use std::process::ExitCode;

use framecast_capture_engine::{get_backend, FilterProfile, SelectionToken, SurfaceCatalog};
use framecast_common::config::AppConfig;

pub fn run(grid: bool, json: bool, config: &AppConfig) -> anyhow::Result<ExitCode> {
    let catalog = SurfaceCatalog::new(get_backend(), config.catalog.clone());
    let profile = if grid {
        FilterProfile::Grid
    } else {
        FilterProfile::List
    };
    let surfaces = catalog.enumerate(profile)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&surfaces)?);
        return Ok(ExitCode::SUCCESS);
    }

    if surfaces.is_empty() {
        println!("No recordable windows. Use `desktop` to record the whole screen.");
        return Ok(ExitCode::SUCCESS);
    }

    println!("Available Windows:");
    for (i, surface) in surfaces.iter().enumerate() {
        let bounds = surface.bounds();
        println!(
            "  {:>2}. {}  [{}x{}, {}]",
            i + 1,
            surface.label(),
            bounds.width,
            bounds.height,
            SelectionToken::for_surface(surface)
        );
    }
    Ok(ExitCode::SUCCESS)
}
