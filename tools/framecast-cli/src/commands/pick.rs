//! Interactive surface picker.
//!
//! Prompts go to stderr so the selection token on stdout can be captured
//! by a script: `framecast record out.mp4 "$(framecast pick)"`.

use std::io::{self, BufReader};
use std::process::ExitCode;

use framecast_capture_engine::{
    get_backend, ListSelector, SelectionToken, SelectorStrategy, SurfaceCatalog, ThumbnailSelector,
};
use framecast_common::config::AppConfig;
use framecast_platform_core::Surface;

pub fn run(thumbnails: bool, config: &AppConfig) -> anyhow::Result<ExitCode> {
    let catalog = SurfaceCatalog::new(get_backend(), config.catalog.clone());
    match choose(&catalog, thumbnails, config)? {
        Some(surface) => {
            println!("{}", SelectionToken::for_surface(&surface));
            Ok(ExitCode::SUCCESS)
        }
        None => {
            eprintln!("Cancelled.");
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Run the configured selector strategy on stdin/stderr.
pub fn choose(
    catalog: &SurfaceCatalog,
    thumbnails: bool,
    config: &AppConfig,
) -> anyhow::Result<Option<Surface>> {
    let strategy: Box<dyn SelectorStrategy> = if thumbnails {
        Box::new(ThumbnailSelector::new(
            config.catalog.preview_width,
            config.catalog.preview_height,
        ))
    } else {
        Box::new(ListSelector)
    };

    let mut input = BufReader::new(io::stdin().lock());
    let mut output = io::stderr().lock();
    Ok(strategy.choose(catalog, &mut input, &mut output)?)
}
