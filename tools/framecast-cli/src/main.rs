//! Framecast CLI: record a window or the whole desktop to MP4.
//!
//! Usage:
//!   framecast record <OUTPUT> [SELECTION]   Record until Ctrl+C / SIGTERM
//!   framecast pick [--thumbnails]           Choose a surface, print its token
//!   framecast list [--grid]                 List recordable windows
//!   framecast check                         Check system capabilities

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use framecast_common::config::{config_file_path, AppConfig};
use framecast_common::error::FramecastError;

mod commands;

#[derive(Parser)]
#[command(
    name = "framecast",
    about = "Record a single window or the whole desktop to an MP4 file",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to $XDG_CONFIG_HOME/framecast/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a surface until interrupted
    Record {
        /// Output file (.mp4)
        output: PathBuf,

        /// List index (1-based), `id:<n>`, or `desktop`; prompts when omitted
        selection: Option<String>,

        /// Record video only
        #[arg(long)]
        no_audio: bool,

        /// Hide the mouse pointer
        #[arg(long)]
        hide_cursor: bool,

        /// Target FPS
        #[arg(long)]
        fps: Option<u32>,

        /// Capture scale factor applied to surface size
        #[arg(long)]
        scale: Option<f64>,

        /// Prompt with a thumbnail grid instead of a list
        #[arg(long)]
        thumbnails: bool,

        /// Print the recording report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Choose a surface interactively and print its selection token
    Pick {
        /// Show a thumbnail grid instead of a list
        #[arg(long)]
        thumbnails: bool,
    },

    /// List recordable windows
    List {
        /// Apply the thumbnail-grid size threshold
        #[arg(long)]
        grid: bool,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check system capabilities
    Check,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let (mut config, load_error) = match &cli.config {
        Some(path) => match AppConfig::load_from(path) {
            Ok(config) => (config, None),
            Err(e) => {
                eprintln!("Error: cannot load {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => match AppConfig::load() {
            Ok(config) => (config, None),
            Err(e) => (AppConfig::default(), Some(e)),
        },
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    framecast_common::logging::init_logging(&config.logging);
    if let Some(e) = load_error {
        tracing::warn!(
            path = %config_file_path().display(),
            error = %e,
            "Failed to load config; using defaults"
        );
    }

    let result = match cli.command {
        Commands::Record {
            output,
            selection,
            no_audio,
            hide_cursor,
            fps,
            scale,
            thumbnails,
            json,
        } => {
            let args = commands::record::RecordArgs {
                output,
                selection,
                no_audio,
                hide_cursor,
                fps,
                scale,
                thumbnails,
                json,
            };
            commands::record::run(args, config).await
        }
        Commands::Pick { thumbnails } => commands::pick::run(thumbnails, &config),
        Commands::List { grid, json } => commands::list::run(grid, json, &config),
        Commands::Check => commands::check::run(),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            report_error(&e);
            ExitCode::FAILURE
        }
    }
}

fn report_error(error: &anyhow::Error) {
    eprintln!("Error: {error:#}");
    let Some(framecast) = error.downcast_ref::<FramecastError>() else {
        return;
    };
    if let Some(path) = framecast.artifact_path() {
        eprintln!("The recording was left at {} and may be incomplete.", path.display());
    }
    if let Some(hint) = framecast.guidance() {
        eprintln!("{hint}");
    }
}
