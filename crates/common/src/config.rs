//! Application configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::FramecastResult;

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Default recording settings.
    pub recording: RecordingDefaults,

    /// Surface catalog filtering policy.
    pub catalog: CatalogFilter,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default recording parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingDefaults {
    /// Target FPS for the video stream.
    pub fps: u32,

    /// Whether the cursor is drawn into captured frames.
    pub show_cursor: bool,

    /// Whether system audio is captured alongside video.
    pub capture_audio: bool,

    /// Audio sample rate in Hz.
    pub audio_sample_rate: u32,

    /// Audio channel count.
    pub audio_channels: u32,

    /// Multiplier from surface size to capture resolution (2.0 on high-density displays).
    pub hidpi_scale: f64,

    /// Fixed video bitrate in bits/s. `None` picks one from the resolution.
    pub video_bitrate: Option<u32>,

    /// Maximum distance between key frames, in frames.
    pub keyframe_interval: u32,

    /// AAC bitrate in bits/s.
    pub audio_bitrate: u32,

    /// Bounded queue depth between the video delivery context and its encoder.
    pub video_queue_depth: usize,

    /// Bounded queue depth between the audio delivery context and its encoder.
    pub audio_queue_depth: usize,

    /// Hard upper bound on finalize before the artifact is reported corrupt.
    pub finalize_timeout_secs: u64,

    /// Upper bound on platform stream setup.
    pub start_timeout_secs: u64,
}

/// Filtering policy applied to every surface enumeration.
///
/// The plain list and the thumbnail grid use different minimum sizes;
/// every other rule is shared.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogFilter {
    /// Minimum window width for the plain list.
    pub list_min_width: u32,

    /// Minimum window height for the plain list.
    pub list_min_height: u32,

    /// Minimum window width for the thumbnail grid.
    pub grid_min_width: u32,

    /// Minimum window height for the thumbnail grid.
    pub grid_min_height: u32,

    /// System-chrome owner names that are never recordable (exact match).
    pub excluded_owners: Vec<String>,

    /// Overlay/helper title keywords (case-insensitive substring match).
    pub excluded_title_keywords: Vec<String>,

    /// Preview thumbnail width.
    pub preview_width: u32,

    /// Preview thumbnail height.
    pub preview_height: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "framecast=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for RecordingDefaults {
    fn default() -> Self {
        Self {
            fps: 30,
            show_cursor: true,
            capture_audio: true,
            audio_sample_rate: 48000,
            audio_channels: 2,
            hidpi_scale: 1.0,
            video_bitrate: None,
            keyframe_interval: 30,
            audio_bitrate: 128_000,
            video_queue_depth: 8,
            audio_queue_depth: 32,
            finalize_timeout_secs: 30,
            start_timeout_secs: 10,
        }
    }
}

impl RecordingDefaults {
    /// Video bitrate for a capture resolution.
    ///
    /// Tuned for screen content (sharp text, low motion):
    ///   - 4K and above: 22 Mbps
    ///   - 1440p:        14 Mbps
    ///   - below:         8 Mbps
    pub fn video_bitrate_for(&self, width: u32, height: u32) -> u32 {
        if let Some(fixed) = self.video_bitrate {
            return fixed;
        }
        let pixels = width as u64 * height as u64;
        if pixels >= 3840 * 2160 {
            22_000_000
        } else if pixels >= 2560 * 1440 {
            14_000_000
        } else {
            8_000_000
        }
    }

    pub fn finalize_timeout(&self) -> Duration {
        Duration::from_secs(self.finalize_timeout_secs)
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }
}

impl Default for CatalogFilter {
    fn default() -> Self {
        let owners = [
            "Dock",
            "Window Server",
            "SystemUIServer",
            "Notification Center",
            "plasmashell",
            "gnome-shell",
            "xfce4-panel",
            "xfdesktop",
            "polybar",
        ];
        let keywords = [
            "underbelly",
            "annotation",
            "overlay",
            "helper",
            "agent",
            "wallpaper",
            "backstop",
            "item-0",
            "notification",
            "desktop",
        ];
        Self {
            list_min_width: 100,
            list_min_height: 100,
            grid_min_width: 200,
            grid_min_height: 150,
            excluded_owners: owners.iter().map(|s| s.to_string()).collect(),
            excluded_title_keywords: keywords.iter().map(|s| s.to_string()).collect(),
            preview_width: 400,
            preview_height: 300,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location. A missing file yields the
    /// defaults; an unreadable or malformed one is an error the caller may
    /// report once logging is up.
    pub fn load() -> FramecastResult<Self> {
        let config_path = config_file_path();
        if !config_path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&config_path)
    }

    /// Load config from an explicit file.
    pub fn load_from(path: &Path) -> FramecastResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("framecast").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitrate_scales_with_resolution() {
        let defaults = RecordingDefaults::default();
        assert_eq!(defaults.video_bitrate_for(3840, 2160), 22_000_000);
        assert_eq!(defaults.video_bitrate_for(2560, 1440), 14_000_000);
        assert_eq!(defaults.video_bitrate_for(1920, 1080), 8_000_000);

        let fixed = RecordingDefaults {
            video_bitrate: Some(6_000_000),
            ..RecordingDefaults::default()
        };
        assert_eq!(fixed.video_bitrate_for(3840, 2160), 6_000_000);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "recording": { "fps": 60, "capture_audio": false } }"#)
                .unwrap();
        assert_eq!(config.recording.fps, 60);
        assert!(!config.recording.capture_audio);
        assert_eq!(config.recording.audio_sample_rate, 48000);
        assert_eq!(config.catalog.grid_min_width, 200);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn load_from_reports_bad_json() {
        let path = std::env::temp_dir().join(format!(
            "framecast_bad_config_{}.json",
            std::process::id()
        ));
        std::fs::write(&path, "{ not json").unwrap();
        assert!(AppConfig::load_from(&path).is_err());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn load_surfaces_malformed_standard_config() {
        let dir = std::env::temp_dir().join(format!("framecast_xdg_{}", std::process::id()));
        std::fs::create_dir_all(dir.join("framecast")).unwrap();
        std::env::set_var("XDG_CONFIG_HOME", &dir);

        assert_eq!(config_file_path(), dir.join("framecast").join("config.json"));
        assert_eq!(AppConfig::load().unwrap().recording.fps, 30);

        std::fs::write(config_file_path(), "{ \"recording\": 5 }").unwrap();
        assert!(AppConfig::load().is_err());

        std::env::remove_var("XDG_CONFIG_HOME");
        std::fs::remove_dir_all(&dir).ok();
    }
}
