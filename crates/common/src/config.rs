//! Application configuration.
//!
//! Everything the pipeline needs (backend choice, API keys, storage
//! location) lives in [`AppConfig`] and is handed to constructors
//! explicitly. Library code never reads process environment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{SlidecastError, SlidecastResult};

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Which encoding backend this deployment uses.
    pub backend: BackendKind,

    /// Local encoder settings (command-line and frame-capture backends).
    pub encoder: EncoderConfig,

    /// Remote render service settings.
    pub remote: RemoteRenderConfig,

    /// Where finished videos are published.
    pub storage: StorageConfig,

    /// Asset download limits.
    pub assets: AssetConfig,

    /// Text rendering settings.
    pub text: TextConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Encoding strategy, chosen once per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// External encoder process driven by a generated filter graph.
    #[default]
    CommandLine,
    /// Frames synthesized in-process and streamed into a muxer.
    FrameCapture,
    /// Declarative job submitted to a remote render service.
    Remote,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CommandLine => "command_line",
            Self::FrameCapture => "frame_capture",
            Self::Remote => "remote",
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = SlidecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "command_line" | "command-line" | "ffmpeg" => Ok(Self::CommandLine),
            "frame_capture" | "frame-capture" => Ok(Self::FrameCapture),
            "remote" => Ok(Self::Remote),
            other => Err(SlidecastError::config(format!(
                "unknown backend '{other}' (expected command_line, frame_capture or remote)"
            ))),
        }
    }
}

/// Local encoder parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Path or name of the ffmpeg binary.
    pub ffmpeg_bin: String,

    /// Path or name of the ffprobe binary used to measure encoded files.
    pub ffprobe_bin: String,

    /// x264 preset.
    pub preset: String,

    /// x264 constant rate factor.
    pub crf: u8,

    /// AAC bitrate in kbps.
    pub audio_bitrate_kbps: u32,
}

/// Remote render service parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteRenderConfig {
    /// Base URL of the render API (`{base_url}/render`).
    pub base_url: String,

    /// API key sent with every request.
    pub api_key: Option<String>,

    /// Seconds between status polls.
    pub poll_interval_secs: f64,

    /// Status polls before the job is abandoned.
    pub max_attempts: u32,

    /// Output container requested from the service.
    pub output_format: String,

    /// Per-request HTTP timeout in seconds.
    pub request_timeout_secs: u64,
}

/// Publishing destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageConfig {
    /// A directory served under a public base URL.
    Local {
        root: PathBuf,
        public_base_url: String,
        #[serde(default = "default_path_prefix")]
        path_prefix: String,
    },
    /// An HTTP object store accepting `PUT {endpoint}/{path}`.
    Http {
        endpoint: String,
        public_base_url: String,
        #[serde(default)]
        token: Option<String>,
        #[serde(default = "default_path_prefix")]
        path_prefix: String,
    },
}

impl StorageConfig {
    pub fn path_prefix(&self) -> &str {
        match self {
            Self::Local { path_prefix, .. } | Self::Http { path_prefix, .. } => path_prefix,
        }
    }
}

/// Asset download limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    /// Largest accepted body per asset, in bytes.
    pub max_asset_bytes: u64,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

/// Text rendering settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TextConfig {
    /// TrueType/OpenType font used for overlays. Without one, a built-in
    /// block glyph face is used.
    pub font_path: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "slidecast=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            encoder: EncoderConfig::default(),
            remote: RemoteRenderConfig::default(),
            storage: StorageConfig::default(),
            assets: AssetConfig::default(),
            text: TextConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_bin: "ffmpeg".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
            preset: "veryfast".to_string(),
            crf: 23,
            audio_bitrate_kbps: 128,
        }
    }
}

impl Default for RemoteRenderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.render.example.com/v1".to_string(),
            api_key: None,
            poll_interval_secs: 10.0,
            max_attempts: 30,
            output_format: "mp4".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let root = default_data_dir().join("published");
        Self::Local {
            public_base_url: format!("file://{}", root.display()),
            root,
            path_prefix: default_path_prefix(),
        }
    }
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            max_asset_bytes: 50 * 1024 * 1024,
            timeout_secs: 30,
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
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to load config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Load config from an explicit file. Unlike [`AppConfig::load`], a
    /// broken file is an error rather than a silent fallback.
    pub fn load_from(path: impl AsRef<Path>) -> SlidecastResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SlidecastError::config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            SlidecastError::config(format!("failed to parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }

    /// Reject settings that can never work.
    pub fn validate(&self) -> SlidecastResult<()> {
        if self.remote.max_attempts == 0 {
            return Err(SlidecastError::config("remote.max_attempts must be at least 1"));
        }
        if !(self.remote.poll_interval_secs.is_finite() && self.remote.poll_interval_secs >= 0.0) {
            return Err(SlidecastError::config(
                "remote.poll_interval_secs must be a non-negative number",
            ));
        }
        if self.backend == BackendKind::Remote && self.remote.base_url.trim().is_empty() {
            return Err(SlidecastError::config(
                "remote.base_url is required for the remote backend",
            ));
        }
        if self.assets.max_asset_bytes == 0 {
            return Err(SlidecastError::config("assets.max_asset_bytes must be positive"));
        }
        Ok(())
    }
}

fn default_path_prefix() -> String {
    "videos".to_string()
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("slidecast").join("config.json")
}

/// Default data directory.
fn default_data_dir() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("slidecast")
}
