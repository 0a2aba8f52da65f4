//! Application configuration loaded from TOML.
//!
//! Every field has a default, so an empty or missing file is a valid
//! configuration:
//!
//! ```toml
//! [window]
//! title = "frameloop"
//! width = 1280
//! height = 720
//!
//! [render]
//! present_mode = "fifo"
//! clear_color = [0.1, 0.1, 0.1, 1.0]
//! fence_timeout_ms = 500
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::logging::DEFAULT_LOG_FILTER;

/// Where [`AppConfig::load`] took its values from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// The file was missing.
    Defaults(PathBuf),
}

impl ConfigSource {
    pub fn log(&self) {
        match self {
            ConfigSource::File(path) => info!("Loaded configuration from {}", path.display()),
            ConfigSource::Defaults(path) => {
                warn!("{} not found, using default configuration", path.display())
            }
        }
    }
}

/// Preferred display mode for the presentation surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PresentModePreference {
    /// Low-latency triple buffering, falls back to FIFO.
    #[default]
    Mailbox,
    /// Vsync.
    Fifo,
    /// No vsync, may tear.
    Immediate,
}

impl std::str::FromStr for PresentModePreference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mailbox" => Ok(Self::Mailbox),
            "fifo" => Ok(Self::Fifo),
            "immediate" => Ok(Self::Immediate),
            other => Err(Error::Config(format!("unknown present mode '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Append FPS and frame time to the window title.
    pub show_stats: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "frameloop".to_string(),
            width: 1280,
            height: 720,
            show_stats: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    pub present_mode: PresentModePreference,
    /// Prefer an sRGB surface format over UNORM.
    pub srgb: bool,
    pub clear_color: [f32; 4],
    /// Enable the Khronos validation layer if it is installed.
    pub validation: bool,
    /// How long a single fence wait may take before a warning is logged.
    pub fence_timeout_ms: u64,
}

impl RenderConfig {
    pub fn fence_timeout(&self) -> Duration {
        Duration::from_millis(self.fence_timeout_ms)
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            present_mode: PresentModePreference::default(),
            srgb: true,
            clear_color: [0.02, 0.02, 0.04, 1.0],
            validation: cfg!(debug_assertions),
            fence_timeout_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AppConfig {
    pub window: WindowConfig,
    pub render: RenderConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    ///
    /// A missing file yields the defaults. Unreadable or malformed files are
    /// errors. Loading happens before logging is up, so nothing is logged
    /// here; report the returned [`ConfigSource`] once a subscriber exists.
    pub fn load(path: impl AsRef<Path>) -> Result<(Self, ConfigSource)> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(text) => Ok((Self::from_toml(&text)?, ConfigSource::File(path.to_owned()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok((Self::default(), ConfigSource::Defaults(path.to_owned())))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }
        if self.render.fence_timeout_ms == 0 {
            return Err(Error::Config("fence_timeout_ms must be at least 1".to_string()));
        }
        Ok(())
    }
}
