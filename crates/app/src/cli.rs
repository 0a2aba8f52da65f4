//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;
use frameloop_core::AppConfig;
use frameloop_core::config::PresentModePreference;

#[derive(Parser, Debug)]
#[command(author, version, about = "Vulkan frame loop demo", long_about = None)]
pub struct Args {
    /// Configuration file; defaults are used if it does not exist
    #[arg(long, default_value = "frameloop.toml")]
    pub config: PathBuf,

    /// Enable the Vulkan validation layer
    #[arg(long)]
    pub validation: bool,

    /// Present mode: mailbox | fifo | immediate
    #[arg(long)]
    pub present_mode: Option<PresentModePreference>,

    /// Initial window width
    #[arg(long)]
    pub width: Option<u32>,

    /// Initial window height
    #[arg(long)]
    pub height: Option<u32>,
}

impl Args {
    /// Applies flags given on the command line over the loaded file.
    pub fn apply(&self, config: &mut AppConfig) {
        if self.validation {
            config.render.validation = true;
        }
        if let Some(mode) = self.present_mode {
            config.render.present_mode = mode;
        }
        if let Some(width) = self.width.filter(|w| *w > 0) {
            config.window.width = width;
        }
        if let Some(height) = self.height.filter(|h| *h > 0) {
            config.window.height = height;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["frameloop"]);
        assert_eq!(args.config, PathBuf::from("frameloop.toml"));
        assert!(!args.validation);
        assert!(args.present_mode.is_none());
    }

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "frameloop",
            "--present-mode",
            "fifo",
            "--width",
            "640",
            "--height",
            "0",
            "--validation",
        ]);

        let mut config = AppConfig::default();
        config.render.validation = false;
        args.apply(&mut config);

        assert_eq!(config.render.present_mode, PresentModePreference::Fifo);
        assert!(config.render.validation);
        assert_eq!(config.window.width, 640);
        // Zero is ignored
        assert_eq!(config.window.height, AppConfig::default().window.height);
    }

    #[test]
    fn test_rejects_unknown_present_mode() {
        assert!(Args::try_parse_from(["frameloop", "--present-mode", "vsync"]).is_err());
    }
}
