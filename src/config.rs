use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::options::{ImageFormat, PrintOptions, DEFAULT_STARTUP_TIMEOUT};
use crate::trigger::DEFAULT_TRIGGER_TIMEOUT;
use crate::{HtmlPdfError, Result, Viewport};

/// Defaults read from `config.toml`; CLI flags override them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Existing browser to use instead of launching one.
    pub host: Option<String>,
    pub port: Option<u16>,
    pub chrome_path: Option<PathBuf>,
    pub chrome_flags: Vec<String>,
    /// Whole-operation deadline; absent means no deadline.
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
    pub timeouts: Timeouts,
    pub viewport: Viewport,
    pub screenshot_format: ImageFormat,
    pub print: PrintOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Time allowed for a launched browser to come up.
    #[serde(with = "humantime_serde")]
    pub startup: Duration,
    /// Default deadline for completion triggers.
    #[serde(with = "humantime_serde")]
    pub trigger: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            startup: DEFAULT_STARTUP_TIMEOUT,
            trigger: DEFAULT_TRIGGER_TIMEOUT,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            chrome_path: None,
            chrome_flags: Vec::new(),
            timeout: None,
            timeouts: Timeouts::default(),
            viewport: Viewport::default(),
            screenshot_format: ImageFormat::default(),
            print: PrintOptions::default(),
        }
    }
}

impl Config {
    /// `<config_dir>/htmlpdf/config.toml`, e.g. `~/.config/htmlpdf/config.toml`.
    pub fn central_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("htmlpdf").join("config.toml"))
    }

    /// Loads `path` if given, else the central config if it exists, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::central_config_path().filter(|p| p.exists()) {
                Some(path) => path,
                None => return Ok(Self::default()),
            },
        };
        let raw = std::fs::read_to_string(&path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| HtmlPdfError::Config(e.message().to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(HtmlPdfError::Config(
                "viewport dimensions must be positive".to_string(),
            ));
        }
        if let Some(scale) = self.print.scale {
            if scale.is_nan() || scale <= 0.0 {
                return Err(HtmlPdfError::Config(format!(
                    "print.scale must be positive, got {scale}"
                )));
            }
        }
        if self.timeouts.startup.is_zero() {
            return Err(HtmlPdfError::Config(
                "timeouts.startup must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
