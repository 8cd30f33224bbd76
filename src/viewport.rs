use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;
use thiserror::Error;

/// Emulated window size used for screenshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

impl Viewport {
    /// Parameters for `Emulation.setDeviceMetricsOverride`.
    ///
    /// A scale factor of 0 keeps the browser's native device pixel ratio.
    pub fn device_metrics(&self, mobile: bool) -> Value {
        json!({
            "width": self.width,
            "height": self.height,
            "deviceScaleFactor": 0,
            "mobile": mobile,
        })
    }

    pub fn with_height(self, height: u32) -> Self {
        Self {
            height: height.max(1),
            ..self
        }
    }
}

#[derive(Debug, Error)]
pub enum ViewportParseError {
    #[error("Invalid viewport format: expected WIDTHxHEIGHT (e.g., 1920x1080)")]
    InvalidFormat,
    #[error("Invalid viewport width: {0}")]
    InvalidWidth(String),
    #[error("Invalid viewport height: {0}")]
    InvalidHeight(String),
    #[error("Viewport dimensions must be positive")]
    Zero,
}

impl FromStr for Viewport {
    type Err = ViewportParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or(ViewportParseError::InvalidFormat)?;
        if h.contains(['x', 'X']) {
            return Err(ViewportParseError::InvalidFormat);
        }

        let width: u32 = w
            .trim()
            .parse()
            .map_err(|_| ViewportParseError::InvalidWidth(w.to_string()))?;
        let height: u32 = h
            .trim()
            .parse()
            .map_err(|_| ViewportParseError::InvalidHeight(h.to_string()))?;

        if width == 0 || height == 0 {
            return Err(ViewportParseError::Zero);
        }

        Ok(Viewport { width, height })
    }
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_width_and_height() {
        let vp: Viewport = "1280x720".parse().unwrap();
        assert_eq!(vp, Viewport { width: 1280, height: 720 });
        let vp: Viewport = " 800 X 600 ".parse().unwrap();
        assert_eq!(vp, Viewport { width: 800, height: 600 });
    }

    #[test]
    fn rejects_malformed_input() {
        assert!("1280".parse::<Viewport>().is_err());
        assert!("1x2x3".parse::<Viewport>().is_err());
        assert!("abcx900".parse::<Viewport>().is_err());
        assert!("0x900".parse::<Viewport>().is_err());
    }

    #[test]
    fn default_matches_desktop_size() {
        let vp = Viewport::default();
        assert_eq!(vp.to_string(), "1920x1080");
    }

    #[test]
    fn device_metrics_use_native_scale() {
        let metrics = Viewport::default().device_metrics(false);
        assert_eq!(metrics["width"], 1920);
        assert_eq!(metrics["height"], 1080);
        assert_eq!(metrics["deviceScaleFactor"], 0);
        assert_eq!(metrics["mobile"], false);
    }

    #[test]
    fn with_height_never_collapses_to_zero() {
        assert_eq!(Viewport::default().with_height(0).height, 1);
        assert_eq!(Viewport::default().with_height(4000).height, 4000);
    }
}
