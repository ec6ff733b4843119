//! Kiosk configuration, read from a TOML file.
//!
//! Every section is optional and falls back to the defaults below, so an
//! empty file is a valid configuration.

use ab_glyph::FontArc;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("font {path} could not be loaded: {reason}")]
    Font { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tuning: Tuning,
    pub framing: FramingConfig,
    pub tracker: TrackerConfig,
    pub smoothing: SmoothingConfig,
    pub overlay: OverlayConfig,
}

/// Empirical gains used to fit the sprite and read head pose.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct Tuning {
    pub yaw_gain: f32,
    pub pitch_gain: f32,
    /// Cheek width is scaled by this before competing for head width.
    pub cheek_factor: f32,
    /// Sprite width as a multiple of head width.
    pub width_overscan: f32,
    /// Sprite height floor as a multiple of face height.
    pub min_height_ratio: f32,
    /// Fraction of sprite height the pivot sits below the sprite center.
    pub vertical_offset: f32,
    /// Horizontal anchor shift as a fraction of head width.
    pub horizontal_offset: f32,
    /// Lower bound on head width in pixels.
    pub min_head_width: f32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            yaw_gain: 2.,
            pitch_gain: 2.,
            cheek_factor: 1.3,
            width_overscan: 1.8,
            min_height_ratio: 1.2,
            vertical_offset: 0.35,
            horizontal_offset: 0.,
            min_head_width: 8.,
        }
    }
}

/// Thresholds for the calibration traffic light.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct FramingConfig {
    /// Max center offset as a fraction of the canvas size on each axis.
    pub max_center_offset: f32,
    pub min_area_ratio: f32,
    pub max_area_ratio: f32,
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            max_center_offset: 0.3,
            min_area_ratio: 0.03,
            max_area_ratio: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Cap on processed frames per second.
    pub max_fps: f32,
    /// Rate of the display tick that drives the loop.
    pub display_hz: f32,
    pub inference_timeout_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_fps: 30.,
            display_hz: 60.,
            inference_timeout_ms: 250,
        }
    }
}

impl TrackerConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f32(1. / self.max_fps)
    }

    pub fn display_interval(&self) -> Duration {
        Duration::from_secs_f32(1. / self.display_hz)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Weight of the newest frame. 1.0 disables smoothing.
    pub alpha: f32,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self { alpha: 0.5 }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// TTF/OTF font for the pose readout, replacing the bundled one.
    pub font: Option<PathBuf>,
    pub font_size: f32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            font: None,
            font_size: 12.,
        }
    }
}

const BUNDLED_FONT: &[u8] = include_bytes!("../assets/DejaVuSansMono.ttf");

impl OverlayConfig {
    /// The configured font, or the bundled DejaVu Sans Mono.
    pub fn load_font(&self) -> Result<FontArc, ConfigError> {
        let Some(path) = &self.font else {
            return FontArc::try_from_slice(BUNDLED_FONT).map_err(|e| ConfigError::Font {
                path: PathBuf::from("<bundled>"),
                reason: e.to_string(),
            });
        };

        let bytes = std::fs::read(path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        FontArc::try_from_vec(bytes).map_err(|e| ConfigError::Font {
            path: path.clone(),
            reason: e.to_string(),
        })
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let src = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&src)
    }

    pub fn from_toml(src: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(src)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.tuning;
        positive("tuning.width_overscan", t.width_overscan)?;
        positive("tuning.min_height_ratio", t.min_height_ratio)?;
        positive("tuning.cheek_factor", t.cheek_factor)?;
        positive("tuning.min_head_width", t.min_head_width)?;
        finite("tuning.yaw_gain", t.yaw_gain)?;
        finite("tuning.pitch_gain", t.pitch_gain)?;
        finite("tuning.vertical_offset", t.vertical_offset)?;
        finite("tuning.horizontal_offset", t.horizontal_offset)?;

        let f = &self.framing;
        positive("framing.max_center_offset", f.max_center_offset)?;
        if !(f.min_area_ratio >= 0. && f.min_area_ratio < f.max_area_ratio) {
            return Err(ConfigError::Invalid {
                field: "framing.min_area_ratio",
                reason: format!(
                    "must be at least 0 and below max_area_ratio ({})",
                    f.max_area_ratio
                ),
            });
        }

        positive("tracker.max_fps", self.tracker.max_fps)?;
        positive("tracker.display_hz", self.tracker.display_hz)?;
        if self.tracker.inference_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "tracker.inference_timeout_ms",
                reason: "must be greater than 0".into(),
            });
        }

        let alpha = self.smoothing.alpha;
        if !(alpha > 0. && alpha <= 1.) {
            return Err(ConfigError::Invalid {
                field: "smoothing.alpha",
                reason: format!("{alpha} is outside (0, 1]"),
            });
        }

        positive("overlay.font_size", self.overlay.font_size)?;
        Ok(())
    }
}

fn finite(field: &'static str, v: f32) -> Result<(), ConfigError> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("{v} is not finite"),
        })
    }
}

fn positive(field: &'static str, v: f32) -> Result<(), ConfigError> {
    finite(field, v)?;
    if v > 0. {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("{v} must be greater than 0"),
        })
    }
}
