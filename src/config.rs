// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline configuration
//!
//! Stored as JSON. Every field has a default, so a partial file (or no file
//! at all) yields a working configuration.

use crate::backends::camera::{CameraBackendType, PixelFormat, SourceKind, get_default_backend};
use crate::constants::{analysis, synthetic};
use crate::errors::{AppError, AppResult};
use crate::media::FilterType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Text analysis settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Run the text recognizer on transformed frames
    pub enabled: bool,
    /// Frames larger than this (either side) are downscaled before recognition
    pub max_dimension: u32,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_dimension: analysis::DEFAULT_MAX_DIMENSION,
        }
    }
}

/// One virtual camera exposed by the synthetic backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticCameraSettings {
    pub name: String,
    pub path: String,
    pub kind: SourceKind,
    pub pixel_format: PixelFormat,
    /// Offered resolutions as (width, height)
    pub resolutions: Vec<(u32, u32)>,
    pub fps: u32,
}

impl Default for SyntheticCameraSettings {
    fn default() -> Self {
        Self {
            name: "Synthetic Camera".to_string(),
            path: "synthetic://0".to_string(),
            kind: SourceKind::Color,
            pixel_format: PixelFormat::YUYV,
            resolutions: synthetic::DEFAULT_RESOLUTIONS.to_vec(),
            fps: synthetic::DEFAULT_FPS,
        }
    }
}

/// Synthetic backend settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticSettings {
    pub cameras: Vec<SyntheticCameraSettings>,
}

impl Default for SyntheticSettings {
    fn default() -> Self {
        Self {
            cameras: vec![SyntheticCameraSettings::default()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Camera backend to use
    pub backend: CameraBackendType,
    /// Device path to prefer over the first enumerated color source
    pub preferred_camera: Option<String>,
    /// Transformation applied to every captured frame
    pub filter: FilterType,
    pub analysis: AnalysisSettings,
    pub synthetic: SyntheticSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: get_default_backend(),
            preferred_camera: None,
            filter: FilterType::default(),
            analysis: AnalysisSettings::default(),
            synthetic: SyntheticSettings::default(),
        }
    }
}

impl Config {
    /// Default config file location (`$XDG_CONFIG_HOME/camera-pipeline/config.json`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("camera-pipeline").join("config.json"))
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        let config: Config = serde_json::from_str(&contents)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        info!(path = %path.display(), backend = %config.backend, "Loaded configuration");
        Ok(config)
    }

    /// Load from `path`, or from the default location if it exists, or use defaults
    ///
    /// An explicitly given path must exist; the default location is optional.
    pub fn load_or_default(path: Option<&Path>) -> AppResult<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match Self::default_path() {
            Some(default) if default.exists() => Self::load(&default),
            _ => {
                debug!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Write configuration as pretty-printed JSON, creating parent directories
    pub fn save(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Storage(e.to_string()))?;
        }
        let json =
            serde_json::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| AppError::Storage(e.to_string()))?;
        Ok(())
    }
}
