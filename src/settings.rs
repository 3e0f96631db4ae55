use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::pdf::DefaultScales;

const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "lazyraster";
const MIN_DEFAULT_WORKERS: usize = 2;
const MAX_DEFAULT_WORKERS: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Tuning knobs for a rasterizer session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterConfig {
    /// Render pool size: how many distinct pages may render at once
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Request queue capacity; 0 makes submission a hand-off to the dispatcher
    #[serde(default)]
    pub queue_capacity: usize,

    /// Scale used when nothing is requested and the document has a landscape page
    #[serde(default = "default_landscape_scale")]
    pub landscape_scale: f32,

    /// Scale used when nothing is requested and every page is portrait
    #[serde(default = "default_portrait_scale")]
    pub portrait_scale: f32,
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map_or(MIN_DEFAULT_WORKERS, usize::from)
        .clamp(MIN_DEFAULT_WORKERS, MAX_DEFAULT_WORKERS)
}

fn default_landscape_scale() -> f32 {
    DefaultScales::LANDSCAPE
}

fn default_portrait_scale() -> f32 {
    DefaultScales::PORTRAIT
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: 0,
            landscape_scale: default_landscape_scale(),
            portrait_scale: default_portrait_scale(),
        }
    }
}

impl RasterConfig {
    /// Load and validate settings from a YAML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&content).map_err(|err| match err {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        debug!("Loaded settings from {path:?}");
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        // An empty file means "all defaults"
        let config: Self = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
                path: PathBuf::new(),
                source,
            })?
        };
        config.validate()?;
        Ok(config)
    }

    /// Settings from the user's config directory, or defaults if there are none
    #[must_use]
    pub fn load_or_default() -> Self {
        let Some(path) = preferred_config_path() else {
            warn!("Could not determine config directory, using default settings");
            return Self::default();
        };
        if !path.exists() {
            info!("Settings file {path:?} not found, using defaults");
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("{e}; using default settings");
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid {
                field: "workers",
                reason: "must be at least 1".to_string(),
            });
        }
        for (field, value) in [
            ("landscape_scale", self.landscape_scale),
            ("portrait_scale", self.portrait_scale),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("must be a positive number, got {value}"),
                });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn default_scales(&self) -> DefaultScales {
        DefaultScales {
            landscape: self.landscape_scale,
            portrait: self.portrait_scale,
        }
    }
}

#[must_use]
pub fn preferred_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let config = RasterConfig::from_yaml("workers: 3\n").unwrap();
        assert_eq!(config.workers, 3);
        assert_eq!(config.queue_capacity, 0);
        assert_eq!(config.landscape_scale, 1.0);
        assert_eq!(config.portrait_scale, 1.5);
    }

    #[test]
    fn empty_file_is_all_defaults() {
        assert_eq!(RasterConfig::from_yaml("  \n").unwrap(), RasterConfig::default());
    }

    #[test]
    fn rejects_zero_workers() {
        let err = RasterConfig::from_yaml("workers: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "workers", .. }));
    }

    #[test]
    fn rejects_non_positive_scale() {
        let err = RasterConfig::from_yaml("portrait_scale: -1.0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "portrait_scale",
                ..
            }
        ));
    }

    #[test]
    fn load_reports_parse_errors_with_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "workers: [not, a, number]").unwrap();

        let err = RasterConfig::load(file.path()).unwrap_err();
        match err {
            ConfigError::Parse { path, .. } => assert_eq!(path, file.path()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn load_reads_scales() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "landscape_scale: 2.0\nportrait_scale: 0.75\nqueue_capacity: 16").unwrap();

        let config = RasterConfig::load(file.path()).unwrap();
        let scales = config.default_scales();
        assert_eq!(scales.landscape, 2.0);
        assert_eq!(scales.portrait, 0.75);
        assert_eq!(config.queue_capacity, 16);
    }

    #[test]
    fn default_workers_is_bounded() {
        let workers = RasterConfig::default().workers;
        assert!((MIN_DEFAULT_WORKERS..=MAX_DEFAULT_WORKERS).contains(&workers));
    }
}
