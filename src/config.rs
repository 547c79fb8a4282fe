//! Startup configuration.
//!
//! Read from a TOML file:
//!
//! ```toml
//! stations = "assets/stations.json"
//! models_dir = "assets/models"
//! n_folds = 10
//! fold_file = "fold_{fold}.json"
//! artifact_format = "json"
//!
//! [schema]
//! version = 1
//! features = ["start_index", "end_index", "haversine_km"]
//! ```
//!
//! Relative paths are resolved against the directory holding the config file.

use crate::features::FeatureSchema;
use crate::fold::ArtifactFormat;
use crate::predictor::DEFAULT_N_FOLDS;
use crate::Result;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration for the trip-time service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Station registry JSON file
    pub stations: PathBuf,

    /// Directory holding the fold artifacts
    pub models_dir: PathBuf,

    /// Number of folds persisted at training time
    pub n_folds: usize,

    /// Fold file name template; `{fold}` is replaced by the fold index
    pub fold_file: String,

    pub artifact_format: ArtifactFormat,

    /// Feature schema the folds were trained on
    pub schema: FeatureSchema,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stations: PathBuf::from("assets/stations.json"),
            models_dir: PathBuf::from("assets/models"),
            n_folds: DEFAULT_N_FOLDS,
            fold_file: "fold_{fold}.json".to_string(),
            artifact_format: ArtifactFormat::Json,
            schema: FeatureSchema::default(),
        }
    }
}

impl Config {
    /// Parse a config from TOML text. Paths are left as written.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml).context("invalid config")?;
        config.schema.validate()?;
        Ok(config)
    }

    /// Load a config file and resolve its relative paths.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = Self::from_toml_str(&text)
            .with_context(|| format!("failed to load config {}", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Ok(config.resolve_paths(base))
    }

    /// Join relative paths onto `base`.
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        if self.stations.is_relative() {
            self.stations = base.join(&self.stations);
        }
        if self.models_dir.is_relative() {
            self.models_dir = base.join(&self.models_dir);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureKind;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.n_folds, 10);
        assert_eq!(config.fold_file, "fold_{fold}.json");
        assert_eq!(config.artifact_format, ArtifactFormat::Json);
        assert_eq!(config.schema, FeatureSchema::default());
    }

    #[test]
    fn test_from_toml_str() {
        let config = Config::from_toml_str(
            r#"
            stations = "data/stations.json"
            models_dir = "data/models"
            n_folds = 5
            artifact_format = "onnx"
            fold_file = "fold-{fold}.onnx"

            [schema]
            version = 3
            features = ["start_index", "end_index", "haversine_km"]
            "#,
        )
        .unwrap();

        assert_eq!(config.n_folds, 5);
        assert_eq!(config.stations, PathBuf::from("data/stations.json"));
        assert_eq!(config.artifact_format, ArtifactFormat::Onnx);
        assert_eq!(config.schema.version, 3);
        assert_eq!(
            config.schema.features,
            vec![FeatureKind::StartIndex, FeatureKind::EndIndex, FeatureKind::HaversineKm]
        );
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config = Config::from_toml_str("n_folds = 3").unwrap();
        assert_eq!(config.n_folds, 3);
        assert_eq!(config.models_dir, PathBuf::from("assets/models"));
        assert_eq!(config.schema, FeatureSchema::default());
    }

    #[test]
    fn test_unknown_feature_rejected() {
        let result = Config::from_toml_str(
            r#"
            [schema]
            version = 1
            features = ["start_index", "weather"]
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_feature_rejected() {
        let result = Config::from_toml_str(
            r#"
            [schema]
            version = 1
            features = ["start_index", "start_index"]
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_paths() {
        let config = Config {
            stations: PathBuf::from("/abs/stations.json"),
            ..Config::default()
        }
        .resolve_paths(Path::new("/etc/triptime"));

        assert_eq!(config.stations, PathBuf::from("/abs/stations.json"));
        assert_eq!(config.models_dir, PathBuf::from("/etc/triptime/assets/models"));
    }
}
