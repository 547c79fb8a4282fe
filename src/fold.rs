//! Fold models and their serialized artifacts.

use crate::error::ConfigurationFailure;
use crate::tree::TreeEnsemble;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// One independently trained regressor of the ensemble.
///
/// Folds are immutable after load and shared across request threads, so `predict`
/// takes `&self` and implementations must be `Send + Sync`.
pub trait Fold: Send + Sync {
    /// Identifier used in logs and load errors.
    fn name(&self) -> &str;

    /// Number of input features the fold was trained on.
    fn num_features(&self) -> usize;

    /// Feature schema version recorded at training time, if the artifact carries one.
    fn schema_version(&self) -> Option<u32> {
        None
    }

    /// Predict trip duration in minutes for one feature row.
    ///
    /// `features.len()` equals [`num_features`](Self::num_features); callers guarantee it.
    fn predict(&self, features: &[f32]) -> f64;
}

/// Serialization format of a fold artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactFormat {
    /// Native tree-ensemble JSON, see [`crate::tree`]
    #[default]
    Json,
    /// ONNX graph, requires the `onnx` cargo feature
    Onnx,
}

impl fmt::Display for ArtifactFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactFormat::Json => write!(f, "json"),
            ArtifactFormat::Onnx => write!(f, "onnx"),
        }
    }
}

impl FromStr for ArtifactFormat {
    type Err = ConfigurationFailure;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ArtifactFormat::Json),
            "onnx" => Ok(ArtifactFormat::Onnx),
            other => Err(ConfigurationFailure::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Raw bytes of one persisted fold.
#[derive(Debug, Clone)]
pub struct FoldArtifact {
    pub name: String,
    pub format: ArtifactFormat,
    pub bytes: Vec<u8>,
}

impl FoldArtifact {
    pub fn new(name: impl Into<String>, format: ArtifactFormat, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            format,
            bytes,
        }
    }

    /// Read an artifact from disk; the file stem becomes its name.
    pub fn read(path: &Path, format: ArtifactFormat) -> Result<Self, ConfigurationFailure> {
        let bytes = fs::read(path).map_err(|source| ConfigurationFailure::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, format, bytes))
    }

    /// Decode into a ready-to-use fold.
    ///
    /// `num_features` is the width of the feature schema the fold will be scored with.
    /// The `json` format declares its own width and ignores it; `onnx` graphs are built
    /// for it.
    pub fn decode(&self, num_features: usize) -> Result<Box<dyn Fold>, ConfigurationFailure> {
        match self.format {
            ArtifactFormat::Json => Ok(Box::new(TreeEnsemble::from_json_slice(
                self.name.clone(),
                &self.bytes,
            )?)),
            #[cfg(feature = "onnx")]
            ArtifactFormat::Onnx => Ok(Box::new(crate::onnx::OnnxFold::from_bytes(
                self.name.clone(),
                &self.bytes,
                num_features,
            )?)),
            #[cfg(not(feature = "onnx"))]
            ArtifactFormat::Onnx => Err(ConfigurationFailure::UnsupportedFormat(
                self.format.to_string(),
            )),
        }
    }
}

/// Expand a fold file template such as `fold_{fold}.json` for one fold index.
pub fn fold_file_name(template: &str, index: usize) -> String {
    template.replace("{fold}", &index.to_string())
}

/// Eagerly read `n_folds` artifacts from `dir`.
///
/// Fails if any of the expected files is missing, and also if a file for index
/// `n_folds` exists: the directory then holds more folds than configured.
pub fn read_fold_artifacts(
    dir: &Path,
    template: &str,
    n_folds: usize,
    format: ArtifactFormat,
) -> Result<Vec<FoldArtifact>, ConfigurationFailure> {
    if !template.contains("{fold}") {
        return Err(ConfigurationFailure::FoldTemplate(template.to_string()));
    }

    let mut artifacts = Vec::with_capacity(n_folds);
    for index in 0..n_folds {
        let path = dir.join(fold_file_name(template, index));
        if !path.is_file() {
            return Err(ConfigurationFailure::MissingArtifact { index, path });
        }
        artifacts.push(FoldArtifact::read(&path, format)?);
    }

    let mut found = n_folds;
    while dir.join(fold_file_name(template, found)).is_file() {
        found += 1;
    }
    if found != n_folds {
        return Err(ConfigurationFailure::FoldCount {
            expected: n_folds,
            found,
        });
    }

    Ok(artifacts)
}
