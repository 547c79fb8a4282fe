//! Typed failures of the prediction pipeline.
//!
//! [`LookupFailure`] is an expected, per-request outcome and is recovered into an
//! invalid [`PredictionResult`](crate::PredictionResult). [`ConfigurationFailure`]
//! only happens while loading and must stop the process from serving.

use crate::features::{FeatureKind, Role};
use std::io;
use std::path::PathBuf;

/// A station identifier could not be resolved while building features.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupFailure {
    #[error("unknown {role} station id '{station_id}'")]
    UnknownStation { role: Role, station_id: String },

    #[error("{0} station was never set")]
    Unset(Role),
}

impl LookupFailure {
    /// Role whose identifier failed to resolve.
    pub fn role(&self) -> Role {
        match self {
            LookupFailure::UnknownStation { role, .. } => *role,
            LookupFailure::Unset(role) => *role,
        }
    }
}

/// Startup failure: the registry, schema or fold artifacts are unusable.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationFailure {
    #[error("n_folds must be at least 1")]
    NoFolds,

    #[error("expected {expected} fold artifacts, found {found}")]
    FoldCount { expected: usize, found: usize },

    #[error("fold '{fold}' expects {found} features but the schema defines {expected}")]
    FeatureCount {
        fold: String,
        expected: usize,
        found: usize,
    },

    #[error("fold '{fold}' was trained on schema version {found}, configured schema is version {expected}")]
    SchemaVersion { fold: String, expected: u32, found: u32 },

    #[error("invalid fold artifact '{fold}': {reason}")]
    InvalidArtifact { fold: String, reason: String },

    #[error("fold artifact {index} not found at {}", path.display())]
    MissingArtifact { index: usize, path: PathBuf },

    #[error("fold file template '{0}' does not contain '{{fold}}'")]
    FoldTemplate(String),

    #[error("fold artifact format '{0}' is not supported by this build")]
    UnsupportedFormat(String),

    #[error("feature schema is empty")]
    EmptySchema,

    #[error("feature schema lists '{0}' more than once")]
    DuplicateFeature(FeatureKind),

    #[error("station registry is empty")]
    EmptyRegistry,

    #[error("invalid station '{station_id}': {reason}")]
    InvalidStation { station_id: String, reason: String },

    #[error("failed to parse station registry: {0}")]
    RegistryFormat(#[from] serde_json::Error),

    #[error("I/O error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_failure_message() {
        let err = LookupFailure::UnknownStation {
            role: Role::End,
            station_id: "Z".to_string(),
        };
        assert_eq!(err.to_string(), "unknown end station id 'Z'");
        assert_eq!(err.role(), Role::End);
        assert_eq!(LookupFailure::Unset(Role::Start).to_string(), "start station was never set");
    }

    #[test]
    fn test_fold_count_message() {
        let err = ConfigurationFailure::FoldCount {
            expected: 10,
            found: 9,
        };
        assert_eq!(err.to_string(), "expected 10 fold artifacts, found 9");
    }
}
