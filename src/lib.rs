//! Bike-share trip duration inference.
//!
//! Validates a pair of station identifiers against a station registry, encodes them
//! into a fixed-order feature vector and averages the predictions of k independently
//! trained tree-ensemble folds.

pub mod config;
pub mod error;
pub mod features;
pub mod fold;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod predictor;
pub mod service;
pub mod station;
pub mod tree;

pub use config::Config;
pub use error::{ConfigurationFailure, LookupFailure};
pub use features::{FeatureBuilder, FeatureKind, FeatureSchema, FeatureVector, Role};
pub use fold::{read_fold_artifacts, ArtifactFormat, Fold, FoldArtifact};
pub use predictor::{EnsemblePredictor, DEFAULT_N_FOLDS};
pub use service::{PredictionResult, TripEstimate, TripTimeService};
pub use station::{Station, StationRecord, StationRegistry};
pub use tree::TreeEnsemble;

/// Library-wide error type for startup paths.
pub type Result<T> = anyhow::Result<T>;
