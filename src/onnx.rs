//! ONNX-exported folds, run through ONNX Runtime.
//!
//! Enabled with the `onnx` cargo feature. The graph must take a single `f32` input of
//! shape `[1, num_features]`; the first element of the first output is the prediction.

use crate::error::ConfigurationFailure;
use crate::fold::Fold;
use ndarray::Array2;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use std::sync::Mutex;

/// A fold backed by an ONNX Runtime session.
///
/// `Session::run` needs exclusive access, so the session sits behind a mutex. Prefer
/// the native `json` format when folds are scored from many threads.
pub struct OnnxFold {
    name: String,
    num_features: usize,
    session: Mutex<Session>,
}

impl OnnxFold {
    /// Build a session from in-memory model bytes for a `[1, num_features]` input.
    ///
    /// The graph is run once on a zero vector so a model built for another width fails
    /// here instead of at the first request.
    pub fn from_bytes(
        name: impl Into<String>,
        bytes: &[u8],
        num_features: usize,
    ) -> Result<Self, ConfigurationFailure> {
        let name = name.into();
        let invalid = |reason: String| ConfigurationFailure::InvalidArtifact {
            fold: name.clone(),
            reason,
        };

        if num_features == 0 {
            return Err(invalid("num_features must be positive".to_string()));
        }

        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(1)) // Single-threaded for determinism
            .and_then(|b| b.commit_from_memory(bytes))
            .map_err(|e| invalid(e.to_string()))?;

        let fold = Self {
            name: name.clone(),
            num_features,
            session: Mutex::new(session),
        };
        fold.run(&vec![0.0; num_features])
            .map_err(|e| invalid(format!("graph rejects a [1, {num_features}] input: {e}")))?;
        Ok(fold)
    }

    fn run(&self, features: &[f32]) -> ort::Result<f64> {
        let input = Array2::from_shape_vec((1, features.len()), features.to_vec())
            .map_err(|e| ort::Error::new(e.to_string()))?;
        let input_tensor = Value::from_array(input)?;

        // Sessions hold no per-request state, so a poisoned lock is still usable
        let mut session = self
            .session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let outputs = session.run(ort::inputs![input_tensor])?;
        let (_, data) = outputs[0].try_extract_tensor::<f32>()?;

        data.first()
            .map(|&v| f64::from(v))
            .ok_or_else(|| ort::Error::new("model produced an empty output"))
    }
}

impl Fold for OnnxFold {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_features(&self) -> usize {
        self.num_features
    }

    fn predict(&self, features: &[f32]) -> f64 {
        match self.run(features) {
            Ok(value) => value,
            Err(e) => panic!("ONNX fold '{}' failed at inference: {e}", self.name),
        }
    }
}
