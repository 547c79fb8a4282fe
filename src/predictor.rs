//! Ensemble inference over k independently trained folds.
//!
//! Provides [`EnsemblePredictor`], which owns every fold for the lifetime of the
//! process and combines their outputs with an equal-weight mean.

use crate::error::ConfigurationFailure;
use crate::features::{FeatureSchema, FeatureVector};
use crate::fold::{Fold, FoldArtifact};
use ndarray::{Array1, ArrayView2};
use std::borrow::Cow;
use std::fmt;
use tracing::{debug, info};

/// Number of folds persisted by the standard training run.
pub const DEFAULT_N_FOLDS: usize = 10;

/// Read-only ensemble of fold models.
///
/// All folds are decoded and checked against the feature schema at construction;
/// a predictor that exists is ready to serve. Cheap to share behind an `Arc`.
pub struct EnsemblePredictor {
    schema: FeatureSchema,
    folds: Vec<Box<dyn Fold>>,
}

impl fmt::Debug for EnsemblePredictor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnsemblePredictor")
            .field("schema", &self.schema)
            .field("folds", &self.folds.iter().map(|fold| fold.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl EnsemblePredictor {
    /// Decode `artifacts` and build the ensemble.
    ///
    /// # Arguments
    /// * `schema` - Feature schema the folds were trained on
    /// * `n_folds` - Number of folds persisted at training time
    /// * `artifacts` - One artifact per fold, in fold order
    ///
    /// # Example
    /// ```no_run
    /// use triptime_inference::{read_fold_artifacts, ArtifactFormat, EnsemblePredictor, FeatureSchema};
    /// use std::path::Path;
    ///
    /// let artifacts =
    ///     read_fold_artifacts(Path::new("models"), "fold_{fold}.json", 10, ArtifactFormat::Json).unwrap();
    /// let predictor = EnsemblePredictor::from_artifacts(FeatureSchema::default(), 10, &artifacts).unwrap();
    /// ```
    pub fn from_artifacts(
        schema: FeatureSchema,
        n_folds: usize,
        artifacts: &[FoldArtifact],
    ) -> Result<Self, ConfigurationFailure> {
        schema.validate()?;
        check_fold_count(n_folds, artifacts.len())?;
        let folds = artifacts
            .iter()
            .map(|artifact| artifact.decode(schema.len()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_folds(schema, n_folds, folds)
    }

    /// Build the ensemble from already decoded folds.
    pub fn from_folds(
        schema: FeatureSchema,
        n_folds: usize,
        folds: Vec<Box<dyn Fold>>,
    ) -> Result<Self, ConfigurationFailure> {
        schema.validate()?;
        check_fold_count(n_folds, folds.len())?;

        for fold in &folds {
            if fold.num_features() != schema.len() {
                return Err(ConfigurationFailure::FeatureCount {
                    fold: fold.name().to_string(),
                    expected: schema.len(),
                    found: fold.num_features(),
                });
            }
            if let Some(version) = fold.schema_version() {
                if version != schema.version {
                    return Err(ConfigurationFailure::SchemaVersion {
                        fold: fold.name().to_string(),
                        expected: schema.version,
                        found: version,
                    });
                }
            }
        }

        info!(
            folds = folds.len(),
            features = schema.len(),
            schema_version = schema.version,
            "loaded fold ensemble"
        );
        Ok(Self { schema, folds })
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn n_folds(&self) -> usize {
        self.folds.len()
    }

    pub fn folds(&self) -> impl Iterator<Item = &dyn Fold> {
        self.folds.iter().map(|fold| &**fold)
    }

    /// Each fold's prediction, in fold order.
    pub fn fold_predictions(&self, features: &FeatureVector) -> Array1<f64> {
        self.check_shape(features.len());
        self.folds
            .iter()
            .map(|fold| fold.predict(features.as_slice()))
            .collect()
    }

    /// Equal-weight mean of all fold predictions.
    ///
    /// # Panics
    /// If `features` does not have one value per schema column. Vectors produced by
    /// [`FeatureBuilder`](crate::FeatureBuilder) with this predictor's schema always do.
    pub fn predict(&self, features: &FeatureVector) -> f64 {
        self.check_shape(features.len());
        let value = self.aggregate(features.as_slice());
        debug!(prediction = value, "ensemble prediction");
        value
    }

    /// Score a matrix of feature rows, one aggregate per row.
    ///
    /// # Panics
    /// If the number of columns differs from the schema length.
    pub fn predict_batch(&self, rows: ArrayView2<'_, f32>) -> Array1<f64> {
        self.check_shape(rows.ncols());
        rows.outer_iter()
            .map(|row| {
                let values = row
                    .as_slice()
                    .map(Cow::Borrowed)
                    .unwrap_or_else(|| Cow::Owned(row.to_vec()));
                self.aggregate(&values)
            })
            .collect()
    }

    /// Running mean in fold order: exact when every fold agrees, deterministic always.
    fn aggregate(&self, features: &[f32]) -> f64 {
        self.folds
            .iter()
            .enumerate()
            .fold(0.0, |mean, (i, fold)| {
                mean + (fold.predict(features) - mean) / (i + 1) as f64
            })
    }

    fn check_shape(&self, len: usize) {
        assert_eq!(
            len,
            self.schema.len(),
            "feature vector has {len} values but the folds expect {}",
            self.schema.len()
        );
    }
}

fn check_fold_count(n_folds: usize, found: usize) -> Result<(), ConfigurationFailure> {
    if n_folds == 0 {
        return Err(ConfigurationFailure::NoFolds);
    }
    if found != n_folds {
        return Err(ConfigurationFailure::FoldCount {
            expected: n_folds,
            found,
        });
    }
    Ok(())
}
