//! Trip-time prediction for a pair of station identifiers.
//!
//! [`TripTimeService`] ties the station registry and the fold ensemble together. Both
//! are loaded before the service exists and are shared read-only, so one service can
//! be cloned into every request handler.

use crate::config::Config;
use crate::error::LookupFailure;
use crate::features::{FeatureBuilder, Role};
use crate::fold::read_fold_artifacts;
use crate::predictor::EnsemblePredictor;
use crate::station::{StationRecord, StationRegistry};
use crate::Result;
use anyhow::Context;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of [`TripTimeService::predict_trip_time`].
///
/// `valid == false` means a station id was unknown; `value` is then `0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PredictionResult {
    /// Predicted trip time in minutes
    pub value: f64,
    pub valid: bool,
}

impl PredictionResult {
    pub fn valid(value: f64) -> Self {
        Self { value, valid: true }
    }

    pub fn invalid() -> Self {
        Self {
            value: 0.0,
            valid: false,
        }
    }
}

/// A prediction together with both station records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripEstimate {
    pub start: StationRecord,
    pub destination: StationRecord,
    pub time_predicted: f64,
}

/// Shared, read-only prediction service.
#[derive(Debug, Clone)]
pub struct TripTimeService {
    registry: Arc<StationRegistry>,
    predictor: Arc<EnsemblePredictor>,
}

impl TripTimeService {
    pub fn new(registry: Arc<StationRegistry>, predictor: Arc<EnsemblePredictor>) -> Self {
        Self {
            registry,
            predictor,
        }
    }

    /// Load the registry and every fold described by `config`.
    ///
    /// Any failure here is fatal: the service must not start without a complete
    /// registry and ensemble.
    pub fn from_config(config: &Config) -> Result<Self> {
        let registry = StationRegistry::from_path(&config.stations)
            .with_context(|| format!("failed to load stations from {}", config.stations.display()))?;

        let artifacts = read_fold_artifacts(
            &config.models_dir,
            &config.fold_file,
            config.n_folds,
            config.artifact_format,
        )
        .with_context(|| format!("failed to read folds from {}", config.models_dir.display()))?;

        let predictor = EnsemblePredictor::from_artifacts(config.schema.clone(), config.n_folds, &artifacts)
            .context("failed to build fold ensemble")?;

        info!(
            stations = registry.len(),
            folds = predictor.n_folds(),
            "trip time service ready"
        );
        Ok(Self::new(Arc::new(registry), Arc::new(predictor)))
    }

    pub fn registry(&self) -> &StationRegistry {
        &self.registry
    }

    pub fn predictor(&self) -> &EnsemblePredictor {
        &self.predictor
    }

    /// Predict trip time from `start_id` to `end_id`.
    ///
    /// Unknown identifiers yield [`PredictionResult::invalid`] without running any fold.
    ///
    /// # Panics
    /// If the ensemble produces NaN or an infinite value. Native folds are bounded at
    /// load, so this only happens with a faulty [`Fold`](crate::Fold) implementation.
    pub fn predict_trip_time(&self, start_id: &str, end_id: &str) -> PredictionResult {
        match self.try_predict(start_id, end_id) {
            Ok(value) => PredictionResult::valid(value),
            Err(failure) => {
                debug!(start_id, end_id, %failure, "station lookup failed");
                PredictionResult::invalid()
            }
        }
    }

    /// Predict trip time and return it with both station records.
    pub fn estimate(&self, start_id: &str, end_id: &str) -> std::result::Result<TripEstimate, LookupFailure> {
        let time_predicted = self.try_predict(start_id, end_id)?;
        let lookup = |station_id: &str, role: Role| {
            self.registry
                .get(station_id)
                .map(|station| station.record())
                .ok_or_else(|| LookupFailure::UnknownStation {
                    role,
                    station_id: station_id.to_string(),
                })
        };

        Ok(TripEstimate {
            start: lookup(start_id, Role::Start)?,
            destination: lookup(end_id, Role::End)?,
            time_predicted,
        })
    }

    /// Station id to display name.
    pub fn station_names(&self) -> BTreeMap<&str, &str> {
        self.registry.names()
    }

    /// Station id to its full record, in id order.
    pub fn stations(&self) -> BTreeMap<&str, StationRecord> {
        self.registry
            .iter()
            .map(|station| (station.id.as_str(), station.record()))
            .collect()
    }

    fn try_predict(&self, start_id: &str, end_id: &str) -> std::result::Result<f64, LookupFailure> {
        let mut builder = FeatureBuilder::new(&self.registry, self.predictor.schema());
        builder.set(start_id, Role::Start)?;
        builder.set(end_id, Role::End)?;
        let features = builder.transform()?;

        let value = self.predictor.predict(&features);
        assert!(
            value.is_finite(),
            "ensemble produced non-finite trip time {value} for {start_id} -> {end_id}"
        );
        if value < 0.0 {
            warn!(start_id, end_id, value, "negative trip time clamped to zero");
            return Ok(0.0);
        }
        Ok(value)
    }
}
