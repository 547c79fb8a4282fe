use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use triptime_inference::{
    Config, ConfigurationFailure, EnsemblePredictor, FeatureSchema, Fold, PredictionResult,
    StationRecord, StationRegistry, TripTimeService,
};

fn manifest_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

fn bundled_service() -> TripTimeService {
    let config = Config::from_file(&manifest_dir().join("triptime.toml")).unwrap();
    TripTimeService::from_config(&config).unwrap()
}

/// Fold that counts how often it is asked for a prediction.
struct CountingFold {
    value: f64,
    calls: Arc<AtomicUsize>,
}

impl Fold for CountingFold {
    fn name(&self) -> &str {
        "counting"
    }

    fn num_features(&self) -> usize {
        FeatureSchema::default().len()
    }

    fn predict(&self, _features: &[f32]) -> f64 {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.value
    }
}

fn two_station_registry() -> StationRegistry {
    StationRegistry::from_records([
        (
            "A",
            StationRecord {
                name: "Alexanderplatz".to_string(),
                lat: 52.5219,
                lon: 13.4132,
            },
        ),
        (
            "B",
            StationRecord {
                name: "Ostbahnhof".to_string(),
                lat: 52.5103,
                lon: 13.4348,
            },
        ),
    ])
    .unwrap()
}

fn counting_service(values: &[f64]) -> (TripTimeService, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let folds = values
        .iter()
        .map(|&value| {
            Box::new(CountingFold {
                value,
                calls: Arc::clone(&calls),
            }) as Box<dyn Fold>
        })
        .collect();
    let predictor = EnsemblePredictor::from_folds(FeatureSchema::default(), values.len(), folds).unwrap();
    let service = TripTimeService::new(Arc::new(two_station_registry()), Arc::new(predictor));
    (service, calls)
}

fn copy_bundle(dest: &Path, n_folds: usize) -> PathBuf {
    let models = dest.join("models");
    fs::create_dir_all(&models).unwrap();
    fs::copy(
        manifest_dir().join("assets/stations.json"),
        dest.join("stations.json"),
    )
    .unwrap();
    for i in 0..n_folds {
        let name = format!("fold_{i}.json");
        fs::copy(manifest_dir().join("assets/models").join(&name), models.join(&name)).unwrap();
    }

    let config_path = dest.join("triptime.toml");
    fs::write(
        &config_path,
        "stations = \"stations.json\"\nmodels_dir = \"models\"\nn_folds = 10\n",
    )
    .unwrap();
    config_path
}

#[test]
fn test_two_station_scenario() {
    let (service, _) = counting_service(&[12.0; 10]);

    assert_eq!(service.predict_trip_time("A", "B"), PredictionResult::valid(12.0));
    assert_eq!(service.predict_trip_time("A", "Z"), PredictionResult { value: 0.0, valid: false });
    assert_eq!(service.predict_trip_time("Z", "B"), PredictionResult { value: 0.0, valid: false });
}

#[test]
fn test_invalid_station_never_reaches_folds() {
    let (service, calls) = counting_service(&[5.0, 6.0, 7.0]);

    for (start, end) in [("A", "Z"), ("Z", "B"), ("Z", "Z"), ("", "A")] {
        assert!(!service.predict_trip_time(start, end).valid);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    assert!(service.predict_trip_time("A", "B").valid);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_constant_folds_give_constant() {
    let (service, _) = counting_service(&[0.7; 10]);
    assert_eq!(service.predict_trip_time("B", "A").value, 0.7);
    assert_eq!(service.predictor().n_folds(), 10);
}

#[test]
fn test_aggregate_is_mean_of_folds() {
    let values = [4.0, 9.5, 11.25, 7.0, 3.3, 8.8, 10.0, 2.2, 6.6, 5.4];
    let (service, _) = counting_service(&values);

    let expected = values.iter().sum::<f64>() / values.len() as f64;
    let result = service.predict_trip_time("A", "B");
    assert!(result.valid);
    assert!((result.value - expected).abs() < 1e-9);
}

#[test]
fn test_bundled_models_all_pairs_valid() {
    let service = bundled_service();
    assert_eq!(service.predictor().n_folds(), 10);

    let ids: Vec<String> = service.registry().iter().map(|s| s.id.clone()).collect();
    assert_eq!(ids.len(), 8);

    for start in &ids {
        for end in &ids {
            let result = service.predict_trip_time(start, end);
            assert!(result.valid, "{start} -> {end} should be valid");
            assert!(result.value.is_finite());
            assert!(result.value >= 0.0);
        }
    }
}

#[test]
fn test_bundled_models_deterministic() {
    let service = bundled_service();
    let first = service.predict_trip_time("1", "8");
    let second = service.predict_trip_time("1", "8");
    assert_eq!(first.value.to_bits(), second.value.to_bits());

    let reloaded = bundled_service().predict_trip_time("1", "8");
    assert_eq!(first.value.to_bits(), reloaded.value.to_bits());
}

#[test]
fn test_bundled_models_same_station() {
    let service = bundled_service();
    let result = service.predict_trip_time("3", "3");
    assert!(result.valid);
    // Zero distance lands in the shortest-trip leaves: 3.45 + 2.4 - 0.5
    assert!((result.value - 5.35).abs() < 1e-4);
}

#[test]
fn test_longer_trips_take_longer() {
    let service = bundled_service();
    // Alexanderplatz -> Hackescher Markt is a short hop, Warschauer Str -> Hauptbahnhof crosses town
    let short = service.predict_trip_time("1", "4");
    let long = service.predict_trip_time("3", "8");
    assert!(short.value < long.value);
}

#[test]
fn test_missing_fold_fails_startup() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = copy_bundle(dir.path(), 9);
    let config = Config::from_file(&config_path).unwrap();

    let err = TripTimeService::from_config(&config).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigurationFailure>(),
        Some(ConfigurationFailure::MissingArtifact { index: 9, .. })
    ));
}

#[test]
fn test_complete_copy_starts() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = copy_bundle(dir.path(), 10);
    let config = Config::from_file(&config_path).unwrap();

    let service = TripTimeService::from_config(&config).unwrap();
    assert_eq!(
        service.predict_trip_time("1", "2"),
        bundled_service().predict_trip_time("1", "2")
    );
}

#[test]
fn test_fold_count_mismatch_fails_startup() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = copy_bundle(dir.path(), 10);
    let mut config = Config::from_file(&config_path).unwrap();
    config.n_folds = 9;

    let err = TripTimeService::from_config(&config).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigurationFailure>(),
        Some(ConfigurationFailure::FoldCount { expected: 9, found: 10 })
    ));
}

#[test]
fn test_schema_drift_fails_startup() {
    let mut config = Config::from_file(&manifest_dir().join("triptime.toml")).unwrap();
    config.schema.features.pop();

    let err = TripTimeService::from_config(&config).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigurationFailure>(),
        Some(ConfigurationFailure::FeatureCount { expected: 8, found: 9, .. })
    ));
}

#[test]
fn test_concurrent_requests_share_state() {
    let service = bundled_service();
    let expected = service.predict_trip_time("2", "6");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = service.clone();
            thread::spawn(move || {
                (0..100)
                    .map(|_| service.predict_trip_time("2", "6"))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for handle in handles {
        for result in handle.join().unwrap() {
            assert_eq!(result, expected);
        }
    }
}
