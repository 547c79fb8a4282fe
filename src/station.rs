//! Station registry: the read-only lookup table of valid station identifiers.
//!
//! Loaded once at startup from a JSON object keyed by station id:
//!
//! ```json
//! {
//!     "42": { "name": "Alexanderplatz", "lat": 52.5219, "lon": 13.4132 },
//!     "63": { "name": "Ostbahnhof", "lat": 52.5103, "lon": 13.4348 }
//! }
//! ```
//!
//! `latitude`/`longitude` are accepted as aliases of `lat`/`lon`.

use crate::error::ConfigurationFailure;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::Path;
use tracing::info;

/// Station attributes as stored in the registry file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationRecord {
    pub name: String,

    #[serde(alias = "latitude")]
    pub lat: f64,

    #[serde(alias = "longitude")]
    pub lon: f64,
}

/// A registered station.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Station {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,

    /// Position of `id` in lexicographic id order; stable for a given registry.
    pub index: usize,
}

impl Station {
    /// The station's attributes without its registry id and index.
    pub fn record(&self) -> StationRecord {
        StationRecord {
            name: self.name.clone(),
            lat: self.lat,
            lon: self.lon,
        }
    }
}

/// Immutable mapping from station id to [`Station`].
#[derive(Debug, Clone)]
pub struct StationRegistry {
    stations: BTreeMap<String, Station>,
}

impl StationRegistry {
    /// Build a registry from `(id, record)` pairs.
    ///
    /// Fails on an empty input and on coordinates that are not finite or out of range.
    /// A repeated id keeps the last record.
    pub fn from_records<I, S>(records: I) -> Result<Self, ConfigurationFailure>
    where
        I: IntoIterator<Item = (S, StationRecord)>,
        S: Into<String>,
    {
        let records: BTreeMap<String, StationRecord> = records
            .into_iter()
            .map(|(id, record)| (id.into(), record))
            .collect();

        if records.is_empty() {
            return Err(ConfigurationFailure::EmptyRegistry);
        }

        let mut stations = BTreeMap::new();
        for (index, (id, record)) in records.into_iter().enumerate() {
            validate_coordinates(&id, &record)?;
            let station = Station {
                id: id.clone(),
                name: record.name,
                lat: record.lat,
                lon: record.lon,
                index,
            };
            stations.insert(id, station);
        }

        Ok(Self { stations })
    }

    /// Parse a registry from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigurationFailure> {
        let records: BTreeMap<String, StationRecord> = serde_json::from_str(json)?;
        Self::from_records(records)
    }

    /// Parse a registry from a JSON reader.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ConfigurationFailure> {
        let records: BTreeMap<String, StationRecord> = serde_json::from_reader(reader)?;
        Self::from_records(records)
    }

    /// Load a registry from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigurationFailure> {
        let json = fs::read_to_string(path).map_err(|source| ConfigurationFailure::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let registry = Self::from_json_str(&json)?;
        info!(
            path = %path.display(),
            stations = registry.len(),
            "loaded station registry"
        );
        Ok(registry)
    }

    pub fn get(&self, station_id: &str) -> Option<&Station> {
        self.stations.get(station_id)
    }

    pub fn contains(&self, station_id: &str) -> bool {
        self.stations.contains_key(station_id)
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Stations in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Station> {
        self.stations.values()
    }

    /// Id to display name, in id order.
    pub fn names(&self) -> BTreeMap<&str, &str> {
        self.stations
            .values()
            .map(|s| (s.id.as_str(), s.name.as_str()))
            .collect()
    }
}

fn validate_coordinates(id: &str, record: &StationRecord) -> Result<(), ConfigurationFailure> {
    let invalid = |reason: String| ConfigurationFailure::InvalidStation {
        station_id: id.to_string(),
        reason,
    };

    if !record.lat.is_finite() || record.lat.abs() > 90.0 {
        return Err(invalid(format!("latitude {} out of range", record.lat)));
    }
    if !record.lon.is_finite() || record.lon.abs() > 180.0 {
        return Err(invalid(format!("longitude {} out of range", record.lon)));
    }
    Ok(())
}
