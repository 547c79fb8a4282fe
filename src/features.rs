//! Feature construction for model inputs.
//!
//! Maps a `(start, end)` station pair to a fixed-order numeric vector. The order and
//! contents are defined by a [`FeatureSchema`], which must be the schema the fold
//! models were trained on. Any drift between the two produces silently wrong
//! predictions, so the schema is versioned and checked against every fold at load time.

use crate::error::{ConfigurationFailure, LookupFailure};
use crate::station::{Station, StationRegistry};
use geo::{Bearing, Distance, Haversine, Point};
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Which end of the trip a station identifier refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Start,
    End,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Start => write!(f, "start"),
            Role::End => write!(f, "end"),
        }
    }
}

/// One column of the feature vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    /// Registry ordinal of the start station
    StartIndex,
    /// Registry ordinal of the end station
    EndIndex,
    StartLatitude,
    StartLongitude,
    EndLatitude,
    EndLongitude,
    /// End minus start latitude (degrees)
    DeltaLatitude,
    /// End minus start longitude (degrees)
    DeltaLongitude,
    /// Great-circle distance (km)
    HaversineKm,
    /// North-south leg plus east-west leg, each measured on the sphere (km)
    ManhattanKm,
    /// Initial bearing from start to end, degrees in `[0, 360)`
    BearingDeg,
    /// 1.0 for a round trip to the same station, 0.0 otherwise
    SameStation,
}

impl FeatureKind {
    pub fn name(&self) -> &'static str {
        match self {
            FeatureKind::StartIndex => "start_index",
            FeatureKind::EndIndex => "end_index",
            FeatureKind::StartLatitude => "start_latitude",
            FeatureKind::StartLongitude => "start_longitude",
            FeatureKind::EndLatitude => "end_latitude",
            FeatureKind::EndLongitude => "end_longitude",
            FeatureKind::DeltaLatitude => "delta_latitude",
            FeatureKind::DeltaLongitude => "delta_longitude",
            FeatureKind::HaversineKm => "haversine_km",
            FeatureKind::ManhattanKm => "manhattan_km",
            FeatureKind::BearingDeg => "bearing_deg",
            FeatureKind::SameStation => "same_station",
        }
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Versioned, ordered list of features the folds were trained on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    /// Schema version; fold artifacts that declare a version must match it
    pub version: u32,

    /// Feature columns in training order
    pub features: Vec<FeatureKind>,
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self {
            version: 1,
            features: vec![
                FeatureKind::StartIndex,
                FeatureKind::EndIndex,
                FeatureKind::StartLatitude,
                FeatureKind::StartLongitude,
                FeatureKind::EndLatitude,
                FeatureKind::EndLongitude,
                FeatureKind::HaversineKm,
                FeatureKind::ManhattanKm,
                FeatureKind::BearingDeg,
            ],
        }
    }
}

impl FeatureSchema {
    pub fn new(version: u32, features: Vec<FeatureKind>) -> Result<Self, ConfigurationFailure> {
        let schema = Self { version, features };
        schema.validate()?;
        Ok(schema)
    }

    /// Reject empty schemas and repeated columns.
    pub fn validate(&self) -> Result<(), ConfigurationFailure> {
        if self.features.is_empty() {
            return Err(ConfigurationFailure::EmptySchema);
        }
        let mut seen = HashSet::with_capacity(self.features.len());
        for kind in &self.features {
            if !seen.insert(*kind) {
                return Err(ConfigurationFailure::DuplicateFeature(*kind));
            }
        }
        Ok(())
    }

    /// Number of columns in every feature vector built with this schema.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Column position of `kind`, if the schema contains it.
    pub fn position(&self, kind: FeatureKind) -> Option<usize> {
        self.features.iter().position(|k| *k == kind)
    }
}

/// Fixed-order numeric encoding of one trip.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: Vec<f32>,
}

impl FeatureVector {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn view(&self) -> ArrayView1<'_, f32> {
        ArrayView1::from(self.values.as_slice())
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.values
    }
}

/// Single-use builder turning two station identifiers into a [`FeatureVector`].
///
/// Call [`set`](Self::set) for both roles, then [`transform`](Self::transform), which
/// consumes the builder.
///
/// # Example
/// ```
/// use triptime_inference::{FeatureBuilder, FeatureSchema, Role, StationRegistry};
///
/// let registry = StationRegistry::from_json_str(
///     r#"{"A": {"name": "A", "lat": 52.52, "lon": 13.41},
///         "B": {"name": "B", "lat": 52.51, "lon": 13.43}}"#,
/// ).unwrap();
/// let schema = FeatureSchema::default();
///
/// let mut builder = FeatureBuilder::new(&registry, &schema);
/// builder.set("A", Role::Start).unwrap();
/// builder.set("B", Role::End).unwrap();
/// let features = builder.transform().unwrap();
/// assert_eq!(features.len(), schema.len());
/// ```
#[derive(Debug)]
pub struct FeatureBuilder<'a> {
    registry: &'a StationRegistry,
    schema: &'a FeatureSchema,
    start: Option<Result<&'a Station, LookupFailure>>,
    end: Option<Result<&'a Station, LookupFailure>>,
}

impl<'a> FeatureBuilder<'a> {
    pub fn new(registry: &'a StationRegistry, schema: &'a FeatureSchema) -> Self {
        Self {
            registry,
            schema,
            start: None,
            end: None,
        }
    }

    /// Stage the station for `role`.
    ///
    /// An unknown identifier is reported here and again by [`transform`](Self::transform).
    /// Setting a role twice replaces the earlier value.
    pub fn set(&mut self, station_id: &str, role: Role) -> Result<(), LookupFailure> {
        let staged = self
            .registry
            .get(station_id)
            .ok_or_else(|| LookupFailure::UnknownStation {
                role,
                station_id: station_id.to_string(),
            });
        let outcome = staged.as_ref().map(|_| ()).map_err(Clone::clone);

        match role {
            Role::Start => self.start = Some(staged),
            Role::End => self.end = Some(staged),
        }
        outcome
    }

    /// Encode the staged stations in schema order.
    pub fn transform(self) -> Result<FeatureVector, LookupFailure> {
        let start = self.start.ok_or(LookupFailure::Unset(Role::Start))??;
        let end = self.end.ok_or(LookupFailure::Unset(Role::End))??;

        let pair = StationPair::new(start, end);
        let values = self
            .schema
            .features
            .iter()
            .map(|kind| pair.feature(*kind) as f32)
            .collect();

        Ok(FeatureVector { values })
    }
}

/// Derived quantities for one start/end pair.
struct StationPair<'a> {
    start: &'a Station,
    end: &'a Station,
}

impl<'a> StationPair<'a> {
    fn new(start: &'a Station, end: &'a Station) -> Self {
        Self { start, end }
    }

    fn same_station(&self) -> bool {
        self.start.id == self.end.id
    }

    fn feature(&self, kind: FeatureKind) -> f64 {
        match kind {
            FeatureKind::StartIndex => self.start.index as f64,
            FeatureKind::EndIndex => self.end.index as f64,
            FeatureKind::StartLatitude => self.start.lat,
            FeatureKind::StartLongitude => self.start.lon,
            FeatureKind::EndLatitude => self.end.lat,
            FeatureKind::EndLongitude => self.end.lon,
            FeatureKind::DeltaLatitude => self.end.lat - self.start.lat,
            FeatureKind::DeltaLongitude => self.end.lon - self.start.lon,
            FeatureKind::HaversineKm => haversine_km(self.start, self.end),
            FeatureKind::ManhattanKm => manhattan_km(self.start, self.end),
            FeatureKind::BearingDeg => {
                if self.same_station() {
                    0.0
                } else {
                    bearing_deg(self.start, self.end)
                }
            }
            FeatureKind::SameStation => {
                if self.same_station() {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

fn point(station: &Station) -> Point<f64> {
    Point::new(station.lon, station.lat)
}

/// Great-circle distance between two stations in kilometres.
pub fn haversine_km(start: &Station, end: &Station) -> f64 {
    Haversine.distance(point(start), point(end)) / 1000.0
}

/// Distance along a north-south leg then an east-west leg, in kilometres.
pub fn manhattan_km(start: &Station, end: &Station) -> f64 {
    let corner = Point::new(end.lon, start.lat);
    (Haversine.distance(point(start), corner) + Haversine.distance(corner, point(end))) / 1000.0
}

/// Initial bearing from `start` to `end`, normalized to `[0, 360)` degrees.
pub fn bearing_deg(start: &Station, end: &Station) -> f64 {
    let bearing = Haversine.bearing(point(start), point(end));
    bearing.rem_euclid(360.0)
}
