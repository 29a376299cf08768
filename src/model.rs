//! Canonical activity model spanning TCX / GPX / FIT.
//!
//! One [`Activity`] owns its [`Lap`]s and [`TrackPoint`]s by value. Entities
//! are built once per load through their builders, validated eagerly, and
//! treated as immutable values afterwards. Everything derivable (end time,
//! duration, GPS presence, bounding box) is a method recomputed from the
//! timeline, never a stored field, so derived data cannot drift.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::normalize::normalize;
use crate::units::{Bpm, Latitude, Longitude, Meters, Rpm, Seconds, SpeedMps, Watts};

/// Source serialization an activity was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Tcx,
    Gpx,
    Fit,
    Other,
}

/// A GPS fix. Latitude and longitude always travel together; a point either
/// has a full position or none at all.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: Latitude,
    pub longitude: Longitude,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ValidationError> {
        Ok(Self {
            latitude: Latitude::new(latitude)?,
            longitude: Longitude::new(longitude)?,
        })
    }
}

/// Bounding box over all GPS-bearing points of an activity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

/// Inclusive index range into `Activity::track_points`. A non-owning position
/// reference: re-validated by the derivation pass, never dereferenced blindly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointRange {
    pub start: usize,
    pub end: usize,
}

impl PointRange {
    pub fn new(start: usize, end: usize) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::InvertedRange { start, end });
        }
        Ok(Self { start, end })
    }
}

/// Metadata about the device or app that recorded the activity.
/// Descriptive only; no invariants.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_name: Option<String>,
    pub manufacturer: Option<String>,
    pub product_id: Option<String>,
    pub firmware_version: Option<String>,
}

// ============================================================================
// TrackPoint
// ============================================================================

/// Single timestamped sample in the activity timeline (GPS + sensors).
/// Superset of the per-point fields of GPX, TCX and FIT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    /// Sample timestamp, normalized to UTC.
    pub timestamp: DateTime<Utc>,
    /// GPS fix; `None` for non-GPS samples (e.g. indoor trainer).
    pub position: Option<Position>,
    /// Elevation in meters above sea level.
    pub elevation: Option<f64>,
    /// Cumulative distance from start to this sample.
    pub distance: Option<Meters>,
    /// Instantaneous speed.
    pub speed: Option<SpeedMps>,
    pub heart_rate: Option<Bpm>,
    pub cadence: Option<Rpm>,
    pub power: Option<Watts>,
    /// Ambient or skin temperature in °C.
    pub temperature: Option<f64>,
    /// Ordinal position in the original file's document order. Stable across
    /// the whole activity, never reset per lap.
    pub source_index: usize,
    /// Source fields the canonical model does not map.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extensions: HashMap<String, serde_json::Value>,
}

impl TrackPoint {
    pub fn builder(timestamp: DateTime<Utc>, source_index: usize) -> TrackPointBuilder {
        TrackPointBuilder::new(timestamp, source_index)
    }

    /// Latitude in decimal degrees, when a GPS fix exists.
    pub fn latitude(&self) -> Option<f64> {
        self.position.map(|p| p.latitude.get())
    }

    /// Longitude in decimal degrees, when a GPS fix exists.
    pub fn longitude(&self) -> Option<f64> {
        self.position.map(|p| p.longitude.get())
    }
}

/// Builder validating a [`TrackPoint`] from raw parsed values.
///
/// Loaders feed unchecked numbers; `build` enforces the GPS-pair invariant and
/// every range in one place.
#[derive(Debug, Clone)]
pub struct TrackPointBuilder {
    timestamp: DateTime<Utc>,
    source_index: usize,
    latitude: Option<f64>,
    longitude: Option<f64>,
    elevation: Option<f64>,
    distance: Option<f64>,
    speed: Option<f64>,
    heart_rate: Option<i64>,
    cadence: Option<i64>,
    power: Option<i64>,
    temperature: Option<f64>,
    extensions: HashMap<String, serde_json::Value>,
}

impl TrackPointBuilder {
    pub fn new(timestamp: DateTime<Utc>, source_index: usize) -> Self {
        Self {
            timestamp,
            source_index,
            latitude: None,
            longitude: None,
            elevation: None,
            distance: None,
            speed: None,
            heart_rate: None,
            cadence: None,
            power: None,
            temperature: None,
            extensions: HashMap::new(),
        }
    }

    pub fn latitude(mut self, value: Option<f64>) -> Self {
        self.latitude = value;
        self
    }

    pub fn longitude(mut self, value: Option<f64>) -> Self {
        self.longitude = value;
        self
    }

    pub fn elevation(mut self, value: Option<f64>) -> Self {
        self.elevation = value;
        self
    }

    pub fn distance(mut self, value: Option<f64>) -> Self {
        self.distance = value;
        self
    }

    pub fn speed(mut self, value: Option<f64>) -> Self {
        self.speed = value;
        self
    }

    pub fn heart_rate(mut self, value: Option<i64>) -> Self {
        self.heart_rate = value;
        self
    }

    pub fn cadence(mut self, value: Option<i64>) -> Self {
        self.cadence = value;
        self
    }

    pub fn power(mut self, value: Option<i64>) -> Self {
        self.power = value;
        self
    }

    pub fn temperature(mut self, value: Option<f64>) -> Self {
        self.temperature = value;
        self
    }

    /// Record an unmapped source field in the extension bag.
    pub fn extension(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extensions.insert(key.into(), value);
        self
    }

    pub fn build(self) -> Result<TrackPoint, ValidationError> {
        let position = match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(Position::new(lat, lon)?),
            (None, None) => None,
            _ => return Err(ValidationError::UnpairedPosition),
        };
        Ok(TrackPoint {
            timestamp: self.timestamp,
            position,
            elevation: self.elevation,
            distance: self.distance.map(Meters::new).transpose()?,
            speed: self.speed.map(SpeedMps::new).transpose()?,
            heart_rate: self.heart_rate.map(Bpm::new).transpose()?,
            cadence: self.cadence.map(Rpm::new).transpose()?,
            power: self.power.map(Watts::new).transpose()?,
            temperature: self.temperature,
            source_index: self.source_index,
            extensions: self.extensions,
        })
    }
}

// ============================================================================
// Lap
// ============================================================================

/// Logical segment of an activity with its own summary statistics. TCX and
/// FIT laps map directly; each GPX track segment becomes one lap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lap {
    /// 0-based lap ordinal in the original source.
    pub index: usize,
    pub start_time: DateTime<Utc>,
    pub total_time: Option<Seconds>,
    pub distance: Option<Meters>,
    pub max_speed: Option<SpeedMps>,
    pub avg_speed: Option<SpeedMps>,
    pub calories: Option<f64>,
    pub avg_heart_rate: Option<Bpm>,
    pub max_heart_rate: Option<Bpm>,
    pub avg_cadence: Option<Rpm>,
    pub max_cadence: Option<Rpm>,
    pub avg_power: Option<Watts>,
    pub max_power: Option<Watts>,
    /// Total positive elevation gain in meters.
    pub ascent: Option<f64>,
    /// Total negative elevation in meters.
    pub descent: Option<f64>,
    /// Intensity label as reported by the source (e.g. "Active", "Resting").
    pub intensity: Option<String>,
    /// Lap trigger as reported by the source (e.g. "Manual", "Distance").
    pub trigger: Option<String>,
    /// Inclusive range this lap covers in `Activity::track_points`. Unset for
    /// laps that contain no points.
    pub point_range: Option<PointRange>,
}

impl Lap {
    pub fn builder(index: usize, start_time: DateTime<Utc>) -> LapBuilder {
        LapBuilder::new(index, start_time)
    }

    /// `start_time + total_time` when the total time is known.
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        let total = self.total_time?;
        let millis = (total.get() * 1000.0).round() as i64;
        Some(self.start_time + Duration::milliseconds(millis))
    }
}

/// Builder validating a [`Lap`] from raw parsed values. A lap without a start
/// time cannot exist; `new` takes it up front.
#[derive(Debug, Clone)]
pub struct LapBuilder {
    index: usize,
    start_time: DateTime<Utc>,
    total_time: Option<f64>,
    distance: Option<f64>,
    max_speed: Option<f64>,
    avg_speed: Option<f64>,
    calories: Option<f64>,
    avg_heart_rate: Option<i64>,
    max_heart_rate: Option<i64>,
    avg_cadence: Option<i64>,
    max_cadence: Option<i64>,
    avg_power: Option<i64>,
    max_power: Option<i64>,
    ascent: Option<f64>,
    descent: Option<f64>,
    intensity: Option<String>,
    trigger: Option<String>,
    point_range: Option<(usize, usize)>,
}

impl LapBuilder {
    pub fn new(index: usize, start_time: DateTime<Utc>) -> Self {
        Self {
            index,
            start_time,
            total_time: None,
            distance: None,
            max_speed: None,
            avg_speed: None,
            calories: None,
            avg_heart_rate: None,
            max_heart_rate: None,
            avg_cadence: None,
            max_cadence: None,
            avg_power: None,
            max_power: None,
            ascent: None,
            descent: None,
            intensity: None,
            trigger: None,
            point_range: None,
        }
    }

    pub fn total_time(mut self, seconds: Option<f64>) -> Self {
        self.total_time = seconds;
        self
    }

    pub fn distance(mut self, meters: Option<f64>) -> Self {
        self.distance = meters;
        self
    }

    pub fn max_speed(mut self, value: Option<f64>) -> Self {
        self.max_speed = value;
        self
    }

    pub fn avg_speed(mut self, value: Option<f64>) -> Self {
        self.avg_speed = value;
        self
    }

    pub fn calories(mut self, value: Option<f64>) -> Self {
        self.calories = value;
        self
    }

    pub fn avg_heart_rate(mut self, value: Option<i64>) -> Self {
        self.avg_heart_rate = value;
        self
    }

    pub fn max_heart_rate(mut self, value: Option<i64>) -> Self {
        self.max_heart_rate = value;
        self
    }

    pub fn avg_cadence(mut self, value: Option<i64>) -> Self {
        self.avg_cadence = value;
        self
    }

    pub fn max_cadence(mut self, value: Option<i64>) -> Self {
        self.max_cadence = value;
        self
    }

    pub fn avg_power(mut self, value: Option<i64>) -> Self {
        self.avg_power = value;
        self
    }

    pub fn max_power(mut self, value: Option<i64>) -> Self {
        self.max_power = value;
        self
    }

    pub fn ascent(mut self, value: Option<f64>) -> Self {
        self.ascent = value;
        self
    }

    pub fn descent(mut self, value: Option<f64>) -> Self {
        self.descent = value;
        self
    }

    pub fn intensity(mut self, value: Option<String>) -> Self {
        self.intensity = value;
        self
    }

    pub fn trigger(mut self, value: Option<String>) -> Self {
        self.trigger = value;
        self
    }

    /// Inclusive point range in the global ordinal sequence.
    pub fn point_range(mut self, start: usize, end: usize) -> Self {
        self.point_range = Some((start, end));
        self
    }

    pub fn build(self) -> Result<Lap, ValidationError> {
        Ok(Lap {
            index: self.index,
            start_time: self.start_time,
            total_time: self.total_time.map(Seconds::new).transpose()?,
            distance: self.distance.map(Meters::new).transpose()?,
            max_speed: self.max_speed.map(SpeedMps::new).transpose()?,
            avg_speed: self.avg_speed.map(SpeedMps::new).transpose()?,
            calories: self.calories,
            avg_heart_rate: self.avg_heart_rate.map(Bpm::new).transpose()?,
            max_heart_rate: self.max_heart_rate.map(Bpm::new).transpose()?,
            avg_cadence: self.avg_cadence.map(Rpm::new).transpose()?,
            max_cadence: self.max_cadence.map(Rpm::new).transpose()?,
            avg_power: self.avg_power.map(Watts::new).transpose()?,
            max_power: self.max_power.map(Watts::new).transpose()?,
            ascent: self.ascent,
            descent: self.descent,
            intensity: self.intensity,
            trigger: self.trigger,
            point_range: self
                .point_range
                .map(|(s, e)| PointRange::new(s, e))
                .transpose()?,
        })
    }
}

// ============================================================================
// Activity
// ============================================================================

/// Unified activity model. Built via [`ActivityBuilder`], which always runs
/// the derivation pass before handing the value out — an `Activity` is never
/// observable in a non-normalized state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Application-level identifier (TCX `<Id>`, GPX track name), if any.
    pub id: Option<String>,
    pub source_format: SourceFormat,
    /// High-level sport type (e.g. "Running", "cycling").
    pub sport: Option<String>,
    /// Sub-sport or profile (e.g. "road", "Indoor cycling").
    pub sub_sport: Option<String>,
    /// Explicit or derived start time. Backfilled from the first track point.
    pub start_time: Option<DateTime<Utc>>,
    /// Explicit or derived total distance. Backfilled from the last point
    /// carrying a cumulative distance; unset means unknown, never zero.
    pub total_distance: Option<Meters>,
    pub total_calories: Option<f64>,
    pub total_ascent: Option<f64>,
    pub total_descent: Option<f64>,
    pub device: Option<DeviceInfo>,
    pub laps: Vec<Lap>,
    /// Flat timeline of all samples, non-decreasing by timestamp.
    pub track_points: Vec<TrackPoint>,
}

impl Activity {
    pub fn builder(source_format: SourceFormat) -> ActivityBuilder {
        ActivityBuilder::new(source_format)
    }

    /// Timestamp of the last sample, if any.
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.track_points.last().map(|tp| tp.timestamp)
    }

    /// `end_time - start_time` when both are known.
    pub fn duration(&self) -> Option<Duration> {
        Some(self.end_time()? - self.start_time?)
    }

    /// Whether any sample carries a GPS fix.
    pub fn has_gps(&self) -> bool {
        self.track_points.iter().any(|tp| tp.position.is_some())
    }

    /// Componentwise min/max over all GPS-bearing samples, or `None` when the
    /// activity has no GPS data.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        let mut bbox: Option<BoundingBox> = None;
        for pos in self.track_points.iter().filter_map(|tp| tp.position) {
            let lat = pos.latitude.get();
            let lon = pos.longitude.get();
            bbox = Some(match bbox {
                None => BoundingBox {
                    min_lat: lat,
                    max_lat: lat,
                    min_lon: lon,
                    max_lon: lon,
                },
                Some(b) => BoundingBox {
                    min_lat: b.min_lat.min(lat),
                    max_lat: b.max_lat.max(lat),
                    min_lon: b.min_lon.min(lon),
                    max_lon: b.max_lon.max(lon),
                },
            });
        }
        bbox
    }

    /// Samples covered by a lap's point range; empty when the lap has none.
    /// Safe to index directly because ranges were validated at build time.
    pub fn lap_points(&self, lap: &Lap) -> &[TrackPoint] {
        match lap.point_range {
            Some(range) => &self.track_points[range.start..=range.end],
            None => &[],
        }
    }
}

/// Builder assembling an [`Activity`] and running the derivation pass.
#[derive(Debug, Clone)]
pub struct ActivityBuilder {
    activity: Activity,
}

impl ActivityBuilder {
    pub fn new(source_format: SourceFormat) -> Self {
        Self {
            activity: Activity {
                id: None,
                source_format,
                sport: None,
                sub_sport: None,
                start_time: None,
                total_distance: None,
                total_calories: None,
                total_ascent: None,
                total_descent: None,
                device: None,
                laps: Vec::new(),
                track_points: Vec::new(),
            },
        }
    }

    pub fn id(mut self, value: Option<String>) -> Self {
        self.activity.id = value;
        self
    }

    pub fn sport(mut self, value: Option<String>) -> Self {
        self.activity.sport = value;
        self
    }

    pub fn sub_sport(mut self, value: Option<String>) -> Self {
        self.activity.sub_sport = value;
        self
    }

    /// Explicit start time from the source; wins over derivation.
    pub fn start_time(mut self, value: Option<DateTime<Utc>>) -> Self {
        self.activity.start_time = value;
        self
    }

    pub fn total_distance(mut self, value: Option<Meters>) -> Self {
        self.activity.total_distance = value;
        self
    }

    pub fn total_calories(mut self, value: Option<f64>) -> Self {
        self.activity.total_calories = value;
        self
    }

    pub fn total_ascent(mut self, value: Option<f64>) -> Self {
        self.activity.total_ascent = value;
        self
    }

    pub fn total_descent(mut self, value: Option<f64>) -> Self {
        self.activity.total_descent = value;
        self
    }

    pub fn device(mut self, value: Option<DeviceInfo>) -> Self {
        self.activity.device = value;
        self
    }

    pub fn laps(mut self, value: Vec<Lap>) -> Self {
        self.activity.laps = value;
        self
    }

    pub fn track_points(mut self, value: Vec<TrackPoint>) -> Self {
        self.activity.track_points = value;
        self
    }

    /// Finish construction: sort the timeline, backfill derivable summaries
    /// and re-validate lap ranges.
    pub fn build(self) -> Result<Activity, ValidationError> {
        let mut activity = self.activity;
        normalize(&mut activity)?;
        Ok(activity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_track_point_pair_atomicity() {
        let full = TrackPoint::builder(ts(0), 0)
            .latitude(Some(10.0))
            .longitude(Some(20.0))
            .build()
            .unwrap();
        assert_eq!(full.latitude(), Some(10.0));
        assert_eq!(full.longitude(), Some(20.0));

        let none = TrackPoint::builder(ts(0), 0).build().unwrap();
        assert!(none.position.is_none());

        let lone = TrackPoint::builder(ts(0), 0).latitude(Some(10.0)).build();
        assert_eq!(lone.unwrap_err(), ValidationError::UnpairedPosition);
    }

    #[test]
    fn test_track_point_range_checks() {
        let err = TrackPoint::builder(ts(0), 0)
            .latitude(Some(95.0))
            .longitude(Some(20.0))
            .build()
            .unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { field: "latitude", .. }));

        let err = TrackPoint::builder(ts(0), 0)
            .heart_rate(Some(-10))
            .build()
            .unwrap_err();
        assert!(matches!(err, ValidationError::Negative { field: "heart rate", .. }));
    }

    #[test]
    fn test_lap_end_time() {
        let lap = Lap::builder(0, ts(0)).total_time(Some(90.0)).build().unwrap();
        assert_eq!(lap.end_time(), Some(ts(90)));

        let open = Lap::builder(0, ts(0)).build().unwrap();
        assert_eq!(open.end_time(), None);
    }

    #[test]
    fn test_lap_inverted_range_rejected() {
        let err = Lap::builder(0, ts(0)).point_range(5, 2).build().unwrap_err();
        assert_eq!(err, ValidationError::InvertedRange { start: 5, end: 2 });
    }

    #[test]
    fn test_activity_views() {
        let points = vec![
            TrackPoint::builder(ts(0), 0)
                .latitude(Some(10.0))
                .longitude(Some(20.0))
                .build()
                .unwrap(),
            TrackPoint::builder(ts(10), 1)
                .latitude(Some(12.0))
                .longitude(Some(18.0))
                .build()
                .unwrap(),
            TrackPoint::builder(ts(20), 2).build().unwrap(),
        ];
        let activity = Activity::builder(SourceFormat::Other)
            .track_points(points)
            .build()
            .unwrap();

        assert_eq!(activity.start_time, Some(ts(0)));
        assert_eq!(activity.end_time(), Some(ts(20)));
        assert_eq!(activity.duration(), Some(Duration::seconds(20)));
        assert!(activity.has_gps());

        let bbox = activity.bounding_box().unwrap();
        assert_eq!(bbox.min_lat, 10.0);
        assert_eq!(bbox.max_lat, 12.0);
        assert_eq!(bbox.min_lon, 18.0);
        assert_eq!(bbox.max_lon, 20.0);
    }

    #[test]
    fn test_empty_activity_views() {
        let activity = Activity::builder(SourceFormat::Other).build().unwrap();
        assert_eq!(activity.start_time, None);
        assert_eq!(activity.end_time(), None);
        assert_eq!(activity.duration(), None);
        assert!(!activity.has_gps());
        assert!(activity.bounding_box().is_none());
    }

    #[test]
    fn test_lap_points_slice() {
        let points: Vec<TrackPoint> = (0..4i64)
            .map(|i| TrackPoint::builder(ts(i), i as usize).build().unwrap())
            .collect();
        let lap = Lap::builder(0, ts(0)).point_range(1, 2).build().unwrap();
        let activity = Activity::builder(SourceFormat::Other)
            .laps(vec![lap])
            .track_points(points)
            .build()
            .unwrap();
        let slice = activity.lap_points(&activity.laps[0]);
        assert_eq!(slice.len(), 2);
        assert_eq!(slice[0].source_index, 1);

        let empty = Lap::builder(1, ts(0)).build().unwrap();
        assert!(activity.lap_points(&empty).is_empty());
    }
}
