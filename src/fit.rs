//! FIT loader.
//!
//! The binary bitstream is decoded by `fitparser` into named field events;
//! this module only maps that event stream onto the canonical model. The
//! stream is folded in document order: `record` messages become track points
//! with strictly increasing ordinals, and each `lap` message closes the
//! inclusive ordinal range of the records seen since the previous lap close
//! (FIT writes lap summaries after their records). Session rollups become the
//! activity's explicit summary fields.

use chrono::{DateTime, Utc};
use fitparser::profile::MesgNum;
use fitparser::{FitDataRecord, Value};
use log::debug;

use crate::error::LoadError;
use crate::loader::ActivityLoader;
use crate::model::{Activity, DeviceInfo, Lap, SourceFormat, TrackPoint};

const FORMAT: &str = "FIT";

/// Semicircles to decimal degrees.
const SEMICIRCLE_DEG: f64 = 180.0 / 2_147_483_648.0;

/// Record fields the canonical model maps; the rest go to the extension bag.
const MAPPED_RECORD_FIELDS: &[&str] = &[
    "timestamp",
    "position_lat",
    "position_long",
    "altitude",
    "enhanced_altitude",
    "distance",
    "speed",
    "enhanced_speed",
    "heart_rate",
    "cadence",
    "power",
    "temperature",
];

pub struct FitLoader;

impl ActivityLoader for FitLoader {
    fn load_bytes(&self, data: &[u8]) -> Result<Option<Activity>, LoadError> {
        let records = fitparser::de::from_bytes(data).map_err(|e| LoadError::Malformed {
            format: FORMAT,
            message: e.to_string(),
        })?;
        assemble(records.iter().map(classify))
    }
}

/// One decoded message: its kind and named field values.
pub(crate) type Message = (MesgNum, Vec<(String, Value)>);

fn classify(record: &FitDataRecord) -> Message {
    let fields = record
        .fields()
        .iter()
        .map(|f| (f.name().to_string(), f.value().clone()))
        .collect();
    (record.kind(), fields)
}

/// Fold a decoded message stream into a canonical activity. Pure over the
/// stream so it can be exercised without binary fixtures.
pub(crate) fn assemble(
    messages: impl IntoIterator<Item = Message>,
) -> Result<Option<Activity>, LoadError> {
    let mut builder = Activity::builder(SourceFormat::Fit);
    let mut device = DeviceInfo::default();
    let mut saw_device = false;
    let mut saw_activity = false;

    let mut laps: Vec<Lap> = Vec::new();
    let mut points: Vec<TrackPoint> = Vec::new();
    let mut lap_start_index = 0usize;

    for (kind, fields) in messages {
        match kind {
            MesgNum::FileId => {
                saw_device = true;
                if let Some(m) = string_field(&fields, "manufacturer") {
                    device.manufacturer = Some(m);
                }
                if let Some(p) = field(&fields, "garmin_product")
                    .or_else(|| field(&fields, "product"))
                {
                    device.product_id = Some(p.to_string());
                }
            }
            MesgNum::DeviceInfo => {
                saw_device = true;
                if device.device_name.is_none() {
                    device.device_name = string_field(&fields, "product_name");
                }
                if device.firmware_version.is_none() {
                    device.firmware_version =
                        field(&fields, "software_version").map(Value::to_string);
                }
            }
            MesgNum::Sport => {
                builder = builder
                    .sport(string_field(&fields, "sport"))
                    .sub_sport(string_field(&fields, "sub_sport"));
            }
            MesgNum::Session => {
                saw_activity = true;
                builder = builder
                    .start_time(timestamp_field(&fields, "start_time"))
                    .total_distance(
                        f64_field(&fields, "total_distance")
                            .map(crate::units::Meters::new)
                            .transpose()?,
                    )
                    .total_calories(f64_field(&fields, "total_calories"))
                    .total_ascent(f64_field(&fields, "total_ascent"))
                    .total_descent(f64_field(&fields, "total_descent"));
            }
            MesgNum::Lap => {
                saw_activity = true;
                laps.push(parse_lap(&fields, laps.len(), lap_start_index, points.len())?);
                lap_start_index = points.len();
            }
            MesgNum::Record => {
                saw_activity = true;
                points.push(parse_record(&fields, points.len())?);
            }
            _ => {}
        }
    }

    if !saw_activity {
        return Ok(None);
    }

    let activity = builder
        .device(saw_device.then_some(device))
        .laps(laps)
        .track_points(points)
        .build()?;

    debug!(
        "[FitLoader] assembled {} laps, {} points",
        activity.laps.len(),
        activity.track_points.len()
    );
    Ok(Some(activity))
}

fn parse_record(fields: &[(String, Value)], source_index: usize) -> Result<TrackPoint, LoadError> {
    let timestamp =
        timestamp_field(fields, "timestamp").ok_or_else(|| LoadError::Malformed {
            format: FORMAT,
            message: format!("record message {source_index} has no timestamp"),
        })?;

    let mut builder = TrackPoint::builder(timestamp, source_index)
        .latitude(semicircles_field(fields, "position_lat"))
        .longitude(semicircles_field(fields, "position_long"))
        .elevation(
            f64_field(fields, "enhanced_altitude").or_else(|| f64_field(fields, "altitude")),
        )
        .distance(f64_field(fields, "distance"))
        .speed(f64_field(fields, "enhanced_speed").or_else(|| f64_field(fields, "speed")))
        .heart_rate(i64_field(fields, "heart_rate"))
        .cadence(i64_field(fields, "cadence"))
        .power(i64_field(fields, "power"))
        .temperature(f64_field(fields, "temperature"));

    for (name, value) in fields {
        if MAPPED_RECORD_FIELDS.contains(&name.as_str()) {
            continue;
        }
        builder = builder.extension(name.clone(), value_to_json(value));
    }

    Ok(builder.build()?)
}

fn parse_lap(
    fields: &[(String, Value)],
    index: usize,
    lap_start_index: usize,
    next_index: usize,
) -> Result<Lap, LoadError> {
    let start_time = timestamp_field(fields, "start_time").ok_or_else(|| LoadError::Malformed {
        format: FORMAT,
        message: format!("lap message {index} has no start_time"),
    })?;

    let mut lap = Lap::builder(index, start_time)
        .total_time(f64_field(fields, "total_elapsed_time"))
        .distance(f64_field(fields, "total_distance"))
        .max_speed(
            f64_field(fields, "enhanced_max_speed").or_else(|| f64_field(fields, "max_speed")),
        )
        .avg_speed(
            f64_field(fields, "enhanced_avg_speed").or_else(|| f64_field(fields, "avg_speed")),
        )
        .calories(f64_field(fields, "total_calories"))
        .avg_heart_rate(i64_field(fields, "avg_heart_rate"))
        .max_heart_rate(i64_field(fields, "max_heart_rate"))
        .avg_cadence(i64_field(fields, "avg_cadence"))
        .max_cadence(i64_field(fields, "max_cadence"))
        .avg_power(i64_field(fields, "avg_power"))
        .max_power(i64_field(fields, "max_power"))
        .ascent(f64_field(fields, "total_ascent"))
        .descent(f64_field(fields, "total_descent"))
        .intensity(string_field(fields, "intensity"))
        .trigger(string_field(fields, "lap_trigger"));
    if next_index > lap_start_index {
        lap = lap.point_range(lap_start_index, next_index - 1);
    }
    Ok(lap.build()?)
}

// ============================================================================
// Field value access
// ============================================================================

fn field<'a>(fields: &'a [(String, Value)], name: &str) -> Option<&'a Value> {
    fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
}

fn string_field(fields: &[(String, Value)], name: &str) -> Option<String> {
    match field(fields, name)? {
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn timestamp_field(fields: &[(String, Value)], name: &str) -> Option<DateTime<Utc>> {
    match field(fields, name)? {
        Value::Timestamp(ts) => Some(ts.with_timezone(&Utc)),
        _ => None,
    }
}

fn f64_field(fields: &[(String, Value)], name: &str) -> Option<f64> {
    field(fields, name).and_then(value_to_f64)
}

fn i64_field(fields: &[(String, Value)], name: &str) -> Option<i64> {
    field(fields, name).and_then(value_to_f64).map(|v| v as i64)
}

fn semicircles_field(fields: &[(String, Value)], name: &str) -> Option<f64> {
    field(fields, name)
        .and_then(value_to_f64)
        .map(|v| v * SEMICIRCLE_DEG)
}

fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Float32(v) => Some(f64::from(*v)),
        Value::Float64(v) => Some(*v),
        Value::SInt8(v) => Some(f64::from(*v)),
        Value::UInt8(v) => Some(f64::from(*v)),
        Value::UInt8z(v) => Some(f64::from(*v)),
        Value::SInt16(v) => Some(f64::from(*v)),
        Value::UInt16(v) => Some(f64::from(*v)),
        Value::UInt16z(v) => Some(f64::from(*v)),
        Value::SInt32(v) => Some(f64::from(*v)),
        Value::UInt32(v) => Some(f64::from(*v)),
        Value::UInt32z(v) => Some(f64::from(*v)),
        Value::SInt64(v) => Some(*v as f64),
        Value::UInt64(v) => Some(*v as f64),
        Value::UInt64z(v) => Some(*v as f64),
        Value::Byte(v) => Some(f64::from(*v)),
        Value::Array(values) => values.iter().find_map(value_to_f64),
        _ => None,
    }
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::String(s) => serde_json::Value::String(s.clone()),
        other => match value_to_f64(other) {
            Some(n) => serde_json::Number::from_f64(n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            None => serde_json::Value::String(other.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone, Utc};

    fn ts_value(secs: i64) -> Value {
        let utc = Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap();
        Value::Timestamp(utc.with_timezone(&Local))
    }

    fn record(secs: i64, extra: Vec<(String, Value)>) -> Message {
        let mut fields = vec![("timestamp".to_string(), ts_value(secs))];
        fields.extend(extra);
        (MesgNum::Record, fields)
    }

    fn f(name: &str, value: Value) -> (String, Value) {
        (name.to_string(), value)
    }

    #[test]
    fn test_empty_stream_is_none() {
        assert!(assemble(Vec::new()).unwrap().is_none());
        // Metadata alone carries no activity either.
        let only_file_id = vec![(
            MesgNum::FileId,
            vec![f("manufacturer", Value::String("garmin".into()))],
        )];
        assert!(assemble(only_file_id).unwrap().is_none());
    }

    #[test]
    fn test_record_semicircles_to_degrees() {
        // 45 degrees in semicircles.
        let semi = (45.0 / SEMICIRCLE_DEG) as i32;
        let messages = vec![record(
            0,
            vec![
                f("position_lat", Value::SInt32(semi)),
                f("position_long", Value::SInt32(-semi)),
                f("heart_rate", Value::UInt8(130)),
                f("distance", Value::Float64(10.0)),
            ],
        )];
        let activity = assemble(messages).unwrap().unwrap();
        let point = &activity.track_points[0];
        assert!((point.latitude().unwrap() - 45.0).abs() < 1e-6);
        assert!((point.longitude().unwrap() + 45.0).abs() < 1e-6);
        assert_eq!(point.heart_rate.unwrap().get(), 130);
        assert_eq!(point.distance.unwrap().get(), 10.0);
    }

    #[test]
    fn test_record_without_timestamp_is_error() {
        let messages = vec![(
            MesgNum::Record,
            vec![f("heart_rate", Value::UInt8(130))],
        )];
        assert!(matches!(
            assemble(messages),
            Err(LoadError::Malformed { .. })
        ));
    }

    #[test]
    fn test_lap_closes_ordinal_range() {
        let messages = vec![
            record(0, vec![]),
            record(10, vec![]),
            record(20, vec![]),
            (
                MesgNum::Lap,
                vec![
                    f("start_time", ts_value(0)),
                    f("total_elapsed_time", Value::Float64(30.0)),
                    f("intensity", Value::String("active".into())),
                ],
            ),
            record(30, vec![]),
            record(40, vec![]),
            record(50, vec![]),
            (MesgNum::Lap, vec![f("start_time", ts_value(30))]),
        ];
        let activity = assemble(messages).unwrap().unwrap();
        assert_eq!(activity.laps.len(), 2);
        let r0 = activity.laps[0].point_range.unwrap();
        let r1 = activity.laps[1].point_range.unwrap();
        assert_eq!((r0.start, r0.end), (0, 2));
        assert_eq!((r1.start, r1.end), (3, 5));
        assert_eq!(activity.laps[0].total_time.unwrap().get(), 30.0);
        assert_eq!(activity.laps[0].intensity.as_deref(), Some("active"));
    }

    #[test]
    fn test_session_rollups_become_explicit_summaries() {
        let messages = vec![
            record(0, vec![f("distance", Value::Float64(5.0))]),
            (
                MesgNum::Session,
                vec![
                    f("start_time", ts_value(-5)),
                    f("total_distance", Value::Float64(5_000.0)),
                    f("total_calories", Value::UInt16(320)),
                    f("total_ascent", Value::UInt16(140)),
                ],
            ),
        ];
        let activity = assemble(messages).unwrap().unwrap();
        // Explicit rollups win over derivation from points.
        assert_eq!(activity.total_distance.unwrap().get(), 5_000.0);
        assert_eq!(activity.total_calories, Some(320.0));
        assert_eq!(activity.total_ascent, Some(140.0));
        assert_eq!(
            activity.start_time.unwrap(),
            Utc.timestamp_opt(1_700_000_000 - 5, 0).unwrap()
        );
    }

    #[test]
    fn test_sport_and_device_metadata() {
        let messages = vec![
            (
                MesgNum::FileId,
                vec![
                    f("manufacturer", Value::String("garmin".into())),
                    f("garmin_product", Value::String("edge_840".into())),
                ],
            ),
            (
                MesgNum::Sport,
                vec![
                    f("sport", Value::String("cycling".into())),
                    f("sub_sport", Value::String("road".into())),
                ],
            ),
            record(0, vec![]),
        ];
        let activity = assemble(messages).unwrap().unwrap();
        assert_eq!(activity.sport.as_deref(), Some("cycling"));
        assert_eq!(activity.sub_sport.as_deref(), Some("road"));
        let device = activity.device.unwrap();
        assert_eq!(device.manufacturer.as_deref(), Some("garmin"));
        assert_eq!(device.product_id.as_deref(), Some("edge_840"));
    }

    #[test]
    fn test_unmapped_record_field_goes_to_bag() {
        let messages = vec![record(
            0,
            vec![f("left_right_balance", Value::UInt8(52))],
        )];
        let activity = assemble(messages).unwrap().unwrap();
        assert_eq!(
            activity.track_points[0]
                .extensions
                .get("left_right_balance"),
            Some(&serde_json::json!(52.0))
        );
    }

    #[test]
    fn test_enhanced_fields_preferred() {
        let messages = vec![record(
            0,
            vec![
                f("altitude", Value::Float64(400.0)),
                f("enhanced_altitude", Value::Float64(402.5)),
                f("speed", Value::Float64(3.0)),
                f("enhanced_speed", Value::Float64(3.2)),
            ],
        )];
        let activity = assemble(messages).unwrap().unwrap();
        let point = &activity.track_points[0];
        assert_eq!(point.elevation, Some(402.5));
        assert_eq!(point.speed.unwrap().get(), 3.2);
    }
}
