//! TCX (Training Center XML) loader.
//!
//! Walks `Activities/Activity/Lap/Track/Trackpoint` in document order,
//! assigning each point a strictly increasing ordinal across the whole
//! activity so every lap can address the flat timeline with an inclusive
//! index range. Lap rollups come straight from the source; missing summaries
//! are the derivation pass's job, not the loader's.

use log::debug;

use crate::error::LoadError;
use crate::loader::{
    child, child_text, children, parse_f64, parse_i64, parse_timestamp, parse_xml, ActivityLoader,
};
use crate::model::{Activity, DeviceInfo, Lap, SourceFormat, TrackPoint};

const FORMAT: &str = "TCX";

/// Trackpoint children the canonical model maps; anything else goes to the
/// extension bag.
const MAPPED_POINT_FIELDS: &[&str] = &[
    "Time",
    "Position",
    "AltitudeMeters",
    "DistanceMeters",
    "HeartRateBpm",
    "Cadence",
    "Extensions",
];

pub struct TcxLoader;

impl ActivityLoader for TcxLoader {
    fn load_bytes(&self, data: &[u8]) -> Result<Option<Activity>, LoadError> {
        let doc = parse_xml(data, FORMAT)?;
        let root = doc.root_element();

        let Some(activities) = child(root, "Activities") else {
            return Ok(None);
        };
        let Some(activity_elem) = child(activities, "Activity") else {
            return Ok(None);
        };

        let sport = activity_elem.attribute("Sport").map(str::to_string);
        let id = child_text(activity_elem, "Id").map(str::to_string);

        let mut laps = Vec::new();
        let mut points = Vec::new();
        let mut global_index = 0usize;

        for (lap_index, lap_elem) in children(activity_elem, "Lap").enumerate() {
            let start_text =
                lap_elem
                    .attribute("StartTime")
                    .ok_or_else(|| LoadError::Malformed {
                        format: FORMAT,
                        message: format!("Lap {lap_index} has no StartTime"),
                    })?;
            let lap_start_index = global_index;

            for track in children(lap_elem, "Track") {
                for tp_elem in children(track, "Trackpoint") {
                    points.push(parse_trackpoint(tp_elem, global_index)?);
                    global_index += 1;
                }
            }

            let mut lap = Lap::builder(lap_index, parse_timestamp(start_text)?)
                .total_time(opt_f64(lap_elem, "TotalTimeSeconds")?)
                .distance(opt_f64(lap_elem, "DistanceMeters")?)
                .max_speed(opt_f64(lap_elem, "MaximumSpeed")?)
                .calories(opt_f64(lap_elem, "Calories")?)
                .avg_heart_rate(nested_value(lap_elem, "AverageHeartRateBpm")?)
                .max_heart_rate(nested_value(lap_elem, "MaximumHeartRateBpm")?)
                .avg_cadence(opt_i64(lap_elem, "Cadence")?)
                .intensity(child_text(lap_elem, "Intensity").map(str::to_string))
                .trigger(child_text(lap_elem, "TriggerMethod").map(str::to_string));
            // A lap with zero points gets no range.
            if global_index > lap_start_index {
                lap = lap.point_range(lap_start_index, global_index - 1);
            }
            laps.push(lap.build()?);
        }

        let device = parse_creator(activity_elem);

        debug!(
            "[TcxLoader] parsed {} laps, {} points, sport={:?}",
            laps.len(),
            points.len(),
            sport
        );

        let activity = Activity::builder(SourceFormat::Tcx)
            .id(id)
            .sport(sport)
            .device(device)
            .laps(laps)
            .track_points(points)
            .build()?;
        Ok(Some(activity))
    }
}

fn parse_trackpoint(
    tp_elem: roxmltree::Node<'_, '_>,
    source_index: usize,
) -> Result<TrackPoint, LoadError> {
    let time_text = child_text(tp_elem, "Time").ok_or_else(|| LoadError::Malformed {
        format: FORMAT,
        message: format!("Trackpoint {source_index} has no Time"),
    })?;

    let mut builder = TrackPoint::builder(parse_timestamp(time_text)?, source_index)
        .elevation(opt_f64(tp_elem, "AltitudeMeters")?)
        .distance(opt_f64(tp_elem, "DistanceMeters")?)
        .heart_rate(nested_value(tp_elem, "HeartRateBpm")?)
        .cadence(opt_i64(tp_elem, "Cadence")?);

    if let Some(position) = child(tp_elem, "Position") {
        builder = builder
            .latitude(
                child_text(position, "LatitudeDegrees")
                    .map(|t| parse_f64(t, "LatitudeDegrees"))
                    .transpose()?,
            )
            .longitude(
                child_text(position, "LongitudeDegrees")
                    .map(|t| parse_f64(t, "LongitudeDegrees"))
                    .transpose()?,
            );
    }

    if let Some(extensions) = child(tp_elem, "Extensions") {
        if let Some(tpx) = child(extensions, "TPX") {
            builder = builder
                .speed(
                    child_text(tpx, "Speed")
                        .map(|t| parse_f64(t, "Speed"))
                        .transpose()?,
                )
                .power(
                    child_text(tpx, "Watts")
                        .map(|t| parse_i64(t, "Watts"))
                        .transpose()?,
                );

            // Unmapped TPX children (RunCadence and friends) keep their data
            // in the extension bag, same as the GPX loader.
            for other in tpx.children().filter(|c| c.is_element()) {
                let name = other.tag_name().name();
                if name == "Speed" || name == "Watts" {
                    continue;
                }
                if let Some(text) = other.text().map(str::trim).filter(|t| !t.is_empty()) {
                    builder =
                        builder.extension(name, serde_json::Value::String(text.to_string()));
                }
            }
        }
    }

    // Preserve unmapped trackpoint children in the extension bag.
    for other in tp_elem.children().filter(|c| c.is_element()) {
        let name = other.tag_name().name();
        if MAPPED_POINT_FIELDS.contains(&name) {
            continue;
        }
        if let Some(text) = other.text().map(str::trim).filter(|t| !t.is_empty()) {
            builder = builder.extension(name, serde_json::Value::String(text.to_string()));
        }
    }

    Ok(builder.build()?)
}

/// `<Name><Value>n</Value></Name>` pattern used by heart-rate rollups.
fn nested_value(node: roxmltree::Node<'_, '_>, name: &'static str) -> Result<Option<i64>, LoadError> {
    match child(node, name).and_then(|wrapper| child_text(wrapper, "Value")) {
        Some(text) => Ok(Some(parse_i64(text, name)?)),
        None => Ok(None),
    }
}

fn opt_f64(node: roxmltree::Node<'_, '_>, name: &'static str) -> Result<Option<f64>, LoadError> {
    child_text(node, name).map(|t| parse_f64(t, name)).transpose()
}

fn opt_i64(node: roxmltree::Node<'_, '_>, name: &'static str) -> Result<Option<i64>, LoadError> {
    child_text(node, name).map(|t| parse_i64(t, name)).transpose()
}

/// Device metadata from the `Creator` subtree. Firmware is composed from
/// major/minor when both are present, falls back to major-only, else stays
/// unset.
fn parse_creator(activity_elem: roxmltree::Node<'_, '_>) -> Option<DeviceInfo> {
    let creator = child(activity_elem, "Creator")?;

    let firmware = child(creator, "Version").and_then(|version| {
        let major = child_text(version, "VersionMajor")?;
        match child_text(version, "VersionMinor") {
            Some(minor) => Some(format!("{major}.{minor}")),
            None => Some(major.to_string()),
        }
    });

    Some(DeviceInfo {
        device_name: child_text(creator, "Name").map(str::to_string),
        manufacturer: None,
        product_id: child_text(creator, "ProductID").map(str::to_string),
        firmware_version: firmware,
    })
}
