//! GPX loader.
//!
//! Same contract and ordinal-assignment rule as the TCX loader, against the
//! GPX grammar: `trk/trkseg/trkpt`. All tracks fold into one flat timeline,
//! in document order. GPX carries no lap rollups, so every non-empty
//! `trkseg` becomes one bare lap whose start time is its first point's
//! timestamp; empty segments are skipped. Garmin
//! `TrackPointExtension` fields (hr, cad, atemp, speed) map onto the
//! canonical sensor fields; anything else under `extensions` lands in the
//! per-point bag.

use log::debug;

use crate::error::LoadError;
use crate::loader::{
    child, child_text, children, parse_f64, parse_i64, parse_timestamp, parse_xml, ActivityLoader,
};
use crate::model::{Activity, DeviceInfo, Lap, SourceFormat, TrackPoint};

const FORMAT: &str = "GPX";

/// TrackPointExtension children the canonical model maps.
const MAPPED_EXTENSION_FIELDS: &[&str] = &["hr", "cad", "atemp", "speed", "power"];

pub struct GpxLoader;

impl ActivityLoader for GpxLoader {
    fn load_bytes(&self, data: &[u8]) -> Result<Option<Activity>, LoadError> {
        let doc = parse_xml(data, FORMAT)?;
        let root = doc.root_element();

        let Some(first_trk) = child(root, "trk") else {
            return Ok(None);
        };

        let id = child_text(first_trk, "name").map(str::to_string);
        let sport = child_text(first_trk, "type").map(str::to_string);
        let start_time = child(root, "metadata")
            .and_then(|m| child_text(m, "time"))
            .map(parse_timestamp)
            .transpose()?;

        let mut laps = Vec::new();
        let mut points = Vec::new();
        let mut global_index = 0usize;

        // Every track contributes to the one flat timeline; name and type
        // come from the first track only.
        for trk in children(root, "trk") {
            for seg in children(trk, "trkseg") {
                let seg_start_index = global_index;
                for tp_elem in children(seg, "trkpt") {
                    points.push(parse_trkpt(tp_elem, global_index)?);
                    global_index += 1;
                }
                // An empty segment has no start time to anchor a lap on.
                if global_index == seg_start_index {
                    continue;
                }
                let lap = Lap::builder(laps.len(), points[seg_start_index].timestamp)
                    .point_range(seg_start_index, global_index - 1)
                    .build()?;
                laps.push(lap);
            }
        }

        let device = root
            .attribute("creator")
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(|creator| DeviceInfo {
                device_name: Some(creator.to_string()),
                ..DeviceInfo::default()
            });

        debug!(
            "[GpxLoader] parsed {} segments, {} points",
            laps.len(),
            points.len()
        );

        let activity = Activity::builder(SourceFormat::Gpx)
            .id(id)
            .sport(sport)
            .start_time(start_time)
            .device(device)
            .laps(laps)
            .track_points(points)
            .build()?;
        Ok(Some(activity))
    }
}

fn parse_trkpt(
    tp_elem: roxmltree::Node<'_, '_>,
    source_index: usize,
) -> Result<TrackPoint, LoadError> {
    // A sample without a timestamp cannot enter the canonical timeline.
    let time_text = child_text(tp_elem, "time").ok_or_else(|| LoadError::Malformed {
        format: FORMAT,
        message: format!("trkpt {source_index} has no time"),
    })?;

    let latitude = tp_elem
        .attribute("lat")
        .map(|t| parse_f64(t, "lat"))
        .transpose()?;
    let longitude = tp_elem
        .attribute("lon")
        .map(|t| parse_f64(t, "lon"))
        .transpose()?;

    let mut builder = TrackPoint::builder(parse_timestamp(time_text)?, source_index)
        .latitude(latitude)
        .longitude(longitude)
        .elevation(
            child_text(tp_elem, "ele")
                .map(|t| parse_f64(t, "ele"))
                .transpose()?,
        );

    if let Some(extensions) = child(tp_elem, "extensions") {
        // Garmin nests sensor data under TrackPointExtension, but power (and
        // on some devices every field) sits directly under extensions.
        let tpe = child(extensions, "TrackPointExtension");
        let lookup = |name| {
            tpe.and_then(|c| child_text(c, name))
                .or_else(|| child_text(extensions, name))
        };
        builder = builder
            .heart_rate(lookup("hr").map(|t| parse_i64(t, "hr")).transpose()?)
            .cadence(lookup("cad").map(|t| parse_i64(t, "cad")).transpose()?)
            .temperature(lookup("atemp").map(|t| parse_f64(t, "atemp")).transpose()?)
            .speed(lookup("speed").map(|t| parse_f64(t, "speed")).transpose()?)
            .power(lookup("power").map(|t| parse_i64(t, "power")).transpose()?);

        let unmapped = extensions
            .children()
            .chain(tpe.into_iter().flat_map(|c| c.children()))
            .filter(|c| c.is_element());
        for other in unmapped {
            let name = other.tag_name().name();
            if MAPPED_EXTENSION_FIELDS.contains(&name) || name == "TrackPointExtension" {
                continue;
            }
            if let Some(text) = other.text().map(str::trim).filter(|t| !t.is_empty()) {
                builder = builder.extension(name, serde_json::Value::String(text.to_string()));
            }
        }
    }

    Ok(builder.build()?)
}
