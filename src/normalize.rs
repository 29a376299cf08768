//! Derivation engine: post-construction normalization of an [`Activity`].
//!
//! Runs on every load, after a loader has assembled the raw entities:
//! 1. Stable-sort the timeline by timestamp. Sources may interleave laps or
//!    record out of sequence; stability keeps same-timestamp samples in their
//!    original document order.
//! 2. Backfill `start_time` from the first post-sort point when unset.
//! 3. Backfill `total_distance` from the last point carrying a cumulative
//!    distance when unset; no such point leaves it unset ("unknown"), never
//!    coerced to zero.
//! 4. Re-validate every lap point range against the timeline length.
//!
//! Explicit source values are never overwritten, and running the pass twice
//! is a no-op.

use log::debug;

use crate::error::ValidationError;
use crate::model::Activity;

/// Normalize an activity in place. Called by `ActivityBuilder::build`; also
/// safe to re-run on an already-normalized activity.
pub fn normalize(activity: &mut Activity) -> Result<(), ValidationError> {
    // Vec::sort_by is stable, so document order survives timestamp ties.
    activity
        .track_points
        .sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

    if activity.start_time.is_none() {
        activity.start_time = activity.track_points.first().map(|tp| tp.timestamp);
    }

    if activity.total_distance.is_none() {
        activity.total_distance = activity
            .track_points
            .iter()
            .rev()
            .find_map(|tp| tp.distance);
    }

    let len = activity.track_points.len();
    for lap in &activity.laps {
        if let Some(range) = lap.point_range {
            if range.end >= len {
                return Err(ValidationError::LapRangeOutOfBounds {
                    start: range.start,
                    end: range.end,
                    len,
                });
            }
        }
    }

    debug!(
        "[Normalize] {} points, {} laps, start_time={:?}",
        len,
        activity.laps.len(),
        activity.start_time
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Activity, Lap, SourceFormat, TrackPoint};
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn point(secs: i64, index: usize, distance: Option<f64>) -> TrackPoint {
        TrackPoint::builder(ts(secs), index)
            .distance(distance)
            .build()
            .unwrap()
    }

    #[test]
    fn test_sorts_out_of_order_points() {
        let activity = Activity::builder(SourceFormat::Other)
            .track_points(vec![point(30, 0, None), point(10, 1, None), point(20, 2, None)])
            .build()
            .unwrap();
        let times: Vec<_> = activity.track_points.iter().map(|p| p.timestamp).collect();
        assert_eq!(times, vec![ts(10), ts(20), ts(30)]);
    }

    #[test]
    fn test_stable_on_equal_timestamps() {
        let activity = Activity::builder(SourceFormat::Other)
            .track_points(vec![point(10, 0, None), point(10, 1, None), point(10, 2, None)])
            .build()
            .unwrap();
        let order: Vec<_> = activity
            .track_points
            .iter()
            .map(|p| p.source_index)
            .collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_backfills_total_distance_from_last_known() {
        let activity = Activity::builder(SourceFormat::Other)
            .track_points(vec![
                point(0, 0, None),
                point(10, 1, Some(120.0)),
                point(20, 2, None),
            ])
            .build()
            .unwrap();
        assert_eq!(activity.total_distance.unwrap().get(), 120.0);
    }

    #[test]
    fn test_leaves_total_distance_unset_when_unknown() {
        let activity = Activity::builder(SourceFormat::Other)
            .track_points(vec![point(0, 0, None), point(10, 1, None)])
            .build()
            .unwrap();
        assert!(activity.total_distance.is_none());
    }

    #[test]
    fn test_explicit_values_not_overwritten() {
        let activity = Activity::builder(SourceFormat::Other)
            .start_time(Some(ts(-100)))
            .track_points(vec![point(0, 0, Some(50.0))])
            .build()
            .unwrap();
        assert_eq!(activity.start_time, Some(ts(-100)));
    }

    #[test]
    fn test_idempotent() {
        let mut activity = Activity::builder(SourceFormat::Other)
            .track_points(vec![point(20, 0, Some(300.0)), point(0, 1, None)])
            .build()
            .unwrap();
        let first = activity.clone();
        normalize(&mut activity).unwrap();
        assert_eq!(activity, first);
    }

    #[test]
    fn test_rejects_out_of_bounds_lap_range() {
        let lap = Lap::builder(0, ts(0)).point_range(0, 5).build().unwrap();
        let err = Activity::builder(SourceFormat::Other)
            .laps(vec![lap])
            .track_points(vec![point(0, 0, None)])
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::LapRangeOutOfBounds {
                start: 0,
                end: 5,
                len: 1
            }
        );
    }
}
