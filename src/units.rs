//! Bounded value types for the canonical model.
//!
//! Each type wraps a raw number and enforces its physical range exactly once,
//! at construction. Loaders never re-check ranges; they hand raw parsed values
//! to these constructors and propagate the [`ValidationError`].
//!
//! - [`Latitude`] in decimal degrees, [-90, 90]
//! - [`Longitude`] in decimal degrees, [-180, 180]
//! - [`Meters`], [`Seconds`], [`SpeedMps`] — non-negative floats
//! - [`Bpm`], [`Rpm`], [`Watts`] — non-negative integers

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

macro_rules! ranged_f64 {
    ($name:ident, $field:literal, $min:expr, $max:expr) => {
        #[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(f64);

        impl $name {
            pub fn new(value: f64) -> Result<Self, ValidationError> {
                if !value.is_finite() || value < $min || value > $max {
                    return Err(ValidationError::OutOfRange {
                        field: $field,
                        value,
                        min: $min,
                        max: $max,
                    });
                }
                Ok(Self(value))
            }

            /// Raw value in the unit's SI representation.
            pub fn get(self) -> f64 {
                self.0
            }
        }
    };
}

macro_rules! non_negative_f64 {
    ($name:ident, $field:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(f64);

        impl $name {
            pub fn new(value: f64) -> Result<Self, ValidationError> {
                if !value.is_finite() || value < 0.0 {
                    return Err(ValidationError::Negative {
                        field: $field,
                        value,
                    });
                }
                Ok(Self(value))
            }

            /// Raw value in the unit's SI representation.
            pub fn get(self) -> f64 {
                self.0
            }
        }
    };
}

macro_rules! non_negative_u16 {
    ($name:ident, $field:literal) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(u16);

        impl $name {
            /// Accepts any integer the source parsed; rejects negatives and
            /// values past u16 range (no physical sensor exceeds it).
            pub fn new(value: i64) -> Result<Self, ValidationError> {
                if value < 0 {
                    return Err(ValidationError::Negative {
                        field: $field,
                        value: value as f64,
                    });
                }
                if value > i64::from(u16::MAX) {
                    return Err(ValidationError::OutOfRange {
                        field: $field,
                        value: value as f64,
                        min: 0.0,
                        max: f64::from(u16::MAX),
                    });
                }
                Ok(Self(value as u16))
            }

            pub fn get(self) -> u16 {
                self.0
            }
        }
    };
}

ranged_f64!(Latitude, "latitude", -90.0, 90.0);
ranged_f64!(Longitude, "longitude", -180.0, 180.0);
non_negative_f64!(Meters, "distance");
non_negative_f64!(Seconds, "duration");
non_negative_f64!(SpeedMps, "speed");
non_negative_u16!(Bpm, "heart rate");
non_negative_u16!(Rpm, "cadence");
non_negative_u16!(Watts, "power");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latitude_bounds() {
        assert!(Latitude::new(-90.0).is_ok());
        assert!(Latitude::new(90.0).is_ok());
        assert!(Latitude::new(90.01).is_err());
        assert!(Latitude::new(-95.0).is_err());
    }

    #[test]
    fn test_longitude_bounds() {
        assert!(Longitude::new(-180.0).is_ok());
        assert!(Longitude::new(180.0).is_ok());
        assert!(Longitude::new(181.0).is_err());
    }

    #[test]
    fn test_meters_rejects_negative() {
        assert!(Meters::new(0.0).is_ok());
        assert_eq!(Meters::new(120.5).unwrap().get(), 120.5);
        assert!(matches!(
            Meters::new(-1.0),
            Err(ValidationError::Negative { field: "distance", .. })
        ));
    }

    #[test]
    fn test_ranged_rejects_non_finite() {
        assert!(Latitude::new(f64::NAN).is_err());
        assert!(Latitude::new(f64::INFINITY).is_err());
        assert!(Longitude::new(f64::NEG_INFINITY).is_err());
    }

    #[test]
    fn test_non_negative_rejects_non_finite() {
        assert!(Meters::new(f64::NAN).is_err());
        assert!(Seconds::new(f64::INFINITY).is_err());
        assert!(SpeedMps::new(f64::NAN).is_err());
    }

    #[test]
    fn test_bpm_rejects_negative() {
        assert_eq!(Bpm::new(160).unwrap().get(), 160);
        assert!(Bpm::new(-5).is_err());
        assert!(Bpm::new(70_000).is_err());
    }
}
