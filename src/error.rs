//! Unified error handling for the trackload library.
//!
//! Two failure families exist:
//! - [`ValidationError`] — a canonical entity would violate a model invariant
//!   (asymmetric GPS pair, out-of-range numeric field, bad lap index range).
//! - [`LoadError`] — a source document could not be turned into an Activity
//!   (I/O failure, malformed serialization, unparsable field).
//!
//! Structural absence of the activity subtree is NOT an error; loaders report
//! it as `Ok(None)`.

use thiserror::Error;

/// A canonical entity failed an invariant at construction time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A bounded numeric field is outside its physical range.
    #[error("{field} {value} outside [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    /// A non-negative field carries a negative value.
    #[error("{field} must be non-negative, got {value}")]
    Negative { field: &'static str, value: f64 },
    /// Latitude and longitude must be both set or both unset.
    #[error("latitude and longitude must be set together")]
    UnpairedPosition,
    /// A lap point range has start after end.
    #[error("lap point range inverted: start {start} > end {end}")]
    InvertedRange { start: usize, end: usize },
    /// A lap point range addresses points outside the activity timeline.
    #[error("lap point range [{start}, {end}] exceeds {len} track points")]
    LapRangeOutOfBounds {
        start: usize,
        end: usize,
        len: usize,
    },
}

/// A source document could not be loaded into a canonical Activity.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Reading the source file/stream failed.
    #[error("failed to read source: {0}")]
    Io(#[from] std::io::Error),
    /// The serialization itself is not well-formed, or a required subtree is
    /// present but unusable (e.g. a lap without a start time).
    #[error("malformed {format} document: {message}")]
    Malformed {
        format: &'static str,
        message: String,
    },
    /// A timestamp field is present but not ISO 8601.
    #[error("invalid timestamp '{text}'")]
    Timestamp { text: String },
    /// A field is present but its text does not parse as the expected type.
    #[error("invalid value '{text}' for {field}")]
    Field { field: &'static str, text: String },
    /// A parsed field violates a model invariant.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_display() {
        let err = ValidationError::OutOfRange {
            field: "latitude",
            value: 95.0,
            min: -90.0,
            max: 90.0,
        };
        assert!(err.to_string().contains("latitude"));
        assert!(err.to_string().contains("95"));
    }

    #[test]
    fn test_load_error_wraps_validation() {
        let err: LoadError = ValidationError::UnpairedPosition.into();
        assert!(err.to_string().contains("set together"));
    }
}
