//! # Trackload
//!
//! Canonical activity model and format loaders for fitness recordings.
//!
//! This library provides:
//! - A unified [`Activity`] model spanning TCX, GPX and FIT sources
//! - One [`ActivityLoader`] per format, selected explicitly by the caller
//! - A derivation pass that sorts the timeline and backfills missing
//!   summaries, so every loaded activity satisfies the model invariants
//!
//! Loaders are stateless and entities are immutable after construction, so
//! independent loads may run concurrently without coordination.
//!
//! ## Quick Start
//!
//! ```rust
//! use trackload::{load_bytes, Format};
//!
//! let tcx = r#"<TrainingCenterDatabase>
//!   <Activities><Activity Sport="Running">
//!     <Lap StartTime="2024-03-10T08:00:00Z"><Track>
//!       <Trackpoint>
//!         <Time>2024-03-10T08:00:00Z</Time>
//!         <DistanceMeters>12.5</DistanceMeters>
//!       </Trackpoint>
//!     </Track></Lap>
//!   </Activity></Activities>
//! </TrainingCenterDatabase>"#;
//!
//! let activity = load_bytes(tcx.as_bytes(), Format::Tcx).unwrap().unwrap();
//! assert_eq!(activity.sport.as_deref(), Some("Running"));
//! assert_eq!(activity.total_distance.unwrap().get(), 12.5);
//! ```

// Unified error handling
pub mod error;
pub use error::{LoadError, ValidationError};

// Bounded value types (range-checked at construction)
pub mod units;
pub use units::{Bpm, Latitude, Longitude, Meters, Rpm, Seconds, SpeedMps, Watts};

// Canonical activity model
pub mod model;
pub use model::{
    Activity, ActivityBuilder, BoundingBox, DeviceInfo, Lap, LapBuilder, PointRange, Position,
    SourceFormat, TrackPoint, TrackPointBuilder,
};

// Derivation engine (sort, invariant check, backfill)
pub mod normalize;
pub use normalize::normalize;

// Loader contract and format dispatch
pub mod loader;
pub use loader::{load_bytes, load_file, ActivityLoader, Format};

// Format-specific loaders
pub mod fit;
pub mod gpx;
pub mod tcx;
pub use fit::FitLoader;
pub use gpx::GpxLoader;
pub use tcx::TcxLoader;
