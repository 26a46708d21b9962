//! Person counting over a detector stream.
//!
//! Per-frame person boxes are bound to identities by a first-match centroid
//! tracker, each identity is counted once as an entry or exit against a
//! horizontal line, and every frame adds to the tally of each rectangular
//! zone a track sits in. Final entry/exit totals are appended to a CSV log
//! when the session ends.

pub mod counting;
pub mod detection;
pub mod error;
pub mod overlay;
pub mod pipeline;
pub mod report;
pub mod session;
pub mod source;
pub mod tracker;
pub mod zones;

#[cfg(feature = "opencv")]
pub mod video;

pub use counting::{Crossing, CrossingCounter, CrossingTotals, ZoneOccupancy};
pub use detection::{BBox, Detection, Point, RawDetection, PERSON_CLASS_ID};
pub use error::ZoneError;
pub use overlay::{DrawDirective, Overlay};
pub use pipeline::{run, FrameSink, Headless, RunOptions, RunSummary, StopReason};
pub use report::SessionReporter;
pub use session::{Command, Control, FrameOutcome, Session, SessionConfig};
pub use source::{Detector, FrameSource, RecordedDetections, ReplayFrame, ReplaySource};
pub use tracker::{CentroidTracker, Track, TrackId};
pub use zones::{Zone, ZoneRect, ZoneStore};
