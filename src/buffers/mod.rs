//! Lock-free shared buffers written by the interception paths and read by
//! the selector, the delay engine and telemetry.

mod markers;
mod ring;

pub use markers::{FrameMarkers, MarkerTable};
pub use ring::{FrameTimeSample, SampleRing};

use crate::limits::{FRAME_TIME_HISTORY, MARKER_TABLE_CAPACITY, SLEEP_INTERVAL_HISTORY};

/// Frame-time history of one present channel.
pub type FrameTimeRing = SampleRing<FRAME_TIME_HISTORY>;

/// Intervals between the application's vendor sleep calls.
pub type SleepIntervalRing = SampleRing<SLEEP_INTERVAL_HISTORY>;

pub type LatencyMarkerTable = MarkerTable<MARKER_TABLE_CAPACITY>;
