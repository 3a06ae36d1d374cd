//! Static limits and constraints.

use crate::system::time::Nanoseconds;

/// Number of frames the latency-marker table can hold before slots are
/// recycled. Must be a power of two.
pub const MARKER_TABLE_CAPACITY: usize = 64;

/// Number of frame ids the pacing selector remembers a decision for. Must be a
/// power of two.
pub const DECISION_CACHE_CAPACITY: usize = 64;

/// Number of frame-time samples kept per present channel. Must be a power of
/// two.
pub const FRAME_TIME_HISTORY: usize = 256;

/// Number of vendor sleep-interval samples kept for the rolling average. Must
/// be a power of two.
pub const SLEEP_INTERVAL_HISTORY: usize = 64;

/// The maximum number of third-party modules whose marker calls are filtered.
pub const MAX_FILTERED_MODULES: usize = 8;

/// The largest composition-rate smoothing window the refresh monitor accepts.
pub const MAX_SMOOTHING_WINDOW: usize = 120;

/// Minimum spacing between two samples on the combined frame-time channel.
pub const COMBINED_SAMPLE_GATE: Nanoseconds = Nanoseconds::from_millis(1);

/// Markers older than this no longer count as "actively received".
pub const MARKER_ACTIVITY_WINDOW: Nanoseconds = Nanoseconds::from_millis(500);

/// Default polling interval of the refresh-rate monitor.
pub const DEFAULT_MONITOR_INTERVAL: Nanoseconds = Nanoseconds::from_millis(2);

/// Length of the window over which the monitor counts refreshes.
pub const REFRESH_COUNT_WINDOW: Nanoseconds = Nanoseconds::from_millis(1_000);

/// How often unresolved filtered-module names are looked up again.
pub const MODULE_RESOLVE_INTERVAL: Nanoseconds = Nanoseconds::from_millis(1_000);

/// Trailing window used for min/max tracking and VRR classification.
pub const VRR_HISTORY_WINDOW: Nanoseconds = Nanoseconds::from_millis(10_000);

/// Window in which recent VRR samples must be dense enough to be trusted.
pub const VRR_DENSITY_WINDOW: Nanoseconds = Nanoseconds::from_millis(1_000);

/// Minimum number of samples in [`VRR_DENSITY_WINDOW`] before the monitor will
/// classify a display as variable refresh.
pub const VRR_MIN_DENSE_SAMPLES: usize = 20;

/// Minimum number of below-fixed-rate dips needed to classify VRR.
pub const VRR_MIN_DIPS: usize = 2;

/// Minimum min/max spread (in Hz) over the trailing window for VRR.
pub const VRR_MIN_SPREAD_HZ: f64 = 2.0;

// :assert_power_of_two_capacities:
const _: () = assert!(MARKER_TABLE_CAPACITY.is_power_of_two());
const _: () = assert!(DECISION_CACHE_CAPACITY.is_power_of_two());
const _: () = assert!(FRAME_TIME_HISTORY.is_power_of_two());
const _: () = assert!(SLEEP_INTERVAL_HISTORY.is_power_of_two());
