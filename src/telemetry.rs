//! Point-in-time view of the engine's statistics for overlays and logs.

use crate::{
    context::PacingContext,
    frame::PacingMode,
    limits::SLEEP_INTERVAL_HISTORY,
    monitor::RefreshRateStats,
    present::PresentVariant,
    selector::CallSite,
    system::time::{Hertz, Nanoseconds},
    vendor::{FrameReport, SleepMode, SleepStatus},
};

/// Average frame time and rate of one present channel.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameTiming {
    pub average: Option<Nanoseconds>,
    pub fps: Hertz,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TelemetrySnapshot {
    pub refresh: RefreshRateStats,
    pub presentation_mode: Option<PacingMode>,
    pub marker_mode: Option<PacingMode>,
    pub present: FrameTiming,
    pub present1: FrameTiming,
    pub combined: FrameTiming,
    pub present_count: u64,
    /// Average interval between the application's vendor sleep calls.
    pub sleep_interval: Option<Nanoseconds>,
    pub sleep_mode: Option<SleepMode>,
    pub sleep_status: Option<SleepStatus>,
    /// Simulation start to GPU render end of the newest complete frame in the
    /// last latency report.
    pub simulation_to_gpu_end: Option<Nanoseconds>,
    pub markers_active: bool,
}

impl TelemetrySnapshot {
    #[must_use]
    pub fn capture(context: &PacingContext) -> Self {
        let presents = context.presents();
        let timing = |variant| FrameTiming {
            average: presents.average_frame_time(variant),
            fps: presents.average_fps(variant),
        };

        let simulation_to_gpu_end = context
            .vendor()
            .latency_report()
            .and_then(|report| report.latest_complete().and_then(FrameReport::simulation_to_gpu_end));

        Self {
            refresh: context.monitor().stats(),
            presentation_mode: context.selector().last_mode(CallSite::Presentation),
            marker_mode: context.selector().last_mode(CallSite::Marker),
            present: timing(Some(PresentVariant::Present)),
            present1: timing(Some(PresentVariant::Present1)),
            combined: timing(None),
            present_count: presents.present_count(),
            sleep_interval: context.sleep_intervals().average(SLEEP_INTERVAL_HISTORY),
            sleep_mode: context.vendor().sleep_mode(),
            sleep_status: context.vendor().sleep_status(),
            simulation_to_gpu_end,
            markers_active: context.markers_active(context.clock().now()),
        }
    }
}
