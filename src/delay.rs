//! Holds present-start back until a fixed number of frame durations after the
//! frame's simulation start.

use std::sync::Arc;

use crate::{
    buffers::{FrameTimeRing, LatencyMarkerTable},
    config::Settings,
    frame::{FrameId, MarkerKind},
    limits::FRAME_TIME_HISTORY,
    system::{
        time::{Nanoseconds, NANOSECONDS_PER_SECOND_F64},
        Clock, DeadlineTimer,
    },
};

/// Reports how many frames are displayed per rendered frame.
pub trait FrameGeneration: Send + Sync {
    fn multiplier(&self) -> u32;
}

/// No frame generation: one displayed frame per rendered frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoFrameGeneration;

impl FrameGeneration for NoFrameGeneration {
    fn multiplier(&self) -> u32 {
        1
    }
}

/// What a call to [`DelayEngine::delay_present_start`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DelayOutcome {
    Disabled,
    /// The frame id is still inside the warm-up range.
    WarmingUp,
    /// No simulation-start marker is recorded for the frame.
    Unavailable,
    /// Neither a target rate nor measured frame times are available.
    NoEstimate,
    /// The simulation start lies more than one frame in the future, so the
    /// deadline is further away than the configured delay could produce.
    Implausible,
    AlreadyPast,
    Waited { deadline: Nanoseconds },
}

pub struct DelayEngine {
    timer: Arc<dyn DeadlineTimer>,
    frame_generation: Arc<dyn FrameGeneration>,
}

impl DelayEngine {
    pub fn new(timer: Arc<dyn DeadlineTimer>, frame_generation: Arc<dyn FrameGeneration>) -> Self {
        Self {
            timer,
            frame_generation,
        }
    }

    /// The duration of one rendered frame: the configured target rate scaled
    /// by the frame-generation multiplier, or failing that the measured
    /// average of `combined`.
    pub fn estimated_frame_duration(
        &self,
        settings: &Settings,
        combined: &FrameTimeRing,
    ) -> Option<Nanoseconds> {
        if let Some(fps) = settings.target_fps() {
            let multiplier = f64::from(self.frame_generation.multiplier().max(1));
            let period = (NANOSECONDS_PER_SECOND_F64 * multiplier / fps.0).round();

            #[allow(clippy::cast_possible_truncation)]
            return Some(Nanoseconds(period as i64));
        }

        combined
            .average(FRAME_TIME_HISTORY)
            .filter(|duration| duration.is_positive())
    }

    /// Blocks the calling thread until `delay_frames` frame durations after
    /// `frame`'s simulation start. Returns without blocking whenever any input
    /// is missing.
    pub fn delay_present_start(
        &self,
        frame: FrameId,
        settings: &Settings,
        table: &LatencyMarkerTable,
        combined: &FrameTimeRing,
        clock: &dyn Clock,
    ) -> DelayOutcome {
        if !settings.delay_enabled() {
            return DelayOutcome::Disabled;
        }

        if frame.0 <= u64::from(settings.warmup_frames()) {
            return DelayOutcome::WarmingUp;
        }

        let Some(simulation_start) = table.get(frame, MarkerKind::SimulationStart) else {
            return DelayOutcome::Unavailable;
        };

        let Some(duration) = self.estimated_frame_duration(settings, combined) else {
            return DelayOutcome::NoEstimate;
        };

        let delay_frames = i64::from(settings.delay_frames());
        let deadline = simulation_start.saturating_add(duration * delay_frames);

        let now = clock.now();
        if deadline <= now {
            return DelayOutcome::AlreadyPast;
        }

        if deadline - now > duration * (delay_frames + 1) {
            tracing::debug!(frame = frame.0, "Skipping implausible present delay");
            return DelayOutcome::Implausible;
        }

        #[cfg(feature = "profile")]
        let _s = tracing_tracy::client::span!("present delay");

        self.timer.wait_until(now, deadline);
        DelayOutcome::Waited { deadline }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        system::time::Hertz,
        testing::{ManualClock, RecordingTimer},
    };

    struct Doubling;

    impl FrameGeneration for Doubling {
        fn multiplier(&self) -> u32 {
            2
        }
    }

    struct Fixture {
        clock: Arc<ManualClock>,
        timer: Arc<RecordingTimer>,
        engine: DelayEngine,
        settings: Settings,
        table: LatencyMarkerTable,
        combined: FrameTimeRing,
    }

    fn fixture() -> Fixture {
        let clock = ManualClock::new(Nanoseconds::ZERO);
        let timer = RecordingTimer::new(clock.clone());
        let engine = DelayEngine::new(timer.clone(), Arc::new(NoFrameGeneration));

        let settings = Settings::default();
        settings.set_delay_enabled(true);
        settings.set_warmup_frames(0);

        Fixture {
            clock,
            timer,
            engine,
            settings,
            table: LatencyMarkerTable::new(),
            combined: FrameTimeRing::new(),
        }
    }

    impl Fixture {
        fn delay(&self, frame: u64) -> DelayOutcome {
            self.engine.delay_present_start(
                FrameId(frame),
                &self.settings,
                &self.table,
                &self.combined,
                self.clock.as_ref(),
            )
        }
    }

    #[test]
    fn two_frames_at_sixty_hertz() {
        let f = fixture();
        f.settings.set_delay_frames(2);
        f.settings.set_target_fps(Hertz(60.0));
        f.table
            .record(FrameId(100), MarkerKind::SimulationStart, Nanoseconds::ZERO);

        f.clock.set(Nanoseconds::from_millis(10));
        let outcome = f.delay(100);

        let deadline = Nanoseconds(33_333_334);
        assert_eq!(outcome, DelayOutcome::Waited { deadline });
        assert_eq!(f.timer.waits(), vec![(Nanoseconds::from_millis(10), deadline)]);
    }

    #[test]
    fn unobserved_frames_never_block() {
        let f = fixture();
        f.settings.set_target_fps(Hertz(60.0));

        assert_eq!(f.delay(5), DelayOutcome::Unavailable);
        assert!(f.timer.waits().is_empty());
    }

    #[test]
    fn warmup_and_disabled() {
        let f = fixture();
        f.settings.set_target_fps(Hertz(60.0));
        f.settings.set_warmup_frames(10);
        f.table
            .record(FrameId(10), MarkerKind::SimulationStart, Nanoseconds::ZERO);

        assert_eq!(f.delay(10), DelayOutcome::WarmingUp);

        f.settings.set_delay_enabled(false);
        assert_eq!(f.delay(11), DelayOutcome::Disabled);
        assert!(f.timer.waits().is_empty());
    }

    #[test]
    fn measured_frame_time_is_the_fallback() {
        let f = fixture();
        assert_eq!(f.engine.estimated_frame_duration(&f.settings, &f.combined), None);

        for _ in 0..4 {
            f.combined.push(Nanoseconds::from_millis(8));
        }
        f.table
            .record(FrameId(1), MarkerKind::SimulationStart, Nanoseconds::from_millis(2));

        assert_eq!(
            f.delay(1),
            DelayOutcome::Waited {
                deadline: Nanoseconds::from_millis(10)
            }
        );
    }

    #[test]
    fn no_estimate_and_past_deadlines_fail_open() {
        let f = fixture();
        f.table
            .record(FrameId(3), MarkerKind::SimulationStart, Nanoseconds::ZERO);
        assert_eq!(f.delay(3), DelayOutcome::NoEstimate);

        f.settings.set_target_fps(Hertz(1000.0));
        f.clock.set(Nanoseconds::from_millis(5));
        assert_eq!(f.delay(3), DelayOutcome::AlreadyPast);

        f.table
            .record(FrameId(4), MarkerKind::SimulationStart, Nanoseconds::from_millis(10_000));
        assert_eq!(f.delay(4), DelayOutcome::Implausible);
        assert!(f.timer.waits().is_empty());
    }

    #[test]
    fn long_delays_at_low_rates_still_wait() {
        let f = fixture();
        f.settings.set_delay_frames(8);
        f.settings.set_target_fps(Hertz(30.0));
        f.table
            .record(FrameId(40), MarkerKind::SimulationStart, Nanoseconds::ZERO);

        f.clock.set(Nanoseconds::from_millis(10));
        let deadline = Nanoseconds(266_666_664);
        assert_eq!(f.delay(40), DelayOutcome::Waited { deadline });
        assert_eq!(f.timer.waits(), vec![(Nanoseconds::from_millis(10), deadline)]);
    }

    #[test]
    fn frame_generation_scales_the_target() {
        let clock = ManualClock::new(Nanoseconds::ZERO);
        let engine = DelayEngine::new(RecordingTimer::new(clock), Arc::new(Doubling));

        let settings = Settings::default();
        settings.set_target_fps(Hertz(120.0));

        assert_eq!(
            engine.estimated_frame_duration(&settings, &FrameTimeRing::new()),
            Some(Nanoseconds(16_666_667))
        );
    }
}
