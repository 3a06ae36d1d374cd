//! The default pacing hooks: a frame-rate limiter scheduled on absolute
//! deadlines.

use std::sync::{
    atomic::{AtomicI64, AtomicU64, Ordering},
    Arc,
};

use crate::{
    config::Settings,
    frame::{FrameId, PacingMode},
    selector::PacingHooks,
    system::{time::Nanoseconds, Clock, DeadlineTimer},
};

/// Deadline value meaning "no frame scheduled yet".
const UNSCHEDULED: i64 = i64::MIN;

/// Holds each paced frame until the next tick of a fixed-rate schedule at the
/// configured target rate.
///
/// The schedule advances by exactly one period per frame, so a late wake-up
/// does not push later frames back. A frame that arrives more than one period
/// behind schedule restarts the schedule from now instead of trying to catch
/// up. Frames decided as [`PacingMode::ExternalSyncDriven`] are handed to the
/// external synchronization hooks, if any.
pub struct FrameLimiter {
    settings: Arc<Settings>,
    clock: Arc<dyn Clock>,
    timer: Arc<dyn DeadlineTimer>,
    external: Option<Arc<dyn PacingHooks>>,
    next_deadline: AtomicI64,
    missed: AtomicU64,
}

impl FrameLimiter {
    pub fn new(settings: Arc<Settings>, clock: Arc<dyn Clock>, timer: Arc<dyn DeadlineTimer>) -> Self {
        Self {
            settings,
            clock,
            timer,
            external: None,
            next_deadline: AtomicI64::new(UNSCHEDULED),
            missed: AtomicU64::new(0),
        }
    }

    /// Routes externally synchronized frames to `external`.
    #[must_use]
    pub fn with_external_sync(mut self, external: Arc<dyn PacingHooks>) -> Self {
        self.external = Some(external);
        self
    }

    /// Number of frames that arrived after their scheduled tick.
    pub fn missed_deadlines(&self) -> u64 {
        self.missed.load(Ordering::Relaxed)
    }

    fn limit(&self, frame: FrameId) {
        let Some(fps) = self.settings.target_fps() else {
            self.next_deadline.store(UNSCHEDULED, Ordering::Relaxed);
            return;
        };

        let period = fps.to_period();
        let now = self.clock.now();
        let scheduled = self.next_deadline.load(Ordering::Relaxed);

        let deadline = if scheduled == UNSCHEDULED {
            now
        } else {
            let scheduled = Nanoseconds(scheduled);

            if now - scheduled > period {
                self.missed.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(frame = frame.0, "Frame limiter resynchronized");
                now
            } else if scheduled - now > period {
                // the target rate was raised since the frame was scheduled
                now + period
            } else {
                scheduled
            }
        };

        self.timer.wait_until(now, deadline);
        self.next_deadline
            .store((deadline + period).0, Ordering::Relaxed);
    }
}

impl PacingHooks for FrameLimiter {
    fn pre_present(&self, frame: FrameId, mode: PacingMode) {
        match mode {
            PacingMode::Disabled => {}
            PacingMode::VendorMarkerDriven | PacingMode::PresentSyncDriven => self.limit(frame),
            PacingMode::ExternalSyncDriven => {
                if let Some(external) = &self.external {
                    external.pre_present(frame, mode);
                }
            }
        }
    }

    fn post_present(&self, frame: FrameId, mode: PacingMode) {
        if mode == PacingMode::ExternalSyncDriven {
            if let Some(external) = &self.external {
                external.post_present(frame, mode);
            }
        }
    }
}
