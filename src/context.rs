//! The process-wide pacing state shared by every interception entry point.

use std::sync::{
    atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering},
    Arc,
};

use crate::{
    buffers::{LatencyMarkerTable, SleepIntervalRing},
    config::Settings,
    delay::{DelayEngine, DelayOutcome, FrameGeneration, NoFrameGeneration},
    error::PacingError,
    frame::{FrameId, MarkerKind},
    limiter::FrameLimiter,
    limits::{DECISION_CACHE_CAPACITY, MARKER_ACTIVITY_WINDOW},
    monitor::{CompositionProvider, RefreshRateMonitor},
    present::PresentStatistics,
    selector::{PacingHooks, PacingSelector, SelectorInputs},
    system::{self, time::Nanoseconds, Clock, DeadlineTimer, PlatformTimer, SystemClock},
    vendor::{MarkerDiagnostics, VendorState},
};

const NO_MARKER: i64 = i64::MIN;

pub struct PacingContext {
    settings: Arc<Settings>,
    clock: Arc<dyn Clock>,
    hooks: Arc<dyn PacingHooks>,
    markers: LatencyMarkerTable,
    presents: PresentStatistics,
    sleep_intervals: SleepIntervalRing,
    selector: PacingSelector<DECISION_CACHE_CAPACITY>,
    delay: DelayEngine,
    monitor: RefreshRateMonitor,
    diagnostics: MarkerDiagnostics,
    vendor: VendorState,
    last_marker: AtomicI64,
    synthetic_frame: AtomicU64,
    shut_down: AtomicBool,
}

impl PacingContext {
    #[must_use]
    pub fn builder() -> PacingContextBuilder {
        PacingContextBuilder::default()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn hooks(&self) -> &dyn PacingHooks {
        self.hooks.as_ref()
    }

    pub fn markers(&self) -> &LatencyMarkerTable {
        &self.markers
    }

    pub fn presents(&self) -> &PresentStatistics {
        &self.presents
    }

    pub fn sleep_intervals(&self) -> &SleepIntervalRing {
        &self.sleep_intervals
    }

    pub fn selector(&self) -> &PacingSelector<DECISION_CACHE_CAPACITY> {
        &self.selector
    }

    pub fn monitor(&self) -> &RefreshRateMonitor {
        &self.monitor
    }

    pub fn diagnostics(&self) -> &MarkerDiagnostics {
        &self.diagnostics
    }

    pub fn vendor(&self) -> &VendorState {
        &self.vendor
    }

    /// Timestamps a marker into the table and notes that markers are arriving.
    pub fn record_marker(&self, frame: FrameId, kind: MarkerKind, now: Nanoseconds) {
        self.markers.record(frame, kind, now);
        self.last_marker.fetch_max(now.0, Ordering::Relaxed);
    }

    /// Whether a marker arrived within the activity window before `now`.
    pub fn markers_active(&self, now: Nanoseconds) -> bool {
        let last = self.last_marker.load(Ordering::Relaxed);
        last != NO_MARKER && now - Nanoseconds(last) <= MARKER_ACTIVITY_WINDOW
    }

    pub fn selector_inputs(&self, now: Nanoseconds) -> SelectorInputs {
        SelectorInputs::from_settings(&self.settings, self.markers_active(now))
    }

    /// The frame id a present at `now` belongs to: the application's most
    /// recent present-start id while it reports markers, otherwise a fresh
    /// engine-generated id.
    pub fn presentation_frame_id(&self, now: Nanoseconds) -> FrameId {
        if self.markers_active(now) {
            let reported = self
                .diagnostics
                .last_frame(MarkerKind::PresentStart)
                .or_else(|| self.diagnostics.last_frame(MarkerKind::SimulationStart));

            if let Some(frame) = reported {
                return frame;
            }
        }

        FrameId(self.synthetic_frame.fetch_add(1, Ordering::Relaxed))
    }

    /// Runs the present-start delay for `frame` on the calling thread.
    pub fn delay_present_start(&self, frame: FrameId) -> DelayOutcome {
        self.delay.delay_present_start(
            frame,
            &self.settings,
            &self.markers,
            self.presents.combined(),
            self.clock.as_ref(),
        )
    }

    pub fn estimated_frame_duration(&self) -> Option<Nanoseconds> {
        self.delay
            .estimated_frame_duration(&self.settings, self.presents.combined())
    }

    /// Starts the refresh-rate monitor if the settings enable it. A failure is
    /// logged and leaves the monitor inactive.
    pub fn sync_monitor(&self) {
        if self.settings.monitor_enabled() && !self.is_shut_down() {
            if self.monitor.start().is_err() {
                tracing::debug!("Refresh-rate statistics will be unavailable");
            }
        } else {
            self.monitor.stop();
        }
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Stops the monitor thread. Interception keeps forwarding calls, and
    /// pacing keeps following the settings.
    #[tracing::instrument(skip(self))]
    pub fn shutdown(&self) -> Result<(), PacingError> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Err(PacingError::ShutDown);
        }

        self.monitor.stop();
        tracing::info!("Pacing context shut down");
        Ok(())
    }
}

#[derive(Default)]
pub struct PacingContextBuilder {
    settings: Option<Settings>,
    clock: Option<Arc<dyn Clock>>,
    timer: Option<Arc<dyn DeadlineTimer>>,
    composition: Option<Arc<dyn CompositionProvider>>,
    frame_generation: Option<Arc<dyn FrameGeneration>>,
    hooks: Option<Arc<dyn PacingHooks>>,
    external_sync: Option<Arc<dyn PacingHooks>>,
}

impl PacingContextBuilder {
    #[must_use]
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    #[must_use]
    pub fn timer(mut self, timer: Arc<dyn DeadlineTimer>) -> Self {
        self.timer = Some(timer);
        self
    }

    #[must_use]
    pub fn composition(mut self, provider: Arc<dyn CompositionProvider>) -> Self {
        self.composition = Some(provider);
        self
    }

    #[must_use]
    pub fn frame_generation(mut self, frame_generation: Arc<dyn FrameGeneration>) -> Self {
        self.frame_generation = Some(frame_generation);
        self
    }

    /// Replaces the default frame limiter.
    #[must_use]
    pub fn hooks(mut self, hooks: Arc<dyn PacingHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// The external synchronization hooks the default frame limiter hands
    /// externally synchronized frames to.
    #[must_use]
    pub fn external_sync(mut self, hooks: Arc<dyn PacingHooks>) -> Self {
        self.external_sync = Some(hooks);
        self
    }

    /// Builds the context, starting the refresh-rate monitor if enabled. The
    /// context is usable even if the monitor cannot start.
    #[tracing::instrument(skip_all)]
    pub fn build(self) -> Result<Arc<PacingContext>, PacingError> {
        let settings = Arc::new(self.settings.unwrap_or_else(Settings::from_env));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let timer = self
            .timer
            .unwrap_or_else(|| Arc::new(PlatformTimer::new()));
        let composition = self
            .composition
            .unwrap_or_else(system::composition_provider);
        let frame_generation = self
            .frame_generation
            .unwrap_or_else(|| Arc::new(NoFrameGeneration));

        let hooks: Arc<dyn PacingHooks> = match self.hooks {
            Some(hooks) => hooks,
            None => {
                let limiter = FrameLimiter::new(settings.clone(), clock.clone(), timer.clone());
                match self.external_sync {
                    Some(external) => Arc::new(limiter.with_external_sync(external)),
                    None => Arc::new(limiter),
                }
            }
        };

        let context = Arc::new(PacingContext {
            monitor: RefreshRateMonitor::new(composition, settings.clone(), clock.clone()),
            delay: DelayEngine::new(timer, frame_generation),
            settings,
            clock,
            hooks,
            markers: LatencyMarkerTable::new(),
            presents: PresentStatistics::default(),
            sleep_intervals: SleepIntervalRing::new(),
            selector: PacingSelector::new(),
            diagnostics: MarkerDiagnostics::default(),
            vendor: VendorState::default(),
            last_marker: AtomicI64::new(NO_MARKER),
            synthetic_frame: AtomicU64::new(0),
            shut_down: AtomicBool::new(false),
        });

        context.sync_monitor();

        tracing::info!(
            strategy = ?context.settings.strategy(),
            policy = ?context.settings.marker_policy(),
            "Pacing context ready"
        );

        Ok(context)
    }
}
