//! Refresh-rate monitor.
//!
//! A dedicated thread polls the compositor's frame statistics, counts how
//! often its "last frame" time changes, and publishes the measured and
//! smoothed refresh rate along with a fixed-versus-variable refresh guess.
//! Readers get a consistent-enough snapshot through relaxed atomics.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread::JoinHandle,
};

use parking_lot::{Mutex, RwLock};

use crate::{
    config::Settings,
    error::MonitorError,
    limits::{
        REFRESH_COUNT_WINDOW, VRR_DENSITY_WINDOW, VRR_HISTORY_WINDOW, VRR_MIN_DENSE_SAMPLES,
        VRR_MIN_DIPS, VRR_MIN_SPREAD_HZ,
    },
    system::{
        time::{Hertz, Nanoseconds},
        Clock,
    },
};

/// One read of the compositor's frame statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CompositionSample {
    /// When the compositor last presented a frame.
    pub last_frame: Nanoseconds,
    /// The compositor's current nominal rate, zero if unknown.
    pub composition_rate: Hertz,
}

/// An open handle on the compositor's statistics. Dropping it releases the
/// handle.
pub trait CompositionPipeline: Send + Sync {
    fn sample(&self) -> Result<CompositionSample, MonitorError>;
}

pub trait CompositionProvider: Send + Sync {
    fn open(&self) -> Result<Box<dyn CompositionPipeline>, MonitorError>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RefreshRateStats {
    /// Refreshes counted over the last complete window.
    pub measured: Hertz,
    /// Rolling average of the compositor's reported rate.
    pub smoothed: Hertz,
    pub min: Hertz,
    pub max: Hertz,
    /// Number of successful statistics reads since the monitor started.
    pub samples: u64,
    pub valid: bool,
    pub probable_vrr: bool,
}

/// Classifies a stream of instantaneous refresh rates as fixed or variable.
#[derive(Debug, Default)]
struct VrrClassifier {
    history: VecDeque<(Nanoseconds, f64)>,
}

impl VrrClassifier {
    fn push(&mut self, now: Nanoseconds, rate: Hertz) {
        self.history.push_back((now, rate.0));

        while let Some(&(time, _)) = self.history.front() {
            if now - time <= VRR_HISTORY_WINDOW {
                break;
            }
            self.history.pop_front();
        }
    }

    fn min_max(&self) -> Option<(f64, f64)> {
        self.history.iter().fold(None, |acc, &(_, rate)| match acc {
            None => Some((rate, rate)),
            Some((min, max)) => Some((min.min(rate), max.max(rate))),
        })
    }

    /// The display is probably variable refresh when rates spread by more than
    /// a couple of hertz, the recent samples are dense enough to trust, and
    /// at least two of them dip clearly below the fixed rate.
    fn probable_vrr(&self, now: Nanoseconds) -> bool {
        let Some((min, fixed_hz)) = self.min_max() else {
            return false;
        };

        if fixed_hz - min <= VRR_MIN_SPREAD_HZ {
            return false;
        }

        let recent = self
            .history
            .iter()
            .rev()
            .take_while(|(time, _)| now - *time <= VRR_DENSITY_WINDOW)
            .count();

        if recent < VRR_MIN_DENSE_SAMPLES {
            return false;
        }

        let threshold = fixed_hz - fixed_hz * fixed_hz / 3600.0;
        let dips = self
            .history
            .iter()
            .filter(|(_, rate)| *rate < threshold)
            .count();

        dips >= VRR_MIN_DIPS
    }
}

/// The monitor thread's state between ticks.
#[derive(Debug, Default)]
struct RefreshTracker {
    window_start: Option<Nanoseconds>,
    refreshes: u64,
    last_frame: Option<Nanoseconds>,
    measured: Hertz,
    rates: VecDeque<f64>,
    vrr: VrrClassifier,
    samples: u64,
}

impl RefreshTracker {
    fn observe(
        &mut self,
        now: Nanoseconds,
        sample: CompositionSample,
        smoothing_window: usize,
    ) -> RefreshRateStats {
        self.samples += 1;
        let window_start = *self.window_start.get_or_insert(now);

        if let Some(previous) = self.last_frame {
            if sample.last_frame > previous {
                self.refreshes += 1;

                let interval = sample.last_frame - previous;
                let nominal = sample.composition_rate.to_period();

                // a gap spanning skipped refreshes says nothing about the rate
                if nominal == Nanoseconds::ZERO || interval.0 * 2 < nominal.0 * 3 {
                    let rate = Hertz::from_period(interval);
                    if rate.is_valid() {
                        self.vrr.push(now, rate);
                    }
                }
            }
        }
        self.last_frame = Some(sample.last_frame);

        let elapsed = now - window_start;
        if elapsed >= REFRESH_COUNT_WINDOW {
            #[allow(clippy::cast_precision_loss)]
            let count = self.refreshes as f64;
            self.measured = Hertz(count / elapsed.as_secs_f64());
            self.refreshes = 0;
            self.window_start = Some(now);
        }

        if sample.composition_rate.is_valid() {
            self.rates.push_back(sample.composition_rate.0);
        }
        while self.rates.len() > smoothing_window.max(1) {
            self.rates.pop_front();
        }

        #[allow(clippy::cast_precision_loss)]
        let smoothed = if self.rates.is_empty() {
            Hertz::ZERO
        } else {
            Hertz(self.rates.iter().sum::<f64>() / self.rates.len() as f64)
        };

        let (min, max) = self.vrr.min_max().unwrap_or((0.0, 0.0));

        RefreshRateStats {
            measured: self.measured,
            smoothed,
            min: Hertz(min),
            max: Hertz(max),
            samples: self.samples,
            valid: self.measured.is_valid(),
            probable_vrr: self.vrr.probable_vrr(now),
        }
    }
}

#[derive(Debug, Default)]
struct PublishedStats {
    measured: AtomicU64,
    smoothed: AtomicU64,
    min: AtomicU64,
    max: AtomicU64,
    samples: AtomicU64,
    valid: AtomicBool,
    probable_vrr: AtomicBool,
}

impl PublishedStats {
    fn publish(&self, stats: &RefreshRateStats) {
        self.measured.store(stats.measured.0.to_bits(), Ordering::Relaxed);
        self.smoothed.store(stats.smoothed.0.to_bits(), Ordering::Relaxed);
        self.min.store(stats.min.0.to_bits(), Ordering::Relaxed);
        self.max.store(stats.max.0.to_bits(), Ordering::Relaxed);
        self.samples.store(stats.samples, Ordering::Relaxed);
        self.probable_vrr.store(stats.probable_vrr, Ordering::Relaxed);
        self.valid.store(stats.valid, Ordering::Relaxed);
    }

    fn load(&self) -> RefreshRateStats {
        let rate = |cell: &AtomicU64| Hertz(f64::from_bits(cell.load(Ordering::Relaxed)));

        RefreshRateStats {
            measured: rate(&self.measured),
            smoothed: rate(&self.smoothed),
            min: rate(&self.min),
            max: rate(&self.max),
            samples: self.samples.load(Ordering::Relaxed),
            valid: self.valid.load(Ordering::Relaxed),
            probable_vrr: self.probable_vrr.load(Ordering::Relaxed),
        }
    }
}

struct Shared {
    pipeline: RwLock<Option<Box<dyn CompositionPipeline>>>,
    stop: AtomicBool,
    active: AtomicBool,
    stats: PublishedStats,
}

pub struct RefreshRateMonitor {
    provider: Arc<dyn CompositionProvider>,
    settings: Arc<Settings>,
    clock: Arc<dyn Clock>,
    shared: Arc<Shared>,
    /// Serializes start and stop; holds the polling thread while it runs.
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshRateMonitor {
    pub fn new(
        provider: Arc<dyn CompositionProvider>,
        settings: Arc<Settings>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            provider,
            settings,
            clock,
            shared: Arc::new(Shared {
                pipeline: RwLock::new(None),
                stop: AtomicBool::new(false),
                active: AtomicBool::new(false),
                stats: PublishedStats::default(),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Acquires the composition handle and starts polling. Starting a running
    /// monitor only re-asserts that it is active.
    #[tracing::instrument(skip(self))]
    pub fn start(&self) -> Result<(), MonitorError> {
        let mut worker = self.worker.lock();

        if worker.is_some() {
            self.shared.active.store(true, Ordering::Relaxed);
            return Ok(());
        }

        let pipeline = self.provider.open().map_err(|e| {
            tracing::warn!("Refresh-rate monitor unavailable: {e}");
            e
        })?;

        *self.shared.pipeline.write() = Some(pipeline);
        self.shared.stop.store(false, Ordering::Release);

        let shared = self.shared.clone();
        let settings = self.settings.clone();
        let clock = self.clock.clone();

        let spawned = std::thread::Builder::new()
            .name("refresh-monitor".to_owned())
            .spawn(move || poll(&shared, &settings, clock.as_ref()));

        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                self.shared.active.store(true, Ordering::Relaxed);
                tracing::info!("Refresh-rate monitor started");
                Ok(())
            }
            Err(e) => {
                *self.shared.pipeline.write() = None;
                tracing::warn!("Failed to start the refresh-rate monitor thread: {e}");
                Err(MonitorError::Spawn(e))
            }
        }
    }

    /// Stops polling and releases the composition handle. Returns once the
    /// polling thread has exited.
    #[tracing::instrument(skip(self))]
    pub fn stop(&self) {
        let mut worker = self.worker.lock();

        let Some(handle) = worker.take() else {
            return;
        };

        self.shared.stop.store(true, Ordering::Release);
        self.shared.active.store(false, Ordering::Relaxed);
        *self.shared.pipeline.write() = None;

        if handle.join().is_err() {
            tracing::error!("The refresh-rate monitor thread panicked");
        }

        self.shared.stats.valid.store(false, Ordering::Relaxed);
        tracing::info!("Refresh-rate monitor stopped");
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn stats(&self) -> RefreshRateStats {
        self.shared.stats.load()
    }
}

impl Drop for RefreshRateMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn poll(shared: &Shared, settings: &Settings, clock: &dyn Clock) {
    let mut tracker = RefreshTracker::default();
    let mut failing = false;

    while !shared.stop.load(Ordering::Acquire) {
        let sample = {
            let pipeline = shared.pipeline.read();
            let Some(pipeline) = pipeline.as_ref() else {
                break;
            };
            pipeline.sample()
        };

        match sample {
            Ok(sample) => {
                let stats = tracker.observe(clock.now(), sample, settings.smoothing_window());
                shared.stats.publish(&stats);
                failing = false;
            }
            Err(e) => {
                if !failing {
                    tracing::warn!("Failed to read composition statistics: {e}");
                }
                failing = true;
            }
        }

        std::thread::sleep(settings.monitor_interval().to_std());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::system::SystemClock;

    /// Feeds a tracker a compositor refreshing every `period`, polled every
    /// 2 ms, for `duration`.
    fn run_synthetic(
        tracker: &mut RefreshTracker,
        period: impl Fn(i64) -> i64,
        duration: Nanoseconds,
    ) -> RefreshRateStats {
        let poll = Nanoseconds::from_millis(2);
        let mut now = Nanoseconds::ZERO;
        let mut last_frame = 0;
        let mut next_frame = period(0);
        let mut stats = RefreshRateStats::default();

        while now <= duration {
            while next_frame <= now.0 {
                last_frame = next_frame;
                next_frame += period(next_frame);
            }

            let sample = CompositionSample {
                last_frame: Nanoseconds(last_frame),
                composition_rate: Hertz::ZERO,
            };
            stats = tracker.observe(now, sample, 32);
            now += poll;
        }

        stats
    }

    #[test]
    fn measured_rate_converges_on_the_period() {
        let mut tracker = RefreshTracker::default();
        let stats = run_synthetic(&mut tracker, |_| 6_944_444, Nanoseconds::from_millis(3_000));

        assert!(stats.valid);
        assert!((stats.measured.0 - 144.0).abs() < 2.0, "{:?}", stats.measured);
    }

    #[test]
    fn flat_refresh_is_not_vrr() {
        let mut tracker = RefreshTracker::default();
        // alternates between 60.0 and 60.4 Hz
        let stats = run_synthetic(
            &mut tracker,
            |t| if (t / 16_666_667) % 2 == 0 { 16_666_667 } else { 16_556_291 },
            Nanoseconds::from_millis(3_000),
        );

        assert!(!stats.probable_vrr);
        assert!(stats.max.0 - stats.min.0 <= 1.0);
    }

    #[test]
    fn dipping_refresh_is_vrr() {
        let mut tracker = RefreshTracker::default();
        // mostly 144 Hz with regular dips to 100 Hz
        let stats = run_synthetic(
            &mut tracker,
            |t| if (t / 6_944_444) % 5 == 0 { 10_000_000 } else { 6_944_444 },
            Nanoseconds::from_millis(3_000),
        );

        assert!(stats.probable_vrr);
        assert!(stats.max.0 - stats.min.0 > 2.0);
    }

    #[test]
    fn smoothed_rate_averages_reported_rates() {
        let mut tracker = RefreshTracker::default();
        let mut stats = RefreshRateStats::default();

        for (i, rate) in [60.0, 120.0, 90.0].into_iter().enumerate() {
            let sample = CompositionSample {
                last_frame: Nanoseconds(i as i64),
                composition_rate: Hertz(rate),
            };
            stats = tracker.observe(Nanoseconds(i as i64), sample, 2);
        }

        assert_eq!(stats.smoothed, Hertz(105.0));
        assert_eq!(stats.samples, 3);
    }

    struct CountingProvider {
        opened: AtomicUsize,
        released: Arc<AtomicUsize>,
        fail: bool,
    }

    struct CountingPipeline {
        released: Arc<AtomicUsize>,
    }

    impl CompositionPipeline for CountingPipeline {
        fn sample(&self) -> Result<CompositionSample, MonitorError> {
            Ok(CompositionSample {
                last_frame: Nanoseconds::now(),
                composition_rate: Hertz(60.0),
            })
        }
    }

    impl Drop for CountingPipeline {
        fn drop(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl CompositionProvider for CountingProvider {
        fn open(&self) -> Result<Box<dyn CompositionPipeline>, MonitorError> {
            if self.fail {
                return Err(MonitorError::Unsupported);
            }

            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CountingPipeline {
                released: self.released.clone(),
            }))
        }
    }

    fn counted_monitor(fail: bool) -> (RefreshRateMonitor, Arc<CountingProvider>) {
        let provider = Arc::new(CountingProvider {
            opened: AtomicUsize::new(0),
            released: Arc::new(AtomicUsize::new(0)),
            fail,
        });

        let monitor = RefreshRateMonitor::new(
            provider.clone(),
            Arc::new(Settings::default()),
            Arc::new(SystemClock),
        );

        (monitor, provider)
    }

    #[test]
    fn start_and_stop_acquire_once() {
        let (monitor, provider) = counted_monitor(false);

        monitor.start().unwrap();
        monitor.start().unwrap();
        assert!(monitor.is_active());
        assert_eq!(provider.opened.load(Ordering::SeqCst), 1);

        monitor.stop();
        monitor.stop();
        assert!(!monitor.is_active());
        assert_eq!(provider.released.load(Ordering::SeqCst), 1);
        assert!(!monitor.stats().valid);

        monitor.start().unwrap();
        assert_eq!(provider.opened.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failed_start_leaves_stats_invalid() {
        let (monitor, _) = counted_monitor(true);

        assert!(matches!(monitor.start(), Err(MonitorError::Unsupported)));
        assert!(!monitor.is_active());
        assert_eq!(monitor.stats(), RefreshRateStats::default());
    }
}
