//! Live pacing configuration.
//!
//! Every setting is an atomic so the interception paths can read it on every
//! call without locking while a settings surface changes it concurrently.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};

use crate::{
    frame::{MarkerPolicy, PacingStrategy},
    limits::{DEFAULT_MONITOR_INTERVAL, MAX_SMOOTHING_WINDOW},
    system::time::{Hertz, Nanoseconds},
};

const DEFAULT_DELAY_FRAMES: u32 = 1;
const DEFAULT_WARMUP_FRAMES: u32 = 60;
const DEFAULT_SMOOTHING_WINDOW: u32 = 32;

#[derive(Debug)]
pub struct Settings {
    pacing_enabled: AtomicBool,
    strategy: AtomicU8,
    /// Bit pattern of an `f64`; zero means uncapped.
    target_fps: AtomicU64,
    delay_enabled: AtomicBool,
    delay_frames: AtomicU32,
    warmup_frames: AtomicU32,
    marker_policy: AtomicU8,
    suppress_present_end: AtomicBool,
    monitor_enabled: AtomicBool,
    monitor_interval_us: AtomicU32,
    smoothing_window: AtomicU32,
}

impl Default for Settings {
    fn default() -> Self {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let interval_us = (DEFAULT_MONITOR_INTERVAL.0 / 1_000) as u32;

        Self {
            pacing_enabled: AtomicBool::new(true),
            strategy: AtomicU8::new(PacingStrategy::default() as u8),
            target_fps: AtomicU64::new(0.0f64.to_bits()),
            delay_enabled: AtomicBool::new(false),
            delay_frames: AtomicU32::new(DEFAULT_DELAY_FRAMES),
            warmup_frames: AtomicU32::new(DEFAULT_WARMUP_FRAMES),
            marker_policy: AtomicU8::new(MarkerPolicy::default() as u8),
            suppress_present_end: AtomicBool::new(false),
            monitor_enabled: AtomicBool::new(true),
            monitor_interval_us: AtomicU32::new(interval_us),
            smoothing_window: AtomicU32::new(DEFAULT_SMOOTHING_WINDOW),
        }
    }
}

impl Settings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default settings with `PACER_*` environment overrides applied.
    #[must_use]
    pub fn from_env() -> Self {
        let settings = Self::default();
        settings.apply_overrides(|name| std::env::var(name).ok());
        settings
    }

    /// Applies every override `lookup` returns a value for. Unparseable values
    /// are logged and ignored.
    pub fn apply_overrides(&self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("PACER_ENABLED") {
            self.set_pacing_enabled(parse_truthy(&v));
        }

        if let Some(v) = lookup("PACER_STRATEGY") {
            match v.trim().to_ascii_lowercase().as_str() {
                "vendor" | "markers" => self.set_strategy(PacingStrategy::VendorMarkers),
                "present" | "present-sync" => self.set_strategy(PacingStrategy::PresentSync),
                "external" | "external-sync" => self.set_strategy(PacingStrategy::ExternalSync),
                other => tracing::warn!("Ignoring unknown PACER_STRATEGY {other:?}"),
            }
        }

        if let Some(v) = lookup("PACER_TARGET_FPS") {
            match parse_non_negative_f64(&v) {
                Some(fps) => self.set_target_fps(Hertz(fps)),
                None => tracing::warn!("Ignoring invalid PACER_TARGET_FPS {v:?}"),
            }
        }

        if let Some(v) = lookup("PACER_DELAY_ENABLED") {
            self.set_delay_enabled(parse_truthy(&v));
        }

        if let Some(v) = lookup("PACER_DELAY_FRAMES") {
            match parse_positive_u32(&v) {
                Some(frames) => self.set_delay_frames(frames),
                None => tracing::warn!("Ignoring invalid PACER_DELAY_FRAMES {v:?}"),
            }
        }

        if let Some(v) = lookup("PACER_WARMUP_FRAMES") {
            match v.trim().parse::<u32>() {
                Ok(frames) => self.set_warmup_frames(frames),
                Err(_) => tracing::warn!("Ignoring invalid PACER_WARMUP_FRAMES {v:?}"),
            }
        }

        if let Some(v) = lookup("PACER_MARKER_POLICY") {
            match v.trim().to_ascii_lowercase().as_str() {
                "native" | "passthrough" => self.set_marker_policy(MarkerPolicy::NativePassthrough),
                "simulation-start" | "sim-start" => {
                    self.set_marker_policy(MarkerPolicy::SimulationStartOnly);
                }
                other => tracing::warn!("Ignoring unknown PACER_MARKER_POLICY {other:?}"),
            }
        }

        if let Some(v) = lookup("PACER_SUPPRESS_PRESENT_END") {
            self.set_suppress_present_end(parse_truthy(&v));
        }

        if let Some(v) = lookup("PACER_MONITOR_ENABLED") {
            self.set_monitor_enabled(parse_truthy(&v));
        }

        if let Some(v) = lookup("PACER_MONITOR_INTERVAL_US") {
            match parse_positive_u32(&v) {
                Some(us) => self.set_monitor_interval(Nanoseconds::from_micros(i64::from(us))),
                None => tracing::warn!("Ignoring invalid PACER_MONITOR_INTERVAL_US {v:?}"),
            }
        }

        if let Some(v) = lookup("PACER_SMOOTHING_WINDOW") {
            match parse_positive_u32(&v) {
                Some(window) => self.set_smoothing_window(window as usize),
                None => tracing::warn!("Ignoring invalid PACER_SMOOTHING_WINDOW {v:?}"),
            }
        }
    }

    pub fn pacing_enabled(&self) -> bool {
        self.pacing_enabled.load(Ordering::Relaxed)
    }

    pub fn set_pacing_enabled(&self, enabled: bool) {
        self.pacing_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn strategy(&self) -> PacingStrategy {
        PacingStrategy::from_raw(self.strategy.load(Ordering::Relaxed))
    }

    pub fn set_strategy(&self, strategy: PacingStrategy) {
        self.strategy.store(strategy as u8, Ordering::Relaxed);
    }

    /// The frame-rate cap, or `None` when uncapped.
    pub fn target_fps(&self) -> Option<Hertz> {
        let fps = Hertz(f64::from_bits(self.target_fps.load(Ordering::Relaxed)));
        fps.is_valid().then_some(fps)
    }

    /// Sets the frame-rate cap. Zero, negative or non-finite rates uncap.
    pub fn set_target_fps(&self, fps: Hertz) {
        let fps = if fps.is_valid() { fps.0 } else { 0.0 };
        self.target_fps.store(fps.to_bits(), Ordering::Relaxed);
    }

    pub fn delay_enabled(&self) -> bool {
        self.delay_enabled.load(Ordering::Relaxed)
    }

    pub fn set_delay_enabled(&self, enabled: bool) {
        self.delay_enabled.store(enabled, Ordering::Relaxed);
    }

    /// How many frame durations present-start is held back from
    /// simulation-start.
    pub fn delay_frames(&self) -> u32 {
        self.delay_frames.load(Ordering::Relaxed)
    }

    pub fn set_delay_frames(&self, frames: u32) {
        self.delay_frames.store(frames, Ordering::Relaxed);
    }

    /// Frames at or below this id are never delayed.
    pub fn warmup_frames(&self) -> u32 {
        self.warmup_frames.load(Ordering::Relaxed)
    }

    pub fn set_warmup_frames(&self, frames: u32) {
        self.warmup_frames.store(frames, Ordering::Relaxed);
    }

    pub fn marker_policy(&self) -> MarkerPolicy {
        MarkerPolicy::from_raw(self.marker_policy.load(Ordering::Relaxed))
    }

    pub fn set_marker_policy(&self, policy: MarkerPolicy) {
        self.marker_policy.store(policy as u8, Ordering::Relaxed);
    }

    pub fn suppress_present_end(&self) -> bool {
        self.suppress_present_end.load(Ordering::Relaxed)
    }

    pub fn set_suppress_present_end(&self, suppress: bool) {
        self.suppress_present_end.store(suppress, Ordering::Relaxed);
    }

    pub fn monitor_enabled(&self) -> bool {
        self.monitor_enabled.load(Ordering::Relaxed)
    }

    pub fn set_monitor_enabled(&self, enabled: bool) {
        self.monitor_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn monitor_interval(&self) -> Nanoseconds {
        Nanoseconds::from_micros(i64::from(self.monitor_interval_us.load(Ordering::Relaxed)))
    }

    /// Sets the monitor's polling interval, clamped to at least 100 µs.
    pub fn set_monitor_interval(&self, interval: Nanoseconds) {
        let us = u32::try_from(interval.0 / 1_000).unwrap_or(u32::MAX).max(100);
        self.monitor_interval_us.store(us, Ordering::Relaxed);
    }

    /// Number of composition-rate reads averaged into the smoothed rate.
    pub fn smoothing_window(&self) -> usize {
        self.smoothing_window.load(Ordering::Relaxed) as usize
    }

    /// Sets the smoothing window, clamped to `1..=MAX_SMOOTHING_WINDOW`.
    pub fn set_smoothing_window(&self, window: usize) {
        let window = window.clamp(1, MAX_SMOOTHING_WINDOW);

        #[allow(clippy::cast_possible_truncation)]
        self.smoothing_window.store(window as u32, Ordering::Relaxed);
    }
}

/// `1`, `true`, `yes` and `on` (case-insensitive, trimmed) are truthy.
fn parse_truthy(raw: &str) -> bool {
    let normalized = raw.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

fn parse_positive_u32(raw: &str) -> Option<u32> {
    raw.trim().parse::<u32>().ok().filter(|value| *value > 0)
}

fn parse_non_negative_f64(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && *value >= 0.0)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn overrides(pairs: &[(&str, &str)]) -> Settings {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();

        let settings = Settings::default();
        settings.apply_overrides(|name| map.get(name).cloned());
        settings
    }

    #[test]
    fn defaults() {
        let settings = Settings::default();
        assert!(settings.pacing_enabled());
        assert_eq!(settings.strategy(), PacingStrategy::VendorMarkers);
        assert_eq!(settings.target_fps(), None);
        assert!(!settings.delay_enabled());
        assert_eq!(settings.delay_frames(), 1);
        assert_eq!(settings.monitor_interval(), Nanoseconds::from_millis(2));
    }

    #[test]
    fn env_overrides_are_parsed() {
        let settings = overrides(&[
            ("PACER_ENABLED", " Off "),
            ("PACER_STRATEGY", "present"),
            ("PACER_TARGET_FPS", "141.5"),
            ("PACER_DELAY_ENABLED", "YES"),
            ("PACER_DELAY_FRAMES", "2"),
            ("PACER_WARMUP_FRAMES", "0"),
            ("PACER_MARKER_POLICY", "simulation-start"),
            ("PACER_SMOOTHING_WINDOW", "100000"),
        ]);

        assert!(!settings.pacing_enabled());
        assert_eq!(settings.strategy(), PacingStrategy::PresentSync);
        assert_eq!(settings.target_fps(), Some(Hertz(141.5)));
        assert!(settings.delay_enabled());
        assert_eq!(settings.delay_frames(), 2);
        assert_eq!(settings.warmup_frames(), 0);
        assert_eq!(settings.marker_policy(), MarkerPolicy::SimulationStartOnly);
        assert_eq!(settings.smoothing_window(), MAX_SMOOTHING_WINDOW);
    }

    #[test]
    fn invalid_overrides_keep_defaults() {
        let settings = overrides(&[
            ("PACER_STRATEGY", "fastest"),
            ("PACER_TARGET_FPS", "-60"),
            ("PACER_DELAY_FRAMES", "0"),
            ("PACER_MONITOR_INTERVAL_US", "soon"),
        ]);

        assert_eq!(settings.strategy(), PacingStrategy::VendorMarkers);
        assert_eq!(settings.target_fps(), None);
        assert_eq!(settings.delay_frames(), 1);
        assert_eq!(settings.monitor_interval(), Nanoseconds::from_millis(2));
    }

    #[test]
    fn zero_fps_uncaps() {
        let settings = Settings::default();
        settings.set_target_fps(Hertz(60.0));
        assert_eq!(settings.target_fps(), Some(Hertz(60.0)));
        settings.set_target_fps(Hertz(0.0));
        assert_eq!(settings.target_fps(), None);
    }
}
