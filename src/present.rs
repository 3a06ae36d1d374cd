//! Presentation interception.
//!
//! [`SwapChainProxy`] wraps a presentation object and stands in for it. Every
//! call is forwarded verbatim except the two frame-submission entry points,
//! which record frame times, consult the pacing selector and run the pacing
//! hooks around the forwarded call.

use std::sync::{
    atomic::{AtomicI64, AtomicU64, Ordering},
    Arc,
};

use bitflags::bitflags;

use crate::{
    buffers::FrameTimeRing,
    context::PacingContext,
    limits::{COMBINED_SAMPLE_GATE, FRAME_TIME_HISTORY},
    selector::CallSite,
    system::time::{Hertz, Nanoseconds},
};

/// An HRESULT-shaped status returned by the presentation surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Status(pub i32);

impl Status {
    pub const OK: Self = Self(0);

    #[allow(clippy::cast_possible_wrap)]
    pub const INVALID_CALL: Self = Self(0x887A_0001_u32 as i32);

    #[allow(clippy::cast_possible_wrap)]
    pub const NO_INTERFACE: Self = Self(0x8000_4002_u32 as i32);

    #[must_use]
    pub fn is_ok(self) -> bool {
        self.0 >= 0
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PresentFlags: u32 {
        /// Checks occlusion without presenting anything.
        const TEST = 0x1;
        const DO_NOT_SEQUENCE = 0x2;
        const RESTART = 0x4;
        const DO_NOT_WAIT = 0x8;
        const STEREO_PREFER_RIGHT = 0x10;
        const STEREO_TEMPORARY_MONO = 0x20;
        const RESTRICT_TO_OUTPUT = 0x40;
        const USE_DURATION = 0x100;
        const ALLOW_TEARING = 0x200;
    }
}

/// The newest interface revision a presentation object implements.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SwapChainVersion {
    V0,
    V1,
    V2,
    V3,
    V4,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

/// Dirty and scroll regions of a multi-buffer present.
#[derive(Clone, Copy, Debug, Default)]
pub struct PresentParameters<'a> {
    pub dirty_rects: &'a [Rect],
    pub scroll_rect: Option<Rect>,
    pub scroll_offset: Option<(i32, i32)>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BufferDesc {
    pub width: u32,
    pub height: u32,
    pub format: u32,
    pub buffer_count: u32,
    pub flags: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ModeDesc {
    pub width: u32,
    pub height: u32,
    pub refresh_numerator: u32,
    pub refresh_denominator: u32,
    pub format: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStatistics {
    pub present_count: u32,
    pub present_refresh_count: u32,
    pub sync_refresh_count: u32,
    pub sync_time: Nanoseconds,
}

/// An interface pointer handed out by the wrapped object. Ownership of the
/// reference passes to the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RawInterface(pub usize);

/// The presentation object's surface.
pub trait PresentationTarget: Send + Sync {
    /// Returns the new reference count.
    fn add_ref(&self) -> u32;
    /// Returns the new reference count.
    fn release(&self) -> u32;
    fn version(&self) -> SwapChainVersion;

    fn present(&self, sync_interval: u32, flags: PresentFlags) -> Status;
    fn present1(
        &self,
        sync_interval: u32,
        flags: PresentFlags,
        parameters: &PresentParameters<'_>,
    ) -> Status;

    fn resize_buffers(&self, count: u32, width: u32, height: u32, format: u32, flags: u32) -> Status;
    fn resize_target(&self, mode: &ModeDesc) -> Status;
    fn buffer(&self, index: u32) -> Result<RawInterface, Status>;
    fn desc(&self) -> Result<BufferDesc, Status>;
    fn frame_statistics(&self) -> Result<FrameStatistics, Status>;
    fn last_present_count(&self) -> Result<u32, Status>;
    fn current_back_buffer_index(&self) -> u32;
    fn set_maximum_frame_latency(&self, frames: u32) -> Status;
    fn maximum_frame_latency(&self) -> Result<u32, Status>;
    fn set_fullscreen_state(&self, fullscreen: bool) -> Status;
    fn fullscreen_state(&self) -> Result<bool, Status>;
    fn set_hdr_metadata(&self, kind: u32, metadata: &[u8]) -> Status;
    fn set_color_space(&self, color_space: u32) -> Status;
    fn check_color_space_support(&self, color_space: u32) -> Result<u32, Status>;
    fn set_source_size(&self, width: u32, height: u32) -> Status;
    fn source_size(&self) -> Result<(u32, u32), Status>;
    fn device(&self) -> Result<RawInterface, Status>;

    /// Submits the calling device's queued work.
    fn flush(&self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PresentVariant {
    Present = 0,
    Present1 = 1,
}

/// Whether a proxy observes the calls it forwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProxyMode {
    /// Forward everything untouched.
    Raw,
    Instrumented,
}

/// Timestamp meaning "no present seen yet".
const NEVER: i64 = i64::MIN;

/// Frame-time history of the instrumented presents.
pub struct PresentStatistics {
    variants: [FrameTimeRing; 2],
    combined: FrameTimeRing,
    last_combined: AtomicI64,
    presents: AtomicU64,
}

impl Default for PresentStatistics {
    fn default() -> Self {
        Self {
            variants: [FrameTimeRing::new(), FrameTimeRing::new()],
            combined: FrameTimeRing::new(),
            last_combined: AtomicI64::new(NEVER),
            presents: AtomicU64::new(0),
        }
    }
}

impl PresentStatistics {
    /// Records a present of `variant` at `now`. `last_variant` is the caller's
    /// own timestamp of its previous present of that variant.
    pub fn record(&self, variant: PresentVariant, now: Nanoseconds, last_variant: &AtomicI64) {
        self.presents.fetch_add(1, Ordering::Relaxed);

        let previous = last_variant.fetch_max(now.0, Ordering::AcqRel);
        if previous != NEVER && now.0 > previous {
            self.variants[variant as usize].push(now - Nanoseconds(previous));
        }

        let mut previous = self.last_combined.load(Ordering::Acquire);
        loop {
            if previous != NEVER && now - Nanoseconds(previous) < COMBINED_SAMPLE_GATE {
                return;
            }

            match self.last_combined.compare_exchange_weak(
                previous,
                now.0,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => previous = actual,
            }
        }

        if previous != NEVER {
            self.combined.push(now - Nanoseconds(previous));
        }
    }

    /// Number of instrumented presents recorded.
    #[must_use]
    pub fn present_count(&self) -> u64 {
        self.presents.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn variant(&self, variant: PresentVariant) -> &FrameTimeRing {
        &self.variants[variant as usize]
    }

    /// Presents of any variant, spaced at least 1 ms apart.
    #[must_use]
    pub fn combined(&self) -> &FrameTimeRing {
        &self.combined
    }

    /// Average frame time of `variant`, or of the combined channel.
    #[must_use]
    pub fn average_frame_time(&self, variant: Option<PresentVariant>) -> Option<Nanoseconds> {
        variant
            .map_or(&self.combined, |v| self.variant(v))
            .average(FRAME_TIME_HISTORY)
    }

    #[must_use]
    pub fn average_fps(&self, variant: Option<PresentVariant>) -> Hertz {
        self.average_frame_time(variant)
            .map_or(Hertz::ZERO, Hertz::from_period)
    }
}

/// Stands in for a presentation object, observing its frame submissions.
pub struct SwapChainProxy<T: PresentationTarget> {
    inner: T,
    mode: ProxyMode,
    context: Arc<PacingContext>,
    last_present: [AtomicI64; 2],
}

impl<T: PresentationTarget> SwapChainProxy<T> {
    pub fn new(inner: T, mode: ProxyMode, context: Arc<PacingContext>) -> Self {
        tracing::info!(?mode, version = ?inner.version(), "Wrapping presentation object");

        Self {
            inner,
            mode,
            context,
            last_present: [AtomicI64::new(NEVER), AtomicI64::new(NEVER)],
        }
    }

    #[must_use]
    pub fn mode(&self) -> ProxyMode {
        self.mode
    }

    #[must_use]
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Hands out another reference to this proxy if the wrapped object
    /// implements `version`.
    pub fn query_interface(&self, version: SwapChainVersion) -> Status {
        if version > self.inner.version() {
            return Status::NO_INTERFACE;
        }

        self.add_ref();
        Status::OK
    }

    fn intercept(
        &self,
        variant: PresentVariant,
        flags: PresentFlags,
        forward: impl FnOnce() -> Status,
    ) -> Status {
        if self.mode == ProxyMode::Raw || flags.contains(PresentFlags::TEST) {
            return forward();
        }

        #[cfg(feature = "profile")]
        let _s = tracing_tracy::client::span!("intercepted present");

        let context = &self.context;
        let now = context.clock().now();

        context
            .presents()
            .record(variant, now, &self.last_present[variant as usize]);

        let frame = context.presentation_frame_id(now);
        let decision = context.selector().choose(
            frame,
            CallSite::Presentation,
            context.selector_inputs(now),
        );

        if decision.activated {
            self.inner.flush();
            context.hooks().pre_present(frame, decision.mode);
        }

        let status = forward();

        if decision.activated {
            context.hooks().post_present(frame, decision.mode);
        }

        #[cfg(feature = "profile")]
        tracing_tracy::client::frame_mark();

        status
    }
}

impl<T: PresentationTarget> PresentationTarget for SwapChainProxy<T> {
    fn add_ref(&self) -> u32 {
        self.inner.add_ref()
    }

    fn release(&self) -> u32 {
        let remaining = self.inner.release();
        if remaining == 0 {
            tracing::info!(mode = ?self.mode, "Presentation object released");
        }
        remaining
    }

    fn version(&self) -> SwapChainVersion {
        self.inner.version()
    }

    fn present(&self, sync_interval: u32, flags: PresentFlags) -> Status {
        self.intercept(PresentVariant::Present, flags, || {
            self.inner.present(sync_interval, flags)
        })
    }

    fn present1(
        &self,
        sync_interval: u32,
        flags: PresentFlags,
        parameters: &PresentParameters<'_>,
    ) -> Status {
        self.intercept(PresentVariant::Present1, flags, || {
            self.inner.present1(sync_interval, flags, parameters)
        })
    }

    fn resize_buffers(&self, count: u32, width: u32, height: u32, format: u32, flags: u32) -> Status {
        self.inner.resize_buffers(count, width, height, format, flags)
    }

    fn resize_target(&self, mode: &ModeDesc) -> Status {
        self.inner.resize_target(mode)
    }

    fn buffer(&self, index: u32) -> Result<RawInterface, Status> {
        self.inner.buffer(index)
    }

    fn desc(&self) -> Result<BufferDesc, Status> {
        self.inner.desc()
    }

    fn frame_statistics(&self) -> Result<FrameStatistics, Status> {
        self.inner.frame_statistics()
    }

    fn last_present_count(&self) -> Result<u32, Status> {
        self.inner.last_present_count()
    }

    fn current_back_buffer_index(&self) -> u32 {
        self.inner.current_back_buffer_index()
    }

    fn set_maximum_frame_latency(&self, frames: u32) -> Status {
        self.inner.set_maximum_frame_latency(frames)
    }

    fn maximum_frame_latency(&self) -> Result<u32, Status> {
        self.inner.maximum_frame_latency()
    }

    fn set_fullscreen_state(&self, fullscreen: bool) -> Status {
        self.inner.set_fullscreen_state(fullscreen)
    }

    fn fullscreen_state(&self) -> Result<bool, Status> {
        self.inner.fullscreen_state()
    }

    fn set_hdr_metadata(&self, kind: u32, metadata: &[u8]) -> Status {
        self.inner.set_hdr_metadata(kind, metadata)
    }

    fn set_color_space(&self, color_space: u32) -> Status {
        self.inner.set_color_space(color_space)
    }

    fn check_color_space_support(&self, color_space: u32) -> Result<u32, Status> {
        self.inner.check_color_space_support(color_space)
    }

    fn set_source_size(&self, width: u32, height: u32) -> Status {
        self.inner.set_source_size(width, height)
    }

    fn source_size(&self) -> Result<(u32, u32), Status> {
        self.inner.source_size()
    }

    fn device(&self) -> Result<RawInterface, Status> {
        self.inner.device()
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, AtomicUsize};

    use parking_lot::Mutex;

    use super::*;
    use crate::{
        config::Settings,
        frame::{FrameId, MarkerKind, PacingMode, PacingStrategy},
        selector::PacingHooks,
        system::Clock,
        testing::{ManualClock, RecordingTimer},
    };

    #[derive(Default)]
    struct Calls {
        log: Mutex<Vec<&'static str>>,
    }

    impl Calls {
        fn push(&self, call: &'static str) {
            self.log.lock().push(call);
        }

        fn take(&self) -> Vec<&'static str> {
            std::mem::take(&mut *self.log.lock())
        }
    }

    struct FakeTarget {
        calls: Arc<Calls>,
        refs: AtomicU32,
        presents: AtomicUsize,
    }

    impl FakeTarget {
        fn new(calls: Arc<Calls>) -> Self {
            Self {
                calls,
                refs: AtomicU32::new(1),
                presents: AtomicUsize::new(0),
            }
        }
    }

    impl PresentationTarget for FakeTarget {
        fn add_ref(&self) -> u32 {
            self.refs.fetch_add(1, Ordering::SeqCst) + 1
        }

        fn release(&self) -> u32 {
            self.refs.fetch_sub(1, Ordering::SeqCst) - 1
        }

        fn version(&self) -> SwapChainVersion {
            SwapChainVersion::V3
        }

        fn present(&self, _sync_interval: u32, _flags: PresentFlags) -> Status {
            self.presents.fetch_add(1, Ordering::SeqCst);
            self.calls.push("present");
            Status::OK
        }

        fn present1(&self, _: u32, _: PresentFlags, _: &PresentParameters<'_>) -> Status {
            self.presents.fetch_add(1, Ordering::SeqCst);
            self.calls.push("present1");
            Status::OK
        }

        fn resize_buffers(&self, _: u32, _: u32, _: u32, _: u32, _: u32) -> Status {
            Status::INVALID_CALL
        }

        fn resize_target(&self, _: &ModeDesc) -> Status {
            Status::OK
        }

        fn buffer(&self, index: u32) -> Result<RawInterface, Status> {
            Ok(RawInterface(0x1000 + index as usize))
        }

        fn desc(&self) -> Result<BufferDesc, Status> {
            Ok(BufferDesc {
                width: 1920,
                height: 1080,
                format: 28,
                buffer_count: 3,
                flags: 0,
            })
        }

        fn frame_statistics(&self) -> Result<FrameStatistics, Status> {
            Err(Status::INVALID_CALL)
        }

        fn last_present_count(&self) -> Result<u32, Status> {
            Ok(7)
        }

        fn current_back_buffer_index(&self) -> u32 {
            2
        }

        fn set_maximum_frame_latency(&self, _: u32) -> Status {
            Status::OK
        }

        fn maximum_frame_latency(&self) -> Result<u32, Status> {
            Ok(1)
        }

        fn set_fullscreen_state(&self, _: bool) -> Status {
            Status::OK
        }

        fn fullscreen_state(&self) -> Result<bool, Status> {
            Ok(false)
        }

        fn set_hdr_metadata(&self, _: u32, _: &[u8]) -> Status {
            Status::OK
        }

        fn set_color_space(&self, _: u32) -> Status {
            Status::OK
        }

        fn check_color_space_support(&self, _: u32) -> Result<u32, Status> {
            Ok(1)
        }

        fn set_source_size(&self, _: u32, _: u32) -> Status {
            Status::OK
        }

        fn source_size(&self) -> Result<(u32, u32), Status> {
            Ok((1280, 720))
        }

        fn device(&self) -> Result<RawInterface, Status> {
            Ok(RawInterface(0xD0))
        }

        fn flush(&self) {
            self.calls.push("flush");
        }
    }

    struct LoggingHooks(Arc<Calls>);

    impl PacingHooks for LoggingHooks {
        fn pre_present(&self, _: FrameId, _: PacingMode) {
            self.0.push("pre");
        }

        fn post_present(&self, _: FrameId, _: PacingMode) {
            self.0.push("post");
        }
    }

    struct Fixture {
        clock: Arc<ManualClock>,
        calls: Arc<Calls>,
        context: Arc<PacingContext>,
    }

    fn fixture(strategy: PacingStrategy) -> Fixture {
        let clock = ManualClock::new(Nanoseconds::from_millis(1));
        let calls = Arc::new(Calls::default());

        let settings = Settings::default();
        settings.set_monitor_enabled(false);
        settings.set_strategy(strategy);

        let context = PacingContext::builder()
            .settings(settings)
            .clock(clock.clone())
            .timer(RecordingTimer::new(clock.clone()))
            .hooks(Arc::new(LoggingHooks(calls.clone())))
            .build()
            .unwrap();

        Fixture {
            clock,
            calls,
            context,
        }
    }

    impl Fixture {
        fn proxy(&self, mode: ProxyMode) -> SwapChainProxy<FakeTarget> {
            SwapChainProxy::new(FakeTarget::new(self.calls.clone()), mode, self.context.clone())
        }
    }

    #[test]
    fn present_sync_runs_hooks_around_the_present() {
        let f = fixture(PacingStrategy::PresentSync);
        let proxy = f.proxy(ProxyMode::Instrumented);

        assert_eq!(proxy.present(1, PresentFlags::empty()), Status::OK);
        assert_eq!(f.calls.take(), vec!["flush", "pre", "present", "post"]);
    }

    #[test]
    fn raw_and_test_presents_are_untouched() {
        let f = fixture(PacingStrategy::PresentSync);
        let raw = f.proxy(ProxyMode::Raw);
        let instrumented = f.proxy(ProxyMode::Instrumented);

        raw.present(0, PresentFlags::empty());
        instrumented.present(0, PresentFlags::TEST);

        assert_eq!(f.calls.take(), vec!["present", "present"]);
        assert_eq!(f.context.presents().present_count(), 0);
    }

    #[test]
    fn marker_driven_frames_are_not_paced_here() {
        let f = fixture(PacingStrategy::VendorMarkers);
        let proxy = f.proxy(ProxyMode::Instrumented);

        f.context
            .record_marker(FrameId(42), MarkerKind::PresentStart, f.clock.now());
        proxy.present(0, PresentFlags::empty());

        assert_eq!(f.calls.take(), vec!["present"]);
    }

    #[test]
    fn frame_times_are_recorded_per_variant() {
        let f = fixture(PacingStrategy::ExternalSync);
        let proxy = f.proxy(ProxyMode::Instrumented);
        let params = PresentParameters::default();

        proxy.present(0, PresentFlags::empty());
        f.clock.advance(Nanoseconds::from_micros(400));
        proxy.present1(0, PresentFlags::empty(), &params);
        f.clock.advance(Nanoseconds::from_millis(5));
        proxy.present(0, PresentFlags::empty());
        f.clock.advance(Nanoseconds::from_millis(5));
        proxy.present1(0, PresentFlags::empty(), &params);

        let stats = f.context.presents();
        assert_eq!(stats.present_count(), 4);

        let present: Vec<_> = stats.variant(PresentVariant::Present).iter().map(|s| s.duration).collect();
        assert_eq!(present, vec![Nanoseconds::from_micros(5_400)]);

        let present1: Vec<_> = stats.variant(PresentVariant::Present1).iter().map(|s| s.duration).collect();
        assert_eq!(present1, vec![Nanoseconds::from_millis(10)]);

        // the 400 µs gap is below the combined channel's spacing
        let combined: Vec<_> = stats.combined().iter().map(|s| s.duration).collect();
        assert_eq!(combined, vec![Nanoseconds::from_millis(5), Nanoseconds::from_micros(5_400)]);
        assert!(combined.iter().all(|d| *d >= COMBINED_SAMPLE_GATE));
    }

    #[test]
    fn everything_else_is_forwarded() {
        let f = fixture(PacingStrategy::PresentSync);
        let proxy = f.proxy(ProxyMode::Instrumented);

        assert_eq!(proxy.resize_buffers(3, 1, 1, 0, 0), Status::INVALID_CALL);
        assert_eq!(proxy.buffer(1), Ok(RawInterface(0x1001)));
        assert_eq!(proxy.desc().map(|d| d.buffer_count), Ok(3));
        assert_eq!(proxy.frame_statistics(), Err(Status::INVALID_CALL));
        assert_eq!(proxy.last_present_count(), Ok(7));
        assert_eq!(proxy.current_back_buffer_index(), 2);
        assert_eq!(proxy.source_size(), Ok((1280, 720)));
        assert_eq!(proxy.device(), Ok(RawInterface(0xD0)));
        assert!(f.calls.take().is_empty());
    }

    #[test]
    fn reference_counting_is_transparent() {
        let f = fixture(PacingStrategy::PresentSync);
        let proxy = f.proxy(ProxyMode::Instrumented);

        assert_eq!(proxy.add_ref(), 2);
        assert_eq!(proxy.query_interface(SwapChainVersion::V2), Status::OK);
        assert_eq!(proxy.inner().refs.load(Ordering::SeqCst), 3);
        assert_eq!(proxy.query_interface(SwapChainVersion::V4), Status::NO_INTERFACE);
        assert_eq!(proxy.release(), 2);
        assert_eq!(proxy.release(), 1);
        assert_eq!(proxy.release(), 0);
    }
}
