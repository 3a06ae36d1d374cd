//! Drives both interception layers with a fake swap chain and a fake vendor
//! driver. One thread plays the game's frame loop, another polls telemetry the
//! way an overlay would.
//!
//! Settings come from `PACER_*` environment variables, e.g.
//! `PACER_STRATEGY=present PACER_TARGET_FPS=60 cargo run --example synthetic_game`.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};

use framepace::{
    present::{
        BufferDesc, FrameStatistics, ModeDesc, PresentFlags, PresentParameters, RawInterface,
        Status, SwapChainVersion,
    },
    system::time::Nanoseconds,
    vendor::{
        FilteredModules, LatencyReport, MarkerCall, SleepMode, SleepStatus, VendorStatus,
    },
    FrameId, MarkerInterceptor, MarkerKind, PacingContext, PresentationTarget, ProxyMode,
    Settings, SwapChainProxy, TelemetrySnapshot, VendorSink,
};
#[cfg(feature = "profile")]
use tracing_subscriber::layer::SubscriberExt;

const FRAMES: u64 = 600;
const SIMULATION_TIME: Duration = Duration::from_millis(4);
const RENDER_TIME: Duration = Duration::from_millis(3);

struct NullSwapChain {
    refs: AtomicU32,
}

impl PresentationTarget for NullSwapChain {
    fn add_ref(&self) -> u32 {
        self.refs.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn release(&self) -> u32 {
        self.refs.fetch_sub(1, Ordering::Relaxed) - 1
    }

    fn version(&self) -> SwapChainVersion {
        SwapChainVersion::V1
    }

    fn present(&self, _sync_interval: u32, _flags: PresentFlags) -> Status {
        Status::OK
    }

    fn present1(&self, _: u32, _: PresentFlags, _: &PresentParameters<'_>) -> Status {
        Status::OK
    }

    fn resize_buffers(&self, _: u32, _: u32, _: u32, _: u32, _: u32) -> Status {
        Status::OK
    }

    fn resize_target(&self, _: &ModeDesc) -> Status {
        Status::OK
    }

    fn buffer(&self, _: u32) -> Result<RawInterface, Status> {
        Err(Status::INVALID_CALL)
    }

    fn desc(&self) -> Result<BufferDesc, Status> {
        Ok(BufferDesc {
            width: 1920,
            height: 1080,
            buffer_count: 2,
            ..Default::default()
        })
    }

    fn frame_statistics(&self) -> Result<FrameStatistics, Status> {
        Err(Status::INVALID_CALL)
    }

    fn last_present_count(&self) -> Result<u32, Status> {
        Ok(0)
    }

    fn current_back_buffer_index(&self) -> u32 {
        0
    }

    fn set_maximum_frame_latency(&self, _: u32) -> Status {
        Status::INVALID_CALL
    }

    fn maximum_frame_latency(&self) -> Result<u32, Status> {
        Err(Status::INVALID_CALL)
    }

    fn set_fullscreen_state(&self, _: bool) -> Status {
        Status::OK
    }

    fn fullscreen_state(&self) -> Result<bool, Status> {
        Ok(false)
    }

    fn set_hdr_metadata(&self, _: u32, _: &[u8]) -> Status {
        Status::INVALID_CALL
    }

    fn set_color_space(&self, _: u32) -> Status {
        Status::INVALID_CALL
    }

    fn check_color_space_support(&self, _: u32) -> Result<u32, Status> {
        Err(Status::INVALID_CALL)
    }

    fn set_source_size(&self, _: u32, _: u32) -> Status {
        Status::INVALID_CALL
    }

    fn source_size(&self) -> Result<(u32, u32), Status> {
        Err(Status::INVALID_CALL)
    }

    fn device(&self) -> Result<RawInterface, Status> {
        Err(Status::NO_INTERFACE)
    }

    fn flush(&self) {}
}

struct NullDriver;

impl VendorSink for NullDriver {
    fn set_latency_marker(&self, _: &MarkerCall) -> VendorStatus {
        VendorStatus::OK
    }

    fn set_sleep_mode(&self, _: &SleepMode) -> VendorStatus {
        VendorStatus::OK
    }

    fn sleep(&self) -> VendorStatus {
        VendorStatus::OK
    }

    fn get_latency(&self) -> Result<LatencyReport, VendorStatus> {
        Ok(LatencyReport::default())
    }

    fn get_sleep_status(&self) -> Result<SleepStatus, VendorStatus> {
        Ok(SleepStatus {
            low_latency_available: true,
            ..Default::default()
        })
    }
}

fn marker(interceptor: &MarkerInterceptor, frame: u64, kind: MarkerKind) {
    let call = MarkerCall {
        frame: FrameId(frame),
        kind,
    };
    interceptor.set_latency_marker(framepace::system::ModuleId::UNKNOWN, call, &NullDriver);
}

pub fn main() {
    #[cfg(feature = "profile")]
    tracing::subscriber::set_global_default(
        tracing_subscriber::registry().with(tracing_tracy::TracyLayer::new()),
    )
    .expect("set up the subscriber");

    #[cfg(not(feature = "profile"))]
    tracing_subscriber::fmt::fmt().pretty().init();

    let context = PacingContext::builder()
        .settings(Settings::from_env())
        .build()
        .expect("build the pacing context");

    let interceptor = Arc::new(MarkerInterceptor::new(
        context.clone(),
        Arc::new(FilteredModules::default()),
    ));

    let swap_chain = SwapChainProxy::new(
        NullSwapChain {
            refs: AtomicU32::new(1),
        },
        ProxyMode::Instrumented,
        context.clone(),
    );

    interceptor.set_sleep_mode(
        SleepMode {
            low_latency: true,
            use_markers_to_optimize: true,
            ..Default::default()
        },
        &NullDriver,
    );

    let running = Arc::new(AtomicBool::new(true));

    let overlay = {
        let interceptor = interceptor.clone();
        let running = running.clone();

        std::thread::Builder::new()
            .name("overlay".to_owned())
            .spawn(move || {
                while running.load(Ordering::Relaxed) {
                    std::thread::sleep(Duration::from_millis(500));

                    let _ = interceptor.get_latency(&NullDriver);
                    let _ = interceptor.get_sleep_status(&NullDriver);

                    let snapshot = TelemetrySnapshot::capture(interceptor.context());
                    tracing::info!(
                        fps = snapshot.combined.fps.0,
                        presents = snapshot.present_count,
                        presentation = ?snapshot.presentation_mode,
                        marker = ?snapshot.marker_mode,
                        refresh = snapshot.refresh.measured.0,
                        "Telemetry"
                    );
                }
            })
            .expect("spawn the overlay thread")
    };

    for frame in 1..=FRAMES {
        interceptor.sleep(framepace::system::ModuleId::UNKNOWN, &NullDriver);

        marker(&interceptor, frame, MarkerKind::SimulationStart);
        std::thread::sleep(SIMULATION_TIME);
        marker(&interceptor, frame, MarkerKind::SimulationEnd);

        marker(&interceptor, frame, MarkerKind::RenderSubmitStart);
        std::thread::sleep(RENDER_TIME);
        marker(&interceptor, frame, MarkerKind::RenderSubmitEnd);

        marker(&interceptor, frame, MarkerKind::PresentStart);
        let status = swap_chain.present(1, PresentFlags::empty());
        marker(&interceptor, frame, MarkerKind::PresentEnd);

        if !status.is_ok() {
            tracing::error!(status = status.0, "Present failed");
            break;
        }
    }

    running.store(false, Ordering::Relaxed);
    overlay.join().expect("join the overlay thread");

    let snapshot = TelemetrySnapshot::capture(&context);
    tracing::info!(
        average = ?snapshot.combined.average.map(|d: Nanoseconds| d.as_secs_f64() * 1000.0),
        sleep_interval = ?snapshot.sleep_interval,
        "Finished"
    );

    context.shutdown().expect("shut down the pacing context");
}
