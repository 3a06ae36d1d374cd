//! Frame presentation pacing and latency-marker synchronization.
//!
//! The engine sits between an application and two APIs it already calls: the
//! presentation object it submits frames to ([`present`]) and the vendor
//! low-latency API it reports frame boundaries to ([`vendor`]). Both layers
//! key their observations by frame id into shared state held by a
//! [`PacingContext`], where the [`selector`] decides once per frame which
//! pacing strategy governs it and the [`delay`] engine holds frames back
//! relative to their simulation start.

pub mod buffers;
pub mod config;
pub mod context;
pub mod delay;
pub mod error;
pub mod frame;
pub mod limiter;
pub mod limits;
pub mod monitor;
pub mod present;
pub mod selector;
pub mod system;
pub mod telemetry;
pub mod vendor;

#[cfg(test)]
mod testing;

pub use config::Settings;
pub use context::{PacingContext, PacingContextBuilder};
pub use error::{MonitorError, PacingError};
pub use frame::{FrameId, MarkerKind, MarkerPolicy, PacingMode, PacingStrategy};
pub use present::{PresentationTarget, ProxyMode, SwapChainProxy};
pub use telemetry::TelemetrySnapshot;
pub use vendor::{MarkerInterceptor, VendorSink};
