use std::sync::Arc;

use windows::Win32::Graphics::DirectComposition::{DCompositionCreateDevice2, IDCompositionDevice};

use crate::{
    error::MonitorError,
    monitor::{CompositionPipeline, CompositionProvider, CompositionSample},
    system::time::{Hertz, Nanoseconds},
};

/// Reads compositor frame statistics through a DirectComposition device.
pub struct DirectCompositionProvider;

impl CompositionProvider for DirectCompositionProvider {
    fn open(&self) -> Result<Box<dyn CompositionPipeline>, MonitorError> {
        let device: IDCompositionDevice = unsafe { DCompositionCreateDevice2(None) }
            .map_err(|e| MonitorError::Acquire(e.to_string()))?;

        Ok(Box::new(DirectCompositionPipeline { device }))
    }
}

struct DirectCompositionPipeline {
    device: IDCompositionDevice,
}

// The device is only used for GetFrameStatistics, which is free-threaded.
unsafe impl Send for DirectCompositionPipeline {}
unsafe impl Sync for DirectCompositionPipeline {}

impl CompositionPipeline for DirectCompositionPipeline {
    fn sample(&self) -> Result<CompositionSample, MonitorError> {
        let stats = unsafe { self.device.GetFrameStatistics() }
            .map_err(|e| MonitorError::Sample(e.to_string()))?;

        let rate = stats.currentCompositionRate;
        let composition_rate = if rate.Denominator == 0 {
            Hertz::ZERO
        } else {
            Hertz(f64::from(rate.Numerator) / f64::from(rate.Denominator))
        };

        Ok(CompositionSample {
            last_frame: Nanoseconds::from_qpc_time(stats.lastFrameTime),
            composition_rate,
        })
    }
}

pub fn default_provider() -> Arc<dyn CompositionProvider> {
    Arc::new(DirectCompositionProvider)
}
