use std::sync::Arc;

use crate::{
    error::MonitorError,
    monitor::{CompositionPipeline, CompositionProvider},
};

/// No compositor statistics are available on this target. Starting the
/// refresh-rate monitor fails and its statistics stay invalid.
pub struct UnsupportedComposition;

impl CompositionProvider for UnsupportedComposition {
    fn open(&self) -> Result<Box<dyn CompositionPipeline>, MonitorError> {
        Err(MonitorError::Unsupported)
    }
}

pub fn default_provider() -> Arc<dyn CompositionProvider> {
    Arc::new(UnsupportedComposition)
}
