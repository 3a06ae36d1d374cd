/// Failures while building or running a [`PacingContext`](crate::PacingContext).
#[derive(Debug, thiserror::Error)]
pub enum PacingError {
    #[error("the high-resolution timer could not be created: {0}")]
    Timer(String),
    #[error("the pacing context has been shut down")]
    ShutDown,
    #[error("a pacing context is already installed for this process")]
    AlreadyInstalled,
    #[error(transparent)]
    Monitor(#[from] MonitorError),
}

/// Failures of the refresh-rate monitor's composition pipeline.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("composition statistics are not available on this platform")]
    Unsupported,
    #[error("the composition handle could not be acquired: {0}")]
    Acquire(String),
    #[error("the composition statistics could not be read: {0}")]
    Sample(String),
    #[error("the monitor thread could not be started")]
    Spawn(#[from] std::io::Error),
}
