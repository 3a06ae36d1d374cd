//! Windows implementations of the platform services.

pub mod composition;
pub mod dxgi;
pub mod module;
pub mod thread;
pub mod time;
pub mod timer;
