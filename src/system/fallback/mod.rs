//! Portable implementations for targets without the Windows pacing stack.

pub mod composition;
pub mod module;
pub mod thread;
pub mod time;
pub mod timer;
