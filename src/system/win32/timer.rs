use windows::{
    core::PCWSTR,
    Win32::{
        Foundation::{CloseHandle, HANDLE},
        System::Threading::{
            CreateWaitableTimerExW, SetWaitableTimer, WaitForSingleObject,
            CREATE_WAITABLE_TIMER_HIGH_RESOLUTION, INFINITE, TIMER_ALL_ACCESS,
        },
    },
};
use windows_version::OsVersion;

use crate::{error::PacingError, system::time::Nanoseconds};

/// A waitable timer, high resolution where the OS supports it (Windows 10
/// 1803 and later).
///
/// Owned by one thread; a wait blocks only that thread.
pub struct HighResolutionTimer {
    handle: HANDLE,
}

impl HighResolutionTimer {
    pub fn new() -> Result<Self, PacingError> {
        let flags = if OsVersion::current() >= OsVersion::new(10, 0, 0, 17134) {
            CREATE_WAITABLE_TIMER_HIGH_RESOLUTION
        } else {
            0
        };

        let handle = unsafe {
            CreateWaitableTimerExW(None, PCWSTR::null(), flags, TIMER_ALL_ACCESS.0)
        }
        .map_err(|e| PacingError::Timer(e.to_string()))?;

        tracing::debug!(high_resolution = flags != 0, "Created pacing timer");

        Ok(Self { handle })
    }

    /// Blocks until the platform clock reaches `deadline`.
    pub fn wait_until(&self, deadline: Nanoseconds) {
        let remaining = deadline - Nanoseconds::now();
        if !remaining.is_positive() {
            return;
        }

        // negative due times are relative, in 100 ns units
        let due_time = -(remaining.0 / 100).max(1);

        if unsafe { SetWaitableTimer(self.handle, &due_time, 0, None, None, false) }.is_err() {
            std::thread::sleep(remaining.to_std());
            return;
        }

        unsafe { WaitForSingleObject(self.handle, INFINITE) };
    }
}

impl Drop for HighResolutionTimer {
    fn drop(&mut self) {
        if let Err(e) = unsafe { CloseHandle(self.handle) } {
            tracing::warn!("Failed to close pacing timer: {e}");
        }
    }
}
