//! Platform services: the high-resolution clock, deadline timers, thread and
//! module identity, and the composition statistics source.
//!
//! Everything above this module talks to the [`Clock`] and [`DeadlineTimer`]
//! traits so that pacing decisions can be driven by a manual clock in tests.

pub mod time;

#[cfg(target_os = "windows")]
#[path = "win32/mod.rs"]
pub(crate) mod platform_impl;

#[cfg(not(target_os = "windows"))]
#[path = "fallback/mod.rs"]
pub(crate) mod platform_impl;

use std::{cell::OnceCell, sync::Arc};

use crate::monitor::CompositionProvider;

use self::time::Nanoseconds;

#[cfg(target_os = "windows")]
pub use platform_impl::dxgi::DxgiSwapChain;

pub trait Clock: Send + Sync {
    fn now(&self) -> Nanoseconds;
}

/// The platform's high-resolution clock (QPC on Windows).
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Nanoseconds {
        Nanoseconds::now()
    }
}

pub trait DeadlineTimer: Send + Sync {
    /// Blocks the calling thread until `deadline`. `now` is the caller's most
    /// recent clock reading; deadlines at or before it return immediately.
    fn wait_until(&self, now: Nanoseconds, deadline: Nanoseconds);
}

thread_local! {
    static THREAD_TIMER: OnceCell<Option<platform_impl::timer::HighResolutionTimer>> =
        const { OnceCell::new() };
}

/// A deadline timer backed by the platform's high-resolution waitable timer.
///
/// Each waiting thread gets its own timer object, created on the first wait
/// that actually has to block and reused for every later wait on that thread.
/// Waits on different threads never hold each other up. If the timer cannot
/// be created the thread degrades to `std::thread::sleep`.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlatformTimer;

impl PlatformTimer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl DeadlineTimer for PlatformTimer {
    fn wait_until(&self, now: Nanoseconds, deadline: Nanoseconds) {
        let remaining = deadline - now;
        if !remaining.is_positive() {
            return;
        }

        THREAD_TIMER.with(|cell| {
            let timer = cell.get_or_init(|| match platform_impl::timer::HighResolutionTimer::new() {
                Ok(timer) => Some(timer),
                Err(e) => {
                    tracing::warn!("High-resolution timer unavailable, falling back to sleep: {e}");
                    None
                }
            });

            match timer {
                Some(timer) => timer.wait_until(Nanoseconds::now() + remaining),
                None => std::thread::sleep(remaining.to_std()),
            }
        });
    }
}

/// Identifies the module (executable or library image) containing a code
/// address. `ModuleId::UNKNOWN` is used where the platform cannot tell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ModuleId(pub usize);

impl ModuleId {
    pub const UNKNOWN: Self = Self(0);
}

/// The native id of the calling thread.
#[must_use]
pub fn current_thread_id() -> u64 {
    platform_impl::thread::current_thread_id()
}

/// Resolves the module containing the code that called the function which
/// called this one, skipping `depth - 1` further frames.
///
/// With `depth = 1`, an intercepted entry point learns which module called it.
#[inline(never)]
#[must_use]
pub fn caller_module(depth: u32) -> ModuleId {
    platform_impl::module::caller_module(depth)
}

/// Looks up an already loaded module by file name.
#[must_use]
pub fn resolve_module(name: &str) -> Option<ModuleId> {
    platform_impl::module::resolve_module(name)
}

/// The platform's composition statistics source for the refresh-rate monitor.
#[must_use]
pub fn composition_provider() -> Arc<dyn CompositionProvider> {
    platform_impl::composition::default_provider()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_ids_differ_between_threads() {
        let here = current_thread_id();
        let there = std::thread::spawn(current_thread_id).join().unwrap();
        assert_ne!(here, there);
        assert_eq!(here, current_thread_id());
    }

    #[test]
    fn platform_timer_returns_for_past_deadlines() {
        std::thread::spawn(|| {
            PlatformTimer::new().wait_until(Nanoseconds(100), Nanoseconds(50));
            assert!(THREAD_TIMER.with(|cell| cell.get().is_none()));
        })
        .join()
        .unwrap();
    }

    #[test]
    fn waits_on_other_threads_do_not_delay_each_other() {
        let timer = std::sync::Arc::new(PlatformTimer::new());

        let long = {
            let timer = timer.clone();
            std::thread::spawn(move || {
                let start = Nanoseconds::now();
                timer.wait_until(start, start + Nanoseconds::from_millis(200));
            })
        };

        std::thread::sleep(std::time::Duration::from_millis(20));

        let short = std::thread::spawn(move || {
            let start = Nanoseconds::now();
            timer.wait_until(start, start + Nanoseconds::from_millis(5));
            assert!(THREAD_TIMER.with(|cell| cell.get().is_some()));
            Nanoseconds::now() - start
        });

        let waited = short.join().unwrap();
        assert!(waited >= Nanoseconds::from_millis(5));
        assert!(waited < Nanoseconds::from_millis(100));

        long.join().unwrap();
    }

    #[test]
    fn platform_timer_blocks_until_deadline() {
        let timer = PlatformTimer::new();
        let start = Nanoseconds::now();
        timer.wait_until(start, start + Nanoseconds::from_millis(3));
        assert!(Nanoseconds::now() - start >= Nanoseconds::from_millis(3));
    }
}
