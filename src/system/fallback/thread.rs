use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
}

/// A process-unique id for the calling thread, assigned on first use.
pub fn current_thread_id() -> u64 {
    THREAD_ID.with(|id| *id)
}
