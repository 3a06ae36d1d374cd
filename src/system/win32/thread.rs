use windows::Win32::System::Threading::GetCurrentThreadId;

pub fn current_thread_id() -> u64 {
    u64::from(unsafe { GetCurrentThreadId() })
}
