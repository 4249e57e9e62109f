use std::sync::atomic::{AtomicU32, Ordering};
use windows::Win32::System::Threading::GetCurrentThreadId;

// The CRT initialization trick is taken from winit (Apache 2.0):
// <https://github.com/rust-windowing/winit/blob/4e3165f3d81b1ee2771d517103c5883ffa2ee29f/src/platform_impl/windows/event_loop.rs>

static MAIN_THREAD_ID: AtomicU32 = AtomicU32::new(0);

/// Returns the id of the thread that ran the process's entry point.
///
/// Windows has no API for this, so we record the id from a function placed
/// in the `.CRT$XCU` section, which the C runtime calls on the main thread
/// before `main` starts.
/// See <https://docs.microsoft.com/en-us/cpp/c-runtime-library/crt-initialization?view=msvc-160>.
pub(crate) fn main_thread_id() -> u32 {
    #[used]
    #[allow(non_upper_case_globals)]
    #[link_section = ".CRT$XCU"]
    static RECORD_MAIN_THREAD_ID: extern "C" fn() = {
        extern "C" fn record() {
            // SAFETY: GetCurrentThreadId has no preconditions.
            let id = unsafe { GetCurrentThreadId() };
            MAIN_THREAD_ID.store(id, Ordering::Relaxed);
        }
        record
    };

    MAIN_THREAD_ID.load(Ordering::Relaxed)
}
