//! # Windows
//! Work is routed through a [message-only window] owned by the UI thread.
//! Its window procedure runs work items when the thread's message loop
//! dispatches our private message:
//! * [`PostMessageW`] enqueues a work item and returns immediately.
//! * [`SendMessageW`] blocks until the window procedure has run the item.
//!   When called on the owning thread, Windows calls the window procedure
//!   directly, so a blocking invoke from the UI thread itself is safe.
//!
//! Messages posted from one thread are retrieved in FIFO order.
//!
//! The window is created the first time the target is resolved on the
//! process's main thread and lives until the process exits.
//! Resolving on any other thread fails until that happened.
//!
//! [message-only window]: https://learn.microsoft.com/en-us/windows/win32/winmsg/window-features#message-only-windows

use crate::{DispatchTarget, Error, ResolveError, WorkItem};
use main_thread::main_thread_id;
use std::sync::{Arc, OnceLock};
use windows::core::{w, PCWSTR};
use windows::Win32::Foundation::{HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, PostMessageW, RegisterClassW, SendMessageW, HWND_MESSAGE,
    WINDOW_EX_STYLE, WINDOW_STYLE, WM_APP, WNDCLASSW,
};

mod main_thread;

pub(crate) const BACKEND: &str = "windows";

const WM_RUN_WORK_ITEM: u32 = WM_APP + 0x0F3;
/// Returned by the window procedure once it has taken ownership of a work item.
/// `SendMessageW` returns zero when the message never reached the window.
const WORK_ITEM_TAKEN: LRESULT = LRESULT(1);
const CLASS_NAME: PCWSTR = w!("FerryDispatchWindow");

static WINDOW: OnceLock<Arc<MessageWindow>> = OnceLock::new();

pub(crate) fn resolve() -> Result<Arc<dyn DispatchTarget>, ResolveError> {
    let window = match WINDOW.get() {
        Some(window) => window.clone(),
        None => create_window()?,
    };
    let target: Arc<dyn DispatchTarget> = window;
    Ok(target)
}

fn create_window() -> Result<Arc<MessageWindow>, ResolveError> {
    let thread_id = current_thread_id();
    if thread_id != main_thread_id() {
        return Err(ResolveError::new(
            "the dispatch window has not been created yet, \
             resolve the target on the main thread first",
        ));
    }
    let window = MessageWindow::create(thread_id)
        .map_err(|e| ResolveError::with_source("failed to create the dispatch window", e))?;
    // Only the main thread gets here, so there's no competing initialization.
    Ok(WINDOW.get_or_init(|| Arc::new(window)).clone())
}

struct MessageWindow {
    hwnd: HWND,
    thread_id: u32,
}

// SAFETY: The handle is only used with PostMessageW and SendMessageW,
// which may be called from any thread. The window is never destroyed.
unsafe impl Send for MessageWindow {}

// SAFETY: See above.
unsafe impl Sync for MessageWindow {}

impl MessageWindow {
    fn create(thread_id: u32) -> windows::core::Result<Self> {
        // SAFETY: Passing `None` returns the handle of the current module.
        let instance = unsafe { GetModuleHandleW(None) }?;
        let class = WNDCLASSW {
            lpfnWndProc: Some(window_proc),
            hInstance: instance.into(),
            lpszClassName: CLASS_NAME,
            ..Default::default()
        };
        // SAFETY: `class` is fully initialized and the class name is a static string.
        // Registering fails if the class already exists, which is fine:
        // the existing registration is identical.
        unsafe { RegisterClassW(&class) };
        // SAFETY: The class was registered above. Message-only windows
        // are never shown and need no size or style.
        let hwnd = unsafe {
            CreateWindowExW(
                WINDOW_EX_STYLE::default(),
                CLASS_NAME,
                PCWSTR::null(),
                WINDOW_STYLE::default(),
                0,
                0,
                0,
                0,
                Some(HWND_MESSAGE),
                None,
                Some(instance.into()),
                None,
            )
        }?;
        Ok(Self { hwnd, thread_id })
    }
}

impl DispatchTarget for MessageWindow {
    fn invoke(&self, work: WorkItem) -> Result<(), Error> {
        let work = Box::into_raw(Box::new(work));
        // SAFETY: SendMessageW only returns once the window procedure has returned,
        // and the procedure reports whether it took ownership of `work`.
        let result = unsafe {
            SendMessageW(
                self.hwnd,
                WM_RUN_WORK_ITEM,
                Some(WPARAM(0)),
                Some(LPARAM(work as isize)),
            )
        };
        if result != WORK_ITEM_TAKEN {
            // SAFETY: The window procedure never saw `work`,
            // e.g. because the window's thread has exited.
            drop(unsafe { Box::from_raw(work) });
            log_send_error();
            return Err(Error::DispatchUnavailable(ResolveError::new(
                "the dispatch window is gone",
            )));
        }
        Ok(())
    }

    fn begin_invoke(&self, work: WorkItem) -> Result<(), Error> {
        let work = Box::into_raw(Box::new(work));
        // SAFETY: On success `window_proc` takes ownership of `work`.
        let posted = unsafe {
            PostMessageW(
                Some(self.hwnd),
                WM_RUN_WORK_ITEM,
                WPARAM(0),
                LPARAM(work as isize),
            )
        };
        if let Err(error) = posted {
            // SAFETY: The message was not posted, so nobody else owns `work`.
            drop(unsafe { Box::from_raw(work) });
            log_post_error(&error);
            return Err(Error::Platform(error.into()));
        }
        Ok(())
    }

    fn has_affinity(&self) -> bool {
        current_thread_id() == self.thread_id
    }
}

unsafe extern "system" fn window_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    if msg == WM_RUN_WORK_ITEM {
        // SAFETY: Our private message always carries a pointer created
        // by `Box::into_raw` that is handed to us exactly once.
        let work = unsafe { Box::from_raw(lparam.0 as *mut WorkItem) };
        work.run_detached();
        return WORK_ITEM_TAKEN;
    }
    // SAFETY: Forwarding the unmodified arguments we received.
    unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) }
}

fn current_thread_id() -> u32 {
    // SAFETY: GetCurrentThreadId has no preconditions.
    unsafe { GetCurrentThreadId() }
}

#[cfg(feature = "log")]
fn log_post_error(error: &windows::core::Error) {
    log::warn!("failed to post work item to the dispatch window: {error}");
}

#[cfg(not(feature = "log"))]
fn log_post_error(_error: &windows::core::Error) {}

#[cfg(feature = "log")]
fn log_send_error() {
    log::warn!("failed to send work item to the dispatch window, its thread has exited");
}

#[cfg(not(feature = "log"))]
fn log_send_error() {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    #[test]
    fn invoke_on_the_owning_thread_runs_inline() {
        let window = MessageWindow::create(current_thread_id()).expect("window is created");
        let ran = Arc::new(AtomicBool::new(false));
        window
            .invoke(WorkItem::new({
                let ran = ran.clone();
                move || ran.store(true, Ordering::SeqCst)
            }))
            .expect("window procedure runs the item");
        assert!(ran.load(Ordering::SeqCst));
        assert!(window.has_affinity());
    }

    #[test]
    fn invoke_reclaims_items_when_the_window_is_gone() {
        // Windows destroy their windows when the owning thread exits.
        let window = thread::spawn(|| MessageWindow::create(current_thread_id()))
            .join()
            .expect("thread finishes")
            .expect("window is created");
        let captured = Arc::new(());
        let error = window
            .invoke(WorkItem::new({
                let captured = captured.clone();
                move || drop(captured)
            }))
            .expect_err("window is gone");
        assert!(error.is_unavailable());
        assert_eq!(1, Arc::strong_count(&captured));
    }
}
