#![cfg_attr(docsrs, feature(doc_auto_cfg, doc_cfg))]
#![forbid(
    clippy::dbg_macro,
    clippy::missing_safety_doc,
    clippy::unnecessary_safety_comment,
    clippy::unnecessary_safety_doc,
    unsafe_op_in_unsafe_fn
)]
#![deny(clippy::unwrap_used)]

//! Your friendly neighbourhood crate for getting work onto the thread
//! that owns your UI event loop ⛴️
//!
//! UI toolkits only let one thread touch their state, but the work that
//! produces updates often happens elsewhere. A [`DispatchService`] ferries
//! closures from any thread to that UI thread, no matter which mechanism
//! the platform uses to get there:
//! * Windows—a message-only window owned by the UI thread.
//! * macOS and iOS—the main dispatch queue.
//! * Android—a `Handler` bound to the main looper.
//! * Everywhere else—a [`pump::MainLoop`] that your event loop drains.
//!
//! The service offers four ways to dispatch:
//! * [`DispatchService::invoke`]—run and wait for the result.
//! * [`DispatchService::begin_invoke`]—enqueue and return immediately.
//! * [`DispatchService::begin_invoke_if_required`]—run inline when already
//!   on the UI thread, enqueue otherwise.
//! * [`DispatchService::spawn`]—enqueue and get a [`Completion`] to await.
//!
//! On the web (`wasm32-unknown-unknown`) nothing can block, so
//! [`Completion::wait`] is not available there and a blocking invoke from
//! anywhere but the UI thread fails with [`Error::Platform`].
//!
//! Each has a `_delegate` twin that accepts a callable and a tuple of arguments
//! (see [`Delegate`]).
//!
//! ## Example
//! ```no_run
//! use ferry::DispatchService;
//! use std::sync::Arc;
//! use std::thread;
//!
//! // Create the service on the UI thread, so the target can be resolved right away.
//! let service = Arc::new(DispatchService::new());
//!
//! thread::spawn(move || {
//!     let title = String::from("loaded");
//!     service
//!         .begin_invoke(move || eprintln!("updating the window title to {title}"))
//!         .expect("the UI thread is available");
//! });
//! ```
//!
//! ## Ordering and blocking
//! Work items submitted from one thread run in the order they were submitted.
//! There is no ordering between items from different threads.
//!
//! A blocking invoke from the UI thread itself runs the work item inline
//! on every built-in backend; waiting for the UI thread from the UI thread
//! would never finish.
//!
//! ## Errors
//! Panics inside work items are caught on the UI thread. Blocking calls
//! return them as [`Error::WorkItemPanicked`], everything else reports them
//! to the backend (logged with the `log` feature, or passed to the
//! [panic handler](`pump::MainLoopBuilder::panic_handler`) of a main loop).

#[cfg(not(all(target_family = "wasm", target_os = "unknown")))]
mod async_rt;
mod blocking;
mod completion;
pub use completion::*;
mod delegate;
pub use delegate::*;
mod error;
pub use error::{Error, ResolveError};
pub mod pump;
mod service;
pub use service::*;
mod target;
pub use target::*;
mod work_item;
pub use work_item::*;

cfg_if::cfg_if! {
    if #[cfg(all(feature = "native", windows))] {
        mod windows;
        use self::windows as imp;
    } else if #[cfg(all(feature = "native", any(target_os = "macos", target_os = "ios")))] {
        mod apple;
        use self::apple as imp;
    } else if #[cfg(all(feature = "native", target_os = "android"))] {
        mod android;
        use self::android as imp;
    } else {
        mod fallback;
        use self::fallback as imp;
    }
}

/// Contains the dispatch mechanism picked for the current platform.
pub mod platform {
    use crate::{DispatchTarget, ResolveError};
    use std::sync::Arc;

    /// The name of the backend used by [`resolve`]:
    /// `"windows"`, `"apple"`, `"android"` or `"pump"`.
    pub const BACKEND: &str = crate::imp::BACKEND;

    /// Resolves the dispatch target of the current platform.
    /// This is the resolver used by [`DispatchService::new`](`crate::DispatchService::new`).
    ///
    /// With the `pump` backend, this fails unless a
    /// [`MainLoop`](`crate::pump::MainLoop`) has been installed.
    pub fn resolve() -> Result<Arc<dyn DispatchTarget>, ResolveError> {
        crate::imp::resolve()
    }
}

/// # Feature Flags
///
/// * `native`—Use the platform's own dispatch mechanism on Windows, macOS,
///   iOS and Android (*default*). Without it, every platform uses the [`pump`].
/// * `log`—Enable logging.
#[cfg(doc)]
#[cfg_attr(docsrs, doc(cfg(doc)))]
pub mod feature_flags {}

#[cfg(test)]
static_assertions::assert_impl_all!(std::sync::Arc<dyn DispatchTarget>: DispatchTarget, Send, Sync);
