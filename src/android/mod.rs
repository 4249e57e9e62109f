//! # Android
//! Work is posted to an [`android.os.Handler`] bound to the main looper.
//! The handler lives in a small Java class (`FerryMainHandler.java`) that our
//! `build.rs` compiles to DEX bytecode and [`support`] injects at runtime,
//! the same setup that the [`netwatcher`] crate uses.
//!
//! To reach the JVM we need the JVM instance and the current Android
//! [`Context`], both provided by the [`ndk_context`] crate. Apps using
//! [`android-activity`] or [`winit`] have it initialized already.
//!
//! A handler can only post, so a blocking invoke posts the work item and
//! waits on a oneshot channel that the item completes. From the main thread
//! itself the item runs inline, since waiting there would deadlock.
//!
//! [`android.os.Handler`]: https://developer.android.com/reference/android/os/Handler
//! [`Context`]: https://developer.android.com/reference/android/content/Context
//! [`netwatcher`]: https://github.com/thombles/netwatcher
//! [`android-activity`]: https://docs.rs/android-activity
//! [`winit`]: https://docs.rs/winit

use crate::blocking::post_and_wait;
use crate::{DispatchTarget, Error, ResolveError, WorkItem};
use jni::sys::jlong;
use std::sync::{Arc, OnceLock};
use support::{java_vm, JavaMainHandler};

mod support;

pub(crate) const BACKEND: &str = "android";

static HANDLER: OnceLock<Arc<MainHandler>> = OnceLock::new();

pub(crate) fn resolve() -> Result<Arc<dyn DispatchTarget>, ResolveError> {
    let handler = match HANDLER.get() {
        Some(handler) => handler.clone(),
        None => {
            let java = JavaMainHandler::from_android_context().map_err(|e| {
                ResolveError::with_source("failed to create a handler for the main looper", e)
            })?;
            HANDLER
                .get_or_init(|| Arc::new(MainHandler { java }))
                .clone()
        }
    };
    let target: Arc<dyn DispatchTarget> = handler;
    Ok(target)
}

struct MainHandler {
    java: JavaMainHandler,
}

impl DispatchTarget for MainHandler {
    fn invoke(&self, work: WorkItem) -> Result<(), Error> {
        if self.has_affinity() {
            work.run_detached();
            Ok(())
        } else {
            post_and_wait(work, |item| self.begin_invoke(item))
        }
    }

    fn begin_invoke(&self, work: WorkItem) -> Result<(), Error> {
        let vm = java_vm().map_err(Error::Platform)?;
        let mut env = vm
            .attach_current_thread()
            .map_err(|e| Error::Platform(e.into()))?;
        let work = Box::into_raw(Box::new(work));
        match self.java.post(&mut env, work as jlong) {
            Ok(true) => Ok(()),
            Ok(false) => {
                // SAFETY: The handler rejected the runnable, so the pointer was never handed out.
                drop(unsafe { Box::from_raw(work) });
                log_rejected_post();
                Err(Error::DispatchUnavailable(ResolveError::new(
                    "the main looper is exiting",
                )))
            }
            // We can't tell whether the runnable was posted,
            // so the work item is leaked rather than risking a double free.
            Err(e) => Err(Error::Platform(e)),
        }
    }

    fn has_affinity(&self) -> bool {
        let result = java_vm().and_then(|vm| {
            let mut env = vm.attach_current_thread()?;
            self.java.is_main_thread(&mut env)
        });
        match result {
            Ok(is_main_thread) => is_main_thread,
            Err(_e) => {
                #[cfg(feature = "log")]
                log::warn!("failed to check for the main looper: {_e:#?}");
                false
            }
        }
    }
}

#[cfg(feature = "log")]
fn log_rejected_post() {
    log::warn!("the main looper rejected a work item");
}

#[cfg(not(feature = "log"))]
fn log_rejected_post() {}
