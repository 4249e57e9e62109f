//! # macOS and iOS
//! Work is submitted to the main [dispatch queue] (a serial queue drained
//! by the main thread's run loop) using the [`dispatch`] crate.
//! Both blocking and non-blocking submission are native, and the queue is FIFO.
//!
//! The main queue exists for the whole lifetime of the process, so resolving
//! never fails. Items only run once the main thread runs its run loop
//! (e.g. `NSApplication.run`) or calls `dispatch_main`.
//!
//! [dispatch queue]: https://developer.apple.com/documentation/dispatch/dispatchqueue/main

use crate::{DispatchTarget, Error, ResolveError, WorkItem};
use dispatch::Queue;
use objc2_foundation::MainThreadMarker;
use std::sync::Arc;

pub(crate) const BACKEND: &str = "apple";

pub(crate) fn resolve() -> Result<Arc<dyn DispatchTarget>, ResolveError> {
    Ok(Arc::new(MainQueue))
}

struct MainQueue;

impl DispatchTarget for MainQueue {
    /// `dispatch_sync` onto the main queue from the main thread deadlocks,
    /// so blocking invokes from the main thread run inline instead.
    fn invoke(&self, work: WorkItem) -> Result<(), Error> {
        if self.has_affinity() {
            work.run_detached();
        } else {
            Queue::main().exec_sync(move || work.run_detached());
        }
        Ok(())
    }

    fn begin_invoke(&self, work: WorkItem) -> Result<(), Error> {
        // A panic must not unwind through libdispatch's C frames.
        Queue::main().exec_async(move || work.run_detached());
        Ok(())
    }

    fn has_affinity(&self) -> bool {
        MainThreadMarker::new().is_some()
    }
}
