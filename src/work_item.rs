use crate::error::panic_message;
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// A single unit of work submitted to a [`DispatchTarget`](`crate::DispatchTarget`).
///
/// Work items are consumed when they run, so every item runs at most once.
pub struct WorkItem(Box<dyn FnOnce() + Send + 'static>);

#[cfg(test)]
static_assertions::assert_impl_all!(WorkItem: Send);

impl WorkItem {
    pub fn new(work: impl FnOnce() + Send + 'static) -> Self {
        WorkItem(Box::new(work))
    }

    /// Runs the work item on the current thread.
    /// Panics raised by the work item propagate to the caller.
    pub fn run(self) {
        (self.0)()
    }

    /// Runs the work item on the current thread, catching and reporting panics.
    ///
    /// Backends use this on the target thread so that a panicking item
    /// can neither unwind into the host event loop nor across FFI.
    pub fn run_detached(self) {
        if let Err(payload) = self.try_run() {
            log_unhandled_panic(payload.as_ref());
        }
    }

    /// Runs the work item on the current thread, returning the panic payload if it panicked.
    pub fn try_run(self) -> Result<(), Box<dyn Any + Send + 'static>> {
        catch_unwind(AssertUnwindSafe(self.0))
    }
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem").finish_non_exhaustive()
    }
}

impl<F> From<F> for WorkItem
where
    F: FnOnce() + Send + 'static,
{
    fn from(work: F) -> Self {
        WorkItem::new(work)
    }
}

#[cfg(feature = "log")]
pub(crate) fn log_unhandled_panic(payload: &(dyn Any + Send)) {
    log::error!(
        "work item panicked on the dispatch target: {}",
        panic_message(payload).unwrap_or("Box<dyn Any>")
    );
}

#[cfg(not(feature = "log"))]
pub(crate) fn log_unhandled_panic(payload: &(dyn Any + Send)) {
    _ = panic_message(payload);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn runs_the_closure() {
        let counter = Arc::new(AtomicUsize::new(0));
        let item = WorkItem::new({
            let counter = counter.clone();
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        item.run();
        assert_eq!(1, counter.load(Ordering::SeqCst));
    }

    #[test]
    fn try_run_returns_panic_payload() {
        let item = WorkItem::new(|| panic!("kaputt"));
        let payload = item.try_run().expect_err("item panics");
        assert_eq!(Some("kaputt"), panic_message(payload.as_ref()));
    }

    #[test]
    fn run_detached_swallows_panics() {
        WorkItem::new(|| panic!("kaputt")).run_detached();
    }

    #[test]
    fn dropping_an_item_drops_its_captures() {
        let captured = Arc::new(());
        let item = WorkItem::from({
            let captured = captured.clone();
            move || drop(captured)
        });
        assert_eq!(2, Arc::strong_count(&captured));
        drop(item);
        assert_eq!(1, Arc::strong_count(&captured));
    }
}
