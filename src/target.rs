use crate::{Error, ResolveError, WorkItem};
use std::sync::Arc;

/// A handle to the scheduler of the thread that owns the UI event loop.
///
/// Implementations wrap one native dispatch mechanism each
/// (see [`platform`](`crate::platform`) for the one picked at build time).
///
/// Every implementation must:
/// * run items submitted from the same thread in submission order,
/// * never let a panicking item unwind into the event loop (use [`WorkItem::run_detached`]),
/// * report an unusable native primitive as an error instead of dropping work silently.
pub trait DispatchTarget: Send + Sync {
    /// Runs `work` on the target thread and returns once it has completed.
    ///
    /// Implementations document what happens when this is called
    /// from the target thread itself.
    fn invoke(&self, work: WorkItem) -> Result<(), Error>;

    /// Enqueues `work` on the target thread and returns immediately.
    fn begin_invoke(&self, work: WorkItem) -> Result<(), Error>;

    /// Tests if the calling thread is the target thread
    /// (or is otherwise running inside the target's serial context).
    fn has_affinity(&self) -> bool;
}

impl<T: DispatchTarget + ?Sized> DispatchTarget for Arc<T> {
    fn invoke(&self, work: WorkItem) -> Result<(), Error> {
        (**self).invoke(work)
    }

    fn begin_invoke(&self, work: WorkItem) -> Result<(), Error> {
        (**self).begin_invoke(work)
    }

    fn has_affinity(&self) -> bool {
        (**self).has_affinity()
    }
}

/// Produces the [`DispatchTarget`] a [`DispatchService`](`crate::DispatchService`) sends work to.
///
/// Resolving may fail, for example when the event loop hasn't been created yet.
/// The service calls the resolver again on its next use until it succeeds.
pub trait Resolve: Send + Sync {
    fn resolve(&self) -> Result<Arc<dyn DispatchTarget>, ResolveError>;
}

impl<F> Resolve for F
where
    F: Fn() -> Result<Arc<dyn DispatchTarget>, ResolveError> + Send + Sync,
{
    fn resolve(&self) -> Result<Arc<dyn DispatchTarget>, ResolveError> {
        self()
    }
}
