use crate::completion::{capture, Completion};
use crate::{platform, Delegate, DispatchTarget, Error, Resolve, ResolveError};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Routes work onto the thread that owns the application's UI event loop.
///
/// The service holds a (lazily resolved) reference to a [`DispatchTarget`]
/// but does not own the target thread: creating or dropping a service
/// has no effect on the event loop.
///
/// `DispatchService` is [`Send`] and [`Sync`], so it can be shared
/// with background threads, for example behind an [`Arc`].
pub struct DispatchService {
    resolver: Box<dyn Resolve>,
    target: OnceLock<Arc<dyn DispatchTarget>>,
}

#[cfg(test)]
static_assertions::assert_impl_all!(DispatchService: Send, Sync);

impl Default for DispatchService {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DispatchService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchService")
            .field("resolved", &self.target.get().is_some())
            .finish_non_exhaustive()
    }
}

impl DispatchService {
    /// Creates a service for the dispatch mechanism of the current platform
    /// (see [`platform`](`crate::platform`)).
    ///
    /// Resolution is attempted immediately. If no target is available yet
    /// (e.g. the event loop hasn't been created) this is not an error:
    /// resolution is attempted again whenever work is dispatched.
    pub fn new() -> Self {
        Self::with_resolver(platform::resolve)
    }

    /// Creates a service that obtains its target from `resolver`.
    pub fn with_resolver(resolver: impl Resolve + 'static) -> Self {
        let service = DispatchService {
            resolver: Box::new(resolver),
            target: OnceLock::new(),
        };
        if let Err(error) = service.resolve() {
            log_deferred_resolution(&error);
        }
        service
    }

    /// Creates a service for an already resolved target.
    pub fn with_target(target: impl DispatchTarget + 'static) -> Self {
        let target: Arc<dyn DispatchTarget> = Arc::new(target);
        DispatchService {
            resolver: Box::new({
                let target = target.clone();
                move || -> Result<Arc<dyn DispatchTarget>, ResolveError> { Ok(target.clone()) }
            }),
            target: OnceLock::from(target),
        }
    }

    /// Returns the dispatch target, resolving it if that hasn't happened yet.
    ///
    /// Once resolved, the target is kept for the lifetime of the service.
    pub fn target(&self) -> Result<Arc<dyn DispatchTarget>, Error> {
        self.resolve().map(Arc::clone)
    }

    /// Tests if the calling thread is the target thread.
    ///
    /// Returns `false` if there's no target.
    pub fn has_affinity(&self) -> bool {
        self.resolve().is_ok_and(|target| target.has_affinity())
    }

    /// Runs `work` on the target thread and waits for it to complete,
    /// returning whatever `work` returned.
    ///
    /// If `work` panics, the panic is caught on the target thread and
    /// returned as [`Error::WorkItemPanicked`].
    ///
    /// Calling this from the target thread itself runs `work` inline
    /// on every built-in backend.
    pub fn invoke<F, R>(&self, work: F) -> Result<R, Error>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let target = self.resolve()?;
        let (item, completion) = capture(work);
        target.invoke(item)?;
        // The target has either run the item or dropped it by now.
        completion
            .try_take()
            .unwrap_or_else(|_pending| Err(Error::WorkItemDropped))
    }

    /// Enqueues `work` on the target thread and returns without waiting for it.
    ///
    /// Items enqueued from the same thread run in the order they were enqueued.
    pub fn begin_invoke<F>(&self, work: F) -> Result<(), Error>
    where
        F: FnOnce() + Send + 'static,
    {
        self.resolve()?.begin_invoke(work.into())
    }

    /// Runs `work` immediately if the calling thread is the target thread,
    /// otherwise behaves like [`DispatchService::begin_invoke`].
    ///
    /// When run inline, panics in `work` propagate to the caller.
    pub fn begin_invoke_if_required<F>(&self, work: F) -> Result<(), Error>
    where
        F: FnOnce() + Send + 'static,
    {
        let target = self.resolve()?;
        if target.has_affinity() {
            work();
            Ok(())
        } else {
            target.begin_invoke(work.into())
        }
    }

    /// Enqueues `work` on the target thread and returns a [`Completion`]
    /// for its result.
    pub fn spawn<F, R>(&self, work: F) -> Result<Completion<R>, Error>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let target = self.resolve()?;
        let (item, completion) = capture(work);
        target.begin_invoke(item)?;
        Ok(completion)
    }

    /// Like [`DispatchService::invoke`], but for a callable and its arguments.
    ///
    /// The callable is optional so that callables looked up at runtime can be
    /// passed on directly: `None` fails with [`Error::InvalidArgument`]
    /// before anything is dispatched.
    pub fn invoke_delegate<D, Args>(
        &self,
        callable: Option<D>,
        args: Args,
    ) -> Result<D::Output, Error>
    where
        D: Delegate<Args>,
        Args: Send + 'static,
    {
        let callable = require_callable(callable)?;
        self.invoke(move || callable.call_with(args))
    }

    /// Like [`DispatchService::begin_invoke`], but for a callable and its arguments.
    ///
    /// The callable's return value is discarded.
    pub fn begin_invoke_delegate<D, Args>(
        &self,
        callable: Option<D>,
        args: Args,
    ) -> Result<(), Error>
    where
        D: Delegate<Args>,
        Args: Send + 'static,
    {
        let callable = require_callable(callable)?;
        self.begin_invoke(move || {
            callable.call_with(args);
        })
    }

    /// Like [`DispatchService::begin_invoke_if_required`], but for a callable and its arguments.
    ///
    /// The callable's return value is discarded.
    pub fn begin_invoke_if_required_delegate<D, Args>(
        &self,
        callable: Option<D>,
        args: Args,
    ) -> Result<(), Error>
    where
        D: Delegate<Args>,
        Args: Send + 'static,
    {
        let callable = require_callable(callable)?;
        self.begin_invoke_if_required(move || {
            callable.call_with(args);
        })
    }

    fn resolve(&self) -> Result<&Arc<dyn DispatchTarget>, Error> {
        if let Some(target) = self.target.get() {
            return Ok(target);
        }
        // Racing threads may both resolve; the first stored target wins.
        let resolved = self.resolver.resolve()?;
        Ok(self.target.get_or_init(|| resolved))
    }
}

fn require_callable<D>(callable: Option<D>) -> Result<D, Error> {
    callable.ok_or(Error::InvalidArgument { name: "callable" })
}

#[cfg(feature = "log")]
fn log_deferred_resolution(error: &Error) {
    log::info!("dispatch target not available yet, retrying on first use: {error}");
}

#[cfg(not(feature = "log"))]
fn log_deferred_resolution(_error: &Error) {}
