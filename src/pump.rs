//! A portable dispatch target for event loops that have no native
//! "run this on my thread" primitive (or that ferry has no backend for).
//!
//! A [`MainLoop`] is a FIFO queue of work items bound to the thread that created it.
//! It does not run an event loop of its own: the host's loop drains it by
//! calling [`MainLoop::run_pending`] whenever it wakes up. Configure a
//! [waker](`MainLoopBuilder::waker`) to get the loop to wake up when work arrives.
//! Threads that have nothing else to do can use [`MainLoop::run`] instead.
//!
//! ```
//! use ferry::pump::MainLoop;
//! use ferry::DispatchService;
//! use std::thread;
//!
//! let main_loop = MainLoop::new();
//! let service = DispatchService::with_target(main_loop.target());
//! let quit = main_loop.target();
//!
//! let worker = thread::spawn(move || {
//!     let answer = service.invoke(|| 6 * 7).unwrap();
//!     quit.quit();
//!     answer
//! });
//!
//! main_loop.run();
//! assert_eq!(42, worker.join().unwrap());
//! ```

use crate::blocking::post_and_wait;
use crate::work_item::log_unhandled_panic;
use crate::{DispatchTarget, Error, ResolveError, WorkItem};
use std::any::Any;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use std::{error, fmt};

type WakerFn = Box<dyn Fn() + Send + Sync>;
type PanicHandlerFn = Box<dyn Fn(Box<dyn Any + Send + 'static>) + Send + Sync>;

/// The main loop that [`resolve`] hands out, registered by [`MainLoop::install`].
static INSTALLED: RwLock<Weak<Shared>> = RwLock::new(Weak::new());

/// A queue of work items drained on the thread that created it.
///
/// Dropping the main loop shuts it down: queued items are dropped without
/// running and further submissions fail with [`Error::DispatchUnavailable`].
pub struct MainLoop {
    shared: Arc<Shared>,
    // Draining is only allowed on the owning thread.
    _not_send: PhantomData<*const ()>,
}

/// A handle for submitting work to a [`MainLoop`] from any thread.
#[derive(Clone)]
pub struct LoopTarget {
    shared: Arc<Shared>,
}

#[cfg(test)]
static_assertions::assert_impl_all!(LoopTarget: Send, Sync);
#[cfg(test)]
static_assertions::assert_not_impl_any!(MainLoop: Send, Sync);

struct Shared {
    owner: ThreadId,
    state: Mutex<State>,
    ready: Condvar,
    waker: Option<WakerFn>,
    panic_handler: Option<PanicHandlerFn>,
}

#[derive(Default)]
struct State {
    queue: VecDeque<WorkItem>,
    quit_requested: bool,
    closed: bool,
}

/// Configures a [`MainLoop`] before it's created.
#[derive(Default)]
#[must_use]
pub struct MainLoopBuilder {
    waker: Option<WakerFn>,
    panic_handler: Option<PanicHandlerFn>,
}

impl MainLoopBuilder {
    /// Sets a function that is called (on the submitting thread) after
    /// work has been enqueued or a quit was requested.
    ///
    /// Use this to wake up the host's event loop, e.g. with an event loop proxy.
    pub fn waker(mut self, waker: impl Fn() + Send + Sync + 'static) -> Self {
        self.waker = Some(Box::new(waker));
        self
    }

    /// Sets a function that receives the payload of panics raised by
    /// work items that nobody waits for.
    ///
    /// Without a handler such panics are logged (with the `log` feature) and discarded.
    pub fn panic_handler(
        mut self,
        handler: impl Fn(Box<dyn Any + Send + 'static>) + Send + Sync + 'static,
    ) -> Self {
        self.panic_handler = Some(Box::new(handler));
        self
    }

    /// Creates a main loop bound to the current thread.
    pub fn build(self) -> MainLoop {
        MainLoop {
            shared: Arc::new(Shared {
                owner: thread::current().id(),
                state: Mutex::new(State::default()),
                ready: Condvar::new(),
                waker: self.waker,
                panic_handler: self.panic_handler,
            }),
            _not_send: PhantomData,
        }
    }

    /// Creates a main loop bound to the current thread and registers it as the
    /// target used by [`DispatchService::new`](`crate::DispatchService::new`)
    /// on platforms without a native backend.
    ///
    /// Fails if another installed main loop is still alive.
    pub fn install(self) -> Result<MainLoop, AlreadyInstalled> {
        let mut installed = INSTALLED.write().unwrap_or_else(PoisonError::into_inner);
        if installed.upgrade().is_some() {
            return Err(AlreadyInstalled);
        }
        let main_loop = self.build();
        *installed = Arc::downgrade(&main_loop.shared);
        Ok(main_loop)
    }
}

impl fmt::Debug for MainLoopBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainLoopBuilder")
            .field("waker", &self.waker.is_some())
            .field("panic_handler", &self.panic_handler.is_some())
            .finish()
    }
}

impl Default for MainLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl MainLoop {
    /// Creates a main loop bound to the current thread.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> MainLoopBuilder {
        MainLoopBuilder::default()
    }

    /// Shortcut for `MainLoop::builder().install()`.
    pub fn install() -> Result<Self, AlreadyInstalled> {
        Self::builder().install()
    }

    /// Returns a handle that submits work to this main loop.
    pub fn target(&self) -> LoopTarget {
        LoopTarget {
            shared: self.shared.clone(),
        }
    }

    /// The number of work items waiting to run.
    pub fn pending(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Runs the work items that are queued at the time of the call
    /// and returns how many ran.
    ///
    /// Items enqueued while draining are left for the next call,
    /// so a work item that keeps re-enqueueing itself can't starve the host loop.
    /// A pending [`LoopTarget::quit`] request is consumed.
    pub fn run_pending(&self) -> usize {
        let count = {
            let mut state = self.shared.lock();
            state.quit_requested = false;
            state.queue.len()
        };
        for ran in 0..count {
            let Some(item) = self.shared.lock().queue.pop_front() else {
                return ran;
            };
            self.shared.run_item(item);
        }
        count
    }

    /// Runs work items as they arrive until [`LoopTarget::quit`] is called.
    pub fn run(&self) {
        self.run_until(None);
    }

    /// Runs work items as they arrive until `timeout` has elapsed
    /// or [`LoopTarget::quit`] is called, and returns how many ran.
    ///
    /// A timeout too large to be represented as an [`Instant`] never elapses.
    pub fn run_for(&self, timeout: Duration) -> usize {
        self.run_until(Instant::now().checked_add(timeout))
    }

    fn run_until(&self, deadline: Option<Instant>) -> usize {
        let mut ran = 0;
        loop {
            let item = {
                let mut state = self.shared.lock();
                loop {
                    if std::mem::take(&mut state.quit_requested) {
                        return ran;
                    }
                    if let Some(item) = state.queue.pop_front() {
                        break item;
                    }
                    state = match deadline {
                        None => self
                            .shared
                            .ready
                            .wait(state)
                            .unwrap_or_else(PoisonError::into_inner),
                        Some(deadline) => {
                            let Some(remaining) = deadline.checked_duration_since(Instant::now())
                            else {
                                return ran;
                            };
                            self.shared
                                .ready
                                .wait_timeout(state, remaining)
                                .unwrap_or_else(PoisonError::into_inner)
                                .0
                        }
                    };
                }
            };
            self.shared.run_item(item);
            ran += 1;
        }
    }
}

impl fmt::Debug for MainLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainLoop")
            .field("owner", &self.shared.owner)
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

impl Drop for MainLoop {
    fn drop(&mut self) {
        let abandoned = {
            let mut state = self.shared.lock();
            state.closed = true;
            std::mem::take(&mut state.queue)
        };
        // Dropping the items outside of the lock wakes up blocked callers.
        drop(abandoned);

        let mut installed = INSTALLED.write().unwrap_or_else(PoisonError::into_inner);
        if installed.as_ptr() == Arc::as_ptr(&self.shared) {
            *installed = Weak::new();
        }
    }
}

impl LoopTarget {
    /// Makes [`MainLoop::run`] (or [`MainLoop::run_for`]) return
    /// after the current work item.
    ///
    /// If the loop isn't running, the request is kept until the next
    /// `run` or `run_for`, which then returns right away.
    /// [`MainLoop::run_pending`] discards such a request, so hosts that only
    /// drain with `run_pending` never leave one behind.
    pub fn quit(&self) {
        self.shared.lock().quit_requested = true;
        self.shared.ready.notify_all();
        self.shared.wake();
    }

    /// Tests if the main loop has been dropped.
    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }
}

impl fmt::Debug for LoopTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopTarget")
            .field("owner", &self.shared.owner)
            .finish_non_exhaustive()
    }
}

/// Blocking invokes from the owning thread run inline, everything else is
/// posted to the queue and waited for.
impl DispatchTarget for LoopTarget {
    fn invoke(&self, work: WorkItem) -> Result<(), Error> {
        if self.has_affinity() {
            self.shared.run_item(work);
            Ok(())
        } else {
            post_and_wait(work, |item| self.shared.push(item))
        }
    }

    fn begin_invoke(&self, work: WorkItem) -> Result<(), Error> {
        self.shared.push(work)
    }

    fn has_affinity(&self) -> bool {
        thread::current().id() == self.shared.owner
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        // Work items never run while the lock is held, so the state is intact
        // even if some other thread panicked while holding it.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, work: WorkItem) -> Result<(), Error> {
        {
            let mut state = self.lock();
            if state.closed {
                return Err(Error::DispatchUnavailable(ResolveError::new(
                    "the main loop has shut down",
                )));
            }
            state.queue.push_back(work);
        }
        self.ready.notify_one();
        self.wake();
        Ok(())
    }

    fn wake(&self) {
        if let Some(waker) = &self.waker {
            waker();
        }
    }

    fn run_item(&self, work: WorkItem) {
        if let Err(payload) = work.try_run() {
            match &self.panic_handler {
                Some(handler) => handler(payload),
                None => log_unhandled_panic(payload.as_ref()),
            }
        }
    }
}

/// Resolves the main loop registered with [`MainLoop::install`].
///
/// This is the default resolver on platforms without a native backend.
/// Pass it to [`DispatchService::with_resolver`](`crate::DispatchService::with_resolver`)
/// to use an installed main loop everywhere else.
pub fn resolve() -> Result<Arc<dyn DispatchTarget>, ResolveError> {
    let installed = INSTALLED.read().unwrap_or_else(PoisonError::into_inner);
    match installed.upgrade() {
        Some(shared) => Ok(Arc::new(LoopTarget { shared })),
        None => Err(ResolveError::new(
            "no main loop installed, call `MainLoop::install` on the UI thread",
        )),
    }
}

/// Returned by [`MainLoop::install`] when another main loop is already installed.
#[derive(Debug, Clone, Copy)]
pub struct AlreadyInstalled;

impl fmt::Display for AlreadyInstalled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("failed to install main loop: another main loop is still alive")
    }
}

impl error::Error for AlreadyInstalled {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    fn push_label(target: &LoopTarget, order: &Arc<Mutex<Vec<u32>>>, label: u32) {
        let order = order.clone();
        target
            .begin_invoke(WorkItem::new(move || {
                order.lock().expect("not poisoned").push(label)
            }))
            .expect("loop is open");
    }

    #[test]
    fn run_pending_runs_items_in_order() {
        let main_loop = MainLoop::new();
        let target = main_loop.target();
        let order = Arc::new(Mutex::new(Vec::new()));
        for label in 1..=3 {
            push_label(&target, &order, label);
        }

        assert_eq!(3, main_loop.pending());
        assert_eq!(3, main_loop.run_pending());
        assert_eq!(vec![1, 2, 3], *order.lock().expect("not poisoned"));
        assert_eq!(0, main_loop.run_pending());
    }

    #[test]
    fn run_pending_leaves_items_enqueued_while_draining() {
        let main_loop = MainLoop::new();
        let target = main_loop.target();
        let requeue = target.clone();
        target
            .begin_invoke(WorkItem::new(move || {
                requeue
                    .begin_invoke(WorkItem::new(|| {}))
                    .expect("loop is open");
            }))
            .expect("loop is open");

        assert_eq!(1, main_loop.run_pending());
        assert_eq!(1, main_loop.pending());
        assert_eq!(1, main_loop.run_pending());
    }

    #[test]
    fn wakes_the_host_loop_on_submission() {
        let wakeups = Arc::new(AtomicUsize::new(0));
        let main_loop = MainLoop::builder()
            .waker({
                let wakeups = wakeups.clone();
                move || {
                    wakeups.fetch_add(1, Ordering::SeqCst);
                }
            })
            .build();
        let target = main_loop.target();
        thread::spawn(move || target.begin_invoke(WorkItem::new(|| {})))
            .join()
            .expect("thread finishes")
            .expect("loop is open");
        assert_eq!(1, wakeups.load(Ordering::SeqCst));
    }

    #[test]
    fn run_returns_after_quit() {
        let main_loop = MainLoop::new();
        let target = main_loop.target();
        let ran = Arc::new(AtomicUsize::new(0));
        let worker = thread::spawn({
            let ran = ran.clone();
            move || {
                for _ in 0..10 {
                    let ran = ran.clone();
                    target
                        .invoke(WorkItem::new(move || {
                            ran.fetch_add(1, Ordering::SeqCst);
                        }))
                        .expect("loop is open");
                }
                target.quit();
            }
        });

        main_loop.run();
        worker.join().expect("worker finishes");
        assert_eq!(10, ran.load(Ordering::SeqCst));
    }

    #[test]
    fn run_for_stops_after_the_timeout() {
        let main_loop = MainLoop::new();
        push_label(&main_loop.target(), &Arc::new(Mutex::new(Vec::new())), 1);
        let started = Instant::now();
        assert_eq!(1, main_loop.run_for(Duration::from_millis(30)));
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn run_for_accepts_timeouts_that_never_elapse() {
        let main_loop = MainLoop::new();
        push_label(&main_loop.target(), &Arc::new(Mutex::new(Vec::new())), 1);
        main_loop.target().quit();
        assert_eq!(0, main_loop.run_for(Duration::MAX));
        assert_eq!(1, main_loop.pending());
    }

    #[test]
    fn run_for_without_deadline_runs_until_quit() {
        let main_loop = MainLoop::new();
        let target = main_loop.target();
        let worker = thread::spawn(move || {
            target
                .invoke(WorkItem::new(|| {}))
                .expect("loop is open");
            target.quit();
        });
        assert_eq!(1, main_loop.run_for(Duration::MAX));
        worker.join().expect("worker finishes");
    }

    #[test]
    fn run_pending_discards_an_earlier_quit() {
        let main_loop = MainLoop::new();
        let target = main_loop.target();
        target.quit();
        assert_eq!(0, main_loop.run_pending());

        push_label(&target, &Arc::new(Mutex::new(Vec::new())), 1);
        assert_eq!(1, main_loop.run_for(Duration::from_millis(20)));
    }

    #[test]
    fn quit_before_run_is_kept() {
        let main_loop = MainLoop::new();
        main_loop.target().quit();
        main_loop.run();
    }

    #[test]
    fn invoke_from_the_owning_thread_runs_inline() {
        let main_loop = MainLoop::new();
        let target = main_loop.target();
        let ran = Arc::new(AtomicUsize::new(0));
        target
            .invoke(WorkItem::new({
                let ran = ran.clone();
                move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                }
            }))
            .expect("loop is open");
        assert_eq!(1, ran.load(Ordering::SeqCst));
        assert_eq!(0, main_loop.pending());
    }

    #[test]
    fn affinity_is_bound_to_the_creating_thread() {
        let main_loop = MainLoop::new();
        let target = main_loop.target();
        assert!(target.has_affinity());
        let elsewhere = thread::spawn(move || target.has_affinity())
            .join()
            .expect("thread finishes");
        assert!(!elsewhere);
    }

    #[test]
    fn panics_are_passed_to_the_panic_handler() {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let main_loop = MainLoop::builder()
            .panic_handler(move |payload| {
                let message = payload.downcast_ref::<&str>().copied();
                _ = tx.lock().expect("not poisoned").send(message);
            })
            .build();
        let target = main_loop.target();
        target
            .begin_invoke(WorkItem::new(|| panic!("handled")))
            .expect("loop is open");
        push_label(&target, &Arc::new(Mutex::new(Vec::new())), 2);

        assert_eq!(2, main_loop.run_pending());
        assert_eq!(Ok(Some("handled")), rx.try_recv());
    }

    #[test]
    fn dropping_the_loop_rejects_new_work() {
        let main_loop = MainLoop::new();
        let target = main_loop.target();
        drop(main_loop);
        assert!(target.is_closed());
        let error = target
            .begin_invoke(WorkItem::new(|| {}))
            .expect_err("loop is closed");
        assert!(error.is_unavailable());
    }

    #[test]
    fn dropping_the_loop_releases_blocked_callers() {
        let main_loop = MainLoop::new();
        let target = main_loop.target();
        let caller = thread::spawn(move || target.invoke(WorkItem::new(|| {})));
        while main_loop.pending() == 0 {
            thread::yield_now();
        }
        drop(main_loop);
        let result = caller.join().expect("caller finishes");
        assert!(matches!(result, Err(Error::WorkItemDropped)));
    }

    #[test]
    fn only_one_main_loop_can_be_installed() {
        let first = MainLoop::install().expect("nothing installed yet");
        assert!(MainLoop::install().is_err());
        let resolved = resolve().expect("main loop is installed");
        assert!(resolved.has_affinity());

        drop(first);
        assert!(resolve().is_err());
        let second = MainLoop::install().expect("first main loop is gone");
        drop(second);
    }
}
