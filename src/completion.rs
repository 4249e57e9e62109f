use crate::{Error, WorkItem};
use futures_channel::oneshot;
use futures_lite::ready;
use pin_project_lite::pin_project;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::thread;

pin_project! {
    /// The eventual result of a work item dispatched with [`DispatchService::spawn`].
    ///
    /// `Completion` is a future, so it can be awaited from async code.
    /// Use [`Completion::wait`] to block for the result instead.
    ///
    /// Dropping a completion does not cancel the work item.
    ///
    /// [`DispatchService::spawn`]: `crate::DispatchService::spawn`
    #[must_use = "dropping a completion discards the work item's result"]
    pub struct Completion<R> {
        #[pin] receiver: oneshot::Receiver<thread::Result<R>>,
    }
}

#[cfg(test)]
static_assertions::assert_impl_all!(Completion<u32>: Send, Unpin);

impl<R> Completion<R> {
    /// Blocks the current thread until the work item has run.
    ///
    /// Don't call this from the target thread itself:
    /// the work item can't run while its thread is blocked here.
    ///
    /// Not available on the web, where blocking isn't possible. Await the completion instead.
    #[cfg(not(all(target_family = "wasm", target_os = "unknown")))]
    pub fn wait(self) -> Result<R, Error> {
        crate::async_rt::block_on(self)
    }

    /// Returns the result if the work item has already finished,
    /// or gives the completion back if it is still pending.
    pub fn try_take(mut self) -> Result<Result<R, Error>, Self> {
        match self.receiver.try_recv() {
            Ok(Some(result)) => Ok(into_dispatch_result(result)),
            Ok(None) => Err(self),
            Err(oneshot::Canceled) => Ok(Err(Error::WorkItemDropped)),
        }
    }
}

impl<R> Future for Completion<R> {
    type Output = Result<R, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        match ready!(this.receiver.poll(cx)) {
            Ok(result) => Poll::Ready(into_dispatch_result(result)),
            Err(oneshot::Canceled) => Poll::Ready(Err(Error::WorkItemDropped)),
        }
    }
}

/// Wraps `work` into a [`WorkItem`] that reports its return value (or panic)
/// to the returned [`Completion`].
pub(crate) fn capture<F, R>(work: F) -> (WorkItem, Completion<R>)
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let (sender, receiver) = oneshot::channel();
    let item = WorkItem::new(move || {
        _ = sender.send(catch_unwind(AssertUnwindSafe(work)));
    });
    (item, Completion { receiver })
}

fn into_dispatch_result<R>(result: thread::Result<R>) -> Result<R, Error> {
    result.map_err(Error::WorkItemPanicked)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_the_return_value() {
        let (item, completion) = capture(|| 6 * 7);
        item.run();
        assert_eq!(42, completion.wait().expect("work succeeds"));
    }

    #[test]
    fn reports_panics() {
        let (item, completion) = capture(|| -> u8 { panic!("oh no") });
        item.run();
        let error = completion.wait().expect_err("work panics");
        assert!(error.is_panic());
    }

    #[test]
    fn reports_dropped_items() {
        let (item, completion) = capture(|| ());
        drop(item);
        assert!(matches!(completion.wait(), Err(Error::WorkItemDropped)));
    }

    #[test]
    fn try_take_gives_back_pending_completions() {
        let (item, completion) = capture(|| "done");
        let Err(completion) = completion.try_take() else {
            panic!("item hasn't run yet");
        };
        item.run();
        let result = completion.try_take().map_err(|_pending| "item ran");
        assert_eq!("done", result.expect("item ran").expect("work succeeds"));
    }

    #[test]
    fn pending_completions_can_still_be_awaited() {
        let (item, completion) = capture(|| 7);
        let completion = completion.try_take().expect_err("item hasn't run yet");
        item.run();
        assert_eq!(7, completion.wait().expect("work succeeds"));
    }
}
