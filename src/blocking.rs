//! Emulates a blocking invoke on top of a post-only primitive:
//! the posted item signals a oneshot channel that the caller waits on.

use crate::{Error, WorkItem};

/// Posts `work` using `post` and blocks until it has run.
///
/// If the backend drops the item without running it, the channel is
/// cancelled and the caller receives [`Error::WorkItemDropped`] instead of hanging.
#[cfg(not(all(target_family = "wasm", target_os = "unknown")))]
pub(crate) fn post_and_wait(
    work: WorkItem,
    post: impl FnOnce(WorkItem) -> Result<(), Error>,
) -> Result<(), Error> {
    use crate::async_rt::block_on;
    use futures_channel::oneshot;

    let (done_tx, done_rx) = oneshot::channel::<()>();
    post(WorkItem::new(move || {
        work.run_detached();
        _ = done_tx.send(());
    }))?;
    block_on(done_rx).map_err(|_canceled| Error::WorkItemDropped)
}

/// The web can't block, so nothing is posted and the caller gets an error.
#[cfg(all(target_family = "wasm", target_os = "unknown"))]
pub(crate) fn post_and_wait(
    _work: WorkItem,
    _post: impl FnOnce(WorkItem) -> Result<(), Error>,
) -> Result<(), Error> {
    Err(Error::Platform(
        "blocking invokes from other threads are not supported on the web".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn waits_for_the_item_to_run() {
        let ran = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel::<WorkItem>();
        let worker = thread::spawn(move || {
            while let Ok(item) = rx.recv() {
                item.run();
            }
        });

        let work = WorkItem::new({
            let ran = ran.clone();
            move || ran.store(true, Ordering::SeqCst)
        });
        post_and_wait(work, |item| {
            tx.send(item).map_err(|_| Error::WorkItemDropped)
        })
        .expect("item runs");
        assert!(ran.load(Ordering::SeqCst));

        drop(tx);
        worker.join().expect("worker exits");
    }

    #[test]
    fn reports_dropped_items() {
        let result = post_and_wait(WorkItem::new(|| {}), |item| {
            drop(item);
            Ok(())
        });
        assert!(matches!(result, Err(Error::WorkItemDropped)));
    }

    #[test]
    fn forwards_post_errors() {
        let result = post_and_wait(WorkItem::new(|| {}), |_item| {
            Err(Error::InvalidArgument { name: "work" })
        });
        assert!(matches!(result, Err(Error::InvalidArgument { name: "work" })));
    }
}
