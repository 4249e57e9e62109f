use ferry::pump::{self, MainLoop};
use ferry::DispatchService;
use log::{info, warn};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const WORKERS: usize = 4;

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("warn,pump_demo=trace,ferry=trace"),
    )
    .init();

    let main_loop = MainLoop::builder()
        .waker(|| log::trace!("waking up the main loop"))
        .panic_handler(|_payload| warn!("a work item panicked"))
        .install()
        .expect("no other main loop is installed");

    // The pump backend works on every platform, so the demo doesn't
    // depend on a native event loop running on the main thread.
    let service = Arc::new(DispatchService::with_resolver(pump::resolve));
    let finished = Arc::new(AtomicUsize::new(0));

    for worker in 0..WORKERS {
        let service = service.clone();
        let finished = finished.clone();
        let quit = main_loop.target();
        thread::Builder::new()
            .name(format!("worker {worker}"))
            .spawn(move || {
                thread::sleep(Duration::from_millis(50 * worker as u64));
                let on_main = service
                    .invoke(move || thread::current().name().map(str::to_owned))
                    .expect("main loop is running");
                info!("worker {worker} ran on {on_main:?}");

                service
                    .begin_invoke_delegate(Some(report), (worker, "done"))
                    .expect("main loop is running");

                if finished.fetch_add(1, Ordering::SeqCst) + 1 == WORKERS {
                    service
                        .begin_invoke(move || quit.quit())
                        .expect("main loop is running");
                }
            })
            .expect("failed to spawn worker");
    }

    main_loop.run();
    info!("all workers finished");
}

fn report(worker: usize, status: &'static str) {
    info!("worker {worker} reports {status}");
}
