//! Drives a [`MainLoop`] from winit's event loop: the waker sends a user event
//! through an [`EventLoopProxy`] and the app drains the queue when it arrives.

use ferry::pump::{self, MainLoop};
use ferry::DispatchService;
use log::info;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy};
use winit::window::WindowId;

#[derive(Debug, Clone, Copy)]
struct Wake;

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("warn,winit_demo=trace,ferry=trace"),
    )
    .init();

    let event_loop = EventLoop::<Wake>::with_user_event().build().unwrap();
    let proxy: EventLoopProxy<Wake> = event_loop.create_proxy();
    let main_loop = MainLoop::builder()
        .waker(move || {
            _ = proxy.send_event(Wake);
        })
        .install()
        .unwrap();

    let service = DispatchService::with_resolver(pump::resolve);
    let done = Arc::new(AtomicBool::new(false));
    thread::spawn({
        let done = done.clone();
        move || {
            for tick in 1..=3 {
                thread::sleep(Duration::from_millis(200));
                let answer = service.invoke(move || tick * 2).unwrap();
                info!("tick {tick} came back as {answer}");
            }
            service
                .begin_invoke(move || done.store(true, Ordering::SeqCst))
                .unwrap();
        }
    });

    event_loop.run_app(&mut App { main_loop, done }).unwrap();
}

struct App {
    main_loop: MainLoop,
    done: Arc<AtomicBool>,
}

impl ApplicationHandler<Wake> for App {
    fn resumed(&mut self, _event_loop: &ActiveEventLoop) {}

    fn user_event(&mut self, event_loop: &ActiveEventLoop, _event: Wake) {
        let ran = self.main_loop.run_pending();
        log::trace!("ran {ran} work items");
        if self.done.load(Ordering::SeqCst) {
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        _event: WindowEvent,
    ) {
    }
}
