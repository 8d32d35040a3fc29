//! Runtime abstraction layer for async operations
//!
//! Module resolution, construction and ready-waits are the only suspension points
//! in the binding layer. They are spawned through an [`AsyncSpawner`] so the same
//! nodes run under Tokio, inside a browser, or on a host's own frame loop via
//! [`ManualSpawner`].

use futures::future::BoxFuture;
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// A trait for spawning async tasks (object-safe version)
pub trait AsyncSpawner: Send + Sync + 'static {
    /// Spawn a future and return a handle to it
    fn spawn_boxed(&self, future: BoxFuture<'static, ()>) -> Box<dyn AsyncHandle>;
}

/// Handle to a spawned async task
pub trait AsyncHandle: Send + Sync {
    /// Check if the task is finished
    fn is_finished(&self) -> bool;

    /// Cancel the task
    fn cancel(&self);
}

/// Spawns on the process-wide default runtime
pub fn spawn<F>(future: F) -> Box<dyn AsyncHandle>
where
    F: futures::Future<Output = ()> + Send + 'static,
{
    runtime().spawn_boxed(Box::pin(future))
}

/// Default spawner implementations
pub mod spawners {
    use super::*;

    #[cfg(feature = "tokio-runtime")]
    pub mod tokio_impl {
        use super::*;
        use ::tokio::runtime::{Builder, Handle, Runtime};
        use ::tokio::task::JoinHandle;

        /// Tokio-based async spawner
        ///
        /// Spawns on the current Tokio runtime. Outside of one, tasks go to a
        /// small background runtime owned by this crate.
        pub struct TokioSpawner;

        impl AsyncSpawner for TokioSpawner {
            fn spawn_boxed(&self, future: BoxFuture<'static, ()>) -> Box<dyn AsyncHandle> {
                match runtime_handle() {
                    Some(handle) => Box::new(TokioHandle(Some(handle.spawn(future)))),
                    None => {
                        log::error!("no Tokio runtime available, task dropped");
                        Box::new(TokioHandle(None))
                    }
                }
            }
        }

        fn runtime_handle() -> Option<Handle> {
            Handle::try_current()
                .ok()
                .or_else(|| background().map(|runtime| runtime.handle().clone()))
        }

        fn background() -> Option<&'static Runtime> {
            static BACKGROUND: OnceCell<Option<Runtime>> = OnceCell::new();
            BACKGROUND
                .get_or_init(|| {
                    let built = Builder::new_multi_thread()
                        .worker_threads(1)
                        .thread_name("mapbind-runtime")
                        .enable_all()
                        .build();
                    match built {
                        Ok(runtime) => {
                            log::debug!("started background Tokio runtime");
                            Some(runtime)
                        }
                        Err(error) => {
                            log::error!("failed to start background Tokio runtime: {}", error);
                            None
                        }
                    }
                })
                .as_ref()
        }

        struct TokioHandle(Option<JoinHandle<()>>);

        impl AsyncHandle for TokioHandle {
            fn is_finished(&self) -> bool {
                self.0.as_ref().map_or(true, |handle| handle.is_finished())
            }

            fn cancel(&self) {
                if let Some(handle) = &self.0 {
                    handle.abort();
                }
            }
        }
    }

    #[cfg(feature = "wasm")]
    pub mod wasm {
        use super::*;
        use std::sync::atomic::{AtomicBool, Ordering};

        /// WASM-compatible async spawner
        pub struct WasmSpawner;

        impl AsyncSpawner for WasmSpawner {
            fn spawn_boxed(&self, future: BoxFuture<'static, ()>) -> Box<dyn AsyncHandle> {
                let finished = Arc::new(AtomicBool::new(false));
                let flag = finished.clone();
                wasm_bindgen_futures::spawn_local(async move {
                    future.await;
                    flag.store(true, Ordering::SeqCst);
                });
                Box::new(WasmHandle { finished })
            }
        }

        struct WasmHandle {
            finished: Arc<AtomicBool>,
        }

        impl AsyncHandle for WasmHandle {
            fn is_finished(&self) -> bool {
                self.finished.load(Ordering::SeqCst)
            }

            fn cancel(&self) {
                // spawn_local tasks can't be cancelled, just mark as finished
                self.finished.store(true, Ordering::SeqCst);
            }
        }
    }
}

pub use manual::ManualSpawner;

/// Deterministic spawner driven by its owner
pub mod manual {
    use super::*;
    use crossbeam_channel::{unbounded, Receiver, Sender};
    use futures::task::{waker_ref, ArcWake};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::task::{Context, Poll};

    struct ManualTask {
        future: Mutex<Option<BoxFuture<'static, ()>>>,
        woken: AtomicBool,
        finished: AtomicBool,
    }

    impl ArcWake for ManualTask {
        fn wake_by_ref(arc_self: &Arc<Self>) {
            arc_self.woken.store(true, Ordering::SeqCst);
        }
    }

    impl ManualTask {
        /// Polls once if woken; returns true when the task made progress.
        fn poll_if_woken(self: &Arc<Self>) -> bool {
            if !self.woken.swap(false, Ordering::SeqCst) {
                return false;
            }
            let waker = waker_ref(self);
            let mut cx = Context::from_waker(&waker);
            let Ok(mut slot) = self.future.lock() else {
                return false;
            };
            if let Some(future) = slot.as_mut() {
                if let Poll::Ready(()) = future.as_mut().poll(&mut cx) {
                    *slot = None;
                    self.finished.store(true, Ordering::SeqCst);
                }
            }
            true
        }
    }

    struct ManualHandle(Arc<ManualTask>);

    impl AsyncHandle for ManualHandle {
        fn is_finished(&self) -> bool {
            self.0.finished.load(Ordering::SeqCst)
        }

        fn cancel(&self) {
            if let Ok(mut slot) = self.0.future.lock() {
                *slot = None;
            }
            self.0.finished.store(true, Ordering::SeqCst);
        }
    }

    /// Single-threaded task queue polled by [`ManualSpawner::run_until_stalled`].
    ///
    /// Spawning never polls; tasks only advance when the owner runs the queue.
    /// This mirrors a UI scheduler flushing effects after a render.
    pub struct ManualSpawner {
        incoming_tx: Sender<Arc<ManualTask>>,
        incoming_rx: Receiver<Arc<ManualTask>>,
        pending: Mutex<Vec<Arc<ManualTask>>>,
    }

    impl ManualSpawner {
        pub fn new() -> Self {
            let (incoming_tx, incoming_rx) = unbounded();
            Self {
                incoming_tx,
                incoming_rx,
                pending: Mutex::new(Vec::new()),
            }
        }

        pub fn shared() -> Arc<Self> {
            Arc::new(Self::new())
        }

        /// Polls woken tasks until none can make progress.
        ///
        /// Returns the number of polls performed.
        pub fn run_until_stalled(&self) -> usize {
            let mut polls = 0;
            loop {
                let mut tasks = match self.pending.lock() {
                    Ok(mut pending) => std::mem::take(&mut *pending),
                    Err(_) => return polls,
                };
                tasks.extend(self.incoming_rx.try_iter());

                let mut progressed = false;
                for task in &tasks {
                    if task.poll_if_woken() {
                        polls += 1;
                        progressed = true;
                    }
                }
                tasks.retain(|task| !task.finished.load(Ordering::SeqCst));

                if let Ok(mut pending) = self.pending.lock() {
                    pending.extend(tasks);
                }
                if !progressed && self.incoming_rx.is_empty() {
                    return polls;
                }
            }
        }

        /// Number of spawned tasks that have not completed yet
        pub fn pending_tasks(&self) -> usize {
            let queued = self.incoming_rx.len();
            let parked = self.pending.lock().map(|p| p.len()).unwrap_or(0);
            queued + parked
        }
    }

    impl Default for ManualSpawner {
        fn default() -> Self {
            Self::new()
        }
    }

    impl AsyncSpawner for ManualSpawner {
        fn spawn_boxed(&self, future: BoxFuture<'static, ()>) -> Box<dyn AsyncHandle> {
            let task = Arc::new(ManualTask {
                future: Mutex::new(Some(future)),
                woken: AtomicBool::new(true),
                finished: AtomicBool::new(false),
            });
            if self.incoming_tx.send(task.clone()).is_err() {
                log::warn!("manual spawner queue closed, task dropped");
            }
            Box::new(ManualHandle(task))
        }
    }
}

/// Global runtime instance
static RUNTIME: OnceCell<Arc<dyn AsyncSpawner>> = OnceCell::new();

/// Initialize the runtime with a specific spawner
///
/// Has no effect once the default runtime has been read.
pub fn init_runtime(spawner: Arc<dyn AsyncSpawner>) {
    if RUNTIME.set(spawner).is_err() {
        log::debug!("runtime already initialised, keeping the existing spawner");
    }
}

/// Get the global runtime spawner
///
/// Falls back to Tokio, then WASM, then a [`ManualSpawner`] nobody drives.
pub fn runtime() -> Arc<dyn AsyncSpawner> {
    RUNTIME
        .get_or_init(|| {
            #[cfg(feature = "tokio-runtime")]
            {
                Arc::new(spawners::tokio_impl::TokioSpawner)
            }

            #[cfg(all(feature = "wasm", not(feature = "tokio-runtime")))]
            {
                Arc::new(spawners::wasm::WasmSpawner)
            }

            #[cfg(not(any(feature = "tokio-runtime", feature = "wasm")))]
            {
                log::warn!("no async runtime feature enabled, using an undriven manual spawner");
                Arc::new(ManualSpawner::new())
            }
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::oneshot;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_manual_spawner_defers_until_run() {
        let spawner = ManualSpawner::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();

        let handle = spawner.spawn_boxed(Box::pin(async move {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(!handle.is_finished());

        spawner.run_until_stalled();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(handle.is_finished());
        assert_eq!(spawner.pending_tasks(), 0);
    }

    #[test]
    fn test_manual_spawner_parks_until_woken() {
        let spawner = ManualSpawner::new();
        let (tx, rx) = oneshot::channel::<u32>();
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();

        spawner.spawn_boxed(Box::pin(async move {
            if let Ok(value) = rx.await {
                s.store(value as usize, Ordering::SeqCst);
            }
        }));

        spawner.run_until_stalled();
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert_eq!(spawner.pending_tasks(), 1);

        tx.send(7).unwrap();
        spawner.run_until_stalled();
        assert_eq!(seen.load(Ordering::SeqCst), 7);
        assert_eq!(spawner.pending_tasks(), 0);
    }

    #[test]
    fn test_manual_spawner_runs_nested_spawns() {
        let spawner = Arc::new(ManualSpawner::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let inner_spawner = spawner.clone();
        let c = counter.clone();

        spawner.spawn_boxed(Box::pin(async move {
            let c2 = c.clone();
            inner_spawner.spawn_boxed(Box::pin(async move {
                c2.fetch_add(10, Ordering::SeqCst);
            }));
            c.fetch_add(1, Ordering::SeqCst);
        }));

        spawner.run_until_stalled();
        assert_eq!(counter.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn test_cancel_drops_future() {
        let spawner = ManualSpawner::new();
        let (_tx, rx) = oneshot::channel::<()>();
        let handle = spawner.spawn_boxed(Box::pin(async move {
            let _ = rx.await;
        }));
        spawner.run_until_stalled();
        handle.cancel();
        assert!(handle.is_finished());
        spawner.run_until_stalled();
        assert_eq!(spawner.pending_tasks(), 0);
    }

    #[cfg(feature = "tokio-runtime")]
    #[::tokio::test]
    async fn test_tokio_spawner() {
        let handle = spawners::tokio_impl::TokioSpawner.spawn_boxed(Box::pin(async {
            ::tokio::time::sleep(::tokio::time::Duration::from_millis(10)).await;
        }));

        // Should not be finished immediately
        assert!(!handle.is_finished());

        // Wait a bit and check again
        ::tokio::time::sleep(::tokio::time::Duration::from_millis(50)).await;
        assert!(handle.is_finished());
    }
}
