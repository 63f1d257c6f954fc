use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Shared lifecycle state for a component backed by one worker thread: a
/// stop flag the worker polls, and the thread handle to join on `stop()`.
///
/// Every long-running piece of the engine (Timeshift Manager worker, Source
/// Input Processor threads, Mix Scheduler per-source workers, MP3 encoder
/// worker) embeds one of these rather than inheriting from a shared base —
/// the hook a subclass would have overridden becomes a closure passed to
/// `spawn`.
pub struct ComponentHandle {
    stop_flag: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ComponentHandle {
    /// Spawns `run` on a new OS thread, handing it a clone of the stop flag
    /// it should poll. `run` is responsible for returning promptly once the
    /// flag is set (typically by also stopping any queue it blocks on).
    pub fn spawn<F>(name: impl Into<String>, run: F) -> Self
    where
        F: FnOnce(Arc<AtomicBool>) + Send + 'static,
    {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let flag_for_thread = Arc::clone(&stop_flag);
        let thread = std::thread::Builder::new()
            .name(name.into())
            .spawn(move || run(flag_for_thread))
            .expect("failed to spawn engine worker thread");
        Self { stop_flag, thread: Some(thread) }
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_flag)
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished()) && !self.stop_flag.load(Ordering::Acquire)
    }

    /// Sets the stop flag and joins the worker thread. Idempotent: calling
    /// `stop()` twice is a no-op the second time.
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for ComponentHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
