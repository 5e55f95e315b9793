use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::backend::lock;

/// Runs the most recently scheduled task once input has been quiet for the
/// configured delay.
///
/// Only the waiting phase is cancellable: once the delay elapses the task is
/// spawned on its own, so a save that already started is never aborted by
/// new input. Its handle is kept so callers can still wait for it.
#[derive(Debug)]
pub struct Debouncer<T = ()> {
    delay: Duration,
    pending: Option<JoinHandle<()>>,
    running: Arc<Mutex<Option<JoinHandle<T>>>>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
            running: Arc::new(Mutex::new(None)),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Replaces any pending task with `task`, restarting the delay.
    pub fn schedule<F>(&mut self, task: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        self.cancel();
        let delay = self.delay;
        let running = Arc::clone(&self.running);
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // No await between spawning and storing the handle, so the
            // pending task only finishes once the running one is visible
            *lock(&running) = Some(tokio::spawn(task));
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    /// Still waiting out the delay.
    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// The delay elapsed and the task has not completed yet.
    pub fn is_running(&self) -> bool {
        lock(&self.running)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Waits for the task that already started, returning its output.
    ///
    /// `None` when nothing was started since the last call, or when the
    /// task panicked.
    pub async fn settle(&mut self) -> Option<T> {
        let handle = lock(&self.running).take()?;
        match handle.await {
            Ok(output) => Some(output),
            Err(e) => {
                tracing::error!("Debounced task did not complete: {}", e);
                None
            }
        }
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting(counter: &Arc<AtomicUsize>, amount: usize) -> impl Future<Output = ()> {
        let counter = Arc::clone(counter);
        async move {
            counter.fetch_add(amount, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_last_task_runs() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut debouncer = Debouncer::new(Duration::from_millis(1500));

        debouncer.schedule(counting(&runs, 1));
        tokio::time::sleep(Duration::from_millis(1000)).await;
        debouncer.schedule(counting(&runs, 10));
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 10);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_waits_for_started_task() {
        let mut debouncer = Debouncer::new(Duration::from_millis(100));
        debouncer.schedule(async {
            tokio::time::sleep(Duration::from_millis(1000)).await;
            42
        });
        assert_eq!(debouncer.settle().await, None);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!debouncer.is_pending());
        assert!(debouncer.is_running());

        debouncer.cancel();
        assert_eq!(debouncer.settle().await, Some(42));
        assert!(!debouncer.is_running());
        assert_eq!(debouncer.settle().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_pending() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut debouncer = Debouncer::new(Duration::from_millis(100));
        debouncer.schedule(counting(&runs, 1));
        assert!(debouncer.is_pending());
        drop(debouncer);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
