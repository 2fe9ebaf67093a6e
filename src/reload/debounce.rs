//! Debounce scheduler
//!
//! A single shared timer. Every `schedule` call cancels the armed timer and
//! arms a new one, so the callback runs once, a full window after the last
//! call.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

pub struct Debouncer {
    window: Duration,
    runtime: Handle,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(window: Duration, runtime: Handle) -> Self {
        Self {
            window,
            runtime,
            timer: Mutex::new(None),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// (Re)arm the timer; `on_fire` runs when the window passes undisturbed
    pub fn schedule<F>(&self, on_fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut timer = self.timer.lock();
        if let Some(previous) = timer.take() {
            previous.abort();
        }

        let window = self.window;
        *timer = Some(self.runtime.spawn(async move {
            tokio::time::sleep(window).await;
            on_fire();
        }));
    }

    /// Disarm without firing
    pub fn cancel(&self) {
        if let Some(previous) = self.timer.lock().take() {
            previous.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.timer
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_burst_fires_once() {
        let debouncer = Debouncer::new(Duration::from_millis(80), Handle::current());
        let fired = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let fired = fired.clone();
            debouncer.schedule(move || {
                fired.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!debouncer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_fire() {
        let debouncer = Debouncer::new(Duration::from_millis(80), Handle::current());
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = fired.clone();
        debouncer.schedule(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(debouncer.is_armed());
        debouncer.cancel();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_windows_fire_separately() {
        let debouncer = Debouncer::new(Duration::from_millis(80), Handle::current());
        let fired = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let counter = fired.clone();
            debouncer.schedule(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(150)).await;
        }

        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }
}
