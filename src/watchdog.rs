// src/watchdog.rs
//! Restartable staleness timer.
//!
//! Fires a callback when it has not been reset for a full interval, then
//! rearms itself. Runs as a tokio task driven by the runtime timer.

use crate::error::{FixError, Result};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{runtime::Handle, sync::Notify, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, Instrument};

type Callback = Arc<dyn Fn() + Send + Sync>;

/// Single-shot timer that rearms after every firing.
///
/// The callback must not stop its own watchdog: `stop()` waits for an
/// in-flight callback to return.
pub struct WatchdogTimer {
    timeout: Duration,
    reset: Arc<Notify>,
    cancel: CancellationToken,
    // Held while the callback runs; false once stopped
    armed: Arc<Mutex<bool>>,
    task: Option<JoinHandle<()>>,
}

impl WatchdogTimer {
    /// Arm a watchdog on the current tokio runtime
    pub fn new<F>(callback: F, timeout: Duration) -> Result<Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let handle = Handle::try_current()?;
        Self::spawn_on(&handle, callback, timeout)
    }

    /// Arm a watchdog on an explicit runtime. A zero timeout is rejected.
    pub fn spawn_on<F>(handle: &Handle, callback: F, timeout: Duration) -> Result<Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        if timeout.is_zero() {
            return Err(FixError::InvalidInterval(timeout));
        }

        let reset = Arc::new(Notify::new());
        let cancel = CancellationToken::new();
        let armed = Arc::new(Mutex::new(true));

        let task = handle.spawn(
            run(
                Arc::new(callback),
                timeout,
                Arc::clone(&reset),
                cancel.clone(),
                Arc::clone(&armed),
            )
            .instrument(tracing::Span::current()),
        );

        debug!(timeout_ms = timeout.as_millis() as u64, "Watchdog armed");

        Ok(Self {
            timeout,
            reset,
            cancel,
            armed,
            task: Some(task),
        })
    }

    /// Cancel the pending deadline and rearm for the full interval
    pub fn reset(&self) {
        self.reset.notify_one();
    }

    /// Disarm. No callback starts after this returns.
    pub fn stop(&mut self) {
        *self.armed.lock().unwrap_or_else(|e| e.into_inner()) = false;
        self.cancel.cancel();
        if self.task.take().is_some() {
            debug!("Watchdog stopped");
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_armed(&self) -> bool {
        *self.armed.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for WatchdogTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(
    callback: Callback,
    timeout: Duration,
    reset: Arc<Notify>,
    cancel: CancellationToken,
    armed: Arc<Mutex<bool>>,
) {
    // Each pass arms a fresh deadline; firing just falls through to the next pass
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = reset.notified() => continue,
            _ = tokio::time::sleep(timeout) => {
                if !fire(&armed, &callback) {
                    break;
                }
            }
        }
    }
    trace!("Watchdog task exited");
}

fn fire(armed: &Mutex<bool>, callback: &Callback) -> bool {
    let gate = armed.lock().unwrap_or_else(|e| e.into_inner());
    if !*gate {
        return false;
    }
    trace!("Watchdog expired");
    callback();
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let hits = Arc::clone(&count);
        (count, move || {
            hits.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_requires_runtime() {
        let result = WatchdogTimer::new(|| {}, Duration::from_millis(10));
        assert!(matches!(result, Err(FixError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_rejects_zero_timeout() {
        let (count, callback) = counter();
        let result = WatchdogTimer::new(callback, Duration::ZERO);
        assert!(matches!(result, Err(FixError::InvalidInterval(d)) if d.is_zero()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fires_and_rearms() {
        let (count, callback) = counter();
        let watchdog = WatchdogTimer::new(callback, Duration::from_millis(40)).unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(count.load(Ordering::SeqCst) >= 2);
        assert!(watchdog.is_armed());
    }

    #[tokio::test]
    async fn test_reset_postpones_firing() {
        let (count, callback) = counter();
        let watchdog = WatchdogTimer::new(callback, Duration::from_millis(200)).unwrap();

        for _ in 0..12 {
            tokio::time::sleep(Duration::from_millis(25)).await;
            watchdog.reset();
        }

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stop_prevents_further_callbacks() {
        let (count, callback) = counter();
        let mut watchdog = WatchdogTimer::new(callback, Duration::from_millis(30)).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        watchdog.stop();
        let after_stop = count.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
        assert!(!watchdog.is_armed());
        assert_eq!(watchdog.timeout(), Duration::from_millis(30));
    }
}
