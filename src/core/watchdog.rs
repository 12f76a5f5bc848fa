//! Advisory delay watchdog.
//!
//! A one-shot timer that raises an out-of-band alert when a bounded
//! operation overruns its budget. It never cancels or interrupts the
//! protected operation; that runs to its natural conclusion regardless.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

pub struct DelayWatchdog;

/// Live timer bound to one in-flight operation. Exactly one of
/// {disarmed in time, alert fired} happens per handle, never both.
pub struct WatchdogHandle {
    token: CancellationToken,
}

impl DelayWatchdog {
    /// Arm a single-shot timer. If it expires before [`WatchdogHandle::disarm`]
    /// is called, `on_timeout` runs exactly once on its own task.
    pub fn arm<F>(duration: Duration, on_timeout: F) -> WatchdogHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let timer_token = token.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = timer_token.cancelled() => {}
                _ = tokio::time::sleep(duration) => {
                    on_timeout.await;
                }
            }
        });

        WatchdogHandle { token }
    }
}

impl WatchdogHandle {
    /// Stop the timer. Idempotent: disarming an already-fired or
    /// already-disarmed handle is a no-op.
    pub fn disarm(&self) {
        self.token.cancel();
    }
}

// Cancellation only stops a timer that has not expired yet. An alert that
// is already running keeps the task alive until it finishes, so dropping
// the handle mid-alert cannot lose the notification.
impl Drop for WatchdogHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
