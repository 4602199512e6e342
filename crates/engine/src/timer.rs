use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::debug;

/// Idle timeout after which an open overlay closes itself.
pub const AUTO_EXPIRY: Duration = Duration::from_secs(300);

/// Single cancellable countdown.
///
/// Arming replaces any pending countdown; dropping the timer cancels it.
#[derive(Debug, Default)]
pub struct ExpiryTimer {
    pending: Option<AbortHandle>,
}

impl ExpiryTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the current countdown and start a new one. Must be called
    /// inside a tokio runtime.
    pub fn rearm<F>(&mut self, after: Duration, on_fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel();
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            on_fire();
        });
        debug!(after_ms = after.as_millis() as u64, "expiry armed");
        self.pending = Some(task.abort_handle());
    }

    /// Returns `true` when a countdown was still pending.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                debug!("expiry cancelled");
                true
            }
            _ => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for ExpiryTimer {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}
