use crate::transport::{self, HostTransport, TransportError};
use dealdesk_protocol::CatalogItem;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Fixed-delay bounded retry. No exponential backoff and no jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

impl<E: fmt::Display> fmt::Display for Exhausted<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "gave up after {} attempts: {}",
            self.attempts, self.last_error
        )
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for Exhausted<E> {}

impl RetryPolicy {
    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Call `op` with the 1-based attempt number until it succeeds or the
    /// retries run out.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, Exhausted<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= self.total_attempts() => {
                    return Err(Exhausted {
                        attempts: attempt,
                        last_error: err,
                    });
                }
                Err(err) => {
                    warn!(
                        attempt,
                        error = %err,
                        retry_in_ms = self.delay.as_millis() as u64,
                        "attempt failed; retrying"
                    );
                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }
}

/// Where the current catalog came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogSource {
    Host,
    Fallback { attempts: u32 },
}

/// Single entry shown when the host never answers.
pub fn fallback_catalog() -> Vec<CatalogItem> {
    vec![CatalogItem {
        name: "weed".to_string(),
        label: "Weed".to_string(),
        base_price: 50.0,
        max_amount: 50,
        description: "High quality street weed".to_string(),
    }]
}

/// Retry `op` under `policy`, degrading to [`fallback_catalog`] on exhaustion.
pub async fn catalog_or_fallback<F, Fut>(
    policy: &RetryPolicy,
    op: F,
) -> (Vec<CatalogItem>, CatalogSource)
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Vec<CatalogItem>, TransportError>>,
{
    match policy.run(op).await {
        Ok(items) => {
            info!(count = items.len(), "catalog loaded");
            (items, CatalogSource::Host)
        }
        Err(exhausted) => {
            warn!(
                attempts = exhausted.attempts,
                error = %exhausted.last_error,
                "catalog fetch exhausted; using fallback"
            );
            (
                fallback_catalog(),
                CatalogSource::Fallback {
                    attempts: exhausted.attempts,
                },
            )
        }
    }
}

/// `/getAvailableItems` with retries against a live transport.
pub async fn fetch_catalog_with_retry<T: HostTransport>(
    transport: &T,
    policy: &RetryPolicy,
) -> (Vec<CatalogItem>, CatalogSource) {
    catalog_or_fallback(policy, |attempt| {
        info!(attempt, "fetching catalog");
        transport::fetch_catalog(transport)
    })
    .await
}
