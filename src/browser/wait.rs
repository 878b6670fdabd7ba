//! Polling with back-off under a ceiling
//!
//! Probes run immediately and then after each back-off delay; the last
//! delay repeats. A probe that becomes ready is seen on the next tick, so
//! a condition that holds at time T completes at most one delay after T.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::common::{Error, Result, TimeoutKind};

/// Retry delays for actionability checks
pub const ACTION_BACKOFF_MS: &[u64] = &[0, 20, 100, 100, 500];

/// Retry delays for assertions
pub const EXPECT_BACKOFF_MS: &[u64] = &[100, 250, 500, 1000];

/// Outcome of one probe
#[derive(Debug)]
pub enum Probe<T> {
    Ready(T),
    /// Not yet; the reason ends up in the timeout message
    Retry(String),
}

/// Run `probe` until it is ready or `timeout_ms` elapses (0 = forever)
///
/// Errors returned by the probe abort the wait immediately.
pub async fn poll_until<T, F, Fut>(
    kind: TimeoutKind,
    timeout_ms: u64,
    what: &str,
    backoff: &[u64],
    mut probe: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Probe<T>>>,
{
    let deadline = (timeout_ms > 0).then(|| Instant::now() + Duration::from_millis(timeout_ms));
    let mut attempt = 0usize;
    let mut last_reason: Option<String> = None;

    loop {
        if attempt > 0 {
            let delay_ms = backoff
                .get(attempt - 1)
                .or(backoff.last())
                .copied()
                .unwrap_or(100);
            let mut delay = Duration::from_millis(delay_ms);
            if let Some(deadline) = deadline {
                delay = delay.min(deadline.saturating_duration_since(Instant::now()));
            }
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
        attempt += 1;

        // A probe stuck inside the backend still counts against the ceiling
        let probed = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, probe()).await {
                Ok(probed) => probed?,
                Err(_) => return Err(expired(kind, timeout_ms, what, last_reason.as_deref())),
            },
            None => probe().await?,
        };

        match probed {
            Probe::Ready(value) => return Ok(value),
            Probe::Retry(reason) => {
                tracing::trace!(what, attempt, %reason, "probe not ready");
                last_reason = Some(reason);
            }
        }

        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return Err(expired(kind, timeout_ms, what, last_reason.as_deref()));
            }
        }
    }
}

fn expired(kind: TimeoutKind, timeout_ms: u64, what: &str, reason: Option<&str>) -> Error {
    let detail = match reason {
        Some(reason) => format!("{} ({})", what, reason),
        None => what.to_string(),
    };
    Error::timeout(kind, timeout_ms, detail)
}

/// Bound a single future by a ceiling (0 = no ceiling)
pub async fn with_ceiling<T, Fut>(kind: TimeoutKind, timeout_ms: u64, what: &str, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    if timeout_ms == 0 {
        return fut.await;
    }
    match tokio::time::timeout(Duration::from_millis(timeout_ms), fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::timeout(kind, timeout_ms, what)),
    }
}
