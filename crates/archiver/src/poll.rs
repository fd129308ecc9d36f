//! Cancellable polling
//!
//! Every wait in the archiver (finality, walk submission, walk completion,
//! the period loop itself) is a condition polled on a fixed interval until
//! it succeeds, fails permanently, or the shared [`CancellationToken`] fires.
//! Transient failures are the condition's business: it logs them and
//! reports "not yet".

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{ExportError, Result};

/// Poll `condition` until it yields a value.
///
/// - `Ok(Some(v))` ends the wait with `v`
/// - `Ok(None)` sleeps for `interval` and polls again
/// - `Err(e)` ends the wait with `e`
///
/// The first poll happens after `initial_delay`. Cancellation is observed
/// while sleeping and while the condition runs, and always yields
/// [`ExportError::Cancelled`].
pub async fn poll_until<T, F, Fut>(
    cancel: &CancellationToken,
    initial_delay: Duration,
    interval: Duration,
    mut condition: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    sleep(cancel, initial_delay).await?;

    loop {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ExportError::Cancelled),
            outcome = condition() => outcome,
        };

        if let Some(value) = outcome? {
            return Ok(value);
        }

        trace!(?interval, "condition not met, waiting");
        sleep(cancel, interval).await?;
    }
}

/// [`poll_until`] for conditions that only report done or not done
pub async fn wait_until<F, Fut>(
    cancel: &CancellationToken,
    initial_delay: Duration,
    interval: Duration,
    mut condition: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    poll_until(cancel, initial_delay, interval, || {
        let fut = condition();
        async move { Ok(fut.await?.then_some(())) }
    })
    .await
}

async fn sleep(cancel: &CancellationToken, duration: Duration) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(ExportError::Cancelled);
    }
    if duration.is_zero() {
        return Ok(());
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ExportError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
