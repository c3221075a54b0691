//! Resilient fetch: retry a single-shot fetch until it succeeds, the caller's
//! context ends, or the client shuts down.
//!
//! There is no retry cap. A call against a permanently failing server only
//! returns once its [`Context`] is done or the [`Shutdown`] signal fires, so
//! callers must pass a context with a deadline or hold on to the signal.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::context::Context;
use crate::error::HeimdallError;
use crate::http::{fetch, Transport};
use crate::shutdown::Shutdown;

/// tokio intervals reject a zero period.
const MIN_RETRY_INTERVAL: Duration = Duration::from_millis(1);

/// Fetches `url` into `T`, retrying every `config.retry_interval` on failure.
///
/// The first attempt is immediate. Between attempts the call waits on the
/// caller's context, the shutdown signal and the retry clock, checked in that
/// order, and returns the context's own error or
/// [`HeimdallError::ShutdownDetected`] as soon as either fires. An attempt in
/// flight is abandoned the same way. Any other attempt error, decode failures
/// included, leads to another attempt.
///
/// `Ok(None)` means the server answered 204.
pub async fn fetch_with_retry<T, R>(
    ctx: &Context,
    transport: &R,
    url: &Url,
    shutdown: &Shutdown,
    config: &ClientConfig,
) -> Result<Option<T>, HeimdallError>
where
    T: DeserializeOwned,
    R: Transport,
{
    if shutdown.is_triggered() {
        debug!(path = url.path(), "shutdown detected before first attempt");
        return Err(HeimdallError::ShutdownDetected);
    }

    let err = match attempt_once(ctx, transport, url, shutdown, config).await {
        Ok(result) => return Ok(result),
        Err(HeimdallError::ShutdownDetected) => return Err(HeimdallError::ShutdownDetected),
        Err(err) => err,
    };

    let mut attempt: u32 = 1;
    warn!(attempt, path = url.path(), error = %err, "an error while trying fetching from Heimdall");

    let period = config.retry_interval.max(MIN_RETRY_INTERVAL);
    let log_every = config.log_every.max(1);
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        debug!(path = url.path(), attempt, retry_in = ?period, "retrying fetch from Heimdall");

        tokio::select! {
            biased;
            reason = ctx.done() => {
                debug!(path = url.path(), %reason, "terminating request by context");
                return Err(reason.into());
            }
            _ = shutdown.wait() => {
                debug!(path = url.path(), "shutdown detected, terminating request");
                return Err(HeimdallError::ShutdownDetected);
            }
            _ = ticker.tick() => {}
        }

        attempt = attempt.saturating_add(1);
        match attempt_once(ctx, transport, url, shutdown, config).await {
            Ok(result) => return Ok(result),
            Err(HeimdallError::ShutdownDetected) => {
                debug!(path = url.path(), "shutdown detected mid-request, terminating request");
                return Err(HeimdallError::ShutdownDetected);
            }
            Err(err) if attempt % log_every == 0 => {
                warn!(attempt, path = url.path(), error = %err, "an error while trying fetching from Heimdall");
            }
            Err(_) => {}
        }
    }
}

/// A single fetch that is dropped if shutdown fires before it completes.
///
/// The fetch is polled first so an expired context still wins.
async fn attempt_once<T, R>(
    ctx: &Context,
    transport: &R,
    url: &Url,
    shutdown: &Shutdown,
    config: &ClientConfig,
) -> Result<Option<T>, HeimdallError>
where
    T: DeserializeOwned,
    R: Transport,
{
    tokio::select! {
        biased;
        result = fetch(ctx, transport, url, config.request_timeout) => result,
        _ = shutdown.wait() => Err(HeimdallError::ShutdownDetected),
    }
}
