//! HTTP transport seam and the single-shot fetcher.
//!
//! # Design
//! The fetch engine talks to the network only through [`Transport`], which
//! returns an [`HttpResponse`] as plain data. The production implementation,
//! [`UreqTransport`], drives a blocking `ureq` agent on tokio's blocking pool;
//! tests substitute a scripted transport and run on a paused clock.
//!
//! [`fetch`] performs exactly one attempt: it bounds the transport call by a
//! per-call timeout layered under the caller's context, interprets the status
//! code and decodes the body.

use std::fmt;
use std::future::Future;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use serde::de::DeserializeOwned;
use ureq::Agent;
use url::Url;

use crate::context::Context;
use crate::error::{HeimdallError, TransportError};

/// An HTTP response described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn no_content() -> Self {
        Self {
            status: 204,
            body: String::new(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
        }
    }
}

/// Performs GET requests for the client.
///
/// Implementations are shared read-only across every concurrent call.
pub trait Transport: Send + Sync + 'static {
    /// Issues one GET. Non-2xx statuses are returned as data, not errors.
    fn get(&self, url: Url) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;

    /// Drops pooled connections that are not currently in use.
    fn close_idle_connections(&self) {}
}

/// [`Transport`] backed by a blocking `ureq` agent.
pub struct UreqTransport {
    timeout: Duration,
    agent: RwLock<Agent>,
}

impl fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UreqTransport").field("timeout", &self.timeout).finish_non_exhaustive()
    }
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            agent: RwLock::new(build_agent(timeout)),
        }
    }

    fn agent(&self) -> Agent {
        self.agent.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Status codes are left for [`fetch`] to interpret.
fn build_agent(timeout: Duration) -> Agent {
    Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(Some(timeout))
        .build()
        .new_agent()
}

fn execute(agent: &Agent, url: &Url) -> Result<HttpResponse, TransportError> {
    let mut response = agent.get(url.as_str()).call()?;
    let status = response.status().as_u16();
    if status == 204 {
        return Ok(HttpResponse::no_content());
    }
    let body = response.body_mut().read_to_string()?;
    Ok(HttpResponse { status, body })
}

impl Transport for UreqTransport {
    fn get(&self, url: Url) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send {
        let agent = self.agent();
        async move {
            tokio::task::spawn_blocking(move || execute(&agent, &url))
                .await
                .map_err(|e| Box::new(e) as TransportError)?
        }
    }

    fn close_idle_connections(&self) {
        // Requests in flight hold clones of the old agent and finish on its
        // pool; the pool is dropped with the last clone.
        let fresh = build_agent(self.timeout);
        *self.agent.write().unwrap_or_else(PoisonError::into_inner) = fresh;
    }
}

/// One GET against `url`, decoded into `T`.
///
/// Returns `Ok(None)` on 204. The attempt is abandoned as soon as `ctx` or the
/// per-call `timeout` runs out, reporting the context's own reason.
pub async fn fetch<T, R>(
    ctx: &Context,
    transport: &R,
    url: &Url,
    timeout: Duration,
) -> Result<Option<T>, HeimdallError>
where
    T: DeserializeOwned,
    R: Transport,
{
    let attempt_ctx = ctx.with_timeout(timeout);
    if let Some(reason) = attempt_ctx.err() {
        return Err(reason.into());
    }

    let response = tokio::select! {
        biased;
        reason = attempt_ctx.done() => return Err(reason.into()),
        response = transport.get(url.clone()) => response.map_err(HeimdallError::Transport)?,
    };

    match response.status {
        200 => Ok(Some(serde_json::from_str(&response.body)?)),
        204 => Ok(None),
        status => Err(HeimdallError::NotSuccessfulResponse { status }),
    }
}
