//! Error types for the Heimdall client.
//!
//! # Design
//! Context and shutdown errors get dedicated variants because callers must
//! stop all further work when they see one: the engine has already retried
//! internally. These two are what a facade call usually fails with. Besides
//! them callers only meet `InvalidUrl` and `NoResponse` (a 204 from a
//! single-resource endpoint); the remaining variants describe a failed
//! attempt, which the engine retries.

use thiserror::Error;

/// Boxed error produced by a [`Transport`](crate::http::Transport).
pub type TransportError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Terminal reason carried by a done [`Context`](crate::context::Context).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    /// The context's deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// The context, or one of its ancestors, was canceled explicitly.
    #[error("context canceled")]
    Canceled,
}

/// Errors returned by [`HeimdallClient`](crate::HeimdallClient) and the fetch
/// functions.
#[derive(Debug, Error)]
pub enum HeimdallError {
    /// The caller's context expired or was canceled. Displays the context's
    /// own message unchanged.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// The client's shutdown signal fired.
    #[error("shutdown detected")]
    ShutdownDetected,

    /// The server answered 204 where a body was expected.
    #[error("got a nil response")]
    NoResponse,

    /// The server returned a status other than 200 or 204.
    #[error("error while fetching data from Heimdall: response code {status}")]
    NotSuccessfulResponse { status: u16 },

    /// The body was not valid JSON for the expected envelope.
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Connection, TLS or I/O failure below HTTP.
    #[error("transport error: {0}")]
    Transport(#[source] TransportError),

    /// The base address could not be parsed.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl HeimdallError {
    /// True for context and shutdown errors. Callers should treat these as a
    /// signal to stop rather than something to retry.
    pub fn is_terminal_signal(&self) -> bool {
        matches!(self, HeimdallError::Context(_) | HeimdallError::ShutdownDetected)
    }
}
