//! Per-call cancellation context.
//!
//! A [`Context`] is handed to every fetch. It becomes done either when its
//! deadline passes or when it, or any ancestor, is canceled, and it remembers
//! which of the two happened first so the fetch engine can report that reason
//! verbatim.
//!
//! Deadlines use [`tokio::time::Instant`], so tests running on a paused clock
//! drive them like any other tokio timer.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::ContextError;

/// Hierarchical deadline/cancel token supplied by the caller of a fetch.
///
/// Cloning a `Context` yields a handle to the same context. Deriving one with
/// [`with_cancel`](Context::with_cancel), [`with_timeout`](Context::with_timeout)
/// or [`with_deadline`](Context::with_deadline) creates a child that is done
/// whenever its parent is.
#[derive(Debug, Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    token: CancellationToken,
    deadline: Option<Instant>,
    /// Terminal reason and the instant it took effect.
    done: OnceLock<(ContextError, Instant)>,
    parent: Option<Arc<Inner>>,
}

impl Inner {
    fn err(&self) -> Option<ContextError> {
        self.done_at().map(|(reason, _)| reason)
    }

    /// Whichever of an inherited reason and this context's own expired
    /// deadline took effect first.
    fn done_at(&self) -> Option<(ContextError, Instant)> {
        if let Some(done) = self.done.get() {
            return Some(*done);
        }
        let inherited = self.parent.as_ref().and_then(|parent| parent.done_at());
        let expired = self
            .deadline
            .filter(|deadline| Instant::now() >= *deadline)
            .map(|deadline| (ContextError::DeadlineExceeded, deadline));
        let done = match (inherited, expired) {
            (Some(inherited), Some(expired)) if expired.1 < inherited.1 => expired,
            (inherited, expired) => inherited.or(expired)?,
        };
        Some(*self.done.get_or_init(|| done))
    }
}

impl Context {
    /// A context that is never done on its own.
    pub fn background() -> Self {
        Self {
            inner: Arc::new(Inner {
                token: CancellationToken::new(),
                deadline: None,
                done: OnceLock::new(),
                parent: None,
            }),
        }
    }

    /// Child that can be canceled independently of `self`.
    pub fn with_cancel(&self) -> Self {
        self.child(self.inner.deadline)
    }

    /// Child whose deadline is `timeout` from now, or the parent's deadline if
    /// that comes first. A timeout too large to represent adds no deadline.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.with_cancel(),
        }
    }

    /// Child whose deadline is the earlier of `deadline` and the parent's.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.inner.deadline {
            Some(parent) => parent.min(deadline),
            None => deadline,
        };
        self.child(Some(deadline))
    }

    fn child(&self, deadline: Option<Instant>) -> Self {
        Self {
            inner: Arc::new(Inner {
                token: self.inner.token.child_token(),
                deadline,
                done: OnceLock::new(),
                parent: Some(Arc::clone(&self.inner)),
            }),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Cancels this context and every context derived from it. Has no effect
    /// on the recorded reason if the context is already done.
    pub fn cancel(&self) {
        if self.inner.done_at().is_none() {
            let _ = self.inner.done.get_or_init(|| (ContextError::Canceled, Instant::now()));
        }
        self.inner.token.cancel();
    }

    /// Terminal reason, or `None` while the context is still live.
    pub fn err(&self) -> Option<ContextError> {
        self.inner.err()
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolves once the context is done and yields the reason.
    pub async fn done(&self) -> ContextError {
        loop {
            if let Some(reason) = self.err() {
                return reason;
            }
            match self.inner.deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = self.inner.token.cancelled() => {}
                        _ = sleep_until(deadline) => {}
                    }
                }
                None => self.inner.token.cancelled().await,
            }
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}
