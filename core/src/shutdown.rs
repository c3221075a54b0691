//! One-shot, process-wide shutdown signal.

use tokio_util::sync::CancellationToken;

/// Broadcast signal that aborts every in-flight resilient fetch sharing it.
///
/// Clones observe the same signal. [`trigger`](Shutdown::trigger) is
/// close-once: the first call fires the signal, later calls from any task are
/// no-ops.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the signal has fired. Returns immediately if it already
    /// has.
    pub async fn wait(&self) {
        self.token.cancelled().await
    }
}
