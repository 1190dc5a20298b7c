//! Process-wide stop signal
//!
//! Ctrl-C and the admin `quit` command both end up here. The supervisor
//! treats the signal firing as one of the racing task completions.

use tokio_util::sync::CancellationToken;
use tracing::info;

/// Cloneable, awaitable stop request
#[derive(Clone, Debug, Default)]
pub struct StopSignal {
    token: CancellationToken,
}

impl StopSignal {
    /// Create an unfired stop signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop; later calls are no-ops
    pub fn trigger(&self, reason: &str) {
        if !self.token.is_cancelled() {
            info!("Stop requested: {}", reason);
            self.token.cancel();
        }
    }

    /// Whether a stop has been requested
    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait until a stop is requested
    pub async fn wait(&self) {
        self.token.cancelled().await;
    }
}
