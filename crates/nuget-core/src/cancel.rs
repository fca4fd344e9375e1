//! Cancellation token threaded through every async source operation.
//!
//! The token is a shared flag. Long-running work checks it at each
//! suspension point, and `cancelled()` lets a request race against it in
//! `tokio::select!`.

use crate::config::NetworkConfig;
use crate::error::NugetError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cancellation token for cooperative cancellation of async operations.
///
/// Clones share state: calling `cancel()` on any clone is observed by all.
///
/// # Example
///
/// ```
/// use nuget_core::CancellationToken;
///
/// let token = CancellationToken::new();
/// let token_clone = token.clone();
///
/// token_clone.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new cancellation token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Return `Err(NugetError::Cancelled)` once cancellation was requested.
    pub fn check(&self) -> Result<(), NugetError> {
        if self.is_cancelled() {
            Err(NugetError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolve once the token is cancelled.
    ///
    /// Polls the flag; meant to be raced against real work with
    /// `tokio::select!`.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            tokio::time::sleep(NetworkConfig::CANCEL_POLL_INTERVAL).await;
        }
    }
}
