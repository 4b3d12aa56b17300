//! Cancellation propagation for external I/O and long-running index work
//! (spec §5).
//!
//! Every orchestrator method accepts a [`CancellationToken`] (re-exported
//! from `tokio_util`) and threads it into storage calls and embed calls
//! via [`run_cancellable`]. Cancellation mid-insert leaves the caller
//! responsible for rollback (`vg-index`'s insert path severs any edges it
//! had already wired before returning [`vg_core::Error::Cancelled`]).

use std::future::Future;
pub use tokio_util::sync::CancellationToken;
use vg_core::{Error, Result};

/// Race `fut` against `token`. If the token fires first, returns
/// [`Error::Cancelled`] naming `operation`; `fut` is dropped, so any
/// partially-completed work inside it must be rolled back by the
/// `Drop` impls of whatever state it was mutating (this module does not
/// itself know how to undo domain-specific mutations).
pub async fn run_cancellable<T>(operation: &str, token: &CancellationToken, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Error::cancelled(operation)),
        result = fut => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_normally_when_not_cancelled() {
        let token = CancellationToken::new();
        let result = run_cancellable("test", &token, async { Ok::<_, Error>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn returns_cancelled_when_token_fires_first() {
        let token = CancellationToken::new();
        token.cancel();
        let result: Result<i32> = run_cancellable("search", &token, std::future::pending()).await;
        assert!(matches!(result, Err(Error::Cancelled { operation }) if operation == "search"));
    }
}
