//! Scoped acquire/release for async resources.
//!
//! [`Lifecycle`] is the async acquire/release pair. [`scoped`] runs a body
//! between the two and releases on both the success and the error path.
//! The blocking facade in [`crate::blocking`] drives the same pair from
//! synchronous code.

use std::future::Future;

use async_trait::async_trait;
use tracing::debug;

use crate::client::SophosClient;
use crate::error::Result;

/// An async resource with an explicit open/close step.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// Acquires whatever the resource needs before use.
    async fn open(&self) -> Result<()>;

    /// Releases what `open` acquired. Must be safe to call after a failed
    /// operation.
    async fn close(&self) -> Result<()>;
}

/// Opening warms the token cache and resolves the API host, so the first
/// real call does not pay for either. Closing drops cached credentials.
#[async_trait]
impl Lifecycle for SophosClient {
    async fn open(&self) -> Result<()> {
        self.token().await?;
        let base_url = self.base_url().await?;
        debug!(%base_url, "Client opened");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.clear_auth_cache().await;
        debug!("Client closed");
        Ok(())
    }
}

/// Runs `body` between `open` and `close`.
///
/// `close` runs whether `body` succeeds or fails. If `open` fails, neither
/// `body` nor `close` runs. An error from `body` takes precedence over an
/// error from `close`.
pub async fn scoped<'r, R, F, Fut, T>(resource: &'r R, body: F) -> Result<T>
where
    R: Lifecycle + ?Sized,
    F: FnOnce(&'r R) -> Fut,
    Fut: Future<Output = Result<T>> + 'r,
{
    resource.open().await?;
    let result = body(resource).await;
    let closed = resource.close().await;
    match (result, closed) {
        (Err(e), _) => Err(e),
        (Ok(_), Err(e)) => Err(e),
        (Ok(value), Ok(())) => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SophosError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counted {
        opens: AtomicUsize,
        closes: AtomicUsize,
        fail_open: bool,
    }

    #[async_trait]
    impl Lifecycle for Counted {
        async fn open(&self) -> Result<()> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if self.fail_open {
                return Err(SophosError::Config("open failed".into()));
            }
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn close_runs_after_success() {
        let r = Counted::default();
        let out = scoped(&r, |_| async { Ok(42) }).await.unwrap();
        assert_eq!(out, 42);
        assert_eq!(r.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn close_runs_after_error_and_error_is_kept() {
        let r = Counted::default();
        let err = scoped(&r, |_| async {
            Err::<(), _>(SophosError::validation("boom"))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, SophosError::Validation { .. }));
        assert_eq!(r.opens.load(Ordering::SeqCst), 1);
        assert_eq!(r.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_open_skips_body_and_close() {
        let r = Counted {
            fail_open: true,
            ..Counted::default()
        };
        let ran = AtomicUsize::new(0);
        let result = scoped(&r, |_| async {
            ran.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;
        assert!(result.is_err());
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(r.closes.load(Ordering::SeqCst), 0);
    }
}
