//! At most one refresh in flight per client.
//!
//! The first caller installs a shared future; everyone arriving while it runs
//! awaits a clone of it and gets the same result. The future clears the slot
//! itself when it finishes, so the next expiry starts a fresh attempt.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::Mutex;

use super::error::RefreshError;

type SharedRefresh = Shared<BoxFuture<'static, Result<String, RefreshError>>>;

/// Default upper bound on a single refresh attempt.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RefreshGuard {
    inflight: Arc<Mutex<Option<SharedRefresh>>>,
    timeout: Duration,
}

impl RefreshGuard {
    pub fn new(timeout: Duration) -> Self {
        Self {
            inflight: Arc::new(Mutex::new(None)),
            timeout,
        }
    }

    /// Join the refresh in flight, or start one with `start`.
    ///
    /// `current` is consulted under the slot lock when nothing is in flight:
    /// returning `Some(token)` means a refresh already completed since the
    /// caller's request and that token should be used instead.
    pub async fn run<C, F, Fut>(&self, current: C, start: F) -> Result<String, RefreshError>
    where
        C: FnOnce() -> Option<String>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, RefreshError>> + Send + 'static,
    {
        let shared = {
            let mut slot = self.inflight.lock().await;
            match slot.as_ref() {
                Some(inflight) => inflight.clone(),
                None => {
                    if let Some(token) = current() {
                        return Ok(token);
                    }

                    let attempt = start();
                    let timeout = self.timeout;
                    let inflight = self.inflight.clone();
                    let shared = async move {
                        let result = tokio::time::timeout(timeout, attempt)
                            .await
                            .unwrap_or(Err(RefreshError::Timeout));
                        inflight.lock().await.take();
                        result
                    }
                    .boxed()
                    .shared();

                    *slot = Some(shared.clone());
                    shared
                }
            }
        };

        shared.await
    }

    pub async fn is_in_flight(&self) -> bool {
        self.inflight.lock().await.is_some()
    }
}

impl Default for RefreshGuard {
    fn default() -> Self {
        Self::new(DEFAULT_REFRESH_TIMEOUT)
    }
}
