use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cluster::NodeLifecycleService;
use crate::config::DEFAULT_REQUEST_TIMEOUT_SECS;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<NodeLifecycleService>,
    pub request_timeout: Duration,
    /// Cancelled when the server shuts down; parent of every request token
    pub shutdown: CancellationToken,
}

/// Cancellation token for one request, fired on timeout or shutdown
pub struct RequestDeadline {
    token: CancellationToken,
    timer: JoinHandle<()>,
}

impl AppState {
    pub fn new(service: NodeLifecycleService) -> Self {
        Self {
            service: Arc::new(service),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Start the deadline for a new request
    pub fn request_deadline(&self) -> RequestDeadline {
        let token = self.shutdown.child_token();
        let expiry = token.clone();
        let timeout = self.request_timeout;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            expiry.cancel();
        });
        RequestDeadline { token, timer }
    }
}

impl RequestDeadline {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for RequestDeadline {
    fn drop(&mut self) {
        self.timer.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MemoryStore;

    fn create_test_state() -> AppState {
        AppState::new(NodeLifecycleService::new(Arc::new(MemoryStore::new())))
    }

    #[tokio::test]
    async fn test_deadline_fires_after_timeout() {
        let state = create_test_state().with_request_timeout(Duration::from_millis(10));
        let deadline = state.request_deadline();

        tokio::time::timeout(Duration::from_secs(5), deadline.token().cancelled())
            .await
            .expect("deadline should fire");
    }

    #[tokio::test]
    async fn test_shutdown_cancels_requests() {
        let state = create_test_state();
        let deadline = state.request_deadline();
        assert!(!deadline.token().is_cancelled());

        state.shutdown.cancel();
        assert!(deadline.token().is_cancelled());
    }

    #[tokio::test]
    async fn test_dropped_deadline_leaves_shutdown_alone() {
        let state = create_test_state().with_request_timeout(Duration::from_millis(1));
        drop(state.request_deadline());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!state.shutdown.is_cancelled());
    }
}
