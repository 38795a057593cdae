//! Non-blocking proxy restarts.
//!
//! The service control command is synchronous, so each restart runs on the
//! blocking pool. Restart units are tracked in a [`JoinSet`]: the loop never
//! waits for them unless asked to, and on shutdown they get a bounded join
//! instead of being silently abandoned.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::service::ProxyService;

/// Fire-and-forget restarter with tracked handles.
pub struct ServiceRestarter<S> {
    service: Arc<S>,
    tasks: JoinSet<()>,
    issued: u64,
}

impl<S: ProxyService> ServiceRestarter<S> {
    pub fn new(service: Arc<S>) -> Self {
        Self {
            service,
            tasks: JoinSet::new(),
            issued: 0,
        }
    }

    /// Trigger a restart and return immediately.
    ///
    /// The outcome is logged from the restart task; failures never reach
    /// the caller.
    pub fn restart_async(&mut self) {
        self.reap();

        self.issued += 1;
        let seq = self.issued;
        let service = Arc::clone(&self.service);
        self.tasks.spawn_blocking(move || {
            info!(service = service.name(), restart = seq, "Restarting proxy service");
            match service.restart() {
                Ok(()) => info!(service = service.name(), restart = seq, "Proxy service restarted"),
                Err(e) => error!(
                    service = service.name(),
                    restart = seq,
                    error = %e,
                    "Proxy service restart failed"
                ),
            }
        });
    }

    /// Total restarts triggered so far.
    pub const fn issued(&self) -> u64 {
        self.issued
    }

    /// Restarts that have not been joined yet.
    pub fn outstanding(&self) -> usize {
        self.tasks.len()
    }

    /// Wait until every outstanding restart has finished.
    pub async fn wait_idle(&mut self) {
        while let Some(res) = self.tasks.join_next().await {
            log_join_result(res);
        }
    }

    /// Join outstanding restarts for at most `timeout`.
    ///
    /// Returns the number of restarts still running when the timeout hit.
    /// Blocking-pool work cannot be cancelled, so those are detached.
    pub async fn shutdown(mut self, timeout: Duration) -> usize {
        self.reap();
        if self.tasks.is_empty() {
            return 0;
        }

        info!(
            outstanding = self.tasks.len(),
            timeout_secs = timeout.as_secs(),
            "Waiting for outstanding proxy restarts"
        );
        if tokio::time::timeout(timeout, self.wait_idle()).await.is_ok() {
            return 0;
        }

        let abandoned = self.tasks.len();
        warn!(abandoned, "Proxy restarts still running at shutdown; abandoning");
        self.tasks.detach_all();
        abandoned
    }

    /// Collect restarts that already finished without waiting.
    fn reap(&mut self) {
        while let Some(res) = self.tasks.try_join_next() {
            log_join_result(res);
        }
    }
}

fn log_join_result(res: Result<(), tokio::task::JoinError>) {
    if let Err(e) = res {
        error!(error = %e, "Proxy restart task panicked");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::service::DaemonState;
    use crate::testing::FakeService;

    #[tokio::test]
    async fn restart_async_returns_before_restart_completes() {
        let (service, gate) = FakeService::gated(DaemonState::Active);
        let service = Arc::new(service);
        let mut restarter = ServiceRestarter::new(Arc::clone(&service));

        restarter.restart_async();
        assert_eq!(restarter.issued(), 1);
        assert_eq!(restarter.outstanding(), 1);
        assert_eq!(service.restarts(), 0);

        gate.send(()).unwrap();
        restarter.wait_idle().await;
        assert_eq!(service.restarts(), 1);
        assert_eq!(restarter.outstanding(), 0);
    }

    #[tokio::test]
    async fn failed_restart_is_swallowed() {
        let service = Arc::new(FakeService::new(DaemonState::Active).failing_restarts());
        let mut restarter = ServiceRestarter::new(Arc::clone(&service));

        restarter.restart_async();
        restarter.restart_async();
        restarter.wait_idle().await;

        assert_eq!(service.restart_attempts(), 2);
        assert_eq!(service.restarts(), 0);
        assert_eq!(restarter.shutdown(Duration::from_secs(1)).await, 0);
    }

    #[tokio::test]
    async fn shutdown_joins_finished_restarts() {
        let service = Arc::new(FakeService::new(DaemonState::Active));
        let mut restarter = ServiceRestarter::new(Arc::clone(&service));

        restarter.restart_async();
        assert_eq!(restarter.shutdown(Duration::from_secs(5)).await, 0);
        assert_eq!(service.restarts(), 1);
    }

    #[tokio::test]
    async fn shutdown_gives_up_after_timeout() {
        let (service, gate) = FakeService::gated(DaemonState::Active);
        let service = Arc::new(service);
        let mut restarter = ServiceRestarter::new(Arc::clone(&service));

        restarter.restart_async();
        let abandoned = restarter.shutdown(Duration::from_millis(50)).await;
        assert_eq!(abandoned, 1);
        assert_eq!(service.restarts(), 0);

        // Unblock the detached restart so the runtime can shut down.
        drop(gate);
    }
}
