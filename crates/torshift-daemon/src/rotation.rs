//! The rotation control loop.
//!
//! A [`RotationLoop`] only exists in the running state: [`RotationLoop::start`]
//! runs the preflight check and refuses to build one when the proxy service
//! is down, and [`RotationLoop::run`] consumes it, so a stopped loop cannot be
//! resumed.
//!
//! Each iteration verifies the exit address, sleeps for the interval, checks
//! for cancellation, triggers a restart and checks again. Cancellation is
//! cooperative: an in-flight verification or sleep always completes first.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use torshift_core::{ExhaustedPolicy, RestartWait, RotationConfig};

use crate::identity::{AddressProbe, IdentityVerifier, VerifyError};
use crate::preflight::{self, PreflightError};
use crate::restart::ServiceRestarter;
use crate::service::ProxyService;

/// Exit status for preflight failures and invalid configuration.
pub const EXIT_FAILURE: u8 = 1;

/// Exit status when address verification exhausted its retries.
pub const EXIT_VERIFICATION_FAILED: u8 = 2;

/// Errors that end the rotation loop.
#[derive(Debug, thiserror::Error)]
pub enum RotationError {
    #[error(transparent)]
    Preflight(#[from] PreflightError),

    #[error("exit address verification failed: {0}")]
    Verification(#[from] VerifyError),
}

impl RotationError {
    /// Process exit status for this failure.
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Preflight(_) => EXIT_FAILURE,
            Self::Verification(_) => EXIT_VERIFICATION_FAILED,
        }
    }
}

/// Counters reported after an orderly shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RotationSummary {
    /// Iterations whose verification succeeded.
    pub verified: u64,
    /// Iterations whose verification exhausted its retries and was skipped.
    pub skipped: u64,
    /// Restarts triggered.
    pub restarts_issued: u64,
    /// Restarts still running when the shutdown join timed out.
    pub abandoned_restarts: usize,
}

/// Running rotation loop.
pub struct RotationLoop<P, S> {
    config: RotationConfig,
    verifier: IdentityVerifier<P>,
    restarter: ServiceRestarter<S>,
    cancel: CancellationToken,
}

impl<P: AddressProbe, S: ProxyService> RotationLoop<P, S> {
    /// Check that the proxy service is active and enter the running state.
    pub fn start(
        config: RotationConfig,
        service: Arc<S>,
        probe: P,
        cancel: CancellationToken,
    ) -> Result<Self, RotationError> {
        preflight::check_active(service.as_ref())?;

        Ok(Self {
            verifier: IdentityVerifier::new(probe, config.retry),
            restarter: ServiceRestarter::new(service),
            config,
            cancel,
        })
    }

    /// Rotate until cancelled.
    ///
    /// Returns a summary on orderly shutdown. With [`ExhaustedPolicy::Exit`]
    /// an exhausted verification stops the loop with an error instead.
    pub async fn run(mut self) -> Result<RotationSummary, RotationError> {
        let interval = self.config.interval();
        info!(
            interval_secs = interval.as_secs(),
            on_exhausted = %self.config.on_exhausted,
            restart_wait = %self.config.restart_wait,
            "Rotation loop started"
        );

        let mut summary = RotationSummary::default();
        let outcome = loop {
            if self.config.restart_wait == RestartWait::Await {
                self.restarter.wait_idle().await;
            }

            match self.verifier.verify().await {
                Ok(_) => summary.verified += 1,
                Err(e) => match self.config.on_exhausted {
                    ExhaustedPolicy::Exit => {
                        error!(error = %e, "Exit address verification failed; stopping");
                        break Err(RotationError::Verification(e));
                    }
                    ExhaustedPolicy::Skip => {
                        summary.skipped += 1;
                        error!(error = %e, "Exit address verification failed; skipping iteration");
                    }
                },
            }

            info!(
                interval_secs = interval.as_secs(),
                "Waiting before next identity rotation"
            );
            tokio::time::sleep(interval).await;
            if self.cancel.is_cancelled() {
                break Ok(());
            }

            self.restarter.restart_async();
            if self.cancel.is_cancelled() {
                break Ok(());
            }
        };

        if outcome.is_ok() {
            info!("Shutdown requested; stopping rotation loop");
        }

        summary.restarts_issued = self.restarter.issued();
        summary.abandoned_restarts = self.restarter.shutdown(self.config.shutdown_timeout).await;

        info!(
            verified = summary.verified,
            skipped = summary.skipped,
            restarts_issued = summary.restarts_issued,
            abandoned_restarts = summary.abandoned_restarts,
            "Rotation loop stopped"
        );
        outcome.map(|()| summary)
    }
}
