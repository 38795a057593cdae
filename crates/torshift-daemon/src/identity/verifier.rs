use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

use torshift_core::RetryPolicy;

use super::retry::{RetryError, retry_fixed};
use super::{AddressProbe, ProbeError};

/// Verification failure after the retry budget is spent.
pub type VerifyError = RetryError<ProbeError>;

/// Outcome of one successful verification. Only logged, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityProbeResult {
    pub address: String,
    pub observed_at: SystemTime,
}

impl IdentityProbeResult {
    /// Observation time as seconds since the Unix epoch.
    pub fn observed_at_unix(&self) -> u64 {
        self.observed_at
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs())
    }
}

/// Bounded-retry lookup of the current exit address.
#[derive(Debug)]
pub struct IdentityVerifier<P> {
    probe: P,
    policy: RetryPolicy,
}

impl<P: AddressProbe> IdentityVerifier<P> {
    pub const fn new(probe: P, policy: RetryPolicy) -> Self {
        Self { probe, policy }
    }

    pub const fn probe(&self) -> &P {
        &self.probe
    }

    /// Probe the exit address, retrying transient failures with a fixed delay.
    pub async fn verify(&self) -> Result<IdentityProbeResult, VerifyError> {
        let probe = &self.probe;
        let address = retry_fixed(&self.policy, ProbeError::is_transient, |attempt| {
            debug!(attempt, "Probing exit address");
            probe.fetch_address()
        })
        .await?;

        let result = IdentityProbeResult {
            address,
            observed_at: SystemTime::now(),
        };
        info!(
            address = %result.address,
            observed_at = result.observed_at_unix(),
            "Current exit address"
        );
        Ok(result)
    }
}
