//! Exit identity verification.
//!
//! An [`AddressProbe`] asks a remote echo service, through the proxy, which
//! address the request appeared to come from. [`IdentityVerifier`] wraps a
//! probe in the fixed-delay retry combinator from [`retry`].

pub mod http;
pub mod retry;
pub mod verifier;

use std::future::Future;

pub use http::HttpProbe;
pub use retry::{RetryError, retry_fixed};
pub use verifier::{IdentityProbeResult, IdentityVerifier, VerifyError};

/// A single probe attempt failure.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// Connection, proxy, TLS or timeout failure.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The probe endpoint answered with a non-2xx status.
    #[error("probe endpoint returned HTTP {0}")]
    Status(u16),

    /// The body was not a JSON document.
    #[error("response body is not valid JSON: {0}")]
    Decode(String),

    /// The JSON document lacks the configured address field.
    #[error("response has no string field '{0}'")]
    MissingField(String),
}

impl ProbeError {
    /// Whether another attempt might succeed.
    ///
    /// A missing field points at a misconfigured probe, which retrying
    /// cannot fix.
    pub const fn is_transient(&self) -> bool {
        !matches!(self, Self::MissingField(_))
    }
}

/// Source of the externally-visible address.
pub trait AddressProbe {
    /// Perform one probe attempt.
    fn fetch_address(&self) -> impl Future<Output = Result<String, ProbeError>> + Send;
}
