//! Startup gate: the proxy daemon must already be running.
//!
//! This is a startup invariant, not a transient condition, so nothing here
//! retries.

use tracing::{error, info};

use crate::service::{DaemonState, ProxyService, ServiceError};

/// Reasons the rotation loop may not start.
#[derive(Debug, thiserror::Error)]
pub enum PreflightError {
    #[error("proxy service '{service}' is not running; start it before running torshift")]
    Inactive { service: String },

    #[error("could not query proxy service state: {0}")]
    Query(#[from] ServiceError),
}

/// Confirm the proxy daemon is active.
pub fn check_active<S: ProxyService + ?Sized>(service: &S) -> Result<DaemonState, PreflightError> {
    match service.state()? {
        DaemonState::Active => {
            info!(service = service.name(), "Proxy service is active");
            Ok(DaemonState::Active)
        }
        DaemonState::Inactive => {
            error!(service = service.name(), "Proxy service is NOT running");
            Err(PreflightError::Inactive {
                service: service.name().to_string(),
            })
        }
    }
}
