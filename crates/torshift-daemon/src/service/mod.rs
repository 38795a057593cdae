//! Proxy daemon control.
//!
//! The proxy daemon is a black box with two synchronous operations: query
//! whether it is active, and restart it. [`ProxyService`] is the seam the
//! rest of the crate depends on; [`SystemdService`] drives it through
//! `systemctl`.

pub mod systemd;

pub use systemd::SystemdService;

/// Run state of the proxy daemon as reported by its service manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    Active,
    Inactive,
}

impl std::fmt::Display for DaemonState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        })
    }
}

/// Errors from a service control command.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The control command could not be executed at all.
    #[error("failed to execute `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The control command ran and reported failure.
    #[error("`{command}` failed ({status}): {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
}

/// Synchronous control surface of the proxy daemon.
///
/// Implementations are shared between the control loop and restart tasks
/// running on the blocking pool.
pub trait ProxyService: Send + Sync + 'static {
    /// Human-readable service name for logs.
    fn name(&self) -> &str;

    /// Query the current run state.
    fn state(&self) -> Result<DaemonState, ServiceError>;

    /// Restart the daemon, blocking until the service manager reports back.
    fn restart(&self) -> Result<(), ServiceError>;
}
