use std::process::Command;

use tracing::debug;

use super::{DaemonState, ProxyService, ServiceError};

/// Proxy daemon managed as a systemd unit.
#[derive(Debug, Clone)]
pub struct SystemdService {
    unit: String,
    program: String,
}

impl SystemdService {
    pub fn new(unit: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            program: "systemctl".to_string(),
        }
    }

    /// Use a different control program with `systemctl`-compatible arguments.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    fn command_line(&self, args: &[&str]) -> String {
        format!("{} {}", self.program, args.join(" "))
    }
}

impl ProxyService for SystemdService {
    fn name(&self) -> &str {
        &self.unit
    }

    fn state(&self) -> Result<DaemonState, ServiceError> {
        let args = ["is-active", "--quiet", self.unit.as_str()];
        let cmd_line = self.command_line(&args);
        debug!("exec: {cmd_line}");

        let status = Command::new(&self.program)
            .args(args)
            .status()
            .map_err(|source| ServiceError::Spawn {
                command: cmd_line,
                source,
            })?;

        Ok(if status.success() {
            DaemonState::Active
        } else {
            DaemonState::Inactive
        })
    }

    fn restart(&self) -> Result<(), ServiceError> {
        let args = ["restart", self.unit.as_str()];
        let cmd_line = self.command_line(&args);
        debug!("exec: {cmd_line}");

        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|source| ServiceError::Spawn {
                command: cmd_line.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ServiceError::Failed {
                command: cmd_line,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}
