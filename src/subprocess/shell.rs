//! Secure-shell channel to remote workers.
//!
//! Remote operations are plain `ssh` and `scp` invocations through the
//! [`ProcessRunner`] abstraction, so the whole remote protocol is testable
//! against [`super::MockProcessRunner`].

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use super::builder::ProcessCommandBuilder;
use super::error::ProcessError;
use super::runner::{ExitStatus, ProcessRunner};

/// Remote execution channel: run a command on a host, copy a file back.
///
/// Transfers must preserve byte-exact content.
#[async_trait]
pub trait RemoteChannel: Send + Sync {
    /// Execute `command` on `host`; returns captured stdout.
    async fn exec(&self, host: &str, command: &str) -> Result<String, ProcessError>;

    /// Copy `remote_path` on `host` into `local_path`.
    async fn copy_from(
        &self,
        host: &str,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<(), ProcessError>;
}

pub struct SshChannel {
    runner: Arc<dyn ProcessRunner>,
}

impl SshChannel {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }
}

fn check_command_success(status: &ExitStatus) -> Result<(), ProcessError> {
    if status.success() {
        Ok(())
    } else {
        Err(ProcessError::ExitCode(status.code().unwrap_or(1)))
    }
}

#[async_trait]
impl RemoteChannel for SshChannel {
    async fn exec(&self, host: &str, command: &str) -> Result<String, ProcessError> {
        let output = self
            .runner
            .run(
                ProcessCommandBuilder::new("ssh")
                    .args(["-o", "BatchMode=yes"])
                    .arg(host)
                    .arg(command)
                    .build(),
            )
            .await?;

        check_command_success(&output.status)?;

        Ok(output.stdout)
    }

    async fn copy_from(
        &self,
        host: &str,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<(), ProcessError> {
        let output = self
            .runner
            .run(
                ProcessCommandBuilder::new("scp")
                    .args(["-o", "BatchMode=yes", "-q"])
                    .arg(&format!("{host}:{remote_path}"))
                    .arg(local_path.to_string_lossy().as_ref())
                    .build(),
            )
            .await?;

        check_command_success(&output.status)
    }
}
