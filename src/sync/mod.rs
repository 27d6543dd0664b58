//! Worker synchronization: the coordinator's view of one worker.
//!
//! A synchronization cycle lists a worker's export stage and transfers the
//! artifacts the coordinator has not yet consumed. Repeating a cycle is
//! always safe: artifact names are fingerprint-derived, a fetched-but-unmerged
//! artifact is simply overwritten with identical bytes, and anything already
//! in `consumed` is skipped.

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{debug, warn};

use crate::staging::{Stage, StagingArea};
use crate::subprocess::RemoteChannel;

/// Where a worker's staging tree lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerHandle {
    /// Staging root on this machine.
    Local(PathBuf),
    /// `[user@]host:path` address reachable over ssh.
    Remote { host: String, path: String },
}

impl WorkerHandle {
    /// `user@host:path` and `host:path` parse as remote; everything else is
    /// a local staging root. A colon after a slash belongs to the path, not
    /// a host.
    pub fn parse(address: &str) -> Self {
        match address.split_once(':') {
            Some((host, path)) if !host.is_empty() && !host.contains('/') => WorkerHandle::Remote {
                host: host.to_string(),
                path: path.to_string(),
            },
            _ => WorkerHandle::Local(PathBuf::from(address)),
        }
    }
}

impl fmt::Display for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerHandle::Local(path) => write!(f, "{}", path.display()),
            WorkerHandle::Remote { host, path } => write!(f, "{host}:{path}"),
        }
    }
}

/// One worker as seen by the coordinator.
pub struct RemoteWorker {
    handle: WorkerHandle,
    staging: StagingArea,
    channel: Arc<dyn RemoteChannel>,
}

impl RemoteWorker {
    /// `staging` is the coordinator's local staging tree, the destination of
    /// every fetch.
    pub fn new(handle: WorkerHandle, staging: StagingArea, channel: Arc<dyn RemoteChannel>) -> Self {
        Self {
            handle,
            staging,
            channel,
        }
    }

    pub fn handle(&self) -> &WorkerHandle {
        &self.handle
    }

    /// Artifact names currently visible in the worker's export stage, sorted.
    pub async fn list_export(&self) -> Result<Vec<String>> {
        match &self.handle {
            WorkerHandle::Local(root) => StagingArea::open(root)?.list(Stage::Export),
            WorkerHandle::Remote { host, path } => {
                let stdout = self
                    .channel
                    .exec(host, &format!("ls -1 {path}/export"))
                    .await
                    .with_context(|| format!("listing export of {}", self.handle))?;
                let mut names: Vec<String> = stdout
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty() && !line.starts_with('.'))
                    .map(str::to_string)
                    .collect();
                names.sort();
                Ok(names)
            }
        }
    }

    /// Transfer every not-yet-consumed artifact into the coordinator's
    /// import stage. Returns the number fetched.
    ///
    /// A failed transfer is logged and skipped, not retried here: the
    /// artifact stays in the worker's export until it is observed in
    /// `consumed`, so the next cycle picks it up again.
    pub async fn fetch_new(&self) -> Result<usize> {
        let mut fetched = 0;
        for name in self.list_export().await? {
            if self.staging.contains(Stage::Consumed, &name) {
                debug!("{} already consumed, skipping", name);
                continue;
            }
            match self.fetch_one(&name).await {
                Ok(()) => fetched += 1,
                Err(err) => warn!("fetch of {} from {} failed: {:#}", name, self.handle, err),
            }
        }
        Ok(fetched)
    }

    async fn fetch_one(&self, name: &str) -> Result<()> {
        let partial = self.staging.partial_path(Stage::Import, name);
        match &self.handle {
            WorkerHandle::Local(root) => {
                let src = StagingArea::open(root)?.path(Stage::Export, name);
                fs::copy(&src, &partial)
                    .with_context(|| format!("copying {}", src.display()))?;
            }
            WorkerHandle::Remote { host, path } => {
                self.channel
                    .copy_from(host, &format!("{path}/export/{name}"), &partial)
                    .await
                    .with_context(|| format!("transferring {name} from {}", self.handle))?;
            }
        }
        self.staging.promote_partial(Stage::Import, name)?;
        debug!("imported {} from {}", name, self.handle);
        Ok(())
    }

    /// Run a pipeline operation (`get <uri>`, `worker`, `clean`) on the
    /// worker and surface its output uninterpreted.
    pub async fn remote_invoke(&self, operation: &str) -> Result<String> {
        match &self.handle {
            WorkerHandle::Local(_) => {
                bail!("remote invocation needs a remote worker, {} is local", self.handle)
            }
            WorkerHandle::Remote { host, path } => self
                .channel
                .exec(host, &format!("wordmill --staging-root {path} {operation}"))
                .await
                .with_context(|| format!("invoking `{operation}` on {}", self.handle)),
        }
    }
}
