//! Aggregation: fold imported artifacts into the durable running total.
//!
//! The master owns the running total; nothing else writes it. An artifact
//! moves to `consumed` only after the updated total is durably on disk, so a
//! crash in between re-merges that one artifact on the next run. That is
//! deliberate at-least-once behavior: a bounded over-count on crash, traded
//! against transactional machinery this pipeline does not need.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::freq::WordCounts;
use crate::staging::{Stage, StagingArea};
use crate::subprocess::{RemoteChannel, SubprocessManager};
use crate::sync::{RemoteWorker, WorkerHandle};

pub struct Master {
    staging: StagingArea,
    total_path: PathBuf,
    workers: Vec<RemoteWorker>,
}

impl Master {
    pub fn new(config: &Config, addresses: &[String]) -> Result<Self> {
        let channel: Arc<dyn RemoteChannel> = Arc::new(SubprocessManager::production().shell());
        Self::with_channel(config, addresses, channel)
    }

    pub fn with_channel(
        config: &Config,
        addresses: &[String],
        channel: Arc<dyn RemoteChannel>,
    ) -> Result<Self> {
        let staging = StagingArea::open(&config.staging_root)?;
        let workers = addresses
            .iter()
            .map(|address| {
                RemoteWorker::new(
                    WorkerHandle::parse(address),
                    staging.clone(),
                    Arc::clone(&channel),
                )
            })
            .collect();
        Ok(Self {
            staging,
            total_path: config.total_path.clone(),
            workers,
        })
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    /// One synchronization cycle over every worker. Returns the number of
    /// artifacts fetched. An unreachable worker is logged and skipped.
    pub async fn synch_all(&self) -> Result<usize> {
        let mut fetched = 0;
        for worker in &self.workers {
            match worker.fetch_new().await {
                Ok(count) => fetched += count,
                Err(err) => {
                    warn!("synchronization with {} failed: {:#}", worker.handle(), err)
                }
            }
        }
        Ok(fetched)
    }

    /// Merge every imported artifact into the running total, then mark it
    /// consumed. Returns the number merged.
    ///
    /// A malformed or unreadable artifact merges as empty rather than
    /// aborting the run.
    pub fn merge_all(&self) -> Result<usize> {
        let mut merged = 0;
        for name in self.staging.list(Stage::Import)? {
            let counts = read_counts(&self.staging.path(Stage::Import, &name));
            let mut total = read_counts(&self.total_path);
            total.merge(&counts);
            write_counts(&self.total_path, &total)?;
            self.staging.relocate(Stage::Import, Stage::Consumed, &name)?;
            debug!("merged {} words from {}", counts.len(), name);
            merged += 1;
        }
        if merged > 0 {
            info!("merged {} artifacts into {}", merged, self.total_path.display());
        }
        Ok(merged)
    }

    /// The `n` highest-count words as `word: count` lines, descending by
    /// count, ties in word order.
    pub fn report(&self, n: usize) -> Vec<String> {
        read_counts(&self.total_path)
            .top_n(n)
            .into_iter()
            .map(|(word, count)| format!("{word}: {count}"))
            .collect()
    }
}

/// Read a frequency mapping; a missing or malformed file reads as empty.
fn read_counts(path: &Path) -> WordCounts {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!("unreadable frequency file {}: {}", path.display(), err);
            }
            return WordCounts::new();
        }
    };
    match serde_json::from_str(&raw) {
        Ok(counts) => counts,
        Err(err) => {
            warn!("malformed frequency file {}: {}", path.display(), err);
            WordCounts::new()
        }
    }
}

/// Write the mapping through a temp file and rename, so a reader never sees
/// a torn total.
fn write_counts(path: &Path, counts: &WordCounts) -> Result<()> {
    let json = serde_json::to_string_pretty(counts).context("serializing running total")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn master_in(root: &Path, addresses: &[String]) -> Master {
        Master::new(&Config::new(root.to_path_buf(), 0, None), addresses).unwrap()
    }

    #[test]
    fn merge_is_additive_across_artifacts() {
        let tmp = TempDir::new().unwrap();
        let master = master_in(tmp.path(), &[]);
        master.staging().write(Stage::Import, "one.json", br#"{"a":1,"b":2}"#).unwrap();
        master.staging().write(Stage::Import, "two.json", br#"{"a":3,"c":1}"#).unwrap();

        assert_eq!(master.merge_all().unwrap(), 2);

        let total = read_counts(&tmp.path().join("total.json"));
        assert_eq!(total.get("a"), 4);
        assert_eq!(total.get("b"), 2);
        assert_eq!(total.get("c"), 1);
        assert_eq!(master.staging().list(Stage::Consumed).unwrap().len(), 2);
        assert!(master.staging().list(Stage::Import).unwrap().is_empty());
    }

    #[test]
    fn merge_with_empty_import_changes_nothing() {
        let tmp = TempDir::new().unwrap();
        let master = master_in(tmp.path(), &[]);
        master.staging().write(Stage::Import, "one.json", br#"{"a":1}"#).unwrap();
        master.merge_all().unwrap();
        let before = fs::read_to_string(tmp.path().join("total.json")).unwrap();

        assert_eq!(master.merge_all().unwrap(), 0);
        let after = fs::read_to_string(tmp.path().join("total.json")).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn malformed_artifacts_merge_as_empty() {
        let tmp = TempDir::new().unwrap();
        let master = master_in(tmp.path(), &[]);
        master.staging().write(Stage::Import, "good.json", br#"{"a":1}"#).unwrap();
        master.staging().write(Stage::Import, "bad.json", b"not json at all").unwrap();

        assert_eq!(master.merge_all().unwrap(), 2);

        let total = read_counts(&tmp.path().join("total.json"));
        assert_eq!(total.get("a"), 1);
        assert_eq!(total.len(), 1);
        // the malformed artifact is still marked consumed so it is not retried forever
        assert_eq!(master.staging().list(Stage::Consumed).unwrap().len(), 2);
    }

    #[test]
    fn report_ranks_by_count_descending() {
        let tmp = TempDir::new().unwrap();
        let master = master_in(tmp.path(), &[]);
        fs::write(
            tmp.path().join("total.json"),
            br#"{"the":56510,"and":37915,"to":27984}"#,
        )
        .unwrap();

        assert_eq!(master.report(2), vec!["the: 56510", "and: 37915"]);
    }

    #[test]
    fn report_on_missing_total_is_empty() {
        let tmp = TempDir::new().unwrap();
        let master = master_in(tmp.path(), &[]);
        assert!(master.report(10).is_empty());
    }
}
