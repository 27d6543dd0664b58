//! The staging pipeline: turn ready documents into exported artifacts.
//!
//! At most one worker process may run a processing pass over a given staging
//! tree at a time. That is an operational precondition, not something this
//! module enforces with locks; the filesystem protocol in [`crate::staging`]
//! covers everything else.

use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::freq::{count_words, Fingerprint};
use crate::source::{document_name, DocumentSource, FetchSource};
use crate::staging::{Stage, StagingArea};

pub struct Worker {
    staging: StagingArea,
    source: Arc<dyn DocumentSource>,
}

impl Worker {
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_source(config, Arc::new(FetchSource::new()))
    }

    pub fn with_source(config: &Config, source: Arc<dyn DocumentSource>) -> Result<Self> {
        Ok(Self {
            staging: StagingArea::open(&config.staging_root)?,
            source,
        })
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    /// Fetch a document and make it visible to the processing pass.
    ///
    /// The bytes land in `intake` first; only a complete document is renamed
    /// into `ready`, so a concurrent pass never reads a half-written input.
    pub async fn ingest(&self, uri: &str) -> Result<String> {
        let bytes = self
            .source
            .fetch(uri)
            .await
            .with_context(|| format!("ingesting {uri}"))?;
        let name = document_name(uri);
        self.staging.write(Stage::Intake, &name, &bytes)?;
        self.staging.relocate(Stage::Intake, Stage::Ready, &name)?;
        info!("ingested {} ({} bytes) as {}", uri, bytes.len(), name);
        Ok(name)
    }

    /// One processing pass over `ready`.
    ///
    /// Returns the number of artifacts newly published to `export`. A
    /// document that cannot be processed stays in `ready` for a later retry;
    /// the rest of the batch continues.
    pub fn process_ready(&self) -> Result<usize> {
        let mut published = 0;
        for name in self.staging.list(Stage::Ready)? {
            match self.process_one(&name) {
                Ok(true) => published += 1,
                Ok(false) => {}
                Err(err) => warn!("document {} left in ready: {:#}", name, err),
            }
        }
        Ok(published)
    }

    fn process_one(&self, name: &str) -> Result<bool> {
        let document = self.staging.path(Stage::Ready, name);
        let bytes =
            fs::read(&document).with_context(|| format!("reading {}", document.display()))?;

        let fingerprint = Fingerprint::of(&bytes);
        let artifact = fingerprint.artifact_name();
        if self.staging.contains(Stage::Export, &artifact) {
            debug!("content of {} already exported as {}, discarding", name, artifact);
            fs::remove_file(&document)
                .with_context(|| format!("discarding {}", document.display()))?;
            return Ok(false);
        }

        let counts = count_words(&bytes);
        let json = serde_json::to_string(&counts)
            .with_context(|| format!("serializing frequencies of {name}"))?;
        self.staging.write(Stage::Output, &artifact, json.as_bytes())?;
        self.staging.relocate(Stage::Output, Stage::Export, &artifact)?;
        fs::remove_file(&document)
            .with_context(|| format!("consuming {}", document.display()))?;

        debug!("published {} ({} distinct words) from {}", artifact, counts.len(), name);
        Ok(true)
    }

    /// Reset the staging tree: drop all documents and artifacts.
    pub fn clean(&self) -> Result<usize> {
        let removed = self.staging.clear()?;
        info!("cleaned {} files from {}", removed, self.staging.root().display());
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::freq::WordCounts;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn worker_in(root: PathBuf) -> Worker {
        Worker::new(&Config::new(root, 0, None)).unwrap()
    }

    fn write_document(tmp: &TempDir, name: &str, content: &str) -> String {
        let path = tmp.path().join(name);
        fs::write(&path, content).unwrap();
        path.to_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn ingest_lands_in_ready() {
        let tmp = TempDir::new().unwrap();
        let uri = write_document(&tmp, "pledge.txt", "The pledge of allegiance to the flag.");
        let worker = worker_in(tmp.path().join("data"));

        let name = worker.ingest(&uri).await.unwrap();
        assert_eq!(name, "pledge.txt");
        assert!(worker.staging().list(Stage::Intake).unwrap().is_empty());
        assert_eq!(worker.staging().list(Stage::Ready).unwrap(), vec!["pledge.txt"]);
    }

    #[tokio::test]
    async fn ingest_failure_leaves_no_trace() {
        let tmp = TempDir::new().unwrap();
        let worker = worker_in(tmp.path().join("data"));

        assert!(worker.ingest("no/such/document.txt").await.is_err());
        assert!(worker.staging().list(Stage::Intake).unwrap().is_empty());
        assert!(worker.staging().list(Stage::Ready).unwrap().is_empty());
    }

    #[tokio::test]
    async fn process_ready_publishes_an_artifact() {
        let tmp = TempDir::new().unwrap();
        let uri = write_document(&tmp, "pledge.txt", "The pledge of allegiance to the flag.");
        let worker = worker_in(tmp.path().join("data"));

        worker.ingest(&uri).await.unwrap();
        assert_eq!(worker.process_ready().unwrap(), 1);

        let exported = worker.staging().list(Stage::Export).unwrap();
        assert_eq!(exported.len(), 1);
        assert!(worker.staging().list(Stage::Ready).unwrap().is_empty());

        let raw = fs::read_to_string(worker.staging().path(Stage::Export, &exported[0])).unwrap();
        let counts: WordCounts = serde_json::from_str(&raw).unwrap();
        assert_eq!(counts.get("the"), 2);
        assert_eq!(counts.get("pledge"), 1);
    }

    #[tokio::test]
    async fn duplicate_content_is_discarded_not_rewritten() {
        let tmp = TempDir::new().unwrap();
        let first = write_document(&tmp, "a.txt", "same words here");
        let second = write_document(&tmp, "b.txt", "SAME WORDS HERE");
        let worker = worker_in(tmp.path().join("data"));

        worker.ingest(&first).await.unwrap();
        assert_eq!(worker.process_ready().unwrap(), 1);

        worker.ingest(&second).await.unwrap();
        assert_eq!(worker.process_ready().unwrap(), 0);

        assert_eq!(worker.staging().list(Stage::Export).unwrap().len(), 1);
        assert!(worker.staging().list(Stage::Ready).unwrap().is_empty());
    }

    #[tokio::test]
    async fn clean_resets_the_tree() {
        let tmp = TempDir::new().unwrap();
        let uri = write_document(&tmp, "a.txt", "words");
        let worker = worker_in(tmp.path().join("data"));

        worker.ingest(&uri).await.unwrap();
        worker.process_ready().unwrap();
        assert!(worker.clean().unwrap() > 0);
        assert!(worker.staging().list(Stage::Export).unwrap().is_empty());
    }
}
