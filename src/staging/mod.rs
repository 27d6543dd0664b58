//! Stage directories: the filesystem protocol behind the pipeline.
//!
//! Each stage is a single-writer, multi-reader mailbox. Artifacts become
//! visible by being renamed into a stage, never by being written in place,
//! so a reader listing a stage can trust every name it sees. The rename is
//! the only concurrency primitive the pipeline uses.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::debug;

/// Pipeline stages, in flow order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Raw fetch buffer for documents being written.
    Intake,
    /// Complete documents awaiting processing.
    Ready,
    /// Artifacts being written, private to the worker.
    Output,
    /// Complete artifacts, publicly visible.
    Export,
    /// Artifacts fetched by the coordinator, awaiting merge.
    Import,
    /// Artifacts already merged into the running total.
    Consumed,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Intake,
        Stage::Ready,
        Stage::Output,
        Stage::Export,
        Stage::Import,
        Stage::Consumed,
    ];

    pub fn dir_name(self) -> &'static str {
        match self {
            Stage::Intake => "intake",
            Stage::Ready => "ready",
            Stage::Output => "output",
            Stage::Export => "export",
            Stage::Import => "import",
            Stage::Consumed => "consumed",
        }
    }
}

/// The six stage directories beneath one staging root.
///
/// `output` and `export` must share a filesystem device: publication is a
/// single `rename`, so a concurrent reader of `export` never observes a
/// half-written artifact.
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    /// Open the staging tree beneath `root`, creating stage directories as
    /// needed. Fails when `output` and `export` live on different devices.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        for stage in Stage::ALL {
            let dir = root.join(stage.dir_name());
            fs::create_dir_all(&dir)
                .with_context(|| format!("creating stage directory {}", dir.display()))?;
        }
        let area = Self { root };
        area.check_same_device()?;
        Ok(area)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self, stage: Stage) -> PathBuf {
        self.root.join(stage.dir_name())
    }

    pub fn path(&self, stage: Stage, name: &str) -> PathBuf {
        self.dir(stage).join(name)
    }

    /// Names currently visible in a stage, sorted. Hidden and temp entries
    /// (leading `.`) are not part of the stage's contents.
    pub fn list(&self, stage: Stage) -> Result<Vec<String>> {
        let dir = self.dir(stage);
        let mut names = Vec::new();
        for entry in
            fs::read_dir(&dir).with_context(|| format!("listing stage {}", dir.display()))?
        {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            names.push(name.to_string());
        }
        names.sort();
        Ok(names)
    }

    pub fn contains(&self, stage: Stage, name: &str) -> bool {
        self.path(stage, name).is_file()
    }

    /// Write complete bytes under `name` in a private stage.
    pub fn write(&self, stage: Stage, name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(stage, name);
        fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))
    }

    /// Atomically relocate `name` from one stage to another.
    pub fn relocate(&self, from: Stage, to: Stage, name: &str) -> Result<()> {
        let src = self.path(from, name);
        let dst = self.path(to, name);
        fs::rename(&src, &dst)
            .with_context(|| format!("moving {} to {}", src.display(), dst.display()))?;
        debug!("{} -> {}: {}", from.dir_name(), to.dir_name(), name);
        Ok(())
    }

    /// Hidden scratch path for an in-flight transfer into `stage`.
    ///
    /// A killed transfer leaves at most this hidden file behind, which
    /// listings ignore; `promote_partial` publishes the completed transfer.
    pub fn partial_path(&self, stage: Stage, name: &str) -> PathBuf {
        self.dir(stage).join(format!(".{name}.partial"))
    }

    /// Rename a completed partial transfer to its visible name.
    pub fn promote_partial(&self, stage: Stage, name: &str) -> Result<()> {
        let partial = self.partial_path(stage, name);
        let dst = self.path(stage, name);
        fs::rename(&partial, &dst)
            .with_context(|| format!("promoting {} to {}", partial.display(), dst.display()))
    }

    /// Remove every file from every stage. Stage directories stay in place.
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for stage in Stage::ALL {
            let dir = self.dir(stage);
            for entry in
                fs::read_dir(&dir).with_context(|| format!("listing stage {}", dir.display()))?
            {
                let entry = entry?;
                if entry.file_type()?.is_file() {
                    fs::remove_file(entry.path())
                        .with_context(|| format!("removing {}", entry.path().display()))?;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    #[cfg(unix)]
    fn check_same_device(&self) -> Result<()> {
        use std::os::unix::fs::MetadataExt;

        let output = self.dir(Stage::Output);
        let export = self.dir(Stage::Export);
        let output_dev = fs::metadata(&output)?.dev();
        let export_dev = fs::metadata(&export)?.dev();
        if output_dev != export_dev {
            bail!(
                "export stage {} must be on the same filesystem device as output stage {} \
                 for atomic publication",
                export.display(),
                output.display()
            );
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn check_same_device(&self) -> Result<()> {
        Ok(())
    }
}
