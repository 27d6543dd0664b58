//! Runtime configuration, one explicit value per process.
//!
//! No global mutable state: every component receives the configuration it
//! needs at construction. The recognized options are the staging root, the
//! verbosity level, and the running-total path.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the six stage directories.
    pub staging_root: PathBuf,
    /// Count of `-v` flags; drives the log filter.
    pub verbosity: u8,
    /// Where the running total lives.
    pub total_path: PathBuf,
}

impl Config {
    /// When no total path is given, the total lives beside the stages as
    /// `<staging_root>/total.json`.
    pub fn new(staging_root: PathBuf, verbosity: u8, total_path: Option<PathBuf>) -> Self {
        let total_path = total_path.unwrap_or_else(|| staging_root.join("total.json"));
        Self {
            staging_root,
            verbosity,
            total_path,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(PathBuf::from("data"), 0, None)
    }
}
