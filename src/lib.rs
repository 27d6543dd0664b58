//! # Wordmill
//!
//! Distributed word-frequency pipeline. Workers turn documents into
//! content-addressed frequency artifacts through staged directories; a
//! master synchronizes worker exports and folds them into a durable running
//! total. Correctness under concurrent, partial, and repeated execution
//! comes from the filesystem protocol: write-then-rename visibility,
//! fingerprint-named artifacts, and a consumed stage that makes merging
//! idempotent.
//!
//! ## Modules
//!
//! - `config` - explicit runtime configuration passed into each component
//! - `freq` - word counting and content fingerprinting
//! - `staging` - stage directories and the atomic-rename protocol
//! - `source` - document acquisition (http(s) URLs or local files)
//! - `subprocess` - subprocess abstraction and the ssh/scp remote channel
//! - `worker` - the staging pipeline from document to exported artifact
//! - `sync` - the coordinator's synchronization proxy for one worker
//! - `master` - aggregation into the running total, and reporting

pub mod config;
pub mod freq;
pub mod master;
pub mod source;
pub mod staging;
pub mod subprocess;
pub mod sync;
pub mod worker;
