//! Word counting and content fingerprinting.
//!
//! Everything here is a pure function of the document bytes: the same input
//! always yields the same counts and the same fingerprint, independent of
//! process or machine. The fingerprint doubles as the dedup key and the
//! artifact filename.

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new("[a-z0-9]+").expect("word pattern"));

/// Word -> occurrence count mapping, strictly typed.
///
/// Backed by a `BTreeMap` so serialization and iteration order are
/// deterministic. Decoding rejects anything that is not a JSON object of
/// string keys and non-negative integer counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WordCounts(BTreeMap<String, u64>);

impl WordCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct words.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Occurrence count for a word, zero when absent.
    pub fn get(&self, word: &str) -> u64 {
        self.0.get(word).copied().unwrap_or(0)
    }

    /// Add every count from `other` into this mapping.
    pub fn merge(&mut self, other: &WordCounts) {
        for (word, &count) in &other.0 {
            *self.0.entry(word.clone()).or_insert(0) += count;
        }
    }

    /// The `n` highest-count entries, descending by count.
    ///
    /// Equal counts order lexicographically by word, so the ranking is
    /// deterministic across runs and machines.
    pub fn top_n(&self, n: usize) -> Vec<(&str, u64)> {
        let mut entries: Vec<(&str, u64)> =
            self.0.iter().map(|(word, &count)| (word.as_str(), count)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        entries.truncate(n);
        entries
    }
}

impl FromIterator<(String, u64)> for WordCounts {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Count the `[a-z0-9]+` token runs of the lowercased document bytes.
///
/// Empty or all-non-alphanumeric input yields an empty mapping.
pub fn count_words(content: &[u8]) -> WordCounts {
    let lowered = content.to_ascii_lowercase();
    let text = String::from_utf8_lossy(&lowered);
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    for token in WORD_RE.find_iter(&text) {
        *counts.entry(token.as_str().to_string()).or_insert(0) += 1;
    }
    WordCounts(counts)
}

/// Content-derived identifier of a document.
///
/// Two documents with identical lowercased byte content always produce the
/// same fingerprint and therefore the same artifact name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// SHA-256 of the ASCII-lowercased bytes, as lowercase hex.
    pub fn of(content: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content.to_ascii_lowercase());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filename of the frequency artifact for this content.
    pub fn artifact_name(&self) -> String {
        format!("{}.json", self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
