//! Optional per-provider write journal.
//!
//! Every persist appends one newline-delimited JSON record carrying a
//! monotonic sequence and a content checksum. Recovery discards records
//! with mismatched checksums and reapplies the highest-sequence valid
//! record per provider.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use wh_domain::error::Result;
use wh_domain::ModelInfo;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalRecord {
    pub provider: String,
    pub models: Vec<ModelInfo>,
    pub timestamp: DateTime<Utc>,
    pub sequence: u64,
    pub checksum: String,
}

impl JournalRecord {
    pub fn new(
        provider: impl Into<String>,
        models: Vec<ModelInfo>,
        sequence: u64,
    ) -> Self {
        let provider = provider.into();
        let timestamp = Utc::now();
        let checksum = compute_checksum(&provider, &models, timestamp, sequence);
        Self {
            provider,
            models,
            timestamp,
            sequence,
            checksum,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.checksum == compute_checksum(&self.provider, &self.models, self.timestamp, self.sequence)
    }
}

fn compute_checksum(
    provider: &str,
    models: &[ModelInfo],
    timestamp: DateTime<Utc>,
    sequence: u64,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(provider.as_bytes());
    hasher.update(serde_json::to_vec(models).unwrap_or_default());
    hasher.update(timestamp.to_rfc3339().as_bytes());
    hasher.update(sequence.to_le_bytes());
    hex::encode(hasher.finalize())
}

/// The journal path for one provider, a sibling of the cache file.
pub fn journal_path(cache_path: &Path, provider: &str) -> PathBuf {
    let stem = cache_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "cache".into());
    cache_path.with_file_name(format!("{stem}.{provider}.journal"))
}

/// Append one record to the provider's journal.
pub fn append(cache_path: &Path, record: &JournalRecord) -> Result<()> {
    let path = journal_path(cache_path, &record.provider);
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)?;
    let mut line = serde_json::to_vec(record)
        .map_err(|e| wh_domain::Error::unknown(format!("failed to encode journal record: {e}")))?;
    line.push(b'\n');
    file.write_all(&line)?;
    Ok(())
}

/// Read a provider's journal, dropping invalid records, and return the
/// highest-sequence valid record, if any.
pub fn recover(cache_path: &Path, provider: &str) -> Option<JournalRecord> {
    let path = journal_path(cache_path, provider);
    let raw = std::fs::read_to_string(&path).ok()?;

    let mut best: Option<JournalRecord> = None;
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: JournalRecord = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(provider = %provider, error = %e, "dropping malformed journal line");
                continue;
            }
        };
        if !record.is_valid() {
            tracing::warn!(
                provider = %provider,
                sequence = record.sequence,
                "dropping journal record with checksum mismatch"
            );
            continue;
        }
        if best.as_ref().is_none_or(|b| record.sequence > b.sequence) {
            best = Some(record);
        }
    }
    best
}

/// The next sequence number for a provider (highest valid + 1).
pub fn next_sequence(cache_path: &Path, provider: &str) -> u64 {
    recover(cache_path, provider)
        .map(|r| r.sequence + 1)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn models(ids: &[&str]) -> Vec<ModelInfo> {
        ids.iter().map(|id| ModelInfo::new(*id, "openai")).collect()
    }

    #[test]
    fn append_then_recover_highest_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("models.json");

        append(&cache_path, &JournalRecord::new("openai", models(&["a"]), 0)).unwrap();
        append(&cache_path, &JournalRecord::new("openai", models(&["a", "b"]), 1)).unwrap();

        let recovered = recover(&cache_path, "openai").unwrap();
        assert_eq!(recovered.sequence, 1);
        assert_eq!(recovered.models.len(), 2);
        assert_eq!(next_sequence(&cache_path, "openai"), 2);
    }

    #[test]
    fn corrupted_record_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("models.json");

        append(&cache_path, &JournalRecord::new("openai", models(&["a"]), 0)).unwrap();
        let mut bad = JournalRecord::new("openai", models(&["evil"]), 1);
        bad.checksum = "0000".into();
        append(&cache_path, &bad).unwrap();

        // The tampered higher-sequence record is dropped; sequence 0 wins.
        let recovered = recover(&cache_path, "openai").unwrap();
        assert_eq!(recovered.sequence, 0);
        assert_eq!(recovered.models[0].id, "a");
    }

    #[test]
    fn journals_are_isolated_per_provider() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("models.json");

        append(&cache_path, &JournalRecord::new("openai", models(&["a"]), 0)).unwrap();
        assert!(recover(&cache_path, "anthropic").is_none());
        assert_eq!(next_sequence(&cache_path, "anthropic"), 0);
    }

    #[test]
    fn record_validates_its_own_checksum() {
        let record = JournalRecord::new("openai", models(&["a"]), 5);
        assert!(record.is_valid());
        let mut tampered = record.clone();
        tampered.models = models(&["b"]);
        assert!(!tampered.is_valid());
    }
}
