//! The three-tier cache store.
//!
//! Memory tier (RwLock'd map, short TTL) over the persistent file tier
//! (long TTL) over hard-coded fallbacks. Persistence runs under a
//! per-provider async lock so concurrent writers for different providers
//! do not serialize against each other's journals.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use wh_domain::config::CacheConfig;
use wh_domain::error::Result;
use wh_domain::ModelInfo;

use crate::journal::{self, JournalRecord};
use crate::path::resolve_cache_path;
use crate::persist;

/// One provider's cached model list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub provider: String,
    pub models: Vec<ModelInfo>,
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(provider: impl Into<String>, models: Vec<ModelInfo>) -> Self {
        Self {
            provider: provider.into(),
            models,
            fetched_at: Utc::now(),
        }
    }

    fn age_within(&self, ttl_secs: u64) -> bool {
        let age = Utc::now().signed_duration_since(self.fetched_at);
        age < ChronoDuration::seconds(ttl_secs as i64) && age >= ChronoDuration::zero()
    }
}

/// Tiered cache storage. Fetch policy lives in
/// [`ModelDiscovery`](crate::service::ModelDiscovery); this type owns the
/// tiers, TTLs, persistence, and journaling.
pub struct ModelCache {
    config: CacheConfig,
    path: PathBuf,
    memory: RwLock<HashMap<String, CacheEntry>>,
    /// Per-provider persistence locks; the outer mutex only guards lock
    /// creation.
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ModelCache {
    pub fn new(config: CacheConfig) -> Self {
        let path = resolve_cache_path(config.path.as_deref());
        Self {
            config,
            path,
            memory: RwLock::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn lock_for(&self, provider: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .entry(provider.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    // ── Tier reads ─────────────────────────────────────────────────

    /// Memory tier: a hit is fresh within the memory TTL.
    pub fn memory_get(&self, provider: &str) -> Option<CacheEntry> {
        let memory = self.memory.read();
        let entry = memory.get(provider)?;
        entry
            .age_within(self.config.memory_ttl_secs)
            .then(|| entry.clone())
    }

    /// File tier: a hit is fresh within the (longer) file TTL. A hit also
    /// populates the memory tier.
    pub fn file_get(&self, provider: &str) -> Option<CacheEntry> {
        let file = persist::load(&self.path);
        let entry = file.providers.get(provider)?;
        if !entry.age_within(self.config.file_ttl_secs) {
            return None;
        }
        self.memory
            .write()
            .insert(provider.to_string(), entry.clone());
        Some(entry.clone())
    }

    /// File tier without the TTL check, for stale-degradation reads.
    pub fn file_get_stale(&self, provider: &str) -> Option<CacheEntry> {
        persist::load(&self.path).providers.get(provider).cloned()
    }

    // ── Writes ─────────────────────────────────────────────────────

    /// Write memory, then persist atomically (and journal when enabled).
    pub async fn set(&self, provider: &str, models: Vec<ModelInfo>) -> Result<()> {
        let entry = CacheEntry::new(provider, models);
        self.memory
            .write()
            .insert(provider.to_string(), entry.clone());

        let lock = self.lock_for(provider);
        let _guard = lock.lock().await;

        let mut file = persist::load(&self.path);
        file.providers.insert(provider.to_string(), entry.clone());
        file.updated_at = Utc::now();
        persist::store(&self.path, &file)?;

        if self.config.journal {
            let sequence = journal::next_sequence(&self.path, provider);
            journal::append(
                &self.path,
                &JournalRecord::new(provider, entry.models, sequence),
            )?;
        }
        Ok(())
    }

    /// Reapply journaled state on startup (journal mode only): for each
    /// named provider, the highest-sequence valid record wins over an older
    /// file entry.
    pub fn recover_journal(&self, providers: &[String]) {
        if !self.config.journal {
            return;
        }
        let mut memory = self.memory.write();
        for provider in providers {
            if let Some(record) = journal::recover(&self.path, provider) {
                let newer = memory
                    .get(provider.as_str())
                    .map(|e| record.timestamp > e.fetched_at)
                    .unwrap_or(true);
                if newer {
                    memory.insert(
                        provider.clone(),
                        CacheEntry {
                            provider: provider.clone(),
                            models: record.models,
                            fetched_at: record.timestamp,
                        },
                    );
                }
            }
        }
    }

    // ── Maintenance ────────────────────────────────────────────────

    /// Evict expired memory entries; returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let mut memory = self.memory.write();
        let before = memory.len();
        memory.retain(|_, entry| entry.age_within(self.config.memory_ttl_secs));
        before - memory.len()
    }

    /// Drop every memory entry.
    pub fn clear(&self) {
        self.memory.write().clear();
    }
}
