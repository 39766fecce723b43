use serde::{Deserialize, Serialize};

/// Model-discovery cache configuration.
///
/// Three tiers: in-memory (short TTL) → persistent file (long TTL) →
/// hard-coded fallback (offline last resort).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache file path; `~/` is expanded. Falls back to a safe default
    /// under the user cache directory when absent or invalid.
    #[serde(default)]
    pub path: Option<String>,
    /// Memory tier TTL. Default 24 h.
    #[serde(default = "d_memory_ttl")]
    pub memory_ttl_secs: u64,
    /// File tier TTL. Default 7 d.
    #[serde(default = "d_file_ttl")]
    pub file_ttl_secs: u64,
    /// Background refresh interval. Default 12 h.
    #[serde(default = "d_refresh")]
    pub refresh_interval_secs: u64,
    /// Expired-entry cleanup interval. Default 1 h.
    #[serde(default = "d_cleanup")]
    pub cleanup_interval_secs: u64,
    /// Never fetch from the network; serve fallback lists on full miss.
    #[serde(default)]
    pub offline: bool,
    /// Append journal records alongside every persist.
    #[serde(default)]
    pub journal: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: None,
            memory_ttl_secs: d_memory_ttl(),
            file_ttl_secs: d_file_ttl(),
            refresh_interval_secs: d_refresh(),
            cleanup_interval_secs: d_cleanup(),
            offline: false,
            journal: false,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_memory_ttl() -> u64 {
    24 * 3600
}
fn d_file_ttl() -> u64 {
    7 * 24 * 3600
}
fn d_refresh() -> u64 {
    12 * 3600
}
fn d_cleanup() -> u64 {
    3600
}
