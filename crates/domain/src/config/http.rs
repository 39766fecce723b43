use serde::{Deserialize, Serialize};

/// TLS/transport presets offered for explicit opt-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TlsPreset {
    /// TLS ≥ 1.3, certificate verification on, system roots.
    #[default]
    Default,
    /// Certificate verification off. Never the default.
    Insecure,
    /// TLS 1.3 only plus a shortened connect timeout.
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsVersion {
    Tls12,
    Tls13,
}

/// Transport configuration. Two configs with equal [`fingerprint`]s share
/// one pooled transport for the lifetime of the process.
///
/// [`fingerprint`]: HttpConfig::fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default)]
    pub preset: TlsPreset,
    #[serde(default = "d_min_tls")]
    pub min_tls: TlsVersion,
    #[serde(default = "d_true")]
    pub verify_certs: bool,
    /// Total request timeout in milliseconds; 0 means no client-side
    /// deadline (rely on caller cancellation).
    #[serde(default = "d_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "d_connect_timeout")]
    pub connect_timeout_ms: u64,
    #[serde(default = "d_pool_idle")]
    pub pool_max_idle_per_host: usize,
    #[serde(default = "d_idle_timeout")]
    pub pool_idle_timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            preset: TlsPreset::Default,
            min_tls: d_min_tls(),
            verify_certs: true,
            timeout_ms: d_timeout(),
            connect_timeout_ms: d_connect_timeout(),
            pool_max_idle_per_host: d_pool_idle(),
            pool_idle_timeout_ms: d_idle_timeout(),
        }
    }
}

impl HttpConfig {
    pub fn insecure() -> Self {
        Self {
            preset: TlsPreset::Insecure,
            min_tls: TlsVersion::Tls12,
            verify_certs: false,
            ..Self::default()
        }
    }

    pub fn strict() -> Self {
        Self {
            preset: TlsPreset::Strict,
            min_tls: TlsVersion::Tls13,
            connect_timeout_ms: 5_000,
            ..Self::default()
        }
    }

    /// Canonical cache key: equal fingerprints share one transport.
    pub fn fingerprint(&self) -> String {
        format!(
            "preset={:?};min_tls={:?};verify={};timeout={};connect={};pool_idle={};idle_timeout={}",
            self.preset,
            self.min_tls,
            self.verify_certs,
            self.timeout_ms,
            self.connect_timeout_ms,
            self.pool_max_idle_per_host,
            self.pool_idle_timeout_ms,
        )
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_min_tls() -> TlsVersion {
    TlsVersion::Tls13
}
fn d_true() -> bool {
    true
}
fn d_timeout() -> u64 {
    30_000
}
fn d_connect_timeout() -> u64 {
    10_000
}
fn d_pool_idle() -> usize {
    16
}
fn d_idle_timeout() -> u64 {
    90_000
}
