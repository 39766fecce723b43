//! Cached HTTP transports.
//!
//! Building a `reqwest::Client` sets up a fresh connection pool and TLS
//! session cache, so clients are shared process-wide, keyed by the
//! canonical fingerprint of their [`HttpConfig`]. A second request with an
//! equal fingerprint reuses the existing transport. HTTP/2 is negotiated
//! via ALPN by default.

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use parking_lot::RwLock;

use wh_domain::config::{HttpConfig, TlsVersion};
use wh_domain::error::{Error, Result};

fn transports() -> &'static RwLock<HashMap<String, reqwest::Client>> {
    static CACHE: OnceLock<RwLock<HashMap<String, reqwest::Client>>> = OnceLock::new();
    CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Get (or build and cache) the transport for `config`.
pub fn client_for(config: &HttpConfig) -> Result<reqwest::Client> {
    let key = config.fingerprint();

    if let Some(client) = transports().read().get(&key) {
        return Ok(client.clone());
    }

    let mut cache = transports().write();
    // Another task may have built it while we waited for the write lock.
    if let Some(client) = cache.get(&key) {
        return Ok(client.clone());
    }

    let client = build_client(config)?;
    cache.insert(key, client.clone());
    Ok(client)
}

fn build_client(config: &HttpConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .use_rustls_tls()
        .min_tls_version(match config.min_tls {
            TlsVersion::Tls12 => reqwest::tls::Version::TLS_1_2,
            TlsVersion::Tls13 => reqwest::tls::Version::TLS_1_3,
        })
        .danger_accept_invalid_certs(!config.verify_certs)
        .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .pool_idle_timeout(Duration::from_millis(config.pool_idle_timeout_ms));

    // timeout 0 means "no client-side deadline": rely on caller cancellation.
    if config.timeout_ms > 0 {
        builder = builder.timeout(Duration::from_millis(config.timeout_ms));
    }

    builder
        .build()
        .map_err(|e| Error::network(format!("failed to build HTTP transport: {e}")).with_cause(e))
}
