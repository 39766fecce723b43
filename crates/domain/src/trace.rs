use serde::Serialize;

/// Structured trace events emitted across all wormhole crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    ProviderRequest {
        provider: String,
        model: String,
        operation: String,
        streaming: bool,
        duration_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
    RetryAttempt {
        provider: String,
        attempt: u32,
        delay_ms: u64,
        code: String,
    },
    Failover {
        from_provider: String,
        to_provider: String,
        reason: String,
    },
    CircuitStateChanged {
        provider: String,
        from: String,
        to: String,
    },
    RateLimited {
        provider: String,
        waited_ms: u64,
    },
    CacheRefresh {
        provider: String,
        models: usize,
        background: bool,
    },
    CacheFallback {
        provider: String,
        tier: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "wh_event");
    }
}
