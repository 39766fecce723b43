use serde::{Deserialize, Serialize};

use super::env::EnvDefaults;

/// Retry policy shared by the transport retry client and the application
/// retry middleware. Delay is `initial × multiplier^attempt`, capped at
/// `max`, with optional ±20% jitter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// 0 means pass-through: the first response (including error statuses)
    /// is returned without retry.
    #[serde(default = "d_retries")]
    pub max_retries: u32,
    #[serde(default = "d_initial_delay")]
    pub initial_delay_ms: u64,
    #[serde(default = "d_max_delay")]
    pub max_delay_ms: u64,
    #[serde(default = "d_multiplier")]
    pub multiplier: f64,
    #[serde(default = "d_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: d_retries(),
            initial_delay_ms: d_initial_delay(),
            max_delay_ms: d_max_delay(),
            multiplier: d_multiplier(),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Defaults with the `WORMHOLE_*` environment overrides applied.
    pub fn from_env_defaults(env: &EnvDefaults) -> Self {
        Self {
            max_retries: env.max_retries,
            initial_delay_ms: env.initial_retry_delay.as_millis() as u64,
            max_delay_ms: env.max_retry_delay.as_millis() as u64,
            ..Self::default()
        }
    }
}

/// Circuit breaker: consecutive failures trip the circuit open; after the
/// cool-off a single half-open probe is admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerConfig {
    #[serde(default = "d_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "d_cooloff")]
    pub cooloff_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: d_threshold(),
            cooloff_ms: d_cooloff(),
        }
    }
}

impl BreakerConfig {
    pub fn from_env_defaults(env: &EnvDefaults) -> Self {
        Self {
            cooloff_ms: env.circuit_breaker_timeout.as_millis() as u64,
            ..Self::default()
        }
    }
}

/// Token bucket per provider; requests block until a token is available or
/// the caller cancels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Bucket capacity (burst size).
    #[serde(default = "d_capacity")]
    pub capacity: u32,
    /// Tokens added per second.
    #[serde(default = "d_refill")]
    pub refill_per_sec: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: d_capacity(),
            refill_per_sec: d_refill(),
        }
    }
}

/// Endpoint-selection policy for the load balancer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BalancePolicy {
    #[default]
    RoundRobin,
    Random,
    /// Observed latency and success rate.
    Adaptive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalancerConfig {
    #[serde(default)]
    pub policy: BalancePolicy,
    /// Consecutive failures before an endpoint is excluded.
    #[serde(default = "d_threshold")]
    pub failure_threshold: u32,
    /// How long an excluded endpoint waits before one trial request.
    #[serde(default = "d_probe")]
    pub probe_interval_ms: u64,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            policy: BalancePolicy::RoundRobin,
            failure_threshold: d_threshold(),
            probe_interval_ms: d_probe(),
        }
    }
}

impl BalancerConfig {
    pub fn from_env_defaults(env: &EnvDefaults) -> Self {
        Self {
            probe_interval_ms: env.health_check_interval.as_millis() as u64,
            ..Self::default()
        }
    }
}

/// The full middleware stack configuration assembled by the façade.
/// Omitted sections disable the corresponding middleware; metrics are on
/// unless disabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    #[serde(default)]
    pub breaker: Option<BreakerConfig>,
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
    /// Provider names tried, in order, after the primary fails retryably.
    #[serde(default)]
    pub fallbacks: Vec<String>,
    #[serde(default)]
    pub balancer: Option<BalancerConfig>,
    #[serde(default = "d_true")]
    pub metrics: bool,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            retry: None,
            breaker: None,
            rate_limit: None,
            fallbacks: Vec::new(),
            balancer: None,
            metrics: true,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_retries() -> u32 {
    3
}
fn d_initial_delay() -> u64 {
    500
}
fn d_max_delay() -> u64 {
    30_000
}
fn d_multiplier() -> f64 {
    2.0
}
fn d_true() -> bool {
    true
}
fn d_threshold() -> u32 {
    5
}
fn d_cooloff() -> u64 {
    30_000
}
fn d_capacity() -> u32 {
    10
}
fn d_refill() -> f64 {
    5.0
}
fn d_probe() -> u64 {
    30_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn retry_config_defaults() {
        let cfg = RetryConfig::default();
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.initial_delay_ms, 500);
        assert!(cfg.jitter);
    }

    #[test]
    fn retry_config_honors_env_defaults() {
        let env = EnvDefaults {
            max_retries: 9,
            initial_retry_delay: Duration::from_millis(10),
            max_retry_delay: Duration::from_secs(5),
            ..EnvDefaults::default()
        };
        let cfg = RetryConfig::from_env_defaults(&env);
        assert_eq!(cfg.max_retries, 9);
        assert_eq!(cfg.initial_delay_ms, 10);
        assert_eq!(cfg.max_delay_ms, 5_000);
    }

    #[test]
    fn resilience_config_sections_default_off() {
        let cfg: ResilienceConfig = serde_json::from_str("{}").unwrap();
        assert!(cfg.retry.is_none());
        assert!(cfg.breaker.is_none());
        assert!(cfg.fallbacks.is_empty());
        assert!(cfg.metrics);
    }

    #[test]
    fn balance_policy_serde() {
        let policy: BalancePolicy = serde_json::from_str("\"adaptive\"").unwrap();
        assert_eq!(policy, BalancePolicy::Adaptive);
    }
}
