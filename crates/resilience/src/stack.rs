//! Middleware stack assembly.
//!
//! Ordering contract (outermost first): rate-limit → circuit breaker →
//! failover → load balancer → retry → metrics → adapter. Rate limiting
//! blocks before any work is spent; metrics sit innermost so every
//! underlying attempt (including failover hops and retries) is observed.

use std::sync::Arc;

use wh_domain::config::ResilienceConfig;
use wh_providers::Provider;

use crate::balancer::BalancedProvider;
use crate::breaker::CircuitBreakerProvider;
use crate::failover::FailoverProvider;
use crate::metrics::{MetricsProvider, MetricsRegistry};
use crate::ratelimit::RateLimitedProvider;
use crate::retry::RetryProvider;

/// Wrap one adapter in the inner (per-attempt) layers: metrics, then retry,
/// then an optional balancer pool around equivalent endpoints.
fn inner_stack(
    adapter: Arc<dyn Provider>,
    config: &ResilienceConfig,
    metrics: &Option<Arc<MetricsRegistry>>,
) -> Arc<dyn Provider> {
    let mut provider = adapter;
    if let Some(registry) = metrics {
        provider = Arc::new(MetricsProvider::new(provider, registry.clone()));
    }
    if let Some(retry) = config.retry {
        provider = Arc::new(RetryProvider::new(provider, retry));
    }
    provider
}

/// Compose the full stack for one primary provider.
///
/// `fallbacks` are the already-resolved fallback adapters, in configured
/// order; `pool` optionally replaces the primary with a balanced endpoint
/// pool. The metrics registry is shared by every layer that records.
pub fn compose(
    primary: Arc<dyn Provider>,
    fallbacks: Vec<Arc<dyn Provider>>,
    pool: Option<Vec<Arc<dyn Provider>>>,
    config: &ResilienceConfig,
    metrics: Option<Arc<MetricsRegistry>>,
) -> Arc<dyn Provider> {
    let name = primary.name().to_string();

    // Innermost layers are applied per endpoint, so every attempt against
    // every endpoint is retried and measured independently.
    let mut provider: Arc<dyn Provider> = match pool {
        Some(endpoints) if !endpoints.is_empty() => {
            let wrapped = endpoints
                .into_iter()
                .map(|e| inner_stack(e, config, &metrics))
                .collect();
            Arc::new(BalancedProvider::new(
                name,
                wrapped,
                config.balancer.unwrap_or_default(),
            ))
        }
        _ => inner_stack(primary, config, &metrics),
    };

    if !fallbacks.is_empty() {
        let wrapped: Vec<Arc<dyn Provider>> = fallbacks
            .into_iter()
            .map(|f| inner_stack(f, config, &metrics))
            .collect();
        provider = Arc::new(FailoverProvider::new(provider, wrapped));
    }

    if let Some(breaker) = config.breaker {
        provider = Arc::new(CircuitBreakerProvider::new(provider, breaker));
    }

    if let Some(rate_limit) = config.rate_limit {
        provider = Arc::new(RateLimitedProvider::new(provider, rate_limit));
    }

    provider
}
