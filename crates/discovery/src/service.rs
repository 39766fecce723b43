//! The discovery service: fetch policy over the tiered cache, plus the
//! background refresh and cleanup tasks.
//!
//! Both background tasks stop through one close-once cancellation token
//! and are awaited in [`ModelDiscovery::close`], so shutdown never leaks a
//! task.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use wh_domain::config::CacheConfig;
use wh_domain::error::{Error, Result};
use wh_domain::trace::TraceEvent;
use wh_domain::ModelInfo;
use wh_providers::ProviderRegistry;

use crate::cache::ModelCache;
use crate::fallback::fallback_models;

pub struct ModelDiscovery {
    cache: Arc<ModelCache>,
    registry: Arc<ProviderRegistry>,
    stop: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ModelDiscovery {
    /// Build the service and start the background refresh/cleanup tickers.
    pub fn start(registry: Arc<ProviderRegistry>, config: CacheConfig) -> Arc<Self> {
        let cache = Arc::new(ModelCache::new(config));
        cache.recover_journal(&registry.names());

        let service = Arc::new(Self {
            cache,
            registry,
            stop: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        });

        service.spawn_refresh_ticker();
        service.spawn_cleanup_ticker();
        service
    }

    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    // ── Get / set ──────────────────────────────────────────────────

    /// Resolve a provider's model list through the tiers.
    ///
    /// Returns `(models, fresh)`. `fresh = false` means fallback or stale
    /// data was served; a background refresh for that provider only is
    /// scheduled in that case (unless offline).
    pub async fn models(self: &Arc<Self>, provider: &str) -> Result<(Vec<ModelInfo>, bool)> {
        if let Some(entry) = self.cache.memory_get(provider) {
            return Ok((entry.models, true));
        }
        if let Some(entry) = self.cache.file_get(provider) {
            return Ok((entry.models, true));
        }

        if self.cache.config().offline {
            return match fallback_models(provider) {
                Some(models) => {
                    TraceEvent::CacheFallback {
                        provider: provider.to_string(),
                        tier: "static".into(),
                    }
                    .emit();
                    Ok((models, false))
                }
                None => Err(Error::validation(format!(
                    "no fallback model list for unknown provider '{provider}'"
                ))),
            };
        }

        match self.fetch_and_store(provider).await {
            Ok(models) => Ok((models, true)),
            Err(fetch_err) => {
                // Degrade to stale file data or the static fallback; the
                // background refresh will try again.
                if let Some(entry) = self.cache.file_get_stale(provider) {
                    TraceEvent::CacheFallback {
                        provider: provider.to_string(),
                        tier: "stale_file".into(),
                    }
                    .emit();
                    self.schedule_refresh(provider);
                    return Ok((entry.models, false));
                }
                if let Some(models) = fallback_models(provider) {
                    TraceEvent::CacheFallback {
                        provider: provider.to_string(),
                        tier: "static".into(),
                    }
                    .emit();
                    self.schedule_refresh(provider);
                    return Ok((models, false));
                }
                Err(fetch_err)
            }
        }
    }

    /// Synchronously fetch from the adapter and populate both tiers.
    async fn fetch_and_store(&self, provider: &str) -> Result<Vec<ModelInfo>> {
        let adapter = self.registry.resolve(provider)?;
        let models = adapter.list_models().await?;
        self.cache.set(provider, models.clone()).await?;
        TraceEvent::CacheRefresh {
            provider: provider.to_string(),
            models: models.len(),
            background: false,
        }
        .emit();
        Ok(models)
    }

    // ── Background work ────────────────────────────────────────────

    /// Schedule a one-off refresh for a single provider.
    fn schedule_refresh(self: &Arc<Self>, provider: &str) {
        let service = Arc::downgrade(self);
        let provider = provider.to_string();
        tokio::spawn(async move {
            if let Some(service) = service.upgrade() {
                service.refresh_one(&provider).await;
            }
        });
    }

    /// Refresh every registered provider in parallel. Failures are
    /// swallowed (best-effort).
    pub async fn refresh_all(&self) {
        let names = self.registry.names();
        let refreshes = names.iter().map(|provider| self.refresh_one(provider));
        join_all(refreshes).await;
    }

    async fn refresh_one(&self, provider: &str) {
        match self.fetch_and_store_background(provider).await {
            Ok(count) => {
                TraceEvent::CacheRefresh {
                    provider: provider.to_string(),
                    models: count,
                    background: true,
                }
                .emit();
            }
            Err(e) => {
                tracing::warn!(provider = %provider, error = %e, "background refresh failed");
            }
        }
    }

    async fn fetch_and_store_background(&self, provider: &str) -> Result<usize> {
        let adapter = self.registry.resolve(provider)?;
        let models = adapter.list_models().await?;
        let count = models.len();
        self.cache.set(provider, models).await?;
        Ok(count)
    }

    fn spawn_refresh_ticker(self: &Arc<Self>) {
        let interval = Duration::from_secs(self.cache.config().refresh_interval_secs.max(1));
        let service = Arc::downgrade(self);
        let stop = self.stop.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await; // the immediate first tick
            loop {
                tokio::select! {
                    _ = stop.cancelled() => return,
                    _ = ticker.tick() => {
                        let Some(service) = service.upgrade() else { return };
                        service.refresh_all().await;
                    }
                }
            }
        });
        self.tasks.lock().push(handle);
    }

    fn spawn_cleanup_ticker(self: &Arc<Self>) {
        let interval = Duration::from_secs(self.cache.config().cleanup_interval_secs.max(1));
        let service = Arc::downgrade(self);
        let stop = self.stop.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = stop.cancelled() => return,
                    _ = ticker.tick() => {
                        let Some(service) = service.upgrade() else { return };
                        let evicted = service.cache.cleanup_expired();
                        if evicted > 0 {
                            tracing::debug!(evicted, "evicted expired cache entries");
                        }
                    }
                }
            }
        });
        self.tasks.lock().push(handle);
    }

    /// Stop the background tasks and wait for them. Idempotent.
    pub async fn close(&self) {
        self.stop.cancel();
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for handle in handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wh_domain::config::CacheConfig;
    use wh_domain::request::TextRequest;
    use wh_domain::response::TextResponse;
    use wh_domain::CapabilitySet;
    use wh_providers::Provider;

    struct Listing {
        models: Vec<&'static str>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Provider for Listing {
        fn name(&self) -> &str {
            "openai"
        }
        fn capabilities(&self) -> CapabilitySet {
            CapabilitySet::empty()
        }
        async fn text(&self, _req: TextRequest) -> wh_domain::Result<TextResponse> {
            Ok(TextResponse::empty("m"))
        }
        async fn list_models(&self) -> wh_domain::Result<Vec<ModelInfo>> {
            if self.fail {
                return Err(Error::provider("listing down"));
            }
            Ok(self
                .models
                .iter()
                .map(|id| ModelInfo::new(*id, "openai"))
                .collect())
        }
    }

    fn config_in(dir: &tempfile::TempDir, offline: bool) -> CacheConfig {
        CacheConfig {
            path: Some(
                dir.path()
                    .join("models.json")
                    .to_string_lossy()
                    .into_owned(),
            ),
            offline,
            // Long intervals so the tickers stay quiet during tests.
            refresh_interval_secs: 3_600,
            cleanup_interval_secs: 3_600,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn online_miss_fetches_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(ProviderRegistry::new());
        registry.register(
            "openai",
            Arc::new(Listing {
                models: vec!["gpt-4o"],
                fail: false,
            }),
        );

        let discovery = ModelDiscovery::start(registry, config_in(&dir, false));
        let (models, fresh) = discovery.models("openai").await.unwrap();
        assert!(fresh);
        assert_eq!(models[0].id, "gpt-4o");

        // Second read hits memory.
        let (_, fresh) = discovery.models("openai").await.unwrap();
        assert!(fresh);
        discovery.close().await;
    }

    #[tokio::test]
    async fn offline_known_provider_serves_fallback_not_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(ProviderRegistry::new());
        let discovery = ModelDiscovery::start(registry, config_in(&dir, true));

        let (models, fresh) = discovery.models("openai").await.unwrap();
        assert!(!fresh);
        assert!(!models.is_empty());
        discovery.close().await;
    }

    #[tokio::test]
    async fn offline_unknown_provider_errors() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(ProviderRegistry::new());
        let discovery = ModelDiscovery::start(registry, config_in(&dir, true));

        let err = discovery.models("mystery").await.unwrap_err();
        assert_eq!(err.code, wh_domain::ErrorCode::Validation);
        discovery.close().await;
    }

    #[tokio::test]
    async fn fetch_failure_degrades_to_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(ProviderRegistry::new());
        registry.register(
            "openai",
            Arc::new(Listing {
                models: vec![],
                fail: true,
            }),
        );
        let discovery = ModelDiscovery::start(registry, config_in(&dir, false));

        let (models, fresh) = discovery.models("openai").await.unwrap();
        assert!(!fresh);
        assert!(!models.is_empty());
        discovery.close().await;
    }

    #[tokio::test]
    async fn close_stops_background_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(ProviderRegistry::new());
        let discovery = ModelDiscovery::start(registry, config_in(&dir, false));
        discovery.close().await;
        assert!(discovery.tasks.lock().is_empty());
    }
}
