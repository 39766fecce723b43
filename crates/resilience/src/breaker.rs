//! Per-provider circuit breaker.
//!
//! State machine {Closed, Open, HalfOpen}. Closed counts consecutive
//! failures; at the threshold the circuit opens and short-circuits calls
//! with a retryable `Provider` error until the cool-off elapses. The first
//! caller after cool-off becomes the single half-open probe: success closes
//! the circuit and resets counters, failure re-opens it and restarts the
//! cool-off. Validation/auth/request failures do not count against the
//! circuit.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use wh_domain::config::BreakerConfig;
use wh_domain::error::{Error, Result};
use wh_domain::model::ModelInfo;
use wh_domain::request::{
    AudioRequest, EmbeddingsRequest, ImageRequest, StructuredRequest, TextRequest,
};
use wh_domain::response::{
    AudioResponse, EmbeddingsResponse, ImageResponse, StructuredResponse, TextResponse,
};
use wh_domain::stream::ChunkStream;
use wh_domain::trace::TraceEvent;
use wh_domain::CapabilitySet;
use wh_providers::Provider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed { consecutive_failures: u32 },
    Open { since: Instant },
    HalfOpen,
}

impl State {
    fn label(&self) -> &'static str {
        match self {
            State::Closed { .. } => "closed",
            State::Open { .. } => "open",
            State::HalfOpen => "half_open",
        }
    }
}

pub struct CircuitBreakerProvider {
    inner: Arc<dyn Provider>,
    config: BreakerConfig,
    state: Mutex<State>,
}

impl CircuitBreakerProvider {
    pub fn new(inner: Arc<dyn Provider>, config: BreakerConfig) -> Self {
        Self {
            inner,
            config,
            state: Mutex::new(State::Closed {
                consecutive_failures: 0,
            }),
        }
    }

    fn cooloff(&self) -> Duration {
        Duration::from_millis(self.config.cooloff_ms)
    }

    fn transition(&self, state: &mut State, to: State) {
        if state.label() != to.label() {
            TraceEvent::CircuitStateChanged {
                provider: self.inner.name().to_string(),
                from: state.label().to_string(),
                to: to.label().to_string(),
            }
            .emit();
        }
        *state = to;
    }

    /// Gate a call: `Ok(())` admits it, `Err` short-circuits without I/O.
    fn admit(&self) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            State::Closed { .. } => Ok(()),
            State::Open { since } => {
                if since.elapsed() >= self.cooloff() {
                    // This caller becomes the single probe.
                    self.transition(&mut state, State::HalfOpen);
                    Ok(())
                } else {
                    Err(self.open_error())
                }
            }
            // A probe is already in flight.
            State::HalfOpen => Err(self.open_error()),
        }
    }

    fn open_error(&self) -> Error {
        Error::provider(format!(
            "circuit breaker open for provider '{}'",
            self.inner.name()
        ))
        .with_provider(self.inner.name())
        .with_retryable(true)
    }

    fn record_success(&self) {
        let mut state = self.state.lock();
        self.transition(
            &mut state,
            State::Closed {
                consecutive_failures: 0,
            },
        );
    }

    fn record_failure(&self, err: &Error) {
        // Caller mistakes (validation, auth, bad request) say nothing about
        // provider health.
        if !err.retryable {
            return;
        }
        let mut state = self.state.lock();
        let next = match *state {
            State::Closed {
                consecutive_failures,
            } => {
                let failures = consecutive_failures + 1;
                if failures >= self.config.failure_threshold {
                    State::Open {
                        since: Instant::now(),
                    }
                } else {
                    State::Closed {
                        consecutive_failures: failures,
                    }
                }
            }
            // Probe failed: restart the cool-off.
            State::HalfOpen => State::Open {
                since: Instant::now(),
            },
            State::Open { since } => State::Open { since },
        };
        self.transition(&mut state, next);
    }

    async fn run<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        self.admit()?;
        match op().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure(&e);
                Err(e)
            }
        }
    }

    #[cfg(test)]
    fn state_label(&self) -> &'static str {
        self.state.lock().label()
    }
}

#[async_trait::async_trait]
impl Provider for CircuitBreakerProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn capabilities(&self) -> CapabilitySet {
        self.inner.capabilities()
    }

    async fn text(&self, req: TextRequest) -> Result<TextResponse> {
        self.run(|| self.inner.text(req)).await
    }

    async fn stream(&self, req: TextRequest) -> Result<ChunkStream> {
        self.run(|| self.inner.stream(req)).await
    }

    async fn structured(&self, req: StructuredRequest) -> Result<StructuredResponse> {
        self.run(|| self.inner.structured(req)).await
    }

    async fn embeddings(&self, req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
        self.run(|| self.inner.embeddings(req)).await
    }

    async fn audio(&self, req: AudioRequest) -> Result<AudioResponse> {
        self.run(|| self.inner.audio(req)).await
    }

    async fn image(&self, req: ImageRequest) -> Result<ImageResponse> {
        self.run(|| self.inner.image(req)).await
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        self.run(|| self.inner.list_models()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;

    struct Scripted {
        /// true = succeed, false = fail with a retryable provider error.
        script: PlMutex<Vec<bool>>,
        calls: PlMutex<u32>,
    }

    impl Scripted {
        fn new(script: Vec<bool>) -> Arc<Self> {
            Arc::new(Self {
                script: PlMutex::new(script),
                calls: PlMutex::new(0),
            })
        }
    }

    #[async_trait::async_trait]
    impl Provider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }
        fn capabilities(&self) -> CapabilitySet {
            CapabilitySet::empty()
        }
        async fn text(&self, _req: TextRequest) -> Result<TextResponse> {
            *self.calls.lock() += 1;
            let ok = {
                let mut script = self.script.lock();
                if script.is_empty() {
                    true
                } else {
                    script.remove(0)
                }
            };
            if ok {
                Ok(TextResponse::empty("m"))
            } else {
                Err(Error::provider("boom"))
            }
        }
    }

    fn breaker(inner: Arc<Scripted>, threshold: u32, cooloff_ms: u64) -> CircuitBreakerProvider {
        CircuitBreakerProvider::new(
            inner,
            BreakerConfig {
                failure_threshold: threshold,
                cooloff_ms,
            },
        )
    }

    #[tokio::test]
    async fn trips_after_threshold_and_short_circuits_without_io() {
        let inner = Scripted::new(vec![false, false, false]);
        let cb = breaker(inner.clone(), 3, 100);

        for _ in 0..3 {
            assert!(cb.text(TextRequest::default()).await.is_err());
        }
        assert_eq!(cb.state_label(), "open");

        // Fourth call short-circuits: the inner provider sees no I/O.
        let err = cb.text(TextRequest::default()).await.unwrap_err();
        assert!(err.retryable);
        assert!(err.message.contains("circuit breaker open"));
        assert_eq!(*inner.calls.lock(), 3);
    }

    #[tokio::test]
    async fn half_open_probe_success_closes() {
        let inner = Scripted::new(vec![false, false, true]);
        let cb = breaker(inner.clone(), 2, 50);

        assert!(cb.text(TextRequest::default()).await.is_err());
        assert!(cb.text(TextRequest::default()).await.is_err());
        assert_eq!(cb.state_label(), "open");

        tokio::time::sleep(Duration::from_millis(60)).await;

        // One probe is admitted after cool-off and succeeds.
        assert!(cb.text(TextRequest::default()).await.is_ok());
        assert_eq!(cb.state_label(), "closed");
        assert_eq!(*inner.calls.lock(), 3);
    }

    #[tokio::test]
    async fn half_open_probe_failure_reopens() {
        let inner = Scripted::new(vec![false, false, false]);
        let cb = breaker(inner.clone(), 2, 50);

        assert!(cb.text(TextRequest::default()).await.is_err());
        assert!(cb.text(TextRequest::default()).await.is_err());
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(cb.text(TextRequest::default()).await.is_err());
        assert_eq!(cb.state_label(), "open");
        assert_eq!(*inner.calls.lock(), 3);
    }

    #[tokio::test]
    async fn non_retryable_failures_do_not_count() {
        struct AlwaysAuth;
        #[async_trait::async_trait]
        impl Provider for AlwaysAuth {
            fn name(&self) -> &str {
                "auth"
            }
            fn capabilities(&self) -> CapabilitySet {
                CapabilitySet::empty()
            }
            async fn text(&self, _req: TextRequest) -> Result<TextResponse> {
                Err(Error::auth("bad key"))
            }
        }

        let cb = CircuitBreakerProvider::new(
            Arc::new(AlwaysAuth),
            BreakerConfig {
                failure_threshold: 1,
                cooloff_ms: 1_000,
            },
        );
        for _ in 0..5 {
            let err = cb.text(TextRequest::default()).await.unwrap_err();
            assert_eq!(err.code, wh_domain::ErrorCode::Auth);
        }
        assert_eq!(cb.state_label(), "closed");
    }

    #[tokio::test]
    async fn success_resets_consecutive_count() {
        let inner = Scripted::new(vec![false, true, false, false]);
        let cb = breaker(inner, 2, 1_000);

        assert!(cb.text(TextRequest::default()).await.is_err());
        assert!(cb.text(TextRequest::default()).await.is_ok());
        // One more failure is below the threshold again.
        assert!(cb.text(TextRequest::default()).await.is_err());
        assert_eq!(cb.state_label(), "closed");
    }
}
