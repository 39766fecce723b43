//! Transport-level retry engine.
//!
//! Wraps request execution with jittered exponential backoff. Retryable
//! HTTP statuses are {408, 429, 500, 502, 503, 504}; every network error is
//! retryable. A server-advertised `Retry-After` (integer seconds) overrides
//! the computed delay, still capped by `max_delay`. `max_retries = 0` is a
//! pass-through that returns the raw response, including error statuses, so
//! callers can inspect error bodies directly.

use std::time::Duration;

use wh_domain::config::RetryConfig;
use wh_domain::error::Result;
use wh_domain::rng;
use wh_domain::trace::TraceEvent;

use crate::util::from_reqwest;

const RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUSES.contains(&status)
}

/// The outcome of a retried execution: the final response plus how many
/// retries were spent obtaining it.
pub struct Executed {
    pub response: reqwest::Response,
    pub retries_used: u32,
}

/// Compute the pre-jitter delay for `attempt` (0-based), capped at
/// `max_delay_ms`.
pub fn compute_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let raw = config.initial_delay_ms as f64 * config.multiplier.powi(attempt as i32);
    let capped = raw.min(config.max_delay_ms as f64);
    Duration::from_millis(capped as u64)
}

/// Apply ±20% jitter when enabled, clamped to the cap.
fn with_jitter(config: &RetryConfig, delay: Duration) -> Duration {
    if !config.jitter {
        return delay;
    }
    let jittered = rng::jitter(delay.as_millis() as f64, 0.2);
    let clamped = jittered.min(config.max_delay_ms as f64).max(0.0);
    Duration::from_millis(clamped as u64)
}

/// Parse a `Retry-After` header value as integer seconds. HTTP-date format
/// is not accepted.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

fn retry_after_of(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after)
}

/// A retrying wrapper around a cached transport.
#[derive(Debug, Clone)]
pub struct RetryClient {
    config: RetryConfig,
    provider: String,
}

impl RetryClient {
    pub fn new(provider: impl Into<String>, config: RetryConfig) -> Self {
        Self {
            config,
            provider: provider.into(),
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute `build()` until a non-retryable outcome or exhaustion.
    ///
    /// `build` produces a fresh request per attempt (bodies are frozen
    /// [`bytes::Bytes`], so re-sending is cheap and safe for POSTs).
    /// Attempts are strictly serial; dropping the future pre-empts any
    /// pending delay.
    pub async fn execute<F>(&self, build: F) -> Result<Executed>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        // Pass-through mode: surface the raw response without retry.
        if self.config.max_retries == 0 {
            let response = build()
                .send()
                .await
                .map_err(|e| from_reqwest(e).with_provider(&self.provider))?;
            return Ok(Executed {
                response,
                retries_used: 0,
            });
        }

        let mut attempt: u32 = 0;
        loop {
            let outcome = build().send().await;

            let (delay_hint, last_error) = match outcome {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if !is_retryable_status(status) || attempt >= self.config.max_retries {
                        return Ok(Executed {
                            response,
                            retries_used: attempt,
                        });
                    }
                    (retry_after_of(&response), None)
                }
                Err(e) => {
                    let err = from_reqwest(e).with_provider(&self.provider);
                    if attempt >= self.config.max_retries {
                        return Err(wh_domain::Error::max_retries_exceeded(attempt + 1, err));
                    }
                    (None, Some(err))
                }
            };

            let computed = compute_delay(&self.config, attempt);
            // The server value overrides the computed delay, still capped.
            let base = match delay_hint {
                Some(server) => server.min(Duration::from_millis(self.config.max_delay_ms)),
                None => computed,
            };
            let delay = with_jitter(&self.config, base);

            TraceEvent::RetryAttempt {
                provider: self.provider.clone(),
                attempt: attempt + 1,
                delay_ms: delay.as_millis() as u64,
                code: last_error
                    .as_ref()
                    .map(|e| e.code.to_string())
                    .unwrap_or_else(|| "http".into()),
            }
            .emit();

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(initial: u64, max: u64, multiplier: f64, jitter: bool) -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            initial_delay_ms: initial,
            max_delay_ms: max,
            multiplier,
            jitter,
        }
    }

    #[test]
    fn delays_grow_geometrically_up_to_cap() {
        let config = cfg(100, 1_000, 2.0, false);
        let delays: Vec<u64> = (0..6)
            .map(|n| compute_delay(&config, n).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1_000, 1_000]);
        // Monotonically non-decreasing up to the cap.
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn jitter_stays_within_twenty_percent_and_cap() {
        let config = cfg(100, 10_000, 2.0, true);
        for attempt in 0..5 {
            let base = compute_delay(&config, attempt).as_millis() as f64;
            for _ in 0..100 {
                let d = with_jitter(&config, compute_delay(&config, attempt)).as_millis() as f64;
                assert!(d >= (base * 0.8) - 1.0, "delay {d} below 0.8×{base}");
                assert!(d <= (base * 1.2).min(10_000.0) + 1.0, "delay {d} above bound");
            }
        }
    }

    #[test]
    fn retry_after_parses_integer_seconds_only() {
        assert_eq!(parse_retry_after("1"), Some(Duration::from_secs(1)));
        assert_eq!(parse_retry_after(" 30 "), Some(Duration::from_secs(30)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
        assert_eq!(parse_retry_after(""), None);
    }

    #[test]
    fn retryable_status_set() {
        for status in [408u16, 429, 500, 502, 503, 504] {
            assert!(is_retryable_status(status));
        }
        for status in [200u16, 400, 401, 404, 422] {
            assert!(!is_retryable_status(status));
        }
    }

    #[tokio::test]
    async fn zero_retries_is_passthrough() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let retry = RetryClient::new(
            "test",
            RetryConfig {
                max_retries: 0,
                ..RetryConfig::default()
            },
        );
        let executed = retry
            .execute(|| client.post(format!("{}/x", server.uri())))
            .await
            .unwrap();
        assert_eq!(executed.response.status().as_u16(), 503);
        assert_eq!(executed.retries_used, 0);
    }

    #[tokio::test]
    async fn retries_retryable_status_then_succeeds() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let retry = RetryClient::new(
            "test",
            RetryConfig {
                max_retries: 2,
                initial_delay_ms: 10,
                jitter: false,
                ..RetryConfig::default()
            },
        );
        let executed = retry
            .execute(|| client.post(format!("{}/x", server.uri())))
            .await
            .unwrap();
        assert_eq!(executed.response.status().as_u16(), 200);
        assert_eq!(executed.retries_used, 1);
    }

    #[tokio::test]
    async fn server_retry_after_overrides_computed_delay() {
        use std::time::Instant;
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "1"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let retry = RetryClient::new(
            "test",
            RetryConfig {
                max_retries: 2,
                initial_delay_ms: 10,
                jitter: false,
                ..RetryConfig::default()
            },
        );
        let start = Instant::now();
        let executed = retry
            .execute(|| client.post(format!("{}/x", server.uri())))
            .await
            .unwrap();
        assert_eq!(executed.response.status().as_u16(), 200);
        // The second attempt may occur no earlier than the advertised 1s.
        assert!(start.elapsed() >= Duration::from_secs(1));
    }
}
