//! Shared utility functions for provider adapters.

use wh_domain::config::{AuthConfig, AuthMode};
use wh_domain::error::{Error, Result};

/// Convert a [`reqwest::Error`] into the canonical [`Error`] type.
///
/// Timeouts map to `Timeout`; everything else (connect failures, resets,
/// protocol errors) maps to `Network`. Both are retryable.
pub fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::timeout(e.to_string()).with_cause(e)
    } else {
        Error::network(e.to_string()).with_retryable(true).with_cause(e)
    }
}

/// Resolve the API key from an [`AuthConfig`].
///
/// Precedence:
/// 1. `key` field (plaintext — warn)
/// 2. `env` field (reads environment variable)
/// 3. `AuthMode::None` → no key
/// 4. Error
pub fn resolve_api_key(auth: &AuthConfig, provider: &str) -> Result<Option<String>> {
    if auth.mode == AuthMode::None {
        return Ok(None);
    }

    if let Some(ref key) = auth.key {
        tracing::warn!(
            provider = %provider,
            "API key loaded from plaintext config field 'key' — prefer 'env' instead"
        );
        return Ok(Some(key.clone()));
    }

    if let Some(ref env_var) = auth.env {
        return std::env::var(env_var).map(Some).map_err(|_| {
            Error::auth(format!(
                "environment variable '{env_var}' not set or not valid UTF-8"
            ))
            .with_provider(provider)
        });
    }

    Err(Error::auth("no API key configured: set 'key' or 'env' in auth config")
        .with_provider(provider))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_plaintext_key() {
        let auth = AuthConfig {
            key: Some("sk-test-123".into()),
            ..Default::default()
        };
        assert_eq!(resolve_api_key(&auth, "p").unwrap().as_deref(), Some("sk-test-123"));
    }

    #[test]
    fn resolve_env_key() {
        let var = "WH_TEST_RESOLVE_ENV_KEY_1234";
        std::env::set_var(var, "env-secret");
        let auth = AuthConfig {
            env: Some(var.into()),
            ..Default::default()
        };
        assert_eq!(resolve_api_key(&auth, "p").unwrap().as_deref(), Some("env-secret"));
        std::env::remove_var(var);
    }

    #[test]
    fn resolve_missing_env_is_auth_error() {
        let auth = AuthConfig {
            env: Some("WH_TEST_NONEXISTENT_VAR_8888".into()),
            ..Default::default()
        };
        let err = resolve_api_key(&auth, "p").unwrap_err();
        assert_eq!(err.code, wh_domain::ErrorCode::Auth);
        assert!(err.message.contains("WH_TEST_NONEXISTENT_VAR_8888"));
    }

    #[test]
    fn resolve_none_mode_has_no_key() {
        let auth = AuthConfig {
            mode: AuthMode::None,
            ..Default::default()
        };
        assert!(resolve_api_key(&auth, "p").unwrap().is_none());
    }

    #[test]
    fn resolve_unconfigured_is_auth_error() {
        let err = resolve_api_key(&AuthConfig::default(), "p").unwrap_err();
        assert!(err.message.contains("no API key configured"));
    }
}
