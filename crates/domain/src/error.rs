use serde::{Deserialize, Serialize};

/// The closed set of canonical error codes.
///
/// Every error surfaced by wormhole carries exactly one of these codes;
/// adapters never leak raw provider error taxonomies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Auth,
    Model,
    RateLimit,
    Request,
    Timeout,
    Provider,
    Network,
    Validation,
    Middleware,
    Unknown,
}

impl ErrorCode {
    /// Whether errors of this code are retryable by default.
    pub fn default_retryable(self) -> bool {
        matches!(
            self,
            ErrorCode::RateLimit | ErrorCode::Timeout | ErrorCode::Provider | ErrorCode::Network
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Auth => "auth",
            ErrorCode::Model => "model",
            ErrorCode::RateLimit => "rate_limit",
            ErrorCode::Request => "request",
            ErrorCode::Timeout => "timeout",
            ErrorCode::Provider => "provider",
            ErrorCode::Network => "network",
            ErrorCode::Validation => "validation",
            ErrorCode::Middleware => "middleware",
            ErrorCode::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical error type used across all wormhole crates.
///
/// Carries a [`ErrorCode`], a human-readable message, the retryability
/// decision, and optionally the HTTP status, the provider name, extra
/// details, and a source error preserving the chain.
#[derive(thiserror::Error, Debug)]
#[error("{code}: {message}")]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub retryable: bool,
    pub status: Option<u16>,
    pub provider: Option<String>,
    pub details: Option<String>,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Construct an error with the code's default retryability.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retryable: code.default_retryable(),
            status: None,
            provider: None,
            details: None,
            cause: None,
        }
    }

    // ── Per-code constructors ──────────────────────────────────────

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Auth, message)
    }

    pub fn model(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Model, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::RateLimit, message)
    }

    pub fn request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Request, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, message)
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Provider, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Network, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Validation, message)
    }

    pub fn middleware(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Middleware, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unknown, message)
    }

    // ── Builder-style enrichment ───────────────────────────────────

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_cause(
        mut self,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    // ── Classification ─────────────────────────────────────────────

    /// Map an HTTP status to the canonical code and retryability.
    ///
    /// | status        | code      | retryable |
    /// |---------------|-----------|-----------|
    /// | 401, 403      | Auth      | no        |
    /// | 404           | Model     | no        |
    /// | 400, 422      | Request   | no        |
    /// | 408, 504      | Timeout   | yes       |
    /// | 429           | RateLimit | yes       |
    /// | 500, 502, 503 | Provider  | yes       |
    /// | other 4xx/5xx | Network   | no        |
    pub fn classify_status(status: u16, message: impl Into<String>) -> Self {
        let (code, retryable) = match status {
            401 | 403 => (ErrorCode::Auth, false),
            404 => (ErrorCode::Model, false),
            400 | 422 => (ErrorCode::Request, false),
            408 | 504 => (ErrorCode::Timeout, true),
            429 => (ErrorCode::RateLimit, true),
            500 | 502 | 503 => (ErrorCode::Provider, true),
            _ => (ErrorCode::Network, false),
        };
        Self::new(code, message)
            .with_retryable(retryable)
            .with_status(status)
    }

    /// Wrap a terminal error after retry exhaustion, preserving the cause
    /// chain and the cause's code.
    pub fn max_retries_exceeded(attempts: u32, cause: Error) -> Self {
        let code = cause.code;
        Self {
            code,
            message: format!("max retries exceeded after {attempts} attempts"),
            retryable: false,
            status: cause.status,
            provider: cause.provider.clone(),
            details: None,
            cause: Some(Box::new(cause)),
        }
    }

    /// Walk the cause chain looking for a wormhole [`Error`]; returns the
    /// innermost one (or `self` when the chain has none).
    pub fn root(&self) -> &Error {
        let mut current = self;
        loop {
            match current
                .cause
                .as_deref()
                .and_then(|c| c.downcast_ref::<Error>())
            {
                Some(inner) => current = inner,
                None => return current,
            }
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::provider(format!("malformed JSON payload: {e}"))
            .with_retryable(false)
            .with_cause(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::unknown(format!("io: {e}")).with_cause(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_auth_statuses() {
        for status in [401u16, 403] {
            let err = Error::classify_status(status, "denied");
            assert_eq!(err.code, ErrorCode::Auth);
            assert!(!err.retryable);
            assert_eq!(err.status, Some(status));
        }
    }

    #[test]
    fn classify_not_found_is_model() {
        let err = Error::classify_status(404, "no such model");
        assert_eq!(err.code, ErrorCode::Model);
        assert!(!err.retryable);
    }

    #[test]
    fn classify_retryable_statuses() {
        for status in [408u16, 429, 500, 502, 503, 504] {
            let err = Error::classify_status(status, "transient");
            assert!(err.retryable, "status {status} must be retryable");
        }
    }

    #[test]
    fn classify_unmapped_is_network_non_retryable() {
        let err = Error::classify_status(418, "teapot");
        assert_eq!(err.code, ErrorCode::Network);
        assert!(!err.retryable);
    }

    #[test]
    fn max_retries_wrapper_preserves_chain() {
        let inner = Error::provider("upstream 503").with_status(503);
        let wrapped = Error::max_retries_exceeded(3, inner);
        assert_eq!(wrapped.code, ErrorCode::Provider);
        assert!(!wrapped.retryable);
        assert_eq!(wrapped.status, Some(503));
        assert!(wrapped.message.contains("max retries exceeded"));

        let source = std::error::Error::source(&wrapped).expect("cause retained");
        assert!(source.to_string().contains("upstream 503"));
    }

    #[test]
    fn root_walks_to_innermost_error() {
        let inner = Error::rate_limit("slow down");
        let outer = Error::max_retries_exceeded(2, inner);
        assert_eq!(outer.root().message, "slow down");
    }

    #[test]
    fn display_includes_code_and_message() {
        let err = Error::validation("unknown provider 'nope'");
        assert_eq!(err.to_string(), "validation: unknown provider 'nope'");
    }
}
