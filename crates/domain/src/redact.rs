//! Error and URL sanitization.
//!
//! Masks secrets (API-key shapes, bearer tokens, sensitive query
//! parameters), internal addresses, and email local parts out of
//! human-readable error text before it reaches logs or callers.
//! Sanitization never touches the typed fields of an [`Error`] and always
//! preserves the cause chain.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, ErrorCode};

/// How aggressively messages are scrubbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SanitizeLevel {
    /// Pass-through.
    None,
    /// Mask secrets in place, preserving a short prefix/suffix for
    /// debuggability.
    #[default]
    Basic,
    /// Replace the whole message with a generic per-code phrase.
    Strict,
}

fn key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(sk|pk)-[A-Za-z0-9_-]{8,}").unwrap())
}

fn bearer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)bearer\s+[A-Za-z0-9._~+/=-]{8,}").unwrap())
}

fn query_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(api_key|apikey|token|secret|key)=([^&\s'\x22]+)").unwrap())
}

fn internal_ip_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\b(10\.\d{1,3}\.\d{1,3}\.\d{1,3}|192\.168\.\d{1,3}\.\d{1,3}|172\.(1[6-9]|2\d|3[01])\.\d{1,3}\.\d{1,3}|127\.\d{1,3}\.\d{1,3}\.\d{1,3})\b|\blocalhost\b",
        )
        .unwrap()
    })
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([A-Za-z0-9._%+-]+)@([A-Za-z0-9.-]+\.[A-Za-z]{2,})\b").unwrap())
}

/// Mask a secret preserving up to 4 leading and trailing characters.
fn mask_preserving_edges(secret: &str) -> String {
    if secret.len() > 12 {
        format!("{}...{}", &secret[..4], &secret[secret.len() - 4..])
    } else {
        "***".to_string()
    }
}

/// Sanitize one message string at the given level.
pub fn sanitize_message(message: &str, level: SanitizeLevel, code: ErrorCode) -> String {
    match level {
        SanitizeLevel::None => message.to_string(),
        SanitizeLevel::Basic => {
            let mut out = key_re()
                .replace_all(message, |caps: &regex::Captures<'_>| {
                    mask_preserving_edges(&caps[0])
                })
                .into_owned();
            out = bearer_re().replace_all(&out, "Bearer ***").into_owned();
            out = query_re().replace_all(&out, "$1=***").into_owned();
            out = internal_ip_re().replace_all(&out, "[internal]").into_owned();
            out = email_re().replace_all(&out, "***@$2").into_owned();
            out
        }
        SanitizeLevel::Strict => generic_phrase(code).to_string(),
    }
}

/// The per-code replacement used at `Strict` level.
fn generic_phrase(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::Auth => "authentication failed",
        ErrorCode::Model => "model not available",
        ErrorCode::RateLimit => "rate limit exceeded",
        ErrorCode::Request => "invalid request",
        ErrorCode::Timeout => "request timed out",
        ErrorCode::Provider => "provider error",
        ErrorCode::Network => "network error",
        ErrorCode::Validation => "validation failed",
        ErrorCode::Middleware => "middleware error",
        ErrorCode::Unknown => "internal error",
    }
}

/// Sanitize an [`Error`]'s message and details, preserving the typed fields
/// and the cause chain.
pub fn sanitize_error(mut err: Error, level: SanitizeLevel) -> Error {
    err.message = sanitize_message(&err.message, level, err.code);
    if let Some(details) = err.details.take() {
        err.details = Some(sanitize_message(&details, level, err.code));
    }
    err
}

/// Mask an API key carried in a URL query string.
pub fn mask_url(url: &str) -> String {
    query_re().replace_all(url, "$1=***").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_masks_sk_keys() {
        let msg = "request with sk-abcd1234efgh5678ijkl failed";
        let out = sanitize_message(msg, SanitizeLevel::Basic, ErrorCode::Auth);
        assert!(!out.contains("sk-abcd1234efgh5678ijkl"));
        assert!(out.contains("sk-a"), "prefix preserved: {out}");
    }

    #[test]
    fn basic_masks_bearer_tokens() {
        let msg = "header was Authorization: Bearer abc123def456ghi789";
        let out = sanitize_message(msg, SanitizeLevel::Basic, ErrorCode::Auth);
        assert!(!out.contains("abc123def456ghi789"));
        assert!(out.contains("Bearer ***"));
    }

    #[test]
    fn basic_masks_query_params() {
        let msg = "GET /v1/models?api_key=supersecretvalue&x=1";
        let out = sanitize_message(msg, SanitizeLevel::Basic, ErrorCode::Request);
        assert!(!out.contains("supersecretvalue"));
        assert!(out.contains("api_key=***"));
    }

    #[test]
    fn basic_masks_internal_ips_and_localhost() {
        for msg in [
            "dial 10.0.0.5 failed",
            "dial 192.168.1.20 failed",
            "dial 172.16.9.1 failed",
            "dial 127.0.0.1 failed",
            "dial localhost failed",
        ] {
            let out = sanitize_message(msg, SanitizeLevel::Basic, ErrorCode::Network);
            assert!(out.contains("[internal]"), "not masked: {out}");
        }
    }

    #[test]
    fn public_ip_is_untouched() {
        let msg = "dial 8.8.8.8 failed";
        let out = sanitize_message(msg, SanitizeLevel::Basic, ErrorCode::Network);
        assert!(out.contains("8.8.8.8"));
    }

    #[test]
    fn basic_masks_email_local_part() {
        let out = sanitize_message(
            "user alice.smith@example.com over quota",
            SanitizeLevel::Basic,
            ErrorCode::RateLimit,
        );
        assert!(!out.contains("alice.smith"));
        assert!(out.contains("***@example.com"));
    }

    #[test]
    fn strict_replaces_wholesale() {
        let out = sanitize_message(
            "sk-verysecretkey12345 leaked",
            SanitizeLevel::Strict,
            ErrorCode::Auth,
        );
        assert_eq!(out, "authentication failed");
    }

    #[test]
    fn none_is_passthrough() {
        let msg = "sk-verysecretkey12345";
        assert_eq!(sanitize_message(msg, SanitizeLevel::None, ErrorCode::Auth), msg);
    }

    #[test]
    fn sanitize_error_preserves_typed_fields_and_chain() {
        let inner = Error::network("tcp reset");
        let err = Error::auth("key sk-abcd1234efgh5678ijkl rejected")
            .with_status(401)
            .with_provider("openai")
            .with_details("url https://api.openai.com?api_key=topsecret")
            .with_cause(inner);

        let cleaned = sanitize_error(err, SanitizeLevel::Basic);
        assert_eq!(cleaned.code, ErrorCode::Auth);
        assert_eq!(cleaned.status, Some(401));
        assert_eq!(cleaned.provider.as_deref(), Some("openai"));
        assert!(!cleaned.message.contains("sk-abcd1234efgh5678ijkl"));
        assert!(!cleaned.details.as_deref().unwrap().contains("topsecret"));
        assert!(std::error::Error::source(&cleaned).is_some());
    }

    #[test]
    fn mask_url_hides_key_param() {
        let url = "https://generativelanguage.googleapis.com/v1beta/models?key=AIzaSyFakeKey123";
        let out = mask_url(url);
        assert!(!out.contains("AIzaSyFakeKey123"));
        assert!(out.contains("key=***"));
    }
}
