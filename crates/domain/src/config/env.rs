use std::time::Duration;

/// Parse a human duration string: `500ms`, `30s`, `2m`, `1h`, or bare
/// seconds (`30`). Returns `None` for anything it does not understand.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let (digits, unit) = match raw.find(|c: char| !c.is_ascii_digit()) {
        Some(split) if split > 0 => raw.split_at(split),
        Some(_) => return None,
        None => (raw, "s"),
    };
    let value: u64 = digits.parse().ok()?;
    match unit {
        "ms" => Some(Duration::from_millis(value)),
        "s" => Some(Duration::from_secs(value)),
        "m" => Some(Duration::from_secs(value * 60)),
        "h" => Some(Duration::from_secs(value * 3600)),
        _ => None,
    }
}

fn env_duration(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|v| parse_duration(&v))
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Compiled defaults, overridable through `WORMHOLE_*` environment
/// variables. Invalid values silently fall back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvDefaults {
    pub default_timeout: Duration,
    pub max_retries: u32,
    pub initial_retry_delay: Duration,
    pub max_retry_delay: Duration,
    pub circuit_breaker_timeout: Duration,
    pub health_check_interval: Duration,
}

impl Default for EnvDefaults {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            max_retries: 3,
            initial_retry_delay: Duration::from_millis(500),
            max_retry_delay: Duration::from_secs(30),
            circuit_breaker_timeout: Duration::from_secs(30),
            health_check_interval: Duration::from_secs(30),
        }
    }
}

impl EnvDefaults {
    /// Read the environment once at client construction.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            default_timeout: env_duration("WORMHOLE_DEFAULT_TIMEOUT", d.default_timeout),
            max_retries: env_u32("WORMHOLE_MAX_RETRIES", d.max_retries),
            initial_retry_delay: env_duration(
                "WORMHOLE_INITIAL_RETRY_DELAY",
                d.initial_retry_delay,
            ),
            max_retry_delay: env_duration("WORMHOLE_MAX_RETRY_DELAY", d.max_retry_delay),
            circuit_breaker_timeout: env_duration(
                "WORMHOLE_CIRCUIT_BREAKER_TIMEOUT",
                d.circuit_breaker_timeout,
            ),
            health_check_interval: env_duration(
                "WORMHOLE_HEALTH_CHECK_INTERVAL",
                d.health_check_interval,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn parse_duration_bare_number_is_seconds() {
        assert_eq!(parse_duration("45"), Some(Duration::from_secs(45)));
    }

    #[test]
    fn parse_duration_rejects_garbage() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("fast"), None);
        assert_eq!(parse_duration("10x"), None);
        assert_eq!(parse_duration("ms"), None);
    }

    #[test]
    fn env_override_wins_and_invalid_falls_back() {
        std::env::set_var("WORMHOLE_MAX_RETRIES", "7");
        std::env::set_var("WORMHOLE_DEFAULT_TIMEOUT", "not-a-duration");
        let defaults = EnvDefaults::from_env();
        assert_eq!(defaults.max_retries, 7);
        assert_eq!(defaults.default_timeout, Duration::from_secs(30));
        std::env::remove_var("WORMHOLE_MAX_RETRIES");
        std::env::remove_var("WORMHOLE_DEFAULT_TIMEOUT");
    }
}
