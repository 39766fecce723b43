//! Configuration types shared by all wormhole crates.
//!
//! Everything deserializes from JSON/TOML with serde defaults, so partial
//! configs are always valid. Compiled defaults can be overridden by the
//! `WORMHOLE_*` environment variables (see [`env`]); invalid values silently
//! fall back.

mod cache;
mod env;
mod http;
mod provider;
mod resilience;

pub use cache::CacheConfig;
pub use env::{parse_duration, EnvDefaults};
pub use http::{HttpConfig, TlsPreset, TlsVersion};
pub use provider::{AuthConfig, AuthMode, ProviderConfig, ProviderKind};
pub use resilience::{
    BalancePolicy, BalancerConfig, BreakerConfig, RateLimitConfig, ResilienceConfig, RetryConfig,
};
