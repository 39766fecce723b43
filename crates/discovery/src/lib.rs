//! Model-discovery cache.
//!
//! Three tiers, queried in order per provider: in-memory map (short TTL) →
//! persistent JSON file (long TTL) → hard-coded fallback list (offline last
//! resort). Writes persist atomically with an optional per-provider
//! journal; a background service refreshes registered providers on an
//! interval and cleans expired memory entries.

pub mod cache;
pub mod fallback;
pub mod journal;
pub mod path;
pub mod persist;
pub mod service;

pub use cache::{CacheEntry, ModelCache};
pub use service::ModelDiscovery;
