//! Provider adapters and the machinery they share.
//!
//! The [`Provider`](traits::Provider) trait is the narrow waist every
//! backend implements. Adapters translate the canonical model to each
//! provider's wire format; the shared base ([`base`]) handles request
//! building, retrying transport ([`retry`]), pooled buffers ([`pool`]),
//! cached TLS transports ([`http`]), SSE streaming ([`sse`]), and error
//! classification.

pub mod base;
pub mod http;
pub mod multipart;
pub mod pool;
pub mod registry;
pub mod retry;
pub mod sse;
pub mod structured;
pub mod traits;
pub mod util;

pub mod anthropic;
pub mod google;
pub mod ollama;
pub mod openai;

pub use registry::{ProviderInitError, ProviderRegistry};
pub use traits::Provider;
