//! Provider layer for aiconf.
//!
//! # Architecture
//!
//! - [`traits::ChatClient`]: what a resolved client can do
//! - [`traits::ChatProvider`]: a named vendor integration that turns a
//!   resolved configuration section into a `ChatClient`
//! - [`registry`]: built-in provider specs, the ordered [`ProviderRegistry`],
//!   and section → provider resolution
//! - [`http_provider::OpenAiCompatibleClient`]: generic `/chat/completions`
//!   HTTP client used by every built-in provider
//! - [`model_cache::ModelCache`]: per-client memo of model-bound sub-clients

pub mod http_provider;
pub mod model_cache;
pub mod registry;
pub mod traits;

// Re-export main types for convenience
pub use http_provider::{HttpTransport, ModelBinding, OpenAiCompatibleClient};
pub use model_cache::ModelCache;
pub use registry::{parse_endpoint, FnProvider, ProviderRegistry, ProviderSpec, PROVIDERS};
pub use traits::{ChatClient, ChatProvider, ChatStream, ClientOptions};
