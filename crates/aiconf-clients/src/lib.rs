//! Configuration-driven chat clients for aiconf.
//!
//! Clients are declared in a [`ConfigTree`](aiconf_core::ConfigTree) under a
//! prefix (default `ai:clients`), one section per client, marked by a
//! `modelid` key. The [`ClientRegistry`] scans the tree once, builds each
//! [`ConfigurableClient`] on first request, and every client follows edits to
//! its section for as long as it lives.
//!
//! ```text
//! ai:clients:openai:modelid   = gpt-4.1
//! ai:clients:openai:apikey    = sk-...
//! ai:clients:grok:modelid     = grok-4
//! ai:clients:grok:endpoint    = https://api.x.ai
//! ai:clients:grok:apikey      = secrets:xai      (indirection)
//! ai:agents:writer:client     = openai
//! ```

pub mod agent;
pub mod apikey;
pub mod configurable;
pub mod identity;
pub mod registry;
pub mod scanner;
mod watch;

pub use agent::{AgentSettings, ConfigurableAgent};
pub use apikey::ApiKeyResolver;
pub use configurable::{ClientEvent, ConfigurableClient};
pub use identity::IdentityKey;
pub use registry::{ClientRegistry, ClientRegistryBuilder};
pub use scanner::{scan_agents, scan_clients, AgentDescriptor, ClientDescriptor};
