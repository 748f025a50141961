//! Core building blocks for aiconf.
//!
//! - [`config`]: the hierarchical, live-reloadable configuration tree,
//!   sections, change tokens, the JSON loader and the file watcher
//! - [`types`]: chat messages, options, responses and the OpenAI-compatible
//!   wire shapes shared by every provider
//! - [`error`]: configuration and dispatch error taxonomy
//! - [`utils`]: path and display helpers

pub mod config;
pub mod error;
pub mod types;
pub mod utils;

pub use config::{ChangeToken, ConfigTree, Section};
pub use error::{ChatError, ConfigError};
