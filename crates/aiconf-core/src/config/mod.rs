//! Configuration system: the live tree, sections, change tokens, file
//! loading and hot reload.
//!
//! # Usage
//! ```no_run
//! use aiconf_core::config;
//!
//! let tree = config::load_config(None);
//! let section = tree.section("ai:clients:openai");
//! println!("Model: {:?}", section.get("modelid"));
//! ```

pub mod change;
pub mod loader;
pub mod path;
pub mod section;
pub mod tree;
pub mod watcher;

// Re-export key types
pub use change::ChangeToken;
pub use loader::{get_config_path, load_config, reload_config};
pub use section::Section;
pub use tree::{ConfigBatch, ConfigTree};
pub use watcher::{ConfigFileWatcher, WatcherHandle};
