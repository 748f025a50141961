//! API key resolution.
//!
//! A section's `apikey` is, in order of precedence:
//!
//! 1. a literal secret;
//! 2. an indirection, written as a colon-delimited configuration path
//!    (`secrets:xai`), naming either a value or a section holding `apikey`;
//! 3. absent, in which case the nearest ancestor's `apikey` applies, itself
//!    subject to 1 and 2.
//!
//! Indirections are followed one level only.

use tracing::debug;

use aiconf_core::config::path::{looks_like_path, normalize_path};
use aiconf_core::error::ConfigError;
use aiconf_core::Section;

/// Key holding the API key in a client section.
pub const API_KEY: &str = "apikey";

/// Resolves the API key for a client section.
pub struct ApiKeyResolver;

impl ApiKeyResolver {
    /// Resolve the API key for `section`.
    pub fn resolve(section: &Section) -> Result<String, ConfigError> {
        let mut holder = Some(section.clone());
        while let Some(current) = holder {
            if let Some(value) = current.get(API_KEY) {
                if current.path() != section.path() {
                    debug!(section = section.path(), from = current.path(), "Inherited api key");
                }
                return Self::dereference(section, &current, value.trim());
            }
            holder = current.parent();
        }
        Err(ConfigError::ApiKeyNotFound {
            section: section.path().to_string(),
        })
    }

    fn dereference(origin: &Section, holder: &Section, value: &str) -> Result<String, ConfigError> {
        if !looks_like_path(value) {
            return Ok(value.to_string());
        }

        let target = normalize_path(value);
        let tree = holder.tree();
        let direct = tree.get(&target).filter(|v| !v.trim().is_empty());
        if let Some(secret) = direct.or_else(|| tree.section(&target).get(API_KEY)) {
            debug!(section = origin.path(), target = %target, "Followed api key indirection");
            return Ok(secret.trim().to_string());
        }

        Err(ConfigError::ApiKeyIndirection {
            section: origin.path().to_string(),
            target,
        })
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
