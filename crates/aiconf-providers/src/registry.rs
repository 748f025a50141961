//! Provider registry: built-in provider specs, the ordered registry, and
//! section → provider resolution.
//!
//! Each `ProviderSpec` describes how to reach one OpenAI-compatible vendor:
//! base URI and host suffix for implicit matching, default API base, URL
//! layout and auth header. The registry holds providers in registration
//! order; that order breaks ties during endpoint matching.
//!
//! # Resolution
//! 1. `provider` set → exact, case-insensitive name lookup.
//! 2. `endpoint` set → longest matching base URI, else longest matching host
//!    suffix.
//! 3. Neither → the registry's default provider.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use aiconf_core::error::ConfigError;
use aiconf_core::Section;

use crate::http_provider::{HttpTransport, OpenAiCompatibleClient};
use crate::traits::{ChatClient, ChatProvider, ClientOptions};

/// Key naming an explicit provider.
pub const PROVIDER_KEY: &str = "provider";
/// Key holding the endpoint URI.
pub const ENDPOINT_KEY: &str = "endpoint";
/// Name of the provider used when a section names neither.
pub const DEFAULT_PROVIDER: &str = "openai";

// ─────────────────────────────────────────────
// ProviderSpec: static metadata for one provider
// ─────────────────────────────────────────────

/// How request URLs are laid out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UrlStyle {
    /// `{api_base}/chat/completions`
    ChatCompletions,
    /// `{endpoint}/openai/deployments/{model}/chat/completions?api-version=..`
    AzureDeployment,
}

/// How the API key is sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// `api-key: <key>`
    ApiKeyHeader,
}

/// Static specification describing one built-in provider.
#[derive(Clone, Debug)]
pub struct ProviderSpec {
    /// Registry name (e.g. `"xai"`).
    pub name: &'static str,
    /// Human-readable name for logs. E.g. `"xAI"`.
    pub display_name: &'static str,
    /// Base URI for longest-match endpoint resolution.
    pub base_uri: Option<&'static str>,
    /// Host suffix for endpoint resolution when no base URI matches.
    pub host_suffix: Option<&'static str>,
    /// API base used when the section sets no endpoint, or only the bare host.
    pub default_api_base: Option<&'static str>,
    pub url_style: UrlStyle,
    pub auth: AuthStyle,
}

/// Azure OpenAI API version used when the section sets no `apiversion`.
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-10-21";

/// Built-in providers, in registration order.
pub static PROVIDERS: &[ProviderSpec] = &[
    // 1. OpenAI: default
    ProviderSpec {
        name: "openai",
        display_name: "OpenAI",
        base_uri: Some("https://api.openai.com/"),
        host_suffix: None,
        default_api_base: Some("https://api.openai.com/v1"),
        url_style: UrlStyle::ChatCompletions,
        auth: AuthStyle::Bearer,
    },
    // 2. Azure OpenAI: per-resource hosts, deployment URLs
    ProviderSpec {
        name: "azure.openai",
        display_name: "Azure OpenAI",
        base_uri: None,
        host_suffix: Some(".openai.azure.com"),
        default_api_base: None,
        url_style: UrlStyle::AzureDeployment,
        auth: AuthStyle::ApiKeyHeader,
    },
    // 3. Azure AI model inference
    ProviderSpec {
        name: "azure.inference",
        display_name: "Azure AI Inference",
        base_uri: Some("https://models.inference.ai.azure.com/"),
        host_suffix: Some(".models.ai.azure.com"),
        default_api_base: Some("https://models.inference.ai.azure.com"),
        url_style: UrlStyle::ChatCompletions,
        auth: AuthStyle::Bearer,
    },
    // 4. xAI (Grok)
    ProviderSpec {
        name: "xai",
        display_name: "xAI",
        base_uri: Some("https://api.x.ai/"),
        host_suffix: Some(".x.ai"),
        default_api_base: Some("https://api.x.ai/v1"),
        url_style: UrlStyle::ChatCompletions,
        auth: AuthStyle::Bearer,
    },
    // 5. DeepSeek
    ProviderSpec {
        name: "deepseek",
        display_name: "DeepSeek",
        base_uri: Some("https://api.deepseek.com/"),
        host_suffix: None,
        default_api_base: Some("https://api.deepseek.com/v1"),
        url_style: UrlStyle::ChatCompletions,
        auth: AuthStyle::Bearer,
    },
    // 6. OpenRouter: gateway
    ProviderSpec {
        name: "openrouter",
        display_name: "OpenRouter",
        base_uri: Some("https://openrouter.ai/api/"),
        host_suffix: None,
        default_api_base: Some("https://openrouter.ai/api/v1"),
        url_style: UrlStyle::ChatCompletions,
        auth: AuthStyle::Bearer,
    },
    // 7. Groq
    ProviderSpec {
        name: "groq",
        display_name: "Groq",
        base_uri: Some("https://api.groq.com/openai/"),
        host_suffix: None,
        default_api_base: Some("https://api.groq.com/openai/v1"),
        url_style: UrlStyle::ChatCompletions,
        auth: AuthStyle::Bearer,
    },
];

/// Find a built-in spec by name (case-insensitive).
pub fn find_by_name(name: &str) -> Option<&'static ProviderSpec> {
    PROVIDERS.iter().find(|s| s.name.eq_ignore_ascii_case(name))
}

// ─────────────────────────────────────────────
// Built-in provider
// ─────────────────────────────────────────────

/// A [`ChatProvider`] backed by a built-in [`ProviderSpec`].
pub struct BuiltinProvider {
    spec: &'static ProviderSpec,
    base_uri: Option<Url>,
}

impl BuiltinProvider {
    pub fn new(spec: &'static ProviderSpec) -> Self {
        Self {
            spec,
            base_uri: spec.base_uri.and_then(|uri| Url::parse(uri).ok()),
        }
    }

    pub fn spec(&self) -> &'static ProviderSpec {
        self.spec
    }
}

#[async_trait]
impl ChatProvider for BuiltinProvider {
    fn name(&self) -> &str {
        self.spec.name
    }

    fn base_uri(&self) -> Option<&Url> {
        self.base_uri.as_ref()
    }

    fn host_suffix(&self) -> Option<&str> {
        self.spec.host_suffix
    }

    async fn create(&self, options: ClientOptions) -> Result<Box<dyn ChatClient>, ConfigError> {
        let transport = HttpTransport::from_options(self.spec, &options)?;
        Ok(Box::new(OpenAiCompatibleClient::new(transport, &options)))
    }
}

// ─────────────────────────────────────────────
// FnProvider: closure-backed provider
// ─────────────────────────────────────────────

type Factory = dyn Fn(ClientOptions) -> Result<Box<dyn ChatClient>, ConfigError> + Send + Sync;

/// A provider whose factory is a closure.
///
/// ```ignore
/// let provider = FnProvider::new("local", |options| {
///     Ok(Box::new(MyClient::new(options)) as Box<dyn ChatClient>)
/// })
/// .with_host_suffix(".internal");
/// ```
pub struct FnProvider {
    name: String,
    base_uri: Option<Url>,
    host_suffix: Option<String>,
    factory: Box<Factory>,
}

impl FnProvider {
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(ClientOptions) -> Result<Box<dyn ChatClient>, ConfigError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            base_uri: None,
            host_suffix: None,
            factory: Box::new(factory),
        }
    }

    pub fn with_base_uri(mut self, base_uri: Url) -> Self {
        self.base_uri = Some(base_uri);
        self
    }

    pub fn with_host_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.host_suffix = Some(suffix.into());
        self
    }
}

#[async_trait]
impl ChatProvider for FnProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn base_uri(&self) -> Option<&Url> {
        self.base_uri.as_ref()
    }

    fn host_suffix(&self) -> Option<&str> {
        self.host_suffix.as_deref()
    }

    async fn create(&self, options: ClientOptions) -> Result<Box<dyn ChatClient>, ConfigError> {
        (self.factory)(options)
    }
}

// ─────────────────────────────────────────────
// ProviderRegistry
// ─────────────────────────────────────────────

/// Ordered catalog of providers. Read-only once built.
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn ChatProvider>>,
    default_name: Option<String>,
}

impl ProviderRegistry {
    /// A registry with no providers and no default.
    pub fn empty() -> Self {
        Self {
            providers: Vec::new(),
            default_name: None,
        }
    }

    /// All built-in providers, with `openai` as the default.
    pub fn builtin() -> Self {
        Self {
            providers: PROVIDERS
                .iter()
                .map(|spec| Arc::new(BuiltinProvider::new(spec)) as Arc<dyn ChatProvider>)
                .collect(),
            default_name: Some(DEFAULT_PROVIDER.to_string()),
        }
    }

    /// Append a provider. Names must be unique case-insensitively.
    pub fn with_provider<P>(mut self, provider: P) -> Result<Self, ConfigError>
    where
        P: ChatProvider + 'static,
    {
        if self.get(provider.name()).is_some() {
            return Err(ConfigError::DuplicateProvider(provider.name().to_string()));
        }
        debug!(provider = provider.name(), "Registering provider");
        self.providers.push(Arc::new(provider));
        Ok(self)
    }

    /// Designate the provider used when a section names neither a provider
    /// nor an endpoint.
    pub fn with_default(mut self, name: impl Into<String>) -> Self {
        self.default_name = Some(name.into());
        self
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Case-insensitive lookup by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ChatProvider>> {
        self.providers
            .iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    pub fn default_provider(&self) -> Option<Arc<dyn ChatProvider>> {
        self.default_name.as_deref().and_then(|name| self.get(name))
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Select the provider for a client section.
    pub fn resolve(&self, section: &Section) -> Result<Arc<dyn ChatProvider>, ConfigError> {
        if let Some(name) = section.get(PROVIDER_KEY) {
            let name = name.trim();
            let provider = self.get(name).ok_or_else(|| ConfigError::UnknownProvider {
                section: section.path().to_string(),
                name: name.to_string(),
                available: self.names(),
            })?;
            debug!(section = section.path(), provider = provider.name(), "Explicit provider");
            return Ok(provider);
        }

        if let Some(endpoint) = parse_endpoint(section)? {
            let provider = self
                .match_base_uri(&endpoint)
                .or_else(|| self.match_host_suffix(&endpoint))
                .ok_or_else(|| ConfigError::NoProviderForEndpoint {
                    section: section.path().to_string(),
                    endpoint: endpoint.to_string(),
                    available: self.names(),
                })?;
            debug!(
                section = section.path(),
                endpoint = %endpoint,
                provider = provider.name(),
                "Provider matched by endpoint"
            );
            return Ok(provider);
        }

        let provider = self.default_provider().ok_or_else(|| ConfigError::NoDefaultProvider {
            section: section.path().to_string(),
        })?;
        debug!(section = section.path(), provider = provider.name(), "Default provider");
        Ok(provider)
    }

    /// Longest base URI matching the endpoint; earlier registration wins ties.
    fn match_base_uri(&self, endpoint: &Url) -> Option<Arc<dyn ChatProvider>> {
        let mut best: Option<(usize, &Arc<dyn ChatProvider>)> = None;
        for provider in &self.providers {
            let Some(base) = provider.base_uri() else {
                continue;
            };
            if !base_uri_matches(base, endpoint) {
                continue;
            }
            let len = base.as_str().len();
            if best.map_or(true, |(best_len, _)| len > best_len) {
                best = Some((len, provider));
            }
        }
        best.map(|(_, provider)| Arc::clone(provider))
    }

    /// Longest host suffix matching the endpoint host.
    fn match_host_suffix(&self, endpoint: &Url) -> Option<Arc<dyn ChatProvider>> {
        let host = endpoint.host_str()?.to_ascii_lowercase();
        let mut best: Option<(usize, &Arc<dyn ChatProvider>)> = None;
        for provider in &self.providers {
            let Some(suffix) = provider.host_suffix() else {
                continue;
            };
            let suffix = suffix.to_ascii_lowercase();
            if suffix.is_empty() {
                continue;
            }
            let longer = best.map_or(true, |(best_len, _)| suffix.len() > best_len);
            if longer && host.ends_with(&suffix) {
                best = Some((suffix.len(), provider));
            }
        }
        best.map(|(_, provider)| Arc::clone(provider))
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .field("default", &self.default_name)
            .finish()
    }
}

/// Parse the section's `endpoint`, if set.
///
/// The value must be an absolute URI with a host.
pub fn parse_endpoint(section: &Section) -> Result<Option<Url>, ConfigError> {
    let Some(raw) = section.get(ENDPOINT_KEY) else {
        return Ok(None);
    };
    let invalid = |reason: String| ConfigError::InvalidEndpoint {
        section: section.path().to_string(),
        endpoint: raw.clone(),
        reason,
    };
    let url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    if url.host_str().is_none() {
        return Err(invalid("endpoint has no host".to_string()));
    }
    Ok(Some(url))
}

/// Scheme and host equal; base path (trailing `/` trimmed) empty or a
/// prefix of the endpoint path.
fn base_uri_matches(base: &Url, endpoint: &Url) -> bool {
    if !base.scheme().eq_ignore_ascii_case(endpoint.scheme()) {
        return false;
    }
    let hosts_equal = match (base.host_str(), endpoint.host_str()) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    };
    if !hosts_equal {
        return false;
    }

    let base_path = base.path().trim_end_matches('/');
    base_path.is_empty() || endpoint.path().starts_with(base_path)
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use aiconf_core::ConfigTree;

    fn section(entries: &[(&str, &str)]) -> Section {
        let tree = ConfigTree::from_entries(
            entries
                .iter()
                .map(|(k, v)| (format!("ai:clients:test:{k}"), v.to_string())),
        );
        tree.section("ai:clients:test")
    }

    fn stub(name: &str) -> FnProvider {
        FnProvider::new(name, |_| {
            Err(ConfigError::NotFound("stub providers build nothing".into()))
        })
    }

    fn resolved_name(registry: &ProviderRegistry, entries: &[(&str, &str)]) -> String {
        registry.resolve(&section(entries)).unwrap().name().to_string()
    }

    // ── specs ──

    #[test]
    fn test_builtin_order_and_default() {
        let registry = ProviderRegistry::builtin();
        assert_eq!(registry.len(), PROVIDERS.len());
        assert_eq!(registry.names()[0], "openai");
        assert_eq!(registry.default_provider().unwrap().name(), "openai");
    }

    #[test]
    fn test_builtin_base_uris_parse() {
        for spec in PROVIDERS {
            if let Some(uri) = spec.base_uri {
                assert!(Url::parse(uri).is_ok(), "{} has bad base uri", spec.name);
            }
            if let Some(base) = spec.default_api_base {
                assert!(Url::parse(base).is_ok(), "{} has bad api base", spec.name);
            }
        }
    }

    #[test]
    fn test_find_by_name_case_insensitive() {
        assert_eq!(find_by_name("XAI").unwrap().name, "xai");
        assert_eq!(find_by_name("Azure.OpenAI").unwrap().auth, AuthStyle::ApiKeyHeader);
        assert!(find_by_name("nonexistent").is_none());
    }

    // ── explicit provider ──

    #[test]
    fn test_explicit_provider_wins_over_endpoint() {
        let registry = ProviderRegistry::builtin();
        let name = resolved_name(
            &registry,
            &[("provider", "DeepSeek"), ("endpoint", "https://api.x.ai/v1")],
        );
        assert_eq!(name, "deepseek");
    }

    #[test]
    fn test_unknown_provider_lists_names() {
        let registry = ProviderRegistry::builtin();
        let err = registry
            .resolve(&section(&[("provider", "nope")]))
            .err()
            .unwrap();
        match err {
            ConfigError::UnknownProvider { name, available, .. } => {
                assert_eq!(name, "nope");
                assert_eq!(available, registry.names());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    // ── endpoint matching ──

    #[test]
    fn test_bare_xai_endpoint_resolves_to_xai() {
        let registry = ProviderRegistry::builtin();
        assert_eq!(resolved_name(&registry, &[("endpoint", "https://api.x.ai")]), "xai");
    }

    #[test]
    fn test_longer_base_uri_wins() {
        let registry = ProviderRegistry::empty()
            .with_provider(stub("root").with_base_uri(Url::parse("https://api.x.ai/").unwrap()))
            .unwrap()
            .with_provider(stub("v1").with_base_uri(Url::parse("https://api.x.ai/v1").unwrap()))
            .unwrap();

        assert_eq!(resolved_name(&registry, &[("endpoint", "https://api.x.ai/v1")]), "v1");
        assert_eq!(
            resolved_name(&registry, &[("endpoint", "https://api.x.ai/v1/chat/completions")]),
            "v1"
        );
        assert_eq!(resolved_name(&registry, &[("endpoint", "https://api.x.ai/v2")]), "root");
        assert_eq!(resolved_name(&registry, &[("endpoint", "https://api.x.ai/v10")]), "v1");
        assert_eq!(
            resolved_name(&registry, &[("endpoint", "https://api.x.ai/v1beta/chat")]),
            "v1"
        );
    }

    #[test]
    fn test_equal_base_uris_resolve_by_registration_order() {
        let base = Url::parse("https://llm.example.com/").unwrap();
        let registry = ProviderRegistry::empty()
            .with_provider(stub("first").with_base_uri(base.clone()))
            .unwrap()
            .with_provider(stub("second").with_base_uri(base))
            .unwrap();
        assert_eq!(
            resolved_name(&registry, &[("endpoint", "https://llm.example.com/v1")]),
            "first"
        );
    }

    #[test]
    fn test_base_uri_requires_same_scheme_and_host() {
        let registry = ProviderRegistry::empty()
            .with_provider(stub("tls").with_base_uri(Url::parse("https://llm.local/").unwrap()))
            .unwrap();
        assert!(registry
            .resolve(&section(&[("endpoint", "http://llm.local/")]))
            .is_err());
        assert!(registry
            .resolve(&section(&[("endpoint", "https://other.local/")]))
            .is_err());
        assert_eq!(resolved_name(&registry, &[("endpoint", "https://LLM.local:443/x")]), "tls");
        assert_eq!(resolved_name(&registry, &[("endpoint", "https://llm.local:8443/")]), "tls");
    }

    #[test]
    fn test_host_suffix_matches_azure_resources() {
        let registry = ProviderRegistry::builtin();
        assert_eq!(
            resolved_name(&registry, &[("endpoint", "https://my-res.openai.azure.com/")]),
            "azure.openai"
        );
        assert_eq!(
            resolved_name(&registry, &[("endpoint", "https://phi.eastus.models.ai.azure.com")]),
            "azure.inference"
        );
    }

    #[test]
    fn test_host_suffix_is_case_insensitive_ends_with() {
        let registry = ProviderRegistry::empty()
            .with_provider(stub("corp").with_host_suffix(".Corp.net"))
            .unwrap();
        assert_eq!(resolved_name(&registry, &[("endpoint", "https://llm.corp.net")]), "corp");
        assert_eq!(resolved_name(&registry, &[("endpoint", "https://LLM.CORP.NET/v1")]), "corp");
        assert!(registry
            .resolve(&section(&[("endpoint", "https://corp.net")]))
            .is_err());
        assert!(registry
            .resolve(&section(&[("endpoint", "https://evilcorp.net")]))
            .is_err());
    }

    #[test]
    fn test_longest_host_suffix_wins() {
        let registry = ProviderRegistry::empty()
            .with_provider(stub("short").with_host_suffix(".net"))
            .unwrap()
            .with_provider(stub("long").with_host_suffix(".corp.net"))
            .unwrap();
        assert_eq!(resolved_name(&registry, &[("endpoint", "https://a.corp.net")]), "long");
        assert_eq!(resolved_name(&registry, &[("endpoint", "https://a.other.net")]), "short");
    }

    #[test]
    fn test_base_uri_beats_host_suffix() {
        let registry = ProviderRegistry::empty()
            .with_provider(stub("suffix").with_host_suffix(".example.com"))
            .unwrap()
            .with_provider(stub("base").with_base_uri(Url::parse("https://api.example.com/").unwrap()))
            .unwrap();
        assert_eq!(resolved_name(&registry, &[("endpoint", "https://api.example.com/v1")]), "base");
    }

    #[test]
    fn test_unmatched_endpoint_is_error() {
        let registry = ProviderRegistry::builtin();
        let err = registry
            .resolve(&section(&[("endpoint", "https://llm.unknown.dev")]))
            .err()
            .unwrap();
        match err {
            ConfigError::NoProviderForEndpoint { endpoint, available, .. } => {
                assert!(endpoint.starts_with("https://llm.unknown.dev"));
                assert!(available.contains(&"xai".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_relative_endpoint_is_invalid() {
        let registry = ProviderRegistry::builtin();
        let err = registry
            .resolve(&section(&[("endpoint", "/v1/chat")]))
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::InvalidEndpoint { .. }));
    }

    // ── default ──

    #[test]
    fn test_default_when_nothing_set() {
        let registry = ProviderRegistry::builtin();
        assert_eq!(resolved_name(&registry, &[("modelid", "gpt-4.1")]), "openai");
    }

    #[test]
    fn test_no_default_is_error() {
        let registry = ProviderRegistry::empty();
        let err = registry.resolve(&section(&[("modelid", "m")])).err().unwrap();
        assert!(matches!(err, ConfigError::NoDefaultProvider { .. }));
    }

    // ── registration ──

    #[test]
    fn test_duplicate_provider_name_rejected() {
        let result = ProviderRegistry::builtin().with_provider(stub("OpenAI"));
        assert!(matches!(result, Err(ConfigError::DuplicateProvider(name)) if name == "OpenAI"));
    }

    #[test]
    fn test_custom_default() {
        let registry = ProviderRegistry::builtin().with_default("groq");
        assert_eq!(resolved_name(&registry, &[]), "groq");
    }
}
