//! Error taxonomy.
//!
//! [`ConfigError`] covers everything that goes wrong while turning a section
//! into a client: missing keys, unresolvable secrets, unknown providers,
//! identity changes on reload. [`ChatError`] covers dispatch: transport
//! failures are passed through from the vendor client untouched.

/// Configuration error raised while resolving or reloading a client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A required key is absent from the section.
    #[error("missing required key '{key}' in section '{section}'")]
    MissingKey { section: String, key: String },

    /// No api key in the section, its indirection target, or any ancestor.
    #[error("no api key found for section '{section}' or any of its ancestors")]
    ApiKeyNotFound { section: String },

    /// The api key points at a configuration path that holds nothing.
    #[error("api key for section '{section}' points to '{target}', which is not set")]
    ApiKeyIndirection { section: String, target: String },

    /// An explicit `provider` name is not registered.
    #[error(
        "unknown provider '{name}' in section '{section}'. Registered providers: {names}",
        names = .available.join(", ")
    )]
    UnknownProvider {
        section: String,
        name: String,
        available: Vec<String>,
    },

    /// The `endpoint` matched no base URI and no host suffix.
    #[error(
        "no provider matches endpoint '{endpoint}' in section '{section}'. Registered providers: {names}",
        names = .available.join(", ")
    )]
    NoProviderForEndpoint {
        section: String,
        endpoint: String,
        available: Vec<String>,
    },

    /// The `endpoint` is not an absolute URI.
    #[error("invalid endpoint '{endpoint}' in section '{section}': {reason}")]
    InvalidEndpoint {
        section: String,
        endpoint: String,
        reason: String,
    },

    /// Neither `provider` nor `endpoint` is set and the registry has no default.
    #[error("section '{section}' names no provider or endpoint and no default provider is registered")]
    NoDefaultProvider { section: String },

    /// A reload read a different id for a live client.
    #[error("client '{id}' at '{section}' cannot be renamed to '{new_id}' while running")]
    IdChanged {
        id: String,
        section: String,
        new_id: String,
    },

    /// Two declarations produce the same id.
    #[error("duplicate id '{id}' declared at '{first}' and '{second}'")]
    DuplicateId {
        id: String,
        first: String,
        second: String,
    },

    /// Two providers registered under the same name.
    #[error("duplicate provider name '{0}'")]
    DuplicateProvider(String),

    /// A value is present but unusable.
    #[error("invalid value '{value}' for '{key}' in section '{section}'")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },

    /// No client or agent is registered under the requested id.
    #[error("no client or agent registered as '{0}'")]
    NotFound(String),

    /// The provider factory rejected the section.
    #[error("provider '{provider}' could not create a client for '{section}': {message}")]
    ProviderFailed {
        provider: String,
        section: String,
        message: String,
    },
}

/// Error returned from a chat dispatch.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The request never produced an HTTP response.
    #[error("request to {provider} failed: {message}")]
    Transport { provider: String, message: String },

    /// The vendor answered with a non-success status.
    #[error("{provider} returned {status}: {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },

    /// The vendor answered with a body we could not interpret.
    #[error("invalid response from {provider}: {message}")]
    InvalidResponse { provider: String, message: String },

    /// The caller's cancellation token fired.
    #[error("request cancelled")]
    Cancelled,

    /// The client was disposed before or during the call.
    #[error("client '{0}' has been disposed")]
    Disposed(String),

    /// The client behind an agent could not be resolved.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
