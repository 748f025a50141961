//! Client and provider traits: the narrow contract between the hot-reload
//! engine and vendor integrations.
//!
//! A [`ChatProvider`] is registered once at startup. Given a resolved
//! configuration section it produces a [`ChatClient`]; the engine never looks
//! inside either beyond this surface.

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;
use url::Url;

use aiconf_core::error::{ChatError, ConfigError};
use aiconf_core::types::{ChatOptions, ChatResponse, ChatResponseUpdate, ClientMetadata, Message};
use aiconf_core::Section;

/// Stream of incremental updates from a streaming dispatch.
pub type ChatStream = BoxStream<'static, Result<ChatResponseUpdate, ChatError>>;

/// A chat completion client bound to one vendor endpoint.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send a chat request and wait for the full response.
    ///
    /// `options.model_id` overrides the client's default model. The call
    /// resolves to [`ChatError::Cancelled`] once `cancel` fires.
    async fn get_response(
        &self,
        messages: &[Message],
        options: &ChatOptions,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, ChatError>;

    /// Send a chat request and stream incremental updates.
    fn get_streaming_response(
        &self,
        messages: Vec<Message>,
        options: ChatOptions,
        cancel: CancellationToken,
    ) -> ChatStream;

    /// Provider name, endpoint and default model of this client.
    fn metadata(&self) -> ClientMetadata;
}

/// Everything a provider needs to build a client for one declaration.
#[derive(Clone, Debug)]
pub struct ClientOptions {
    /// Client id the declaration resolved to.
    pub id: String,
    /// Default model (`modelid`).
    pub model_id: String,
    /// Resolved API key, after inheritance and indirection.
    pub api_key: String,
    /// Parsed `endpoint`, if the section sets one.
    pub endpoint: Option<Url>,
    /// The declaring section, for provider-specific keys.
    pub section: Section,
}

impl ClientOptions {
    pub fn section_path(&self) -> &str {
        self.section.path()
    }
}

/// A named vendor integration.
///
/// Providers advertise an optional base URI and host suffix so that a
/// section's `endpoint` can select them implicitly.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Registry name, matched case-insensitively against `provider`.
    fn name(&self) -> &str;

    /// Base URI for longest-match endpoint resolution.
    fn base_uri(&self) -> Option<&Url> {
        None
    }

    /// Host suffix (e.g. `.openai.azure.com`) used when no base URI matches.
    fn host_suffix(&self) -> Option<&str> {
        None
    }

    /// Build a client from a resolved section.
    async fn create(&self, options: ClientOptions) -> Result<Box<dyn ChatClient>, ConfigError>;
}
