//! Generic HTTP client for OpenAI-compatible APIs.
//!
//! Every built-in provider talks to a `/chat/completions` endpoint through
//! this module. The work is split in two:
//!
//! - [`HttpTransport`]: the pooled `reqwest::Client`, API base, auth and
//!   extra headers. Built once per resolved client.
//! - [`ModelBinding`]: the transport bound to one model and its request URL.
//!   Cheap; one per model id, memoized in the client's [`ModelCache`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use url::Url;

use aiconf_core::error::{ChatError, ConfigError};
use aiconf_core::types::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatOptions, ChatResponse,
    ClientMetadata, Message,
};
use aiconf_core::utils::mask_secret;
use aiconf_core::Section;

use crate::model_cache::ModelCache;
use crate::registry::{AuthStyle, ProviderSpec, UrlStyle, DEFAULT_AZURE_API_VERSION};
use crate::traits::{ChatClient, ChatStream, ClientOptions};

/// Request timeout for every provider.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Section key holding the Azure API version.
pub const API_VERSION_KEY: &str = "apiversion";
/// Section holding extra request headers (`headers:<Header-Name>`).
pub const HEADERS_KEY: &str = "headers";

// ─────────────────────────────────────────────
// HttpTransport
// ─────────────────────────────────────────────

/// Connection-level state shared by every model of one client.
pub struct HttpTransport {
    /// HTTP client (shared, connection-pooled).
    client: reqwest::Client,
    /// Provider name, for errors and logs.
    provider: String,
    /// API base (e.g. `https://api.x.ai/v1`), or the Azure resource endpoint.
    api_base: Url,
    api_key: String,
    auth: AuthStyle,
    url_style: UrlStyle,
    /// Azure `api-version` query value.
    api_version: String,
    /// Extra headers sent with each request.
    extra_headers: HeaderMap,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("provider", &self.provider)
            .field("api_base", &self.api_base.as_str())
            .field("api_key", &mask_secret(&self.api_key))
            .field("url_style", &self.url_style)
            .finish()
    }
}

impl HttpTransport {
    /// Build the transport for a resolved section.
    ///
    /// The API base is the section's `endpoint` when it carries a path, the
    /// spec's default API base when the endpoint is the vendor's bare host or
    /// absent. Azure deployments require an endpoint.
    pub fn from_options(spec: &ProviderSpec, options: &ClientOptions) -> Result<Self, ConfigError> {
        let api_base = select_api_base(spec, options)?;
        let api_version = options
            .section
            .get(API_VERSION_KEY)
            .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string());

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ConfigError::ProviderFailed {
                provider: spec.name.to_string(),
                section: options.section_path().to_string(),
                message: e.to_string(),
            })?;

        debug!(
            provider = spec.display_name,
            section = options.section_path(),
            api_base = %api_base,
            "Creating HTTP transport"
        );

        Ok(Self {
            client,
            provider: spec.name.to_string(),
            api_base,
            api_key: options.api_key.clone(),
            auth: spec.auth,
            url_style: spec.url_style,
            api_version,
            extra_headers: extra_headers(&options.section),
        })
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    /// Full chat completions URL for `model`.
    pub fn completions_url(&self, model: &str) -> String {
        let base = self.api_base.as_str().trim_end_matches('/');
        match self.url_style {
            UrlStyle::ChatCompletions => format!("{base}/chat/completions"),
            UrlStyle::AzureDeployment => format!(
                "{base}/openai/deployments/{model}/chat/completions?api-version={}",
                self.api_version
            ),
        }
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self.client.post(url).headers(self.extra_headers.clone());
        match self.auth {
            AuthStyle::Bearer => request.bearer_auth(&self.api_key),
            AuthStyle::ApiKeyHeader => request.header("api-key", &self.api_key),
        }
    }
}

fn select_api_base(spec: &ProviderSpec, options: &ClientOptions) -> Result<Url, ConfigError> {
    let default = spec.default_api_base.and_then(|base| Url::parse(base).ok());
    let missing_endpoint = || ConfigError::MissingKey {
        section: options.section_path().to_string(),
        key: crate::registry::ENDPOINT_KEY.to_string(),
    };

    match (&options.endpoint, default) {
        (None, _) if spec.url_style == UrlStyle::AzureDeployment => Err(missing_endpoint()),
        (None, Some(default)) => Ok(default),
        (None, None) => Err(missing_endpoint()),
        (Some(endpoint), Some(default))
            if endpoint.path() == "/"
                && endpoint.scheme() == default.scheme()
                && endpoint.host_str() == default.host_str() =>
        {
            Ok(default)
        }
        (Some(endpoint), _) => Ok(endpoint.clone()),
    }
}

fn extra_headers(section: &Section) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (key, value) in section.child(HEADERS_KEY).entries() {
        if let (Ok(name), Ok(val)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            headers.insert(name, val);
        } else {
            warn!(section = section.path(), header = %key, "Invalid header, skipping");
        }
    }
    headers
}

// ─────────────────────────────────────────────
// ModelBinding
// ─────────────────────────────────────────────

/// A transport bound to one model.
#[derive(Debug)]
pub struct ModelBinding {
    transport: Arc<HttpTransport>,
    model: String,
    url: String,
}

impl ModelBinding {
    pub fn new(transport: Arc<HttpTransport>, model: &str) -> Self {
        let url = transport.completions_url(model);
        Self {
            transport,
            model: model.to_string(),
            url,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST the request and check the status.
    async fn send(&self, body: &ChatCompletionRequest) -> Result<reqwest::Response, ChatError> {
        let provider = self.transport.provider();
        debug!(
            provider,
            model = %self.model,
            messages = body.messages.len(),
            stream = body.stream,
            "Calling chat completions"
        );

        let response = self
            .transport
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!(provider, error = %e, "HTTP request failed");
                ChatError::Transport {
                    provider: provider.to_string(),
                    message: e.to_string(),
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(provider, status = %status, body = %body, "API error");
            return Err(ChatError::Status {
                provider: provider.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Non-streaming completion.
    pub async fn complete(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<ChatResponse, ChatError> {
        let provider = self.transport.provider();
        let body = ChatCompletionRequest::new(&self.model, messages, options, false);
        let response = self.send(&body).await?;

        let parsed = response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| {
                error!(provider, error = %e, "Failed to parse chat response");
                ChatError::InvalidResponse {
                    provider: provider.to_string(),
                    message: e.to_string(),
                }
            })?;

        let response = parsed
            .into_response(&self.model)
            .ok_or_else(|| ChatError::InvalidResponse {
                provider: provider.to_string(),
                message: "response has no choices".to_string(),
            })?;

        debug!(
            provider,
            has_content = response.content.is_some(),
            tool_calls = response.tool_calls.len(),
            finish_reason = response.finish_reason.as_deref().unwrap_or("?"),
            "Chat response received"
        );
        Ok(response)
    }

    /// Streaming completion over server-sent events.
    ///
    /// Yields one update per `data:` line until `[DONE]` or end of body.
    /// Cancelling `cancel` ends the stream with [`ChatError::Cancelled`].
    pub fn stream(
        self: Arc<Self>,
        messages: Vec<Message>,
        options: ChatOptions,
        cancel: CancellationToken,
    ) -> ChatStream {
        let stream = async_stream::stream! {
            let provider = self.transport.provider().to_string();
            let body = ChatCompletionRequest::new(&self.model, &messages, &options, true);

            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = self.send(&body) => Some(result),
            };
            let response = match sent {
                None => {
                    yield Err(ChatError::Cancelled);
                    return;
                }
                Some(Err(e)) => {
                    yield Err(e);
                    return;
                }
                Some(Ok(response)) => response,
            };

            let mut bytes = Box::pin(response.bytes_stream());
            let mut buffer: Vec<u8> = Vec::new();
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    chunk = bytes.next() => Some(chunk),
                };
                let chunk = match next {
                    None => {
                        yield Err(ChatError::Cancelled);
                        return;
                    }
                    Some(None) => break,
                    Some(Some(Err(e))) => {
                        yield Err(ChatError::Transport {
                            provider: provider.clone(),
                            message: e.to_string(),
                        });
                        return;
                    }
                    Some(Some(Ok(chunk))) => chunk,
                };
                buffer.extend_from_slice(&chunk);

                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    match parse_sse_line(&line) {
                        SseLine::Skip => {}
                        SseLine::Done => return,
                        SseLine::Chunk(data) => match serde_json::from_str::<ChatCompletionChunk>(&data) {
                            Ok(chunk) => yield Ok(chunk.into()),
                            Err(e) => {
                                yield Err(ChatError::InvalidResponse {
                                    provider: provider.clone(),
                                    message: e.to_string(),
                                });
                                return;
                            }
                        },
                    }
                }
            }
        };
        Box::pin(stream)
    }
}

enum SseLine {
    Skip,
    Done,
    Chunk(String),
}

fn parse_sse_line(line: &[u8]) -> SseLine {
    let line = String::from_utf8_lossy(line);
    let Some(data) = line.trim().strip_prefix("data:") else {
        return SseLine::Skip;
    };
    match data.trim() {
        "" => SseLine::Skip,
        "[DONE]" => SseLine::Done,
        data => SseLine::Chunk(data.to_string()),
    }
}

// ─────────────────────────────────────────────
// OpenAiCompatibleClient
// ─────────────────────────────────────────────

/// A [`ChatClient`] for any OpenAI-compatible API.
pub struct OpenAiCompatibleClient {
    transport: Arc<HttpTransport>,
    models: ModelCache<ModelBinding>,
    metadata: ClientMetadata,
}

impl fmt::Debug for OpenAiCompatibleClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiCompatibleClient")
            .field("transport", &self.transport)
            .field("default_model", &self.metadata.default_model_id)
            .field("cached_models", &self.models.len())
            .finish()
    }
}

impl OpenAiCompatibleClient {
    pub fn new(transport: HttpTransport, options: &ClientOptions) -> Self {
        let metadata = ClientMetadata {
            provider_name: transport.provider().to_string(),
            provider_uri: Some(transport.api_base().clone()),
            default_model_id: options.model_id.clone(),
            id: options.id.clone(),
            section_path: options.section_path().to_string(),
        };
        Self {
            transport: Arc::new(transport),
            models: ModelCache::new(),
            metadata,
        }
    }

    /// Binding for the requested model, or the default model.
    pub fn binding(&self, model_id: Option<&str>) -> Arc<ModelBinding> {
        let model = model_id
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(self.metadata.default_model_id.as_str());
        self.models
            .get_or_create(model, |m| ModelBinding::new(Arc::clone(&self.transport), m))
    }

    pub fn models(&self) -> &ModelCache<ModelBinding> {
        &self.models
    }

    pub fn transport(&self) -> &HttpTransport {
        &self.transport
    }
}

#[async_trait]
impl ChatClient for OpenAiCompatibleClient {
    async fn get_response(
        &self,
        messages: &[Message],
        options: &ChatOptions,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, ChatError> {
        let binding = self.binding(options.model_id.as_deref());
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ChatError::Cancelled),
            result = binding.complete(messages, options) => result,
        }
    }

    fn get_streaming_response(
        &self,
        messages: Vec<Message>,
        options: ChatOptions,
        cancel: CancellationToken,
    ) -> ChatStream {
        self.binding(options.model_id.as_deref())
            .stream(messages, options, cancel)
    }

    fn metadata(&self) -> ClientMetadata {
        self.metadata.clone()
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
