//! Configurable client: a long-lived, hot-reloading chat client handle.
//!
//! A `ConfigurableClient` owns exactly one resolved inner client at a time.
//! Resolution reads the declaring section, resolves the API key and the
//! provider, and asks the provider for a client. When the tree changes the
//! section is re-read; if anything the client depends on differs, a new inner
//! client is built off to the side and swapped in with one pointer write.
//!
//! Dispatches take a snapshot of the current state before calling out, so a
//! request that started before a swap completes against the client it
//! started with. The previous state is released once the swap is visible
//! and the last in-flight request holding it has finished.
//!
//! ```text
//! Uninitialized ──create──▶ Active ──dispose──▶ Disposed
//!                             │  ▲
//!                      change │  │ swap (or keep old state on error)
//!                             ▼  │
//!                            Reload
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::RwLock;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use aiconf_core::error::{ChatError, ConfigError};
use aiconf_core::types::{ChatOptions, ChatResponse, ChatResponseUpdate, ClientMetadata, Message};
use aiconf_core::{ConfigTree, Section};
use aiconf_providers::registry::parse_endpoint;
use aiconf_providers::{ChatClient, ChatProvider, ChatStream, ClientOptions, ProviderRegistry};

use crate::apikey::ApiKeyResolver;
use crate::scanner::{ClientDescriptor, ID_KEY, MODEL_ID_KEY};
use crate::watch::{spawn_watch_loop, OnChange};

/// Capacity of the per-client event channel.
const EVENT_CAPACITY: usize = 16;

/// Lifecycle notifications published by a [`ConfigurableClient`].
#[derive(Clone, Debug)]
pub enum ClientEvent {
    /// A new inner client was installed.
    Reloaded { metadata: ClientMetadata },
    /// Re-resolution failed; the previous client stays active.
    ReloadFailed { id: String, error: ConfigError },
    /// The client was disposed.
    Disposed { id: String },
}

// ─────────────────────────────────────────────
// Resolution
// ─────────────────────────────────────────────

/// Everything a build depends on. Two equal fingerprints build equal clients.
#[derive(PartialEq, Eq)]
struct Fingerprint {
    provider: String,
    api_key: String,
    entries: Vec<(String, String)>,
}

/// Settings read from the tree, not yet built into a client.
struct Resolution {
    provider: Arc<dyn ChatProvider>,
    options: ClientOptions,
    fingerprint: Fingerprint,
}

impl Resolution {
    fn read(
        descriptor: &ClientDescriptor,
        section: &Section,
        providers: &ProviderRegistry,
    ) -> Result<Self, ConfigError> {
        let model_id = section
            .get(MODEL_ID_KEY)
            .map(|m| m.trim().to_string())
            .ok_or_else(|| ConfigError::MissingKey {
                section: section.path().to_string(),
                key: MODEL_ID_KEY.to_string(),
            })?;
        let id = section
            .get(ID_KEY)
            .map(|id| id.trim().to_string())
            .unwrap_or_else(|| descriptor.name.clone());

        let api_key = ApiKeyResolver::resolve(section)?;
        let provider = providers.resolve(section)?;
        let endpoint = parse_endpoint(section)?;

        let fingerprint = Fingerprint {
            provider: provider.name().to_ascii_lowercase(),
            api_key: api_key.clone(),
            entries: section
                .entries()
                .into_iter()
                .map(|(key, value)| (key.to_lowercase(), value))
                .collect(),
        };

        Ok(Self {
            provider,
            options: ClientOptions {
                id,
                model_id,
                api_key,
                endpoint,
                section: section.clone(),
            },
            fingerprint,
        })
    }

    async fn build(self) -> Result<ResolvedState, ConfigError> {
        let provider = self.provider;
        let options = self.options;
        let client = provider.create(options.clone()).await?;

        let mut metadata = client.metadata();
        metadata.id = options.id.clone();
        metadata.section_path = options.section_path().to_string();
        metadata.provider_name = provider.name().to_string();
        if metadata.default_model_id.is_empty() {
            metadata.default_model_id = options.model_id.clone();
        }
        if metadata.provider_uri.is_none() {
            metadata.provider_uri = options
                .endpoint
                .clone()
                .or_else(|| provider.base_uri().cloned());
        }

        Ok(ResolvedState {
            client,
            metadata,
            fingerprint: self.fingerprint,
        })
    }
}

/// One installed inner client.
struct ResolvedState {
    client: Box<dyn ChatClient>,
    metadata: ClientMetadata,
    fingerprint: Fingerprint,
}

struct Shared {
    /// `None` once disposed.
    current: Option<Arc<ResolvedState>>,
    /// Last installed metadata; kept after dispose.
    metadata: ClientMetadata,
}

// ─────────────────────────────────────────────
// ConfigurableClient
// ─────────────────────────────────────────────

/// A chat client that follows its configuration section.
pub struct ConfigurableClient {
    descriptor: ClientDescriptor,
    section: Section,
    providers: Arc<ProviderRegistry>,
    shared: RwLock<Shared>,
    /// Serializes reloads.
    reload_lock: Mutex<()>,
    shutdown: CancellationToken,
    events: broadcast::Sender<ClientEvent>,
}

impl ConfigurableClient {
    /// Resolve and build the client declared by `descriptor`, then start
    /// watching the tree.
    ///
    /// Fails if the declaration cannot be resolved; nothing is left running
    /// in that case.
    pub async fn create(
        descriptor: ClientDescriptor,
        tree: &ConfigTree,
        providers: Arc<ProviderRegistry>,
    ) -> Result<Arc<Self>, ConfigError> {
        let section = tree.section(&descriptor.section_path);

        // Arm before the first read so no edit is missed.
        let token = tree.change_token();
        let state = Resolution::read(&descriptor, &section, &providers)?.build().await?;

        if state.metadata.id != descriptor.id {
            return Err(ConfigError::IdChanged {
                id: descriptor.id.clone(),
                section: descriptor.section_path.clone(),
                new_id: state.metadata.id.clone(),
            });
        }

        info!(
            id = %descriptor.id,
            section = %descriptor.section_path,
            provider = %state.metadata.provider_name,
            model = %state.metadata.default_model_id,
            "Client created"
        );

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let client = Arc::new(Self {
            descriptor,
            section,
            providers,
            shared: RwLock::new(Shared {
                metadata: state.metadata.clone(),
                current: Some(Arc::new(state)),
            }),
            reload_lock: Mutex::new(()),
            shutdown: CancellationToken::new(),
            events,
        });

        spawn_watch_loop(&client, tree.clone(), token, client.shutdown.clone());
        Ok(client)
    }

    /// Id the client was declared under. Never changes.
    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    /// Declaring section path. Never changes.
    pub fn section_path(&self) -> &str {
        &self.descriptor.section_path
    }

    pub fn descriptor(&self) -> &ClientDescriptor {
        &self.descriptor
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.read().current.is_none()
    }

    fn snapshot(&self) -> Result<Arc<ResolvedState>, ChatError> {
        self.shared
            .read()
            .current
            .clone()
            .ok_or_else(|| ChatError::Disposed(self.descriptor.id.clone()))
    }

    /// Re-read the section and swap in a new inner client if it changed.
    ///
    /// Returns whether a new client was installed. On error the current
    /// client stays active and a [`ClientEvent::ReloadFailed`] is published.
    pub async fn reload(&self) -> Result<bool, ConfigError> {
        let _guard = self.reload_lock.lock().await;

        let Ok(current) = self.snapshot() else {
            return Ok(false);
        };

        match self.rebuild(&current).await {
            Ok(Some(state)) => {
                let metadata = state.metadata.clone();
                let previous = {
                    let mut shared = self.shared.write();
                    if shared.current.is_none() {
                        debug!(id = %self.descriptor.id, "Disposed during reload, discarding");
                        return Ok(false);
                    }
                    shared.metadata = metadata.clone();
                    shared.current.replace(Arc::new(state))
                };
                // Released after the swap is visible.
                drop(previous);

                info!(
                    id = %self.descriptor.id,
                    provider = %metadata.provider_name,
                    model = %metadata.default_model_id,
                    "Client reloaded"
                );
                let _ = self.events.send(ClientEvent::Reloaded { metadata });
                Ok(true)
            }
            Ok(None) => {
                debug!(id = %self.descriptor.id, "Section unchanged, keeping client");
                Ok(false)
            }
            Err(error) => {
                warn!(
                    id = %self.descriptor.id,
                    section = %self.descriptor.section_path,
                    error = %error,
                    "Client reload failed, keeping previous client"
                );
                let _ = self.events.send(ClientEvent::ReloadFailed {
                    id: self.descriptor.id.clone(),
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }

    /// Build the replacement state, or `None` if nothing relevant changed.
    async fn rebuild(&self, current: &ResolvedState) -> Result<Option<ResolvedState>, ConfigError> {
        let resolution = Resolution::read(&self.descriptor, &self.section, &self.providers)?;

        if resolution.options.id != self.descriptor.id {
            return Err(ConfigError::IdChanged {
                id: self.descriptor.id.clone(),
                section: self.descriptor.section_path.clone(),
                new_id: resolution.options.id,
            });
        }
        if resolution.fingerprint == current.fingerprint {
            return Ok(None);
        }
        resolution.build().await.map(Some)
    }

    /// Stop watching and release the inner client. Later dispatches fail
    /// with [`ChatError::Disposed`]. Idempotent.
    pub fn dispose(&self) {
        self.shutdown.cancel();
        let previous = self.shared.write().current.take();
        if previous.is_some() {
            drop(previous);
            info!(id = %self.descriptor.id, "Client disposed");
            let _ = self.events.send(ClientEvent::Disposed {
                id: self.descriptor.id.clone(),
            });
        }
    }
}

#[async_trait]
impl ChatClient for ConfigurableClient {
    async fn get_response(
        &self,
        messages: &[Message],
        options: &ChatOptions,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, ChatError> {
        let state = self.snapshot()?;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ChatError::Cancelled),
            result = state.client.get_response(messages, options, cancel) => result,
        }
    }

    fn get_streaming_response(
        &self,
        messages: Vec<Message>,
        options: ChatOptions,
        cancel: CancellationToken,
    ) -> ChatStream {
        let state = match self.snapshot() {
            Ok(state) => state,
            Err(e) => {
                return Box::pin(futures::stream::once(async move {
                    Err::<ChatResponseUpdate, _>(e)
                }))
            }
        };
        let mut inner = state.client.get_streaming_response(messages, options, cancel);
        Box::pin(async_stream::stream! {
            // The snapshot lives as long as the stream.
            let _state = state;
            while let Some(item) = inner.next().await {
                yield item;
            }
        })
    }

    fn metadata(&self) -> ClientMetadata {
        self.shared.read().metadata.clone()
    }
}

#[async_trait]
impl OnChange for ConfigurableClient {
    fn watch_name(&self) -> String {
        self.descriptor.id.clone()
    }

    async fn on_change(&self) {
        // Failures are logged and published by `reload`.
        let _ = self.reload().await;
    }
}

impl Drop for ConfigurableClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl fmt::Debug for ConfigurableClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.shared.read();
        f.debug_struct("ConfigurableClient")
            .field("id", &self.descriptor.id)
            .field("section", &self.descriptor.section_path)
            .field("provider", &shared.metadata.provider_name)
            .field("model", &shared.metadata.default_model_id)
            .field("disposed", &shared.current.is_none())
            .finish()
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use aiconf_providers::FnProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Echoes its build-time settings back in every response.
    struct EchoClient {
        metadata: ClientMetadata,
        api_key: String,
    }

    #[async_trait]
    impl ChatClient for EchoClient {
        async fn get_response(
            &self,
            _messages: &[Message],
            options: &ChatOptions,
            _cancel: &CancellationToken,
        ) -> Result<ChatResponse, ChatError> {
            let model = options
                .model_id
                .clone()
                .unwrap_or_else(|| self.metadata.default_model_id.clone());
            Ok(ChatResponse::text(model, self.api_key.clone()))
        }

        fn get_streaming_response(
            &self,
            _messages: Vec<Message>,
            _options: ChatOptions,
            _cancel: CancellationToken,
        ) -> ChatStream {
            let update = ChatResponseUpdate {
                content: Some(self.api_key.clone()),
                ..Default::default()
            };
            Box::pin(futures::stream::iter(vec![Ok(update)]))
        }

        fn metadata(&self) -> ClientMetadata {
            self.metadata.clone()
        }
    }

    fn echo_registry(builds: Arc<AtomicUsize>) -> Arc<ProviderRegistry> {
        let provider = FnProvider::new("echo", move |options: ClientOptions| {
            builds.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(EchoClient {
                metadata: ClientMetadata {
                    provider_name: "echo".into(),
                    provider_uri: None,
                    default_model_id: options.model_id.clone(),
                    id: options.id.clone(),
                    section_path: options.section_path().to_string(),
                },
                api_key: options.api_key.clone(),
            }) as Box<dyn ChatClient>)
        });
        Arc::new(
            ProviderRegistry::empty()
                .with_provider(provider)
                .unwrap()
                .with_default("echo"),
        )
    }

    fn descriptor(name: &str) -> ClientDescriptor {
        ClientDescriptor {
            id: name.to_string(),
            name: name.to_string(),
            section_path: format!("ai:clients:{name}"),
        }
    }

    fn tree() -> ConfigTree {
        ConfigTree::from_entries([
            ("ai:clients:echo:modelid", "m1"),
            ("ai:clients:echo:apikey", "key-1"),
        ])
    }

    async fn ask(client: &ConfigurableClient) -> Result<ChatResponse, ChatError> {
        client
            .get_response(&[Message::user("hi")], &ChatOptions::default(), &CancellationToken::new())
            .await
    }

    #[tokio::test]
    async fn test_create_and_dispatch() {
        let builds = Arc::new(AtomicUsize::new(0));
        let tree = tree();
        let client = ConfigurableClient::create(descriptor("echo"), &tree, echo_registry(builds.clone()))
            .await
            .unwrap();

        let resp = ask(&client).await.unwrap();
        assert_eq!(resp.content.as_deref(), Some("key-1"));
        assert_eq!(resp.model_id, "m1");
        assert_eq!(builds.load(Ordering::SeqCst), 1);

        let meta = client.metadata();
        assert_eq!(meta.id, "echo");
        assert_eq!(meta.provider_name, "echo");
        assert_eq!(meta.section_path, "ai:clients:echo");
        assert_eq!(client.metadata(), meta);
    }

    #[tokio::test]
    async fn test_create_fails_without_modelid() {
        let tree = ConfigTree::from_entries([("ai:clients:echo:apikey", "k")]);
        let err = ConfigurableClient::create(
            descriptor("echo"),
            &tree,
            echo_registry(Arc::new(AtomicUsize::new(0))),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey { ref key, .. } if key == "modelid"));
    }

    #[tokio::test]
    async fn test_explicit_reload_swaps_state() {
        let builds = Arc::new(AtomicUsize::new(0));
        let tree = tree();
        let client = ConfigurableClient::create(descriptor("echo"), &tree, echo_registry(builds.clone()))
            .await
            .unwrap();

        tree.set("ai:clients:echo:apikey", "key-2");
        client.reload().await.unwrap();

        assert_eq!(ask(&client).await.unwrap().content.as_deref(), Some("key-2"));
    }

    #[tokio::test]
    async fn test_unrelated_edit_does_not_rebuild() {
        let builds = Arc::new(AtomicUsize::new(0));
        let tree = tree();
        let client = ConfigurableClient::create(descriptor("echo"), &tree, echo_registry(builds.clone()))
            .await
            .unwrap();

        tree.set("logging:level", "debug");
        assert!(!client.reload().await.unwrap());
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_id_change_is_rejected() {
        let tree = tree();
        let client = ConfigurableClient::create(
            descriptor("echo"),
            &tree,
            echo_registry(Arc::new(AtomicUsize::new(0))),
        )
        .await
        .unwrap();

        tree.set("ai:clients:echo:id", "renamed");
        let err = client.reload().await.unwrap_err();
        assert!(matches!(err, ConfigError::IdChanged { ref new_id, .. } if new_id == "renamed"));
        assert_eq!(client.id(), "echo");
        assert_eq!(client.metadata().id, "echo");
    }

    #[tokio::test]
    async fn test_in_flight_snapshot_survives_swap() {
        let tree = tree();
        let client = ConfigurableClient::create(
            descriptor("echo"),
            &tree,
            echo_registry(Arc::new(AtomicUsize::new(0))),
        )
        .await
        .unwrap();

        let stream = client.get_streaming_response(
            vec![Message::user("hi")],
            ChatOptions::default(),
            CancellationToken::new(),
        );
        tree.set("ai:clients:echo:apikey", "key-2");
        client.reload().await.unwrap();

        let updates: Vec<_> = stream.collect().await;
        assert_eq!(updates[0].as_ref().unwrap().content.as_deref(), Some("key-1"));
        assert_eq!(ask(&client).await.unwrap().content.as_deref(), Some("key-2"));
    }

    #[tokio::test]
    async fn test_watch_loop_reloads_on_edit() {
        let tree = tree();
        let client = ConfigurableClient::create(
            descriptor("echo"),
            &tree,
            echo_registry(Arc::new(AtomicUsize::new(0))),
        )
        .await
        .unwrap();
        let mut events = client.subscribe();

        tree.set("ai:clients:echo:modelid", "m2");

        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            ClientEvent::Reloaded { metadata } => assert_eq!(metadata.default_model_id, "m2"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dispose() {
        let tree = tree();
        let client = ConfigurableClient::create(
            descriptor("echo"),
            &tree,
            echo_registry(Arc::new(AtomicUsize::new(0))),
        )
        .await
        .unwrap();
        let mut events = client.subscribe();

        client.dispose();
        client.dispose();

        assert!(client.is_disposed());
        assert!(matches!(ask(&client).await, Err(ChatError::Disposed(id)) if id == "echo"));
        assert!(matches!(events.recv().await, Ok(ClientEvent::Disposed { .. })));
        assert!(!client.reload().await.unwrap());
        // Metadata stays readable after dispose.
        assert_eq!(client.metadata().default_model_id, "m1");
    }

    #[tokio::test]
    async fn test_cancelled_dispatch() {
        let tree = tree();
        let client = ConfigurableClient::create(
            descriptor("echo"),
            &tree,
            echo_registry(Arc::new(AtomicUsize::new(0))),
        )
        .await
        .unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = client
            .get_response(&[Message::user("hi")], &ChatOptions::default(), &cancel)
            .await;
        assert!(matches!(result, Err(ChatError::Cancelled)));
    }
}
