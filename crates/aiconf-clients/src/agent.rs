//! Configurable agents: named instructions and defaults layered over a
//! configured client.
//!
//! ```text
//! ai:agents:writer:client       = openai
//! ai:agents:writer:instructions = You are a concise technical writer.
//! ai:agents:writer:temperature  = 0.3
//! ```
//!
//! An agent names its client by id and is resolved through the registry on
//! every dispatch, so it picks up both its own edits and its client's
//! reloads.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Weak};

use futures::StreamExt;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use aiconf_core::error::{ChatError, ConfigError};
use aiconf_core::types::{ChatOptions, ChatResponse, ChatResponseUpdate, Message};
use aiconf_core::{ConfigTree, Section};
use aiconf_providers::{ChatClient, ChatStream};

use crate::configurable::ConfigurableClient;
use crate::registry::RegistryInner;
use crate::scanner::{AgentDescriptor, CLIENT_KEY, ID_KEY};
use crate::watch::{spawn_watch_loop, OnChange};

// ─────────────────────────────────────────────
// AgentSettings
// ─────────────────────────────────────────────

/// Settings read from an agent section.
#[derive(Clone, Debug, PartialEq)]
pub struct AgentSettings {
    pub id: String,
    /// Id of the client the agent dispatches through.
    pub client_id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    /// Prepended to every conversation as a system message.
    pub instructions: Option<String>,
    /// Default model, overriding the client's.
    pub model_id: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

impl AgentSettings {
    /// Read settings from `section`; `fallback_id` applies when the section
    /// sets no `id`.
    pub fn from_section(section: &Section, fallback_id: &str) -> Result<Self, ConfigError> {
        let client_id = section
            .get(CLIENT_KEY)
            .map(|c| c.trim().to_string())
            .ok_or_else(|| ConfigError::MissingKey {
                section: section.path().to_string(),
                key: CLIENT_KEY.to_string(),
            })?;

        Ok(Self {
            id: section
                .get(ID_KEY)
                .map(|id| id.trim().to_string())
                .unwrap_or_else(|| fallback_id.to_string()),
            client_id,
            name: section.get("name"),
            description: section.get("description"),
            instructions: section.get("instructions"),
            model_id: section.get("modelid").map(|m| m.trim().to_string()),
            temperature: parse_value(section, "temperature")?,
            max_tokens: parse_value(section, "maxtokens")?,
        })
    }

    /// Apply instructions and option defaults to a request.
    ///
    /// Options set by the caller win over the agent's defaults.
    pub fn apply(&self, messages: &[Message], options: &ChatOptions) -> (Vec<Message>, ChatOptions) {
        let mut prepared = Vec::with_capacity(messages.len() + 1);
        if let Some(instructions) = &self.instructions {
            prepared.push(Message::system(instructions.clone()));
        }
        prepared.extend_from_slice(messages);

        let options = ChatOptions {
            model_id: options.model_id.clone().or_else(|| self.model_id.clone()),
            max_tokens: options.max_tokens.or(self.max_tokens),
            temperature: options.temperature.or(self.temperature),
            tools: options.tools.clone(),
        };
        (prepared, options)
    }
}

fn parse_value<T: FromStr>(section: &Section, key: &str) -> Result<Option<T>, ConfigError> {
    match section.get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                section: section.path().to_string(),
                key: key.to_string(),
                value: raw,
            }),
    }
}

// ─────────────────────────────────────────────
// ConfigurableAgent
// ─────────────────────────────────────────────

/// An agent that follows its configuration section.
pub struct ConfigurableAgent {
    descriptor: AgentDescriptor,
    section: Section,
    registry: Weak<RegistryInner>,
    /// `None` once disposed.
    settings: RwLock<Option<Arc<AgentSettings>>>,
    reload_lock: Mutex<()>,
    shutdown: CancellationToken,
}

impl ConfigurableAgent {
    pub(crate) async fn create(
        descriptor: AgentDescriptor,
        tree: &ConfigTree,
        registry: Weak<RegistryInner>,
    ) -> Result<Arc<Self>, ConfigError> {
        let section = tree.section(&descriptor.section_path);
        let token = tree.change_token();
        let settings = read_settings(&descriptor, &section, &registry)?;

        info!(
            id = %descriptor.id,
            client = %settings.client_id,
            "Agent created"
        );

        let agent = Arc::new(Self {
            descriptor,
            section,
            registry,
            settings: RwLock::new(Some(Arc::new(settings))),
            reload_lock: Mutex::new(()),
            shutdown: CancellationToken::new(),
        });
        spawn_watch_loop(&agent, tree.clone(), token, agent.shutdown.clone());
        Ok(agent)
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn descriptor(&self) -> &AgentDescriptor {
        &self.descriptor
    }

    /// Current settings, or `None` once disposed.
    pub fn settings(&self) -> Option<Arc<AgentSettings>> {
        self.settings.read().clone()
    }

    fn snapshot(&self) -> Result<Arc<AgentSettings>, ChatError> {
        self.settings()
            .ok_or_else(|| ChatError::Disposed(self.descriptor.id.clone()))
    }

    /// The client this agent currently dispatches through.
    pub async fn client(&self) -> Result<Arc<ConfigurableClient>, ChatError> {
        let settings = self.snapshot()?;
        client_for(&self.registry, &self.descriptor.id, &settings.client_id).await
    }

    /// Re-read the section. Returns whether the settings changed.
    pub async fn reload(&self) -> Result<bool, ConfigError> {
        let _guard = self.reload_lock.lock().await;
        let Some(current) = self.settings() else {
            return Ok(false);
        };

        let next = read_settings(&self.descriptor, &self.section, &self.registry).and_then(|next| {
            if next.id != self.descriptor.id {
                return Err(ConfigError::IdChanged {
                    id: self.descriptor.id.clone(),
                    section: self.descriptor.section_path.clone(),
                    new_id: next.id,
                });
            }
            Ok(next)
        });

        match next {
            Ok(next) if next == *current => {
                debug!(id = %self.descriptor.id, "Agent settings unchanged");
                Ok(false)
            }
            Ok(next) => {
                let mut slot = self.settings.write();
                if slot.is_none() {
                    return Ok(false);
                }
                info!(id = %self.descriptor.id, client = %next.client_id, "Agent reloaded");
                *slot = Some(Arc::new(next));
                Ok(true)
            }
            Err(error) => {
                warn!(
                    id = %self.descriptor.id,
                    error = %error,
                    "Agent reload failed, keeping previous settings"
                );
                Err(error)
            }
        }
    }

    /// Send a request through the agent's client.
    pub async fn get_response(
        &self,
        messages: &[Message],
        options: &ChatOptions,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, ChatError> {
        let settings = self.snapshot()?;
        let client = client_for(&self.registry, &self.descriptor.id, &settings.client_id).await?;
        let (messages, options) = settings.apply(messages, options);
        client.get_response(&messages, &options, cancel).await
    }

    /// Stream a request through the agent's client.
    pub fn get_streaming_response(
        &self,
        messages: Vec<Message>,
        options: ChatOptions,
        cancel: CancellationToken,
    ) -> ChatStream {
        let settings = match self.snapshot() {
            Ok(settings) => settings,
            Err(e) => {
                return Box::pin(futures::stream::once(async move {
                    Err::<ChatResponseUpdate, _>(e)
                }))
            }
        };
        let registry = self.registry.clone();
        let id = self.descriptor.id.clone();

        Box::pin(async_stream::stream! {
            let client = match client_for(&registry, &id, &settings.client_id).await {
                Ok(client) => client,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            let (messages, options) = settings.apply(&messages, &options);
            let mut inner = client.get_streaming_response(messages, options, cancel);
            while let Some(item) = inner.next().await {
                yield item;
            }
        })
    }

    /// Stop watching. Later dispatches fail with [`ChatError::Disposed`].
    pub fn dispose(&self) {
        self.shutdown.cancel();
        if self.settings.write().take().is_some() {
            info!(id = %self.descriptor.id, "Agent disposed");
        }
    }
}

fn read_settings(
    descriptor: &AgentDescriptor,
    section: &Section,
    registry: &Weak<RegistryInner>,
) -> Result<AgentSettings, ConfigError> {
    let settings = AgentSettings::from_section(section, &descriptor.name)?;
    if let Some(registry) = registry.upgrade() {
        if !registry.has_client(&settings.client_id) {
            return Err(ConfigError::NotFound(settings.client_id));
        }
    }
    Ok(settings)
}

async fn client_for(
    registry: &Weak<RegistryInner>,
    agent_id: &str,
    client_id: &str,
) -> Result<Arc<ConfigurableClient>, ChatError> {
    let registry = registry
        .upgrade()
        .ok_or_else(|| ChatError::Disposed(agent_id.to_string()))?;
    Ok(registry.client(client_id).await?)
}

#[async_trait::async_trait]
impl OnChange for ConfigurableAgent {
    fn watch_name(&self) -> String {
        format!("agent:{}", self.descriptor.id)
    }

    async fn on_change(&self) {
        let _ = self.reload().await;
    }
}

impl Drop for ConfigurableAgent {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl fmt::Debug for ConfigurableAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigurableAgent")
            .field("id", &self.descriptor.id)
            .field("section", &self.descriptor.section_path)
            .field("settings", &self.settings.read())
            .finish()
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
