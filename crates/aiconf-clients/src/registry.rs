//! Client registry: the lookup surface for configured clients and agents.
//!
//! The registry scans the tree once when built and keeps one lazily
//! initialized slot per declaration. The first `get_client` for an id
//! resolves and builds the client; later calls return the same instance.
//! A failed build leaves the slot empty, so the next request tries again.
//!
//! Lookups try the exact id first, then the case-insensitive
//! [`IdentityKey`]; both routes land on the same slot.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, info};

use aiconf_core::error::ConfigError;
use aiconf_core::ConfigTree;
use aiconf_providers::ProviderRegistry;

use crate::agent::ConfigurableAgent;
use crate::configurable::ConfigurableClient;
use crate::identity::IdentityKey;
use crate::scanner::{scan_agents, scan_clients, ClientDescriptor};

/// Default section prefix for client declarations.
pub const DEFAULT_CLIENTS_PREFIX: &str = "ai:clients";
/// Default section prefix for agent declarations.
pub const DEFAULT_AGENTS_PREFIX: &str = "ai:agents";

// ─────────────────────────────────────────────
// Slots
// ─────────────────────────────────────────────

struct Slot<T> {
    descriptor: ClientDescriptor,
    cell: OnceCell<Arc<T>>,
}

struct Slots<T> {
    entries: Vec<Slot<T>>,
    exact: HashMap<String, usize>,
    by_identity: HashMap<IdentityKey, usize>,
}

impl<T> Slots<T> {
    fn new(descriptors: Vec<ClientDescriptor>) -> Self {
        let mut exact = HashMap::new();
        let mut by_identity = HashMap::new();
        for (index, descriptor) in descriptors.iter().enumerate() {
            exact.insert(descriptor.id.clone(), index);
            by_identity.insert(IdentityKey::new(descriptor.id.as_str()), index);
        }
        Self {
            entries: descriptors
                .into_iter()
                .map(|descriptor| Slot {
                    descriptor,
                    cell: OnceCell::new(),
                })
                .collect(),
            exact,
            by_identity,
        }
    }

    fn find(&self, id: &str) -> Option<&Slot<T>> {
        self.exact
            .get(id)
            .or_else(|| self.by_identity.get(&IdentityKey::new(id)))
            .map(|&index| &self.entries[index])
    }

    fn descriptors(&self) -> Vec<ClientDescriptor> {
        self.entries.iter().map(|s| s.descriptor.clone()).collect()
    }

    fn built(&self) -> impl Iterator<Item = &Arc<T>> {
        self.entries.iter().filter_map(|s| s.cell.get())
    }
}

// ─────────────────────────────────────────────
// RegistryInner
// ─────────────────────────────────────────────

pub(crate) struct RegistryInner {
    tree: ConfigTree,
    providers: Arc<ProviderRegistry>,
    clients: Slots<ConfigurableClient>,
    agents: Slots<ConfigurableAgent>,
}

impl RegistryInner {
    pub(crate) fn has_client(&self, id: &str) -> bool {
        self.clients.find(id).is_some()
    }

    pub(crate) async fn client(&self, id: &str) -> Result<Arc<ConfigurableClient>, ConfigError> {
        let slot = self
            .clients
            .find(id)
            .ok_or_else(|| ConfigError::NotFound(id.to_string()))?;
        slot.cell
            .get_or_try_init(|| {
                debug!(id = %slot.descriptor.id, "Building client on first use");
                ConfigurableClient::create(
                    slot.descriptor.clone(),
                    &self.tree,
                    Arc::clone(&self.providers),
                )
            })
            .await
            .map(Arc::clone)
    }
}

// ─────────────────────────────────────────────
// ClientRegistry
// ─────────────────────────────────────────────

/// Lazily materializes configured clients and agents.
///
/// Cheap to clone; clones share the same instances.
#[derive(Clone)]
pub struct ClientRegistry {
    inner: Arc<RegistryInner>,
}

impl ClientRegistry {
    /// Scan `tree` with the built-in providers and default prefixes.
    pub fn new(tree: ConfigTree) -> Result<Self, ConfigError> {
        Self::builder(tree).build()
    }

    pub fn builder(tree: ConfigTree) -> ClientRegistryBuilder {
        ClientRegistryBuilder {
            tree,
            providers: None,
            clients_prefix: DEFAULT_CLIENTS_PREFIX.to_string(),
            agents_prefix: DEFAULT_AGENTS_PREFIX.to_string(),
        }
    }

    /// Declared clients, in scan order.
    pub fn clients(&self) -> Vec<ClientDescriptor> {
        self.inner.clients.descriptors()
    }

    /// Declared agents, in scan order.
    pub fn agents(&self) -> Vec<ClientDescriptor> {
        self.inner.agents.descriptors()
    }

    /// The client declared as `id`, built on first request.
    pub async fn get_client(&self, id: &str) -> Result<Arc<ConfigurableClient>, ConfigError> {
        self.inner.client(id).await
    }

    /// The agent declared as `id`, built on first request.
    pub async fn get_agent(&self, id: &str) -> Result<Arc<ConfigurableAgent>, ConfigError> {
        let slot = self
            .inner
            .agents
            .find(id)
            .ok_or_else(|| ConfigError::NotFound(id.to_string()))?;
        slot.cell
            .get_or_try_init(|| {
                ConfigurableAgent::create(
                    slot.descriptor.clone(),
                    &self.inner.tree,
                    Arc::downgrade(&self.inner),
                )
            })
            .await
            .map(Arc::clone)
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.inner.providers
    }

    pub fn tree(&self) -> &ConfigTree {
        &self.inner.tree
    }

    /// Dispose every client and agent built so far.
    pub fn dispose(&self) {
        for agent in self.inner.agents.built() {
            agent.dispose();
        }
        for client in self.inner.clients.built() {
            client.dispose();
        }
    }
}

impl fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("clients", &ids(self.clients()))
            .field("agents", &ids(self.agents()))
            .field("providers", &self.inner.providers)
            .finish()
    }
}

fn ids(descriptors: Vec<ClientDescriptor>) -> Vec<String> {
    descriptors.into_iter().map(|d| d.id).collect()
}

/// Builder for [`ClientRegistry`].
pub struct ClientRegistryBuilder {
    tree: ConfigTree,
    providers: Option<ProviderRegistry>,
    clients_prefix: String,
    agents_prefix: String,
}

impl ClientRegistryBuilder {
    /// Use `providers` instead of the built-in set.
    pub fn providers(mut self, providers: ProviderRegistry) -> Self {
        self.providers = Some(providers);
        self
    }

    pub fn clients_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.clients_prefix = prefix.into();
        self
    }

    pub fn agents_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.agents_prefix = prefix.into();
        self
    }

    /// Scan the tree and build the registry. Fails on duplicate ids.
    pub fn build(self) -> Result<ClientRegistry, ConfigError> {
        let clients = scan_clients(&self.tree, &self.clients_prefix)?;
        let agents = scan_agents(&self.tree, &self.agents_prefix)?;
        info!(
            clients = clients.len(),
            agents = agents.len(),
            prefix = %self.clients_prefix,
            "Client registry ready"
        );

        Ok(ClientRegistry {
            inner: Arc::new(RegistryInner {
                providers: Arc::new(self.providers.unwrap_or_else(ProviderRegistry::builtin)),
                clients: Slots::new(clients),
                agents: Slots::new(agents),
                tree: self.tree,
            }),
        })
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
