//! `aiconf show <id>`: resolve a client or agent and print what it binds to.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;

use aiconf_clients::{ApiKeyResolver, ClientRegistry, ConfigurableClient};
use aiconf_core::error::ConfigError;
use aiconf_providers::ChatClient;

use crate::helpers::{load_registry, preview, print_heading, print_metadata};

pub async fn run(config: &Path, id: &str) -> Result<()> {
    let registry = load_registry(config)?;

    match registry.get_client(id).await {
        Ok(client) => {
            print_heading(&format!("Client {}", client.id()));
            print_client(&registry, &client);
        }
        Err(ConfigError::NotFound(_)) => {
            let agent = registry
                .get_agent(id)
                .await
                .with_context(|| format!("failed to resolve '{id}'"))?;
            let Some(settings) = agent.settings() else {
                anyhow::bail!("agent '{id}' has been disposed");
            };

            print_heading(&format!("Agent {}", agent.id()));
            println!("  {:<12} {}", "Client:".bold(), settings.client_id);
            if let Some(instructions) = &settings.instructions {
                println!("  {:<12} {}", "Instructions:".bold(), preview(instructions));
            }
            if let Some(model) = &settings.model_id {
                println!("  {:<12} {}", "Model:".bold(), model);
            }
            if let Some(temperature) = settings.temperature {
                println!("  {:<12} {}", "Temperature:".bold(), temperature);
            }

            let client = agent.client().await?;
            print_heading(&format!("Client {}", client.id()));
            print_client(&registry, &client);
        }
        Err(e) => return Err(e).with_context(|| format!("failed to resolve '{id}'")),
    }

    println!();
    registry.dispose();
    Ok(())
}

fn print_client(registry: &ClientRegistry, client: &ConfigurableClient) {
    let section = registry.tree().section(client.section_path());
    let api_key = ApiKeyResolver::resolve(&section).ok();
    print_metadata(&client.metadata(), api_key.as_deref());
}
