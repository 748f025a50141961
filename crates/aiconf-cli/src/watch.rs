//! `aiconf watch`: follow the config file and report every client reload.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use aiconf_clients::{ClientEvent, ClientRegistry};
use aiconf_core::config::{load_config, ConfigFileWatcher};
use aiconf_providers::ChatClient;

use crate::helpers::{print_heading, print_metadata};

pub async fn run(config: &Path) -> Result<()> {
    let tree = load_config(Some(config));
    let _watcher = ConfigFileWatcher::new(tree.clone(), config)
        .start()
        .with_context(|| format!("failed to watch {}", config.display()))?;
    let registry = ClientRegistry::new(tree)
        .with_context(|| format!("failed to scan {}", config.display()))?;

    print_heading(&format!("Watching {}", config.display()));
    for descriptor in registry.clients() {
        let client = match registry.get_client(&descriptor.id).await {
            Ok(client) => client,
            Err(e) => {
                println!("  {} {}: {}", "✗".red(), descriptor.id.bold(), e);
                continue;
            }
        };
        println!("  {} {}", "✓".green(), descriptor.id.bold());
        print_metadata(&client.metadata(), None);

        let mut events = client.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => print_event(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Dropped client events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }
    println!();
    println!("{}", "Press Ctrl-C to stop.".dimmed());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    registry.dispose();
    Ok(())
}

fn print_event(event: &ClientEvent) {
    match event {
        ClientEvent::Reloaded { metadata } => {
            print_heading(&format!("Reloaded {}", metadata.id));
            print_metadata(metadata, None);
        }
        ClientEvent::ReloadFailed { id, error } => {
            println!();
            println!(
                "{} {}: {}",
                "Reload failed".red().bold(),
                id.bold(),
                error
            );
            println!("  {}", "(previous client still active)".dimmed());
        }
        ClientEvent::Disposed { id } => {
            println!("{} {}", "Disposed".dimmed(), id);
        }
    }
}
