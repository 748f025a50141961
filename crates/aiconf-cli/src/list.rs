//! `aiconf list`: print the declared clients and agents.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use crate::helpers::{load_registry, print_heading};

pub fn run(config: &Path) -> Result<()> {
    let registry = load_registry(config)?;
    let tree = registry.tree();

    print_heading(&format!("Clients ({})", config.display()));
    let clients = registry.clients();
    if clients.is_empty() {
        println!("  {}", "(none declared)".dimmed());
    }
    for descriptor in clients {
        let model = tree
            .section(&descriptor.section_path)
            .get("modelid")
            .unwrap_or_default();
        println!(
            "  {:<20} {:<28} {}",
            descriptor.id.bold(),
            descriptor.section_path.dimmed(),
            model
        );
    }

    print_heading("Agents");
    let agents = registry.agents();
    if agents.is_empty() {
        println!("  {}", "(none declared)".dimmed());
    }
    for descriptor in agents {
        let client = tree
            .section(&descriptor.section_path)
            .get("client")
            .unwrap_or_default();
        println!(
            "  {:<20} {:<28} → {}",
            descriptor.id.bold(),
            descriptor.section_path.dimmed(),
            client
        );
    }
    println!();
    Ok(())
}
