//! aiconf CLI entry point.
//!
//! # Commands
//!
//! - `aiconf list`: declared clients and agents
//! - `aiconf show <ID>`: resolve one and print its provider, endpoint and model
//! - `aiconf chat <ID> -m MESSAGE [--model MODEL]`: one streamed request
//! - `aiconf watch`: follow the config file and report reloads

mod chat;
mod helpers;
mod list;
mod show;
mod watch;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// Configuration-driven, hot-reloadable chat clients
#[derive(Parser)]
#[command(name = "aiconf", version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.aiconf/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true, default_value_t = false)]
    logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List declared clients and agents
    List,

    /// Resolve a client or agent and show what it binds to
    Show {
        /// Client or agent id (case-insensitive)
        id: String,
    },

    /// Send a single message and stream the reply
    Chat {
        /// Client or agent id (case-insensitive)
        id: String,

        /// Message to send
        #[arg(short, long)]
        message: String,

        /// Model override for this request
        #[arg(long)]
        model: Option<String>,
    },

    /// Watch the config file and print client metadata on every reload
    Watch,
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.logs);
    let config = helpers::config_path(cli.config.as_deref());

    match cli.command {
        Commands::List => list::run(&config),
        Commands::Show { id } => show::run(&config, &id).await,
        Commands::Chat { id, message, model } => chat::run(&config, &id, message, model).await,
        Commands::Watch => watch::run(&config).await,
    }
}

/// Initialize tracing/logging.
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("aiconf_core=debug,aiconf_providers=debug,aiconf_clients=debug,info")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .init();
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat() {
        let cli = Cli::try_parse_from([
            "aiconf", "--config", "/tmp/c.json", "chat", "grok", "-m", "hi", "--model", "grok-4",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.json")));
        match cli.command {
            Commands::Chat { id, message, model } => {
                assert_eq!(id, "grok");
                assert_eq!(message, "hi");
                assert_eq!(model.as_deref(), Some("grok-4"));
            }
            _ => panic!("expected chat"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["aiconf", "watch", "--logs"]).unwrap();
        assert!(cli.logs);
        assert!(matches!(cli.command, Commands::Watch));
    }

    #[test]
    fn test_chat_requires_message() {
        assert!(Cli::try_parse_from(["aiconf", "chat", "grok"]).is_err());
    }
}
