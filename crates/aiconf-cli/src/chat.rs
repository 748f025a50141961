//! `aiconf chat <id> -m <message>`: send one message and stream the reply.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use aiconf_core::error::ConfigError;
use aiconf_core::types::{ChatOptions, Message};
use aiconf_providers::{ChatClient, ChatStream};

use crate::helpers::load_registry;

pub async fn run(config: &Path, id: &str, message: String, model: Option<String>) -> Result<()> {
    let registry = load_registry(config)?;
    let messages = vec![Message::user(message)];
    let options = ChatOptions {
        model_id: model,
        ..Default::default()
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    // Clients win over agents sharing the same id.
    let stream: ChatStream = match registry.get_client(id).await {
        Ok(client) => {
            debug!(id = %client.id(), "Chatting through client");
            client.get_streaming_response(messages, options, cancel)
        }
        Err(ConfigError::NotFound(_)) => {
            let agent = registry
                .get_agent(id)
                .await
                .with_context(|| format!("failed to resolve '{id}'"))?;
            debug!(id = %agent.id(), "Chatting through agent");
            agent.get_streaming_response(messages, options, cancel)
        }
        Err(e) => return Err(e).with_context(|| format!("failed to resolve '{id}'")),
    };

    let printed = print_stream(stream).await;
    registry.dispose();
    printed
}

async fn print_stream(mut stream: ChatStream) -> Result<()> {
    let mut stdout = std::io::stdout();
    let mut finish_reason = None;

    println!();
    while let Some(update) = stream.next().await {
        let update = update.context("chat request failed")?;
        if let Some(text) = update.content {
            write!(stdout, "{text}")?;
            stdout.flush()?;
        }
        if update.finish_reason.is_some() {
            finish_reason = update.finish_reason;
        }
    }
    println!();

    if let Some(reason) = finish_reason.filter(|r| r != "stop") {
        eprintln!("{}", format!("(finished: {reason})").dimmed());
    }
    Ok(())
}
