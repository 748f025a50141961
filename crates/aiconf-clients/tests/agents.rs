//! Agents dispatching through configured clients.

use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use aiconf_clients::ClientRegistry;
use aiconf_core::types::{ChatOptions, Message};
use aiconf_core::ConfigTree;

fn tree(endpoint: &str) -> ConfigTree {
    ConfigTree::from_entries([
        ("ai:clients:openai:modelid", "gpt-4.1"),
        ("ai:clients:openai:apikey", "sk-agent"),
        ("ai:clients:openai:provider", "openai"),
        ("ai:clients:openai:endpoint", endpoint),
        ("ai:agents:writer:client", "OpenAI"),
        ("ai:agents:writer:instructions", "Be terse."),
        ("ai:agents:writer:maxtokens", "128"),
    ])
}

#[tokio::test]
async fn test_agent_prepends_instructions() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(serde_json::json!({
            "model": "gpt-4.1",
            "max_tokens": 128,
            "messages": [
                { "role": "system", "content": "Be terse." },
                { "role": "user", "content": "Explain Rust." }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{ "message": { "content": "Fast and safe." }, "finish_reason": "stop" }]
        })))
        .mount(&server)
        .await;

    let registry = ClientRegistry::new(tree(&server.uri())).unwrap();
    let agent = registry.get_agent("writer").await.unwrap();
    let resp = agent
        .get_response(
            &[Message::user("Explain Rust.")],
            &ChatOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(resp.content.as_deref(), Some("Fast and safe."));
}

#[tokio::test]
async fn test_agent_streaming() {
    let server = MockServer::start().await;
    let sse = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"Fast \"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"and safe.\"},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
        .mount(&server)
        .await;

    let registry = ClientRegistry::new(tree(&server.uri())).unwrap();
    let agent = registry.get_agent("writer").await.unwrap();
    let text: String = agent
        .get_streaming_response(
            vec![Message::user("Explain Rust.")],
            ChatOptions::default(),
            CancellationToken::new(),
        )
        .map(|update| update.unwrap().content.unwrap_or_default())
        .collect::<Vec<_>>()
        .await
        .concat();
    assert_eq!(text, "Fast and safe.");
}

#[tokio::test]
async fn test_agent_follows_settings_edits() {
    let tree = tree("http://127.0.0.1:1");
    let registry = ClientRegistry::new(tree.clone()).unwrap();
    let agent = registry.get_agent("writer").await.unwrap();
    assert_eq!(agent.settings().unwrap().max_tokens, Some(128));

    tree.set("ai:agents:writer:maxtokens", "256");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while agent.settings().unwrap().max_tokens != Some(256) {
        assert!(tokio::time::Instant::now() < deadline, "agent never reloaded");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_agent_keeps_settings_when_client_vanishes() {
    let tree = tree("http://127.0.0.1:1");
    let registry = ClientRegistry::new(tree.clone()).unwrap();
    let agent = registry.get_agent("writer").await.unwrap();

    tree.set("ai:agents:writer:client", "ghost");
    let err = agent.reload().await.unwrap_err();
    assert!(err.to_string().contains("ghost"));
    assert_eq!(agent.settings().unwrap().client_id, "OpenAI");
}
