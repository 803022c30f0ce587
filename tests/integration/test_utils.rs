//! Shared test utilities for integration tests
//!
//! Mock chat-completion server replies and an API wired to a local provider.

use coachgen::api::CoachApi;
use coachgen::config::GenerationSettings;
use coachgen::notify::NotificationBus;
use coachgen::prompt::TemplateStore;
use coachgen::provider::{CompletionOptions, ProviderConfig, ProviderRegistry, ProviderType};
use coachgen::store::Repositories;
use coachgen::types::CallerId;
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub fn coach() -> Option<CallerId> {
    Some(CallerId::new("coach-1"))
}

/// OpenAI chat-completions body carrying `content` as the assistant reply.
pub fn chat_reply(content: &str) -> Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "model": "test-model",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 12, "completion_tokens": 34, "total_tokens": 46}
    })
}

pub fn training_plan_json() -> String {
    json!({
        "title": "Spring 10k block",
        "overview": "Four weeks building toward a sub-50 10k.",
        "weeks": [
            {"week": 1, "focus": "Aerobic base", "sessions": ["Easy 5k", "Strides"]},
            {"week": 2, "focus": "Tempo", "sessions": ["2x10min tempo"]}
        ]
    })
    .to_string()
}

/// Answer every chat-completion call with `content`.
pub async fn mount_reply(server: &MockServer, content: &str) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(content)))
        .mount(server)
        .await;
}

pub fn local_provider(server: &MockServer) -> ProviderConfig {
    ProviderConfig {
        provider_name: Some("mock".to_string()),
        provider_type: ProviderType::LocalCustom,
        model: "test-model".to_string(),
        api_key: None,
        endpoint: Some(server.uri()),
        timeout_secs: Some(5),
        default_options: CompletionOptions::default(),
    }
}

/// API over a temporary store whose provider talks to `server`.
pub fn api_with_server(server: &MockServer, settings: GenerationSettings) -> CoachApi {
    let mut registry = ProviderRegistry::new();
    registry.insert("mock", local_provider(server));
    let provider = registry.generation_provider("mock").unwrap();
    CoachApi::new(
        Repositories::temporary().unwrap(),
        NotificationBus::new(64),
        settings,
    )
    .with_provider(Arc::new(TemplateStore::builtin()), provider)
}
