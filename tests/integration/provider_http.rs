//! HTTP behaviour of the OpenAI-compatible client against a mock server

use super::test_utils::{chat_reply, local_provider, training_plan_json};
use coachgen::error::ApiError;
use coachgen::job::JobKind;
use coachgen::prompt::RenderedPrompt;
use coachgen::provider::ProviderRegistry;
use coachgen::schema::response_schema;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn prompt() -> RenderedPrompt {
    RenderedPrompt {
        system: "You are a coach.".to_string(),
        user: "Plan the week.".to_string(),
    }
}

#[tokio::test]
async fn test_requests_json_mode_with_bearer_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "test-model",
            "response_format": {"type": "json_object"},
            "stream": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(&training_plan_json())))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = local_provider(&server);
    config.api_key = Some("sk-test".to_string());
    let mut registry = ProviderRegistry::new();
    registry.insert("mock", config);
    let provider = registry.generation_provider("mock").unwrap();

    let value = provider
        .generate(&prompt(), &response_schema(JobKind::TrainingPlan))
        .await
        .unwrap();
    assert_eq!(value["title"], "Spring 10k block");
}

#[tokio::test]
async fn test_reply_wrapped_in_prose_is_extracted() {
    let server = MockServer::start().await;
    let reply = format!("Here is your plan:\n```json\n{}\n```\nGood luck!", training_plan_json());
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(&reply)))
        .mount(&server)
        .await;

    let mut registry = ProviderRegistry::new();
    registry.insert("mock", local_provider(&server));
    let provider = registry.generation_provider("mock").unwrap();
    let value = provider
        .generate(&prompt(), &response_schema(JobKind::TrainingPlan))
        .await
        .unwrap();
    assert_eq!(value["weeks"][1]["focus"], "Tempo");
}

#[tokio::test]
async fn test_status_codes_map_to_provider_errors() {
    let cases = [
        (429, "rate"),
        (401, "auth"),
        (404, "model"),
        (500, "request"),
    ];
    for (status, label) in cases {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&server)
            .await;

        let mut registry = ProviderRegistry::new();
        registry.insert("mock", local_provider(&server));
        let provider = registry.generation_provider("mock").unwrap();
        let err = provider
            .generate(&prompt(), &response_schema(JobKind::ProgressAnalysis))
            .await
            .unwrap_err();

        let matched = match label {
            "rate" => matches!(err, ApiError::ProviderRateLimit(_)),
            "auth" => matches!(err, ApiError::ProviderAuthFailed(_)),
            "model" => matches!(err, ApiError::ProviderModelNotFound(_)),
            _ => matches!(err, ApiError::ProviderRequestFailed(_)),
        };
        assert!(matched, "status {} produced {:?}", status, err);
        assert!(err.is_provider_error());
    }
}

#[tokio::test]
async fn test_non_json_reply_is_a_validation_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(chat_reply("I cannot help with that.")),
        )
        .mount(&server)
        .await;

    let mut registry = ProviderRegistry::new();
    registry.insert("mock", local_provider(&server));
    let provider = registry.generation_provider("mock").unwrap();
    let err = provider
        .generate(&prompt(), &response_schema(JobKind::SessionPlan))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::ResponseValidation(_)));
}
