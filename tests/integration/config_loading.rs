//! Integration tests for configuration layering and its effect on runs

use super::test_utils::{chat_reply, training_plan_json};
use coachgen::cli::RunContext;
use coachgen::config::{ConfigLoader, ContextResolution, InFlightPolicy};
use coachgen::error::ApiError;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[test]
fn test_override_file_layers_over_workspace_config() {
    let workspace = TempDir::new().unwrap();
    std::fs::create_dir_all(workspace.path().join("config")).unwrap();
    std::fs::write(
        workspace.path().join("config").join("config.toml"),
        "[generation]\ncontext_resolution = \"strict\"\nrecent_sessions = 4\n",
    )
    .unwrap();
    let override_file = workspace.path().join("ci.toml");
    std::fs::write(
        &override_file,
        "[generation]\nin_flight = \"reject_duplicate\"\nrecent_sessions = 2\n",
    )
    .unwrap();

    let config =
        ConfigLoader::load_with_override(workspace.path(), Some(override_file.as_path())).unwrap();
    assert_eq!(config.generation.context_resolution, ContextResolution::Strict);
    assert_eq!(config.generation.in_flight, InFlightPolicy::RejectDuplicate);
    assert_eq!(config.generation.recent_sessions, 2);
}

#[test]
fn test_undefined_generation_provider_is_rejected() {
    let workspace = TempDir::new().unwrap();
    std::fs::create_dir_all(workspace.path().join("config")).unwrap();
    std::fs::write(
        workspace.path().join("config").join("config.toml"),
        "[generation]\nprovider = \"missing\"\n",
    )
    .unwrap();

    match RunContext::new(workspace.path().to_path_buf(), None, None) {
        Err(ApiError::ConfigError(message)) => assert!(message.contains("missing")),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("config with an undefined provider was accepted"),
    }
}

#[tokio::test]
async fn test_workspace_templates_dir_overrides_builtin() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("Custom plan for Ada"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(&training_plan_json())))
        .expect(1)
        .mount(&server)
        .await;

    let workspace = TempDir::new().unwrap();
    let templates = workspace.path().join("templates");
    std::fs::create_dir_all(&templates).unwrap();
    std::fs::write(
        templates.join("training_plan.yaml"),
        "system: |\n  Reply with JSON only.\nuser: |\n  Custom plan for {{athleteName}}.\n",
    )
    .unwrap();
    std::fs::create_dir_all(workspace.path().join("config")).unwrap();
    std::fs::write(
        workspace.path().join("config").join("config.toml"),
        format!(
            "caller = \"coach-1\"\n\n[generation]\nprovider = \"mock\"\ntemplates_dir = \"templates\"\n\n[providers.mock]\nprovider_type = \"local\"\nmodel = \"test-model\"\nendpoint = \"{}\"\n",
            server.uri()
        ),
    )
    .unwrap();

    let ctx = RunContext::new(workspace.path().to_path_buf(), None, None).unwrap();
    let caller = coachgen::types::CallerId::new("coach-1");
    let athlete = ctx
        .api()
        .create_athlete(
            Some(&caller),
            coachgen::model::NewAthlete {
                name: "Ada".to_string(),
                sport: None,
                level: None,
                notes: None,
            },
        )
        .await
        .unwrap();
    let submitted = ctx
        .api()
        .create_training_plan(
            Some(&caller),
            coachgen::api::GenerationRequest::for_athlete(athlete.id),
        )
        .await
        .unwrap();
    let event = submitted.handle.wait().await.unwrap();
    assert!(event.error.is_none(), "run failed: {:?}", event.error);
}
