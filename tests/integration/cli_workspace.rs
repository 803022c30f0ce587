//! CLI route table against a workspace whose config points at a mock provider

use super::test_utils::{mount_reply, training_plan_json};
use clap::Parser;
use coachgen::cli::{Cli, RunContext};
use coachgen::error::ApiError;
use tempfile::TempDir;
use wiremock::MockServer;

fn write_config(workspace: &TempDir, server: &MockServer, extra: &str) {
    let config_dir = workspace.path().join("config");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("config.toml"),
        format!(
            r#"caller = "coach-1"

[generation]
provider = "mock"
{extra}

[providers.mock]
provider_type = "local"
model = "test-model"
endpoint = "{uri}"
timeout_secs = 5
"#,
            extra = extra,
            uri = server.uri()
        ),
    )
    .unwrap();
}

async fn run(ctx: &RunContext, args: &[&str]) -> Result<String, ApiError> {
    let mut argv = vec!["coachgen"];
    argv.extend_from_slice(args);
    let cli = Cli::try_parse_from(argv).unwrap();
    ctx.execute(&cli.command).await
}

async fn add_athlete(ctx: &RunContext) -> String {
    let out = run(ctx, &["athlete", "add", "Ada", "--sport", "running", "--format", "json"])
        .await
        .unwrap();
    let athlete: serde_json::Value = serde_json::from_str(&out).unwrap();
    athlete["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_plan_training_wait_prints_generated_job() {
    let server = MockServer::start().await;
    mount_reply(&server, &training_plan_json()).await;
    let workspace = TempDir::new().unwrap();
    write_config(&workspace, &server, "");
    let ctx = RunContext::new(workspace.path().to_path_buf(), None, None).unwrap();
    let athlete_id = add_athlete(&ctx).await;

    let out = run(
        &ctx,
        &["plan", "training", &athlete_id, "--wait", "--format", "json"],
    )
    .await
    .unwrap();
    let job: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(job["status"], "generated");
    assert_eq!(job["title"], "Spring 10k block");
    assert_eq!(job["content"]["weeks"][0]["focus"], "Aerobic base");
}

#[tokio::test]
async fn test_detached_run_persists_after_drain() {
    let server = MockServer::start().await;
    mount_reply(&server, &training_plan_json()).await;
    let workspace = TempDir::new().unwrap();
    write_config(&workspace, &server, "");
    let ctx = RunContext::new(workspace.path().to_path_buf(), None, None).unwrap();
    let athlete_id = add_athlete(&ctx).await;

    let out = run(&ctx, &["progress", "analyze", &athlete_id])
        .await
        .unwrap();
    assert!(out.starts_with("Created progress_analysis job"));
    assert!(out.contains("(pending)"));

    ctx.drain().await;
    let listed = run(&ctx, &["job", "list", "--status", "error", "--format", "json"])
        .await
        .unwrap();
    let jobs: serde_json::Value = serde_json::from_str(&listed).unwrap();
    // A training plan reply is not a valid progress analysis.
    assert_eq!(jobs.as_array().unwrap().len(), 1);
    assert!(jobs[0]["error"].as_str().unwrap().contains("validation"));
}

#[tokio::test]
async fn test_store_survives_new_context() {
    let server = MockServer::start().await;
    mount_reply(&server, &training_plan_json()).await;
    let workspace = TempDir::new().unwrap();
    write_config(&workspace, &server, "");
    let athlete_id = {
        let ctx = RunContext::new(workspace.path().to_path_buf(), None, None).unwrap();
        let id = add_athlete(&ctx).await;
        run(&ctx, &["plan", "training", &id]).await.unwrap();
        ctx.drain().await;
        id
    };

    let ctx = RunContext::new(workspace.path().to_path_buf(), None, None).unwrap();
    let out = run(
        &ctx,
        &["job", "list", "--athlete", &athlete_id, "--format", "json"],
    )
    .await
    .unwrap();
    let jobs: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(jobs[0]["status"], "generated");
}

#[tokio::test]
async fn test_caller_flag_scopes_records() {
    let server = MockServer::start().await;
    let workspace = TempDir::new().unwrap();
    write_config(&workspace, &server, "");
    let ctx = RunContext::new(workspace.path().to_path_buf(), None, None).unwrap();
    add_athlete(&ctx).await;
    drop(ctx);

    let other = RunContext::new(
        workspace.path().to_path_buf(),
        None,
        Some("coach-2".to_string()),
    )
    .unwrap();
    assert_eq!(run(&other, &["athlete", "list"]).await.unwrap(), "No athletes.");
}

#[tokio::test]
async fn test_strict_workspace_rejects_unknown_goal() {
    let server = MockServer::start().await;
    let workspace = TempDir::new().unwrap();
    write_config(&workspace, &server, "context_resolution = \"strict\"");
    let ctx = RunContext::new(workspace.path().to_path_buf(), None, None).unwrap();
    let athlete_id = add_athlete(&ctx).await;

    let err = run(&ctx, &["plan", "training", &athlete_id, "--goal", "missing-1"])
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound { kind: "goal", .. }));
    assert_eq!(run(&ctx, &["job", "list"]).await.unwrap(), "No jobs.");
}

#[tokio::test]
async fn test_follow_prints_placeholder_then_terminal_event() {
    let server = MockServer::start().await;
    mount_reply(&server, &training_plan_json()).await;
    let workspace = TempDir::new().unwrap();
    write_config(&workspace, &server, "");
    let ctx = RunContext::new(workspace.path().to_path_buf(), None, None).unwrap();
    let athlete_id = add_athlete(&ctx).await;

    let out = run(&ctx, &["plan", "training", &athlete_id, "--follow"])
        .await
        .unwrap();
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("training_plan"));
    assert!(lines[0].contains("pending"));
    assert!(lines[1].contains("training_plan.completed"));
    assert!(lines[1].ends_with("Spring 10k block"));
}

#[tokio::test]
async fn test_retry_follow_reports_failure_event() {
    let server = MockServer::start().await;
    mount_reply(&server, &training_plan_json()).await;
    let workspace = TempDir::new().unwrap();
    write_config(&workspace, &server, "");
    let ctx = RunContext::new(workspace.path().to_path_buf(), None, None).unwrap();
    let athlete_id = add_athlete(&ctx).await;

    // A training plan reply fails progress analysis validation on every attempt.
    let out = run(
        &ctx,
        &["progress", "analyze", &athlete_id, "--wait", "--format", "json"],
    )
    .await
    .unwrap();
    let job: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(job["status"], "error");
    let job_id = job["id"].as_str().unwrap();

    let out = run(&ctx, &["job", "retry", job_id, "--follow", "--format", "json"])
        .await
        .unwrap();
    let lines: Vec<serde_json::Value> = out
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines[0]["status"], "pending");
    assert_eq!(lines[0]["attempt"], 2);
    assert_eq!(lines[1]["job_id"], job_id);
    assert_eq!(lines[1]["topic"]["outcome"], "failed");
}
