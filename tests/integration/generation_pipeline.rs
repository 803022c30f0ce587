//! End-to-end generation: placeholder, background run, provider over HTTP, event.

use super::test_utils::{api_with_server, chat_reply, coach, mount_reply, training_plan_json};
use coachgen::api::{GenerationRequest, GoalEvaluationRequest};
use coachgen::config::{ContextResolution, GenerationSettings, InFlightPolicy};
use coachgen::error::ApiError;
use coachgen::job::{JobKind, JobStatus};
use coachgen::model::{NewAthlete, NewGoal, NewSessionLog};
use coachgen::notify::Topic;
use coachgen::types::{CallerId, EntityId};
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn seed_athlete(api: &coachgen::api::CoachApi) -> EntityId {
    let athlete = api
        .create_athlete(
            coach().as_ref(),
            NewAthlete {
                name: "Ada".to_string(),
                sport: Some("running".to_string()),
                level: Some("intermediate".to_string()),
                notes: None,
            },
        )
        .await
        .unwrap();
    api.log_session(
        coach().as_ref(),
        NewSessionLog {
            athlete_id: athlete.id.clone(),
            performed_on: "2026-10-01".to_string(),
            duration_minutes: Some(45),
            perceived_effort: Some(6),
            notes: Some("Hill repeats".to_string()),
        },
    )
    .await
    .unwrap();
    athlete.id
}

#[tokio::test]
async fn test_training_plan_runs_to_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("Ada"))
        .and(body_string_contains("Hill repeats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(&training_plan_json())))
        .expect(1)
        .mount(&server)
        .await;
    let api = api_with_server(&server, GenerationSettings::default());
    let athlete_id = seed_athlete(&api).await;
    let mut events = api.subscribe(coach().as_ref(), None).unwrap();

    let submitted = api
        .create_training_plan(coach().as_ref(), GenerationRequest::for_athlete(athlete_id))
        .await
        .unwrap();
    assert_eq!(submitted.job.status, JobStatus::Pending);
    assert!(submitted.job.content.is_none());

    let event = events.wait_for(&submitted.job.id).await.unwrap();
    assert_eq!(event.topic, Topic::completed(JobKind::TrainingPlan));
    assert_eq!(event.owner, CallerId::new("coach-1"));

    let job = api.get_job(coach().as_ref(), &submitted.job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Generated);
    assert_eq!(job.title.as_deref(), Some("Spring 10k block"));
    assert!(job.summary.unwrap().starts_with("Four weeks"));
    assert_eq!(job.source_digest.map(|d| d.len()), Some(64));
    assert!(job.error.is_none());
}

#[tokio::test]
async fn test_malformed_reply_fails_with_one_event() {
    let server = MockServer::start().await;
    mount_reply(&server, r#"{"title": "Half a plan", "weeks": "#).await;
    let api = api_with_server(&server, GenerationSettings::default());
    let athlete_id = seed_athlete(&api).await;
    let mut events = api.subscribe(coach().as_ref(), None).unwrap();

    let submitted = api
        .analyze_progress(coach().as_ref(), GenerationRequest::for_athlete(athlete_id))
        .await
        .unwrap();
    let event = submitted.handle.wait().await.unwrap();
    assert_eq!(event.topic, Topic::failed(JobKind::ProgressAnalysis));
    assert!(event.error.as_deref().unwrap().contains("validation"));

    let delivered = events.wait_for(&submitted.job.id).await.unwrap();
    assert_eq!(delivered.seq, event.seq);

    let job = api.get_job(coach().as_ref(), &submitted.job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert!(job.content.is_none());
}

#[tokio::test]
async fn test_rate_limited_provider_marks_job_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;
    let api = api_with_server(&server, GenerationSettings::default());
    let athlete_id = seed_athlete(&api).await;

    let submitted = api
        .create_training_plan(coach().as_ref(), GenerationRequest::for_athlete(athlete_id))
        .await
        .unwrap();
    submitted.handle.wait().await.unwrap();

    let job = api.get_job(coach().as_ref(), &submitted.job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert!(job.error.unwrap().contains("rate limit"));
}

#[tokio::test]
async fn test_back_to_back_requests_both_finish_without_subscribers() {
    let server = MockServer::start().await;
    mount_reply(&server, &training_plan_json()).await;
    let api = api_with_server(&server, GenerationSettings::default());
    let athlete_id = seed_athlete(&api).await;
    assert_eq!(api.bus().subscriber_count(), 0);

    let first = api
        .create_training_plan(
            coach().as_ref(),
            GenerationRequest::for_athlete(athlete_id.clone()),
        )
        .await
        .unwrap();
    let second = api
        .create_training_plan(coach().as_ref(), GenerationRequest::for_athlete(athlete_id))
        .await
        .unwrap();
    assert_ne!(first.job.id, second.job.id);

    for submitted in [first, second] {
        let job_id = submitted.job.id.clone();
        let event = submitted.handle.wait().await.unwrap();
        assert_eq!(event.topic, Topic::completed(JobKind::TrainingPlan));
        let job = api.get_job(coach().as_ref(), &job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Generated);
    }
    let stats = api.supervisor().unwrap().stats();
    assert_eq!(stats.completed, 2);
    assert_eq!(stats.running, 0);
}

#[tokio::test]
async fn test_session_plan_reads_latest_training_plan() {
    let server = MockServer::start().await;
    let session = json!({
        "title": "Tempo Tuesday",
        "objective": "Hold threshold pace",
        "blocks": [
            {"name": "Warm-up", "duration_minutes": 15},
            {"name": "Tempo", "duration_minutes": 20, "description": "2x10min"}
        ]
    })
    .to_string();
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("Spring 10k block"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(&session)))
        .mount(&server)
        .await;
    mount_reply(&server, &training_plan_json()).await;

    let api = api_with_server(&server, GenerationSettings::default());
    let athlete_id = seed_athlete(&api).await;
    let plan = api
        .create_training_plan(
            coach().as_ref(),
            GenerationRequest::for_athlete(athlete_id.clone()),
        )
        .await
        .unwrap();
    plan.handle.wait().await.unwrap();

    let submitted = api
        .create_session_plan(coach().as_ref(), GenerationRequest::for_athlete(athlete_id))
        .await
        .unwrap();
    let event = submitted.handle.wait().await.unwrap();
    assert_eq!(event.topic, Topic::completed(JobKind::SessionPlan));
    assert_eq!(event.job.unwrap().title.as_deref(), Some("Tempo Tuesday"));
}

#[tokio::test]
async fn test_goal_evaluation_targets_the_goal_athlete() {
    let server = MockServer::start().await;
    let evaluation = json!({
        "verdict": "at_risk",
        "score": 55,
        "rationale": "Volume dipped for two weeks.",
        "recommendations": ["Add a long run"]
    })
    .to_string();
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("Sub-50 10k"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(&evaluation)))
        .mount(&server)
        .await;
    let api = api_with_server(&server, GenerationSettings::default());
    let athlete_id = seed_athlete(&api).await;
    let goal = api
        .create_goal(
            coach().as_ref(),
            NewGoal {
                athlete_id: athlete_id.clone(),
                title: "Sub-50 10k".to_string(),
                description: None,
                target_date: Some("2027-04-01".to_string()),
            },
        )
        .await
        .unwrap();

    let submitted = api
        .evaluate_goal(
            coach().as_ref(),
            GoalEvaluationRequest {
                goal_id: goal.id,
                assistant_ids: Vec::new(),
                instructions: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(submitted.job.subject_id, athlete_id);
    submitted.handle.wait().await.unwrap();

    let job = api.get_job(coach().as_ref(), &submitted.job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Generated);
    assert_eq!(job.title.as_deref(), Some("Goal evaluation: at risk"));
}

#[tokio::test]
async fn test_resubmit_after_failure_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("not json")))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_reply(&server, &training_plan_json()).await;

    let api = api_with_server(&server, GenerationSettings::default());
    let athlete_id = seed_athlete(&api).await;
    let first = api
        .create_training_plan(coach().as_ref(), GenerationRequest::for_athlete(athlete_id))
        .await
        .unwrap();
    let job_id = first.job.id.clone();
    let event = first.handle.wait().await.unwrap();
    assert_eq!(event.topic, Topic::failed(JobKind::TrainingPlan));

    let retry = api.resubmit_job(coach().as_ref(), &job_id).await.unwrap();
    assert_eq!(retry.job.status, JobStatus::Pending);
    assert_eq!(retry.job.attempt, 2);
    assert!(retry.job.error.is_none());
    retry.handle.wait().await.unwrap();

    let job = api.get_job(coach().as_ref(), &job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Generated);
    assert_eq!(job.attempt, 2);
}

#[tokio::test]
async fn test_strict_resolution_rejects_before_write() {
    let server = MockServer::start().await;
    mount_reply(&server, &training_plan_json()).await;
    let settings = GenerationSettings {
        context_resolution: ContextResolution::Strict,
        ..Default::default()
    };
    let api = api_with_server(&server, settings);

    let err = api
        .create_training_plan(coach().as_ref(), GenerationRequest::for_athlete("ghost"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound { .. }));
    let jobs = api
        .list_jobs(coach().as_ref(), &Default::default())
        .await
        .unwrap();
    assert!(jobs.is_empty());
}

#[tokio::test]
async fn test_duplicate_rejected_while_in_flight() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(chat_reply(&training_plan_json()))
                .set_delay(std::time::Duration::from_millis(300)),
        )
        .mount(&server)
        .await;
    let settings = GenerationSettings {
        in_flight: InFlightPolicy::RejectDuplicate,
        ..Default::default()
    };
    let api = api_with_server(&server, settings);
    let athlete_id = seed_athlete(&api).await;

    let first = api
        .create_training_plan(
            coach().as_ref(),
            GenerationRequest::for_athlete(athlete_id.clone()),
        )
        .await
        .unwrap();
    let err = api
        .create_training_plan(
            coach().as_ref(),
            GenerationRequest::for_athlete(athlete_id.clone()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::GenerationInFlight { .. }));

    // A different kind for the same athlete is not a duplicate.
    let analysis = api
        .analyze_progress(
            coach().as_ref(),
            GenerationRequest::for_athlete(athlete_id.clone()),
        )
        .await;
    assert!(analysis.is_ok());

    first.handle.wait().await.unwrap();
    let again = api
        .create_training_plan(coach().as_ref(), GenerationRequest::for_athlete(athlete_id))
        .await;
    assert!(again.is_ok());
}

#[tokio::test]
async fn test_unauthenticated_request_writes_nothing() {
    let server = MockServer::start().await;
    mount_reply(&server, &training_plan_json()).await;
    let api = api_with_server(&server, GenerationSettings::default());
    let athlete_id = seed_athlete(&api).await;

    let err = api
        .create_training_plan(None, GenerationRequest::for_athlete(athlete_id))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Unauthenticated));
    assert!(server.received_requests().await.unwrap().is_empty());
    assert!(api
        .list_jobs(coach().as_ref(), &Default::default())
        .await
        .unwrap()
        .is_empty());
}
