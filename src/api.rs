//! Coach API
//!
//! Resolver-level surface of the library: caller-scoped CRUD over domain
//! records, the generation mutations, and job queries and subscriptions.
//!
//! Generation mutations persist a `Pending` placeholder and hand the job to
//! the [`JobSupervisor`]; they return as soon as the placeholder is written.
//! Errors in the background run are only visible through the job's status
//! and the published events.

use crate::config::{ContextResolution, GenerationSettings};
use crate::context::ContextAssembler;
use crate::error::ApiError;
use crate::generation::{GenerationWorker, JobHandle, JobSupervisor};
use crate::job::{GenerationJob, JobKind, JobStatus, RelatedIds};
use crate::model::{
    Assistant, Athlete, AthleteUpdate, Goal, NewAssistant, NewAthlete, NewGoal, NewSessionLog,
    SessionLog,
};
use crate::notify::{NotificationBus, Subscription, Topic};
use crate::prompt::TemplateStore;
use crate::provider::GenerationProvider;
use crate::store::Repositories;
use crate::types::{CallerId, EntityId, JobId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Input shared by the generation mutations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Athlete the job is generated for.
    pub subject_id: EntityId,
    #[serde(default)]
    pub related: RelatedIds,
    #[serde(default)]
    pub instructions: Option<String>,
}

impl GenerationRequest {
    pub fn for_athlete(subject_id: impl Into<EntityId>) -> Self {
        Self {
            subject_id: subject_id.into(),
            related: RelatedIds::default(),
            instructions: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalEvaluationRequest {
    pub goal_id: EntityId,
    #[serde(default)]
    pub assistant_ids: Vec<EntityId>,
    #[serde(default)]
    pub instructions: Option<String>,
}

/// Filter for [`CoachApi::list_jobs`]; unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub athlete_id: Option<EntityId>,
    pub kind: Option<JobKind>,
    pub status: Option<JobStatus>,
}

impl JobFilter {
    fn matches(&self, job: &GenerationJob) -> bool {
        self.kind.map_or(true, |kind| job.kind == kind)
            && self.status.map_or(true, |status| job.status == status)
    }
}

/// A freshly written placeholder and the handle of its background run.
///
/// Dropping `handle` detaches the run; it still completes and publishes.
#[derive(Debug)]
pub struct SubmittedJob {
    pub job: GenerationJob,
    pub handle: JobHandle,
}

pub struct CoachApi {
    repos: Repositories,
    bus: NotificationBus,
    settings: GenerationSettings,
    supervisor: Option<JobSupervisor>,
}

impl CoachApi {
    /// API without a generation provider. Generation mutations fail with
    /// `ProviderNotConfigured` until [`CoachApi::with_provider`] is used.
    pub fn new(repos: Repositories, bus: NotificationBus, settings: GenerationSettings) -> Self {
        Self {
            repos,
            bus,
            settings,
            supervisor: None,
        }
    }

    pub fn with_provider(
        mut self,
        templates: Arc<TemplateStore>,
        provider: Arc<dyn GenerationProvider>,
    ) -> Self {
        let worker = GenerationWorker::new(self.repos.clone(), templates, provider)
            .with_recent_sessions(self.settings.recent_sessions);
        self.supervisor = Some(JobSupervisor::new(
            worker,
            self.repos.clone(),
            self.bus.clone(),
            self.settings.in_flight,
        ));
        self
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repos
    }

    pub fn supervisor(&self) -> Option<&JobSupervisor> {
        self.supervisor.as_ref()
    }

    pub async fn create_athlete(
        &self,
        caller: Option<&CallerId>,
        input: NewAthlete,
    ) -> Result<Athlete, ApiError> {
        let caller = require_caller(caller)?;
        input.validate()?;
        let athlete = self
            .repos
            .athletes
            .put(caller, input.into_record(caller.clone()))
            .await?;
        info!(caller = %caller, athlete_id = %athlete.id, "Athlete created");
        Ok(athlete)
    }

    pub async fn update_athlete(
        &self,
        caller: Option<&CallerId>,
        athlete_id: &EntityId,
        update: AthleteUpdate,
    ) -> Result<Athlete, ApiError> {
        let caller = require_caller(caller)?;
        update.validate()?;
        let mut athlete = self.athlete(caller, athlete_id).await?;
        if update.is_empty() {
            return Ok(athlete);
        }
        update.apply(&mut athlete);
        Ok(self.repos.athletes.put(caller, athlete).await?)
    }

    pub async fn delete_athlete(
        &self,
        caller: Option<&CallerId>,
        athlete_id: &EntityId,
    ) -> Result<(), ApiError> {
        let caller = require_caller(caller)?;
        if !self.repos.athletes.soft_delete(caller, athlete_id).await? {
            return Err(not_found("athlete", athlete_id));
        }
        info!(caller = %caller, athlete_id = %athlete_id, "Athlete deleted");
        Ok(())
    }

    pub async fn list_athletes(&self, caller: Option<&CallerId>) -> Result<Vec<Athlete>, ApiError> {
        let caller = require_caller(caller)?;
        Ok(self.repos.athletes.list(caller).await?)
    }

    pub async fn create_goal(
        &self,
        caller: Option<&CallerId>,
        input: NewGoal,
    ) -> Result<Goal, ApiError> {
        let caller = require_caller(caller)?;
        input.validate()?;
        self.athlete(caller, &input.athlete_id).await?;
        Ok(self
            .repos
            .goals
            .put(caller, input.into_record(caller.clone()))
            .await?)
    }

    pub async fn list_goals(
        &self,
        caller: Option<&CallerId>,
        athlete_id: &EntityId,
    ) -> Result<Vec<Goal>, ApiError> {
        let caller = require_caller(caller)?;
        Ok(self.repos.goals.list_for_athlete(caller, athlete_id).await?)
    }

    pub async fn log_session(
        &self,
        caller: Option<&CallerId>,
        input: NewSessionLog,
    ) -> Result<SessionLog, ApiError> {
        let caller = require_caller(caller)?;
        input.validate()?;
        self.athlete(caller, &input.athlete_id).await?;
        Ok(self
            .repos
            .session_logs
            .put(caller, input.into_record(caller.clone()))
            .await?)
    }

    pub async fn list_session_logs(
        &self,
        caller: Option<&CallerId>,
        athlete_id: &EntityId,
    ) -> Result<Vec<SessionLog>, ApiError> {
        let caller = require_caller(caller)?;
        Ok(self
            .repos
            .session_logs
            .list_for_athlete(caller, athlete_id)
            .await?)
    }

    pub async fn create_assistant(
        &self,
        caller: Option<&CallerId>,
        input: NewAssistant,
    ) -> Result<Assistant, ApiError> {
        let caller = require_caller(caller)?;
        input.validate()?;
        Ok(self
            .repos
            .assistants
            .put(caller, input.into_record(caller.clone()))
            .await?)
    }

    pub async fn list_assistants(
        &self,
        caller: Option<&CallerId>,
    ) -> Result<Vec<Assistant>, ApiError> {
        let caller = require_caller(caller)?;
        Ok(self.repos.assistants.list(caller).await?)
    }

    pub async fn create_training_plan(
        &self,
        caller: Option<&CallerId>,
        request: GenerationRequest,
    ) -> Result<SubmittedJob, ApiError> {
        self.submit_generation(caller, JobKind::TrainingPlan, request)
            .await
    }

    /// Session plan for an athlete. `related.training_plan_id` selects the
    /// parent plan; without it the latest generated training plan is used.
    pub async fn create_session_plan(
        &self,
        caller: Option<&CallerId>,
        request: GenerationRequest,
    ) -> Result<SubmittedJob, ApiError> {
        self.submit_generation(caller, JobKind::SessionPlan, request)
            .await
    }

    /// Evaluate one goal. The goal must resolve since it names the subject athlete.
    pub async fn evaluate_goal(
        &self,
        caller: Option<&CallerId>,
        request: GoalEvaluationRequest,
    ) -> Result<SubmittedJob, ApiError> {
        let caller_id = require_caller(caller)?;
        let goal = self
            .repos
            .goals
            .get(caller_id, &request.goal_id)
            .await?
            .ok_or_else(|| not_found("goal", &request.goal_id))?;
        let request = GenerationRequest {
            subject_id: goal.athlete_id,
            related: RelatedIds {
                goal_ids: vec![goal.id],
                assistant_ids: request.assistant_ids,
                training_plan_id: None,
            },
            instructions: request.instructions,
        };
        self.submit_generation(caller, JobKind::GoalEvaluation, request)
            .await
    }

    pub async fn analyze_progress(
        &self,
        caller: Option<&CallerId>,
        request: GenerationRequest,
    ) -> Result<SubmittedJob, ApiError> {
        self.submit_generation(caller, JobKind::ProgressAnalysis, request)
            .await
    }

    /// Start a fresh run of a job that ended in `Error` or `Generated`.
    pub async fn resubmit_job(
        &self,
        caller: Option<&CallerId>,
        job_id: &JobId,
    ) -> Result<SubmittedJob, ApiError> {
        let caller = require_caller(caller)?;
        let supervisor = self.generation_supervisor()?;
        let current = self.job(caller, job_id).await?;
        let slot = supervisor.reserve(current.kind, &current.subject_id, job_id)?;
        let job = self
            .repos
            .jobs
            .update(caller, job_id, &|job: &mut GenerationJob| job.resubmit())
            .await?;
        info!(
            caller = %caller,
            job_id = %job.id,
            kind = %job.kind,
            attempt = job.attempt,
            "Generation job resubmitted"
        );
        let handle = supervisor.submit(&job, caller.clone(), slot);
        Ok(SubmittedJob { job, handle })
    }

    async fn submit_generation(
        &self,
        caller: Option<&CallerId>,
        kind: JobKind,
        request: GenerationRequest,
    ) -> Result<SubmittedJob, ApiError> {
        let caller = require_caller(caller)?;
        let supervisor = self.generation_supervisor()?;
        self.check_references(caller, kind, &request).await?;

        let instructions = request
            .instructions
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());
        let placeholder = GenerationJob::placeholder(
            kind,
            caller.clone(),
            request.subject_id,
            request.related,
            instructions,
        );
        let slot = supervisor.reserve(kind, &placeholder.subject_id, &placeholder.id)?;
        let job = self.repos.jobs.put(caller, placeholder).await?;
        info!(
            caller = %caller,
            job_id = %job.id,
            kind = %kind,
            subject_id = %job.subject_id,
            "Generation job created"
        );

        let handle = supervisor.submit(&job, caller.clone(), slot);
        Ok(SubmittedJob { job, handle })
    }

    /// Resolve the request's references. Strict mode rejects the first miss;
    /// lenient mode logs every miss and lets the worker decide.
    async fn check_references(
        &self,
        caller: &CallerId,
        kind: JobKind,
        request: &GenerationRequest,
    ) -> Result<(), ApiError> {
        let assembler = ContextAssembler::new(
            self.repos.clone(),
            caller.clone(),
            self.settings.recent_sessions,
        );
        let missing = assembler
            .missing_references(&request.subject_id, &request.related)
            .await?;
        match self.settings.context_resolution {
            ContextResolution::Strict => match missing.into_iter().next() {
                Some(reference) => Err(reference.into_error()),
                None => Ok(()),
            },
            ContextResolution::Lenient => {
                for reference in missing {
                    warn!(
                        caller = %caller,
                        kind = %kind,
                        reference_kind = reference.kind,
                        reference_id = %reference.id,
                        "Referenced record not found, creating job anyway"
                    );
                }
                Ok(())
            }
        }
    }

    pub async fn get_job(
        &self,
        caller: Option<&CallerId>,
        job_id: &JobId,
    ) -> Result<GenerationJob, ApiError> {
        let caller = require_caller(caller)?;
        self.job(caller, job_id).await
    }

    pub async fn list_jobs(
        &self,
        caller: Option<&CallerId>,
        filter: &JobFilter,
    ) -> Result<Vec<GenerationJob>, ApiError> {
        let caller = require_caller(caller)?;
        let jobs = match &filter.athlete_id {
            Some(athlete_id) => self.repos.jobs.list_for_athlete(caller, athlete_id).await?,
            None => self.repos.jobs.list(caller).await?,
        };
        Ok(jobs.into_iter().filter(|job| filter.matches(job)).collect())
    }

    /// Subscribe to the caller's job events, optionally limited to `topics`.
    pub fn subscribe(
        &self,
        caller: Option<&CallerId>,
        topics: Option<Vec<Topic>>,
    ) -> Result<Subscription, ApiError> {
        let caller = require_caller(caller)?;
        let subscription = match topics {
            Some(topics) => self.bus.subscribe_to(topics),
            None => self.bus.subscribe(),
        };
        Ok(subscription.for_owner(caller.clone()))
    }

    fn generation_supervisor(&self) -> Result<&JobSupervisor, ApiError> {
        self.supervisor.as_ref().ok_or_else(|| {
            ApiError::ProviderNotConfigured(
                "no generation provider configured; set [generation] provider".to_string(),
            )
        })
    }

    async fn athlete(&self, caller: &CallerId, id: &EntityId) -> Result<Athlete, ApiError> {
        self.repos
            .athletes
            .get(caller, id)
            .await?
            .ok_or_else(|| not_found("athlete", id))
    }

    async fn job(&self, caller: &CallerId, id: &JobId) -> Result<GenerationJob, ApiError> {
        self.repos
            .jobs
            .get(caller, id)
            .await?
            .ok_or_else(|| not_found("job", id))
    }
}

fn require_caller(caller: Option<&CallerId>) -> Result<&CallerId, ApiError> {
    match caller {
        Some(caller) if !caller.as_str().trim().is_empty() => Ok(caller),
        _ => Err(ApiError::Unauthenticated),
    }
}

fn not_found(kind: &'static str, id: &EntityId) -> ApiError {
    ApiError::NotFound {
        kind,
        id: id.to_string(),
    }
}
