//! Generation jobs: status-tracked AI content attached to an athlete.
//!
//! A job moves through a small closed state set. The transition methods on
//! [`GenerationJob`] are the only way to change status or content, which keeps
//! `content.is_some() == (status == Generated)` true for every stored job.

use crate::error::ApiError;
use crate::types::{now_millis, CallerId, EntityId, JobId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Generating,
    Generated,
    Error,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Generating => "generating",
            JobStatus::Generated => "generated",
            JobStatus::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        [
            JobStatus::Pending,
            JobStatus::Generating,
            JobStatus::Generated,
            JobStatus::Error,
        ]
        .into_iter()
        .find(|status| status.as_str() == value)
    }

    /// Generated and Error end a run; only an explicit resubmit leaves them.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Generated | JobStatus::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    TrainingPlan,
    SessionPlan,
    GoalEvaluation,
    ProgressAnalysis,
}

impl JobKind {
    pub const ALL: [JobKind; 4] = [
        JobKind::TrainingPlan,
        JobKind::SessionPlan,
        JobKind::GoalEvaluation,
        JobKind::ProgressAnalysis,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::TrainingPlan => "training_plan",
            JobKind::SessionPlan => "session_plan",
            JobKind::GoalEvaluation => "goal_evaluation",
            JobKind::ProgressAnalysis => "progress_analysis",
        }
    }

    /// Name of the prompt template rendered for this kind.
    pub fn template_name(self) -> &'static str {
        self.as_str()
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Secondary records a job's context is built from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelatedIds {
    #[serde(default)]
    pub goal_ids: Vec<EntityId>,
    #[serde(default)]
    pub assistant_ids: Vec<EntityId>,
    /// Parent training plan, used by session plans.
    #[serde(default)]
    pub training_plan_id: Option<JobId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationJob {
    pub id: JobId,
    pub kind: JobKind,
    pub owner: CallerId,
    /// The athlete the job's context is built around.
    pub subject_id: EntityId,
    #[serde(default)]
    pub related: RelatedIds,
    /// Free-form coach instructions appended to the prompt.
    #[serde(default)]
    pub instructions: Option<String>,
    pub status: JobStatus,
    #[serde(default)]
    pub content: Option<Value>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    /// Exact rendered prompt sent to the provider.
    #[serde(default)]
    pub source_context: Option<String>,
    #[serde(default)]
    pub source_digest: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    /// Incremented on every explicit resubmit.
    #[serde(default = "first_attempt")]
    pub attempt: u32,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    #[serde(default)]
    pub deleted_at_ms: Option<u64>,
}

fn first_attempt() -> u32 {
    1
}

impl GenerationJob {
    /// New job awaiting generation: `Pending` with no content.
    pub fn placeholder(
        kind: JobKind,
        owner: CallerId,
        subject_id: EntityId,
        related: RelatedIds,
        instructions: Option<String>,
    ) -> Self {
        let now = now_millis();
        Self {
            id: EntityId::generate(),
            kind,
            owner,
            subject_id,
            related,
            instructions,
            status: JobStatus::Pending,
            content: None,
            title: None,
            summary: None,
            source_context: None,
            source_digest: None,
            error: None,
            attempt: first_attempt(),
            created_at_ms: now,
            updated_at_ms: now,
            deleted_at_ms: None,
        }
    }

    pub fn begin_generating(&mut self) -> Result<(), ApiError> {
        self.expect_status(&[JobStatus::Pending], JobStatus::Generating)?;
        self.status = JobStatus::Generating;
        self.error = None;
        Ok(())
    }

    /// Record the rendered prompt used for this run.
    pub fn record_source(&mut self, source_context: String, digest: String) {
        self.source_context = Some(source_context);
        self.source_digest = Some(digest);
    }

    pub fn complete(
        &mut self,
        content: Value,
        title: Option<String>,
        summary: Option<String>,
    ) -> Result<(), ApiError> {
        self.expect_status(&[JobStatus::Generating], JobStatus::Generated)?;
        self.status = JobStatus::Generated;
        self.content = Some(content);
        self.title = title;
        self.summary = summary;
        self.error = None;
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), ApiError> {
        self.expect_status(&[JobStatus::Pending, JobStatus::Generating], JobStatus::Error)?;
        self.force_error(message);
        Ok(())
    }

    /// Terminal safety net: mark the job failed regardless of its current status.
    pub fn force_error(&mut self, message: impl Into<String>) {
        self.status = JobStatus::Error;
        self.content = None;
        self.error = Some(message.into());
    }

    /// Explicit client action that starts a fresh run of a finished job.
    pub fn resubmit(&mut self) -> Result<(), ApiError> {
        self.expect_status(&[JobStatus::Error, JobStatus::Generated], JobStatus::Pending)?;
        self.status = JobStatus::Pending;
        self.content = None;
        self.title = None;
        self.summary = None;
        self.error = None;
        self.attempt += 1;
        Ok(())
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at_ms.is_some()
    }

    fn expect_status(&self, allowed: &[JobStatus], to: JobStatus) -> Result<(), ApiError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(ApiError::InvalidTransition {
                job_id: self.id.clone(),
                from: self.status.as_str(),
                to: to.as_str(),
            })
        }
    }
}
