//! Context assembly for generation prompts.
//!
//! The subject athlete must exist. Everything else (goals, session logs,
//! assistants, a parent training plan) is best effort: missing records are
//! logged and the corresponding prompt variable falls back to placeholder
//! text, so every template variable always has a value.

use crate::error::{ApiError, StorageError};
use crate::job::{GenerationJob, JobKind, JobStatus, RelatedIds};
use crate::model::{Assistant, Athlete, Goal, GoalStatus, SessionLog};
use crate::prompt::PromptVariables;
use crate::store::{BatchLoader, Repositories};
use crate::types::{CallerId, EntityId};
use std::fmt::Write as _;
use tracing::{debug, warn};

pub const FALLBACK_NONE: &str = "None";
pub const FALLBACK_NA: &str = "N/A";

pub const VAR_ATHLETE_NAME: &str = "athleteName";
pub const VAR_ATHLETE_SPORT: &str = "athleteSport";
pub const VAR_ATHLETE_LEVEL: &str = "athleteLevel";
pub const VAR_ATHLETE_NOTES: &str = "athleteNotes";
pub const VAR_GOALS: &str = "goals";
pub const VAR_RECENT_SESSIONS: &str = "recentSessions";
pub const VAR_ASSISTANT_INSTRUCTIONS: &str = "assistantInstructions";
pub const VAR_COACH_INSTRUCTIONS: &str = "coachInstructions";
pub const VAR_TRAINING_PLAN: &str = "trainingPlan";
pub const VAR_GOAL_TITLE: &str = "goalTitle";
pub const VAR_GOAL_DESCRIPTION: &str = "goalDescription";
pub const VAR_GOAL_TARGET_DATE: &str = "goalTargetDate";
pub const VAR_TODAY: &str = "today";

/// Every variable the assembler defines, for any job kind.
pub const KNOWN_VARIABLES: &[&str] = &[
    VAR_ATHLETE_NAME,
    VAR_ATHLETE_SPORT,
    VAR_ATHLETE_LEVEL,
    VAR_ATHLETE_NOTES,
    VAR_GOALS,
    VAR_RECENT_SESSIONS,
    VAR_ASSISTANT_INSTRUCTIONS,
    VAR_COACH_INSTRUCTIONS,
    VAR_TRAINING_PLAN,
    VAR_GOAL_TITLE,
    VAR_GOAL_DESCRIPTION,
    VAR_GOAL_TARGET_DATE,
    VAR_TODAY,
];

/// A reference from a job request to a record that does not resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingReference {
    pub kind: &'static str,
    pub id: EntityId,
}

impl MissingReference {
    pub fn into_error(self) -> ApiError {
        ApiError::NotFound {
            kind: self.kind,
            id: self.id.to_string(),
        }
    }
}

pub struct ContextAssembler {
    repos: Repositories,
    caller: CallerId,
    recent_sessions: usize,
    goals: BatchLoader<Goal>,
    assistants: BatchLoader<Assistant>,
}

impl ContextAssembler {
    pub fn new(repos: Repositories, caller: CallerId, recent_sessions: usize) -> Self {
        let goals = BatchLoader::new(repos.goals.clone(), caller.clone());
        let assistants = BatchLoader::new(repos.assistants.clone(), caller.clone());
        Self {
            repos,
            caller,
            recent_sessions,
            goals,
            assistants,
        }
    }

    /// References in a request that do not resolve for this caller, subject first.
    pub async fn missing_references(
        &self,
        subject_id: &EntityId,
        related: &RelatedIds,
    ) -> Result<Vec<MissingReference>, StorageError> {
        let mut missing = Vec::new();
        if self.repos.athletes.get(&self.caller, subject_id).await?.is_none() {
            missing.push(MissingReference {
                kind: "athlete",
                id: subject_id.clone(),
            });
        }
        let (found, absent) = self.goals.load_found(&related.goal_ids).await?;
        let foreign = found
            .into_iter()
            .filter(|goal| &goal.athlete_id != subject_id)
            .map(|goal| goal.id);
        missing.extend(
            absent
                .into_iter()
                .chain(foreign)
                .map(|id| MissingReference { kind: "goal", id }),
        );
        let (_, assistants) = self.assistants.load_found(&related.assistant_ids).await?;
        missing.extend(
            assistants
                .into_iter()
                .map(|id| MissingReference { kind: "assistant", id }),
        );
        if let Some(plan_id) = &related.training_plan_id {
            let plan = self.repos.jobs.get(&self.caller, plan_id).await?;
            if plan.map(|p| p.kind) != Some(JobKind::TrainingPlan) {
                missing.push(MissingReference {
                    kind: "training plan",
                    id: plan_id.clone(),
                });
            }
        }
        Ok(missing)
    }

    /// Gather everything the job's prompt needs.
    pub async fn assemble(&self, job: &GenerationJob) -> Result<PromptVariables, ApiError> {
        let athlete = self
            .repos
            .athletes
            .get(&self.caller, &job.subject_id)
            .await?
            .ok_or_else(|| ApiError::SubjectNotFound(format!("athlete {}", job.subject_id)))?;

        let goals = self.goals_for(job).await?;
        let sessions = self.recent_sessions_for(&athlete.id).await?;
        let assistants = self.assistants_for(job).await?;
        let training_plan = if job.kind == JobKind::SessionPlan {
            self.training_plan_for(job).await?
        } else {
            None
        };
        let evaluated_goal = if job.kind == JobKind::GoalEvaluation {
            goals.first().cloned()
        } else {
            None
        };

        debug!(
            job_id = %job.id,
            athlete_id = %athlete.id,
            goals = goals.len(),
            sessions = sessions.len(),
            assistants = assistants.len(),
            has_training_plan = training_plan.is_some(),
            "Assembled generation context"
        );

        let mut vars = athlete_variables(&athlete);
        vars.insert(VAR_GOALS, format_goals(&goals), FALLBACK_NONE);
        vars.insert(VAR_RECENT_SESSIONS, format_sessions(&sessions), FALLBACK_NONE);
        vars.insert(
            VAR_ASSISTANT_INSTRUCTIONS,
            format_assistants(&assistants),
            "",
        );
        vars.insert(VAR_COACH_INSTRUCTIONS, job.instructions.clone(), FALLBACK_NONE);
        vars.insert(VAR_TRAINING_PLAN, training_plan, FALLBACK_NONE);
        vars.insert(
            VAR_GOAL_TITLE,
            evaluated_goal.as_ref().map(|g| g.title.clone()),
            FALLBACK_NA,
        );
        vars.insert(
            VAR_GOAL_DESCRIPTION,
            evaluated_goal.as_ref().and_then(|g| g.description.clone()),
            FALLBACK_NA,
        );
        vars.insert(
            VAR_GOAL_TARGET_DATE,
            evaluated_goal.as_ref().and_then(|g| g.target_date.clone()),
            FALLBACK_NA,
        );
        vars.insert(
            VAR_TODAY,
            Some(chrono::Utc::now().date_naive().format("%Y-%m-%d").to_string()),
            FALLBACK_NA,
        );
        Ok(vars)
    }

    /// Explicitly referenced goals, or the athlete's active goals when none were given.
    async fn goals_for(&self, job: &GenerationJob) -> Result<Vec<Goal>, StorageError> {
        if job.related.goal_ids.is_empty() {
            let goals = self
                .repos
                .goals
                .list_for_athlete(&self.caller, &job.subject_id)
                .await?;
            return Ok(goals
                .into_iter()
                .filter(|g| g.status == GoalStatus::Active)
                .collect());
        }
        let (found, missing) = self.goals.load_found(&job.related.goal_ids).await?;
        for id in missing {
            warn!(job_id = %job.id, goal_id = %id, "Referenced goal not found, continuing without it");
        }
        let (own, foreign): (Vec<Goal>, Vec<Goal>) = found
            .into_iter()
            .partition(|goal| goal.athlete_id == job.subject_id);
        for goal in foreign {
            warn!(
                job_id = %job.id,
                goal_id = %goal.id,
                goal_athlete_id = %goal.athlete_id,
                "Referenced goal belongs to another athlete, continuing without it"
            );
        }
        Ok(own)
    }

    async fn recent_sessions_for(
        &self,
        athlete_id: &EntityId,
    ) -> Result<Vec<SessionLog>, StorageError> {
        let mut sessions = self
            .repos
            .session_logs
            .list_for_athlete(&self.caller, athlete_id)
            .await?;
        sessions.sort_by(|a, b| {
            b.performed_on
                .cmp(&a.performed_on)
                .then(b.created_at_ms.cmp(&a.created_at_ms))
        });
        sessions.truncate(self.recent_sessions);
        Ok(sessions)
    }

    async fn assistants_for(&self, job: &GenerationJob) -> Result<Vec<Assistant>, StorageError> {
        let (found, missing) = self.assistants.load_found(&job.related.assistant_ids).await?;
        for id in missing {
            warn!(job_id = %job.id, assistant_id = %id, "Referenced assistant not found, continuing without it");
        }
        Ok(found)
    }

    /// Text form of the parent plan: the referenced one, else the athlete's latest generated plan.
    async fn training_plan_for(&self, job: &GenerationJob) -> Result<Option<String>, StorageError> {
        let plan = match &job.related.training_plan_id {
            Some(plan_id) => {
                let plan = self.repos.jobs.get(&self.caller, plan_id).await?;
                match plan {
                    Some(plan) if plan.kind == JobKind::TrainingPlan => Some(plan),
                    Some(other) => {
                        warn!(job_id = %job.id, training_plan_id = %plan_id, kind = %other.kind, "Referenced job is not a training plan, continuing without it");
                        None
                    }
                    None => {
                        warn!(job_id = %job.id, training_plan_id = %plan_id, "Referenced training plan not found, continuing without it");
                        None
                    }
                }
            }
            None => self
                .repos
                .jobs
                .list_for_athlete(&self.caller, &job.subject_id)
                .await?
                .into_iter()
                .filter(|j| j.kind == JobKind::TrainingPlan && j.status == JobStatus::Generated)
                .max_by_key(|j| j.updated_at_ms),
        };

        Ok(plan.and_then(|plan| {
            if plan.status != JobStatus::Generated {
                warn!(job_id = %job.id, training_plan_id = %plan.id, status = %plan.status, "Training plan has no content yet");
                return None;
            }
            Some(format_training_plan(&plan))
        }))
    }
}

fn athlete_variables(athlete: &Athlete) -> PromptVariables {
    PromptVariables::new()
        .with(VAR_ATHLETE_NAME, Some(athlete.name.clone()), "the athlete")
        .with(VAR_ATHLETE_SPORT, athlete.sport.clone(), FALLBACK_NA)
        .with(VAR_ATHLETE_LEVEL, athlete.level.clone(), FALLBACK_NA)
        .with(VAR_ATHLETE_NOTES, athlete.notes.clone(), FALLBACK_NONE)
}

fn format_goals(goals: &[Goal]) -> Option<String> {
    if goals.is_empty() {
        return None;
    }
    let mut out = String::new();
    for goal in goals {
        let _ = write!(out, "- {} ({}", goal.title, goal.status.as_str());
        if let Some(date) = &goal.target_date {
            let _ = write!(out, ", target {}", date);
        }
        out.push(')');
        if let Some(description) = &goal.description {
            let _ = write!(out, ": {}", description);
        }
        out.push('\n');
    }
    Some(out.trim_end().to_string())
}

fn format_sessions(sessions: &[SessionLog]) -> Option<String> {
    if sessions.is_empty() {
        return None;
    }
    let lines: Vec<String> = sessions
        .iter()
        .map(|s| {
            let mut line = format!("- {}", s.performed_on);
            if let Some(minutes) = s.duration_minutes {
                let _ = write!(line, ", {} min", minutes);
            }
            if let Some(effort) = s.perceived_effort {
                let _ = write!(line, ", effort {}/10", effort);
            }
            if let Some(notes) = &s.notes {
                let _ = write!(line, ": {}", notes);
            }
            line
        })
        .collect();
    Some(lines.join("\n"))
}

fn format_assistants(assistants: &[Assistant]) -> Option<String> {
    if assistants.is_empty() {
        return None;
    }
    Some(
        assistants
            .iter()
            .map(|a| a.instructions.trim())
            .collect::<Vec<_>>()
            .join("\n\n"),
    )
}

fn format_training_plan(plan: &GenerationJob) -> String {
    let mut out = plan.title.clone().unwrap_or_else(|| "Training plan".to_string());
    if let Some(summary) = &plan.summary {
        let _ = write!(out, ": {}", summary);
    }
    if let Some(content) = &plan.content {
        let _ = write!(out, "\n{}", content);
    }
    out
}
