//! Response schemas for each job kind.
//!
//! Provider output is untrusted: it is deserialised into the typed content
//! for the job kind and then checked for the semantic constraints serde
//! cannot express. Any mismatch is a [`ApiError::ResponseValidation`].

use crate::error::ApiError;
use crate::job::JobKind;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const SUMMARY_MAX_CHARS: usize = 280;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingPlanContent {
    pub title: String,
    pub overview: String,
    pub weeks: Vec<PlanWeek>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanWeek {
    pub week: u32,
    pub focus: String,
    pub sessions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionPlanContent {
    pub title: String,
    pub objective: String,
    pub blocks: Vec<SessionBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionBlock {
    pub name: String,
    pub duration_minutes: u32,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalVerdict {
    OnTrack,
    AtRisk,
    OffTrack,
}

impl GoalVerdict {
    pub fn label(self) -> &'static str {
        match self {
            GoalVerdict::OnTrack => "on track",
            GoalVerdict::AtRisk => "at risk",
            GoalVerdict::OffTrack => "off track",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalEvaluationContent {
    pub verdict: GoalVerdict,
    pub score: u8,
    pub rationale: String,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressAnalysisContent {
    pub summary: String,
    #[serde(default)]
    pub trends: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

/// Content that passed validation, with summary fields derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedContent {
    pub content: Value,
    pub title: Option<String>,
    pub summary: Option<String>,
}

/// Validate `value` against the schema of `kind`.
pub fn validate(kind: JobKind, value: Value) -> Result<ValidatedContent, ApiError> {
    let (title, summary) = match kind {
        JobKind::TrainingPlan => {
            let plan: TrainingPlanContent = typed(kind, &value)?;
            require_text(kind, "title", &plan.title)?;
            if plan.weeks.is_empty() {
                return Err(invalid(kind, "weeks must not be empty"));
            }
            if let Some(week) = plan.weeks.iter().find(|w| w.sessions.is_empty()) {
                return Err(invalid(
                    kind,
                    &format!("week {} has no sessions", week.week),
                ));
            }
            (plan.title, plan.overview)
        }
        JobKind::SessionPlan => {
            let plan: SessionPlanContent = typed(kind, &value)?;
            require_text(kind, "title", &plan.title)?;
            if plan.blocks.is_empty() {
                return Err(invalid(kind, "blocks must not be empty"));
            }
            if let Some(block) = plan.blocks.iter().find(|b| b.duration_minutes == 0) {
                return Err(invalid(
                    kind,
                    &format!("block '{}' has zero duration", block.name),
                ));
            }
            (plan.title, plan.objective)
        }
        JobKind::GoalEvaluation => {
            let eval: GoalEvaluationContent = typed(kind, &value)?;
            if eval.score > 100 {
                return Err(invalid(
                    kind,
                    &format!("score must be within 0..=100, got {}", eval.score),
                ));
            }
            require_text(kind, "rationale", &eval.rationale)?;
            (
                format!("Goal evaluation: {}", eval.verdict.label()),
                eval.rationale,
            )
        }
        JobKind::ProgressAnalysis => {
            let analysis: ProgressAnalysisContent = typed(kind, &value)?;
            require_text(kind, "summary", &analysis.summary)?;
            ("Progress analysis".to_string(), analysis.summary)
        }
    };

    Ok(ValidatedContent {
        content: value,
        title: Some(title.trim().to_string()),
        summary: non_empty(truncate(summary.trim(), SUMMARY_MAX_CHARS)),
    })
}

/// JSON schema hint sent to providers alongside the prompt.
pub fn response_schema(kind: JobKind) -> Value {
    let string_list = json!({"type": "array", "items": {"type": "string"}});
    match kind {
        JobKind::TrainingPlan => json!({
            "type": "object",
            "required": ["title", "overview", "weeks"],
            "properties": {
                "title": {"type": "string"},
                "overview": {"type": "string"},
                "weeks": {"type": "array", "items": {
                    "type": "object",
                    "required": ["week", "focus", "sessions"],
                    "properties": {
                        "week": {"type": "integer"},
                        "focus": {"type": "string"},
                        "sessions": string_list,
                    }
                }}
            }
        }),
        JobKind::SessionPlan => json!({
            "type": "object",
            "required": ["title", "objective", "blocks"],
            "properties": {
                "title": {"type": "string"},
                "objective": {"type": "string"},
                "blocks": {"type": "array", "items": {
                    "type": "object",
                    "required": ["name", "duration_minutes"],
                    "properties": {
                        "name": {"type": "string"},
                        "duration_minutes": {"type": "integer"},
                        "description": {"type": "string"},
                    }
                }}
            }
        }),
        JobKind::GoalEvaluation => json!({
            "type": "object",
            "required": ["verdict", "score", "rationale"],
            "properties": {
                "verdict": {"enum": ["on_track", "at_risk", "off_track"]},
                "score": {"type": "integer", "minimum": 0, "maximum": 100},
                "rationale": {"type": "string"},
                "recommendations": string_list,
            }
        }),
        JobKind::ProgressAnalysis => json!({
            "type": "object",
            "required": ["summary"],
            "properties": {
                "summary": {"type": "string"},
                "trends": string_list,
                "recommendations": string_list,
            }
        }),
    }
}

fn typed<T: DeserializeOwned>(kind: JobKind, value: &Value) -> Result<T, ApiError> {
    T::deserialize(value).map_err(|e| invalid(kind, &e.to_string()))
}

fn require_text(kind: JobKind, field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(invalid(kind, &format!("{} must not be empty", field)));
    }
    Ok(())
}

fn invalid(kind: JobKind, detail: &str) -> ApiError {
    ApiError::ResponseValidation(format!("{} response: {}", kind, detail))
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
