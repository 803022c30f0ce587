//! CLI presentation: text and json formatters per command family.

mod jobs;
mod provider;
mod records;
mod shared;

pub use jobs::{format_event, format_job, format_jobs, format_status_change, format_submitted};
pub use provider::format_provider_list;
pub use records::{
    format_assistant, format_assistants, format_athlete, format_athletes, format_goal,
    format_goals, format_session_log, format_session_logs,
};
pub use shared::OutputFormat;
