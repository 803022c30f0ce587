//! Formatters for athletes, goals, session logs and assistants.

use super::shared::{detail_table, or_dash, table, timestamp, to_json, OutputFormat};
use crate::error::ApiError;
use crate::model::{Assistant, Athlete, Goal, SessionLog};

pub fn format_athlete(athlete: &Athlete, format: OutputFormat) -> Result<String, ApiError> {
    if format == OutputFormat::Json {
        return to_json(athlete);
    }
    Ok(detail_table(vec![
        ("ID", athlete.id.to_string()),
        ("Name", athlete.name.clone()),
        ("Sport", or_dash(athlete.sport.as_deref())),
        ("Level", or_dash(athlete.level.as_deref())),
        ("Notes", or_dash(athlete.notes.as_deref())),
        ("Updated", timestamp(athlete.updated_at_ms)),
    ]))
}

pub fn format_athletes(athletes: &[Athlete], format: OutputFormat) -> Result<String, ApiError> {
    if format == OutputFormat::Json {
        return to_json(athletes);
    }
    if athletes.is_empty() {
        return Ok("No athletes.".to_string());
    }
    let mut table = table(vec!["ID", "Name", "Sport", "Level"]);
    for athlete in athletes {
        table.add_row(vec![
            athlete.id.to_string(),
            athlete.name.clone(),
            or_dash(athlete.sport.as_deref()),
            or_dash(athlete.level.as_deref()),
        ]);
    }
    Ok(table.to_string())
}

pub fn format_goal(goal: &Goal, format: OutputFormat) -> Result<String, ApiError> {
    if format == OutputFormat::Json {
        return to_json(goal);
    }
    Ok(detail_table(vec![
        ("ID", goal.id.to_string()),
        ("Athlete", goal.athlete_id.to_string()),
        ("Title", goal.title.clone()),
        ("Description", or_dash(goal.description.as_deref())),
        ("Target date", or_dash(goal.target_date.as_deref())),
        ("Status", goal.status.as_str().to_string()),
    ]))
}

pub fn format_goals(goals: &[Goal], format: OutputFormat) -> Result<String, ApiError> {
    if format == OutputFormat::Json {
        return to_json(goals);
    }
    if goals.is_empty() {
        return Ok("No goals.".to_string());
    }
    let mut table = table(vec!["ID", "Title", "Target", "Status"]);
    for goal in goals {
        table.add_row(vec![
            goal.id.to_string(),
            goal.title.clone(),
            or_dash(goal.target_date.as_deref()),
            goal.status.as_str().to_string(),
        ]);
    }
    Ok(table.to_string())
}

pub fn format_session_log(log: &SessionLog, format: OutputFormat) -> Result<String, ApiError> {
    if format == OutputFormat::Json {
        return to_json(log);
    }
    Ok(detail_table(vec![
        ("ID", log.id.to_string()),
        ("Athlete", log.athlete_id.to_string()),
        ("Date", log.performed_on.clone()),
        ("Minutes", or_dash(log.duration_minutes.map(|m| m.to_string()).as_deref())),
        ("Effort", or_dash(log.perceived_effort.map(|e| e.to_string()).as_deref())),
        ("Notes", or_dash(log.notes.as_deref())),
    ]))
}

pub fn format_session_logs(logs: &[SessionLog], format: OutputFormat) -> Result<String, ApiError> {
    if format == OutputFormat::Json {
        return to_json(logs);
    }
    if logs.is_empty() {
        return Ok("No sessions logged.".to_string());
    }
    let mut table = table(vec!["Date", "Minutes", "Effort", "Notes"]);
    for log in logs {
        table.add_row(vec![
            log.performed_on.clone(),
            or_dash(log.duration_minutes.map(|m| m.to_string()).as_deref()),
            or_dash(log.perceived_effort.map(|e| e.to_string()).as_deref()),
            or_dash(log.notes.as_deref()),
        ]);
    }
    Ok(table.to_string())
}

pub fn format_assistant(assistant: &Assistant, format: OutputFormat) -> Result<String, ApiError> {
    if format == OutputFormat::Json {
        return to_json(assistant);
    }
    Ok(detail_table(vec![
        ("ID", assistant.id.to_string()),
        ("Name", assistant.name.clone()),
        ("Instructions", assistant.instructions.clone()),
    ]))
}

pub fn format_assistants(assistants: &[Assistant], format: OutputFormat) -> Result<String, ApiError> {
    if format == OutputFormat::Json {
        return to_json(assistants);
    }
    if assistants.is_empty() {
        return Ok("No assistants.".to_string());
    }
    let mut table = table(vec!["ID", "Name", "Instructions"]);
    for assistant in assistants {
        let mut instructions: String = assistant.instructions.chars().take(60).collect();
        if assistant.instructions.chars().count() > 60 {
            instructions.push_str("...");
        }
        table.add_row(vec![assistant.id.to_string(), assistant.name.clone(), instructions]);
    }
    Ok(table.to_string())
}
