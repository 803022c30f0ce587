//! Formatters for generation jobs and job events.

use super::shared::{detail_table, or_dash, table, timestamp, to_json, OutputFormat};
use crate::error::ApiError;
use crate::job::GenerationJob;
use crate::notify::JobEvent;
use serde_json::json;

pub fn format_job(job: &GenerationJob, format: OutputFormat) -> Result<String, ApiError> {
    if format == OutputFormat::Json {
        return to_json(job);
    }
    let mut out = detail_table(vec![
        ("ID", job.id.to_string()),
        ("Kind", job.kind.to_string()),
        ("Status", job.status.to_string()),
        ("Athlete", job.subject_id.to_string()),
        ("Attempt", job.attempt.to_string()),
        ("Title", or_dash(job.title.as_deref())),
        ("Summary", or_dash(job.summary.as_deref())),
        ("Error", or_dash(job.error.as_deref())),
        ("Prompt digest", or_dash(job.source_digest.as_deref())),
        ("Created", timestamp(job.created_at_ms)),
        ("Updated", timestamp(job.updated_at_ms)),
    ]);
    if let Some(content) = &job.content {
        out.push_str("\n\n");
        out.push_str(&to_json(content)?);
    }
    Ok(out)
}

pub fn format_jobs(jobs: &[GenerationJob], format: OutputFormat) -> Result<String, ApiError> {
    if format == OutputFormat::Json {
        return to_json(jobs);
    }
    if jobs.is_empty() {
        return Ok("No jobs.".to_string());
    }
    let mut table = table(vec!["ID", "Kind", "Status", "Athlete", "Title", "Attempt", "Updated"]);
    for job in jobs {
        table.add_row(vec![
            job.id.to_string(),
            job.kind.to_string(),
            job.status.to_string(),
            job.subject_id.to_string(),
            or_dash(job.title.as_deref()),
            job.attempt.to_string(),
            timestamp(job.updated_at_ms),
        ]);
    }
    Ok(table.to_string())
}

/// Response to a generation command that did not wait.
pub fn format_submitted(job: &GenerationJob, format: OutputFormat) -> Result<String, ApiError> {
    if format == OutputFormat::Json {
        return to_json(job);
    }
    Ok(format!(
        "Created {} job {} ({}). Check it with: coachgen job show {}",
        job.kind, job.id, job.status, job.id
    ))
}

/// One line per observed status change.
pub fn format_status_change(job: &GenerationJob, format: OutputFormat) -> Result<String, ApiError> {
    if format == OutputFormat::Json {
        let line = json!({
            "job_id": job.id,
            "kind": job.kind,
            "status": job.status,
            "attempt": job.attempt,
            "updated_at": timestamp(job.updated_at_ms),
            "title": job.title,
            "error": job.error,
        });
        return serde_json::to_string(&line)
            .map_err(|e| ApiError::InvalidInput(format!("failed to render JSON output: {}", e)));
    }
    let detail = job
        .error
        .as_deref()
        .or(job.title.as_deref())
        .map(|d| format!(" {}", d))
        .unwrap_or_default();
    Ok(format!(
        "{} {} {} {}{}",
        timestamp(job.updated_at_ms),
        job.kind,
        job.id,
        job.status,
        detail
    ))
}

/// Terminal event line printed by `--follow`.
pub fn format_event(event: &JobEvent, format: OutputFormat) -> Result<String, ApiError> {
    if format == OutputFormat::Json {
        return serde_json::to_string(event)
            .map_err(|e| ApiError::InvalidInput(format!("failed to render JSON output: {}", e)));
    }
    let detail = event
        .error
        .as_deref()
        .or_else(|| event.job.as_ref().and_then(|job| job.title.as_deref()))
        .map(|d| format!(" {}", d))
        .unwrap_or_default();
    Ok(format!("{} {} {}{}", event.ts, event.topic, event.job_id, detail))
}
