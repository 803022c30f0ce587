//! Generation worker
//!
//! Runs one attempt of a job: mark it generating, assemble context, render
//! the kind's template, call the provider, validate the response and persist
//! the result. Every step that can fail returns an [`ApiError`]; turning that
//! into a terminal status and an event is the supervisor's job.

use crate::context::ContextAssembler;
use crate::error::ApiError;
use crate::job::GenerationJob;
use crate::prompt::TemplateStore;
use crate::provider::GenerationProvider;
use crate::schema::{self, ValidatedContent};
use crate::store::Repositories;
use crate::types::{CallerId, JobId};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

pub const DEFAULT_RECENT_SESSIONS: usize = 10;

#[derive(Clone)]
pub struct GenerationWorker {
    repos: Repositories,
    templates: Arc<TemplateStore>,
    provider: Arc<dyn GenerationProvider>,
    recent_sessions: usize,
}

impl GenerationWorker {
    pub fn new(
        repos: Repositories,
        templates: Arc<TemplateStore>,
        provider: Arc<dyn GenerationProvider>,
    ) -> Self {
        Self {
            repos,
            templates,
            provider,
            recent_sessions: DEFAULT_RECENT_SESSIONS,
        }
    }

    /// Number of most recent session logs folded into the prompt.
    pub fn with_recent_sessions(mut self, recent_sessions: usize) -> Self {
        self.recent_sessions = recent_sessions;
        self
    }

    pub fn provider(&self) -> &Arc<dyn GenerationProvider> {
        &self.provider
    }

    /// Run one generation attempt and return the `Generated` job.
    pub async fn run(&self, job_id: &JobId, caller: &CallerId) -> Result<GenerationJob, ApiError> {
        let started = Instant::now();
        let job = self
            .repos
            .jobs
            .update(caller, job_id, &|job: &mut GenerationJob| job.begin_generating())
            .await?;
        info!(
            job_id = %job.id,
            kind = %job.kind,
            subject_id = %job.subject_id,
            attempt = job.attempt,
            provider = %self.provider.describe(),
            "Generation started"
        );

        let assembler =
            ContextAssembler::new(self.repos.clone(), caller.clone(), self.recent_sessions);
        let variables = assembler.assemble(&job).await?;

        let template = self.templates.load(job.kind.template_name())?;
        let rendered = template.render(&variables)?;
        let response_schema = schema::response_schema(job.kind);
        let prompt = self.provider.prepare(&rendered, &response_schema)?;
        let source_context = prompt.source_context();
        let digest = prompt.digest();
        debug!(
            job_id = %job.id,
            template = %template.name,
            variables = variables.len(),
            prompt_digest = %digest,
            "Prompt rendered"
        );
        self.repos
            .jobs
            .update(caller, job_id, &|job: &mut GenerationJob| {
                job.record_source(source_context.clone(), digest.clone());
                Ok(())
            })
            .await?;

        let provider_started = Instant::now();
        let response = self
            .provider
            .generate(&rendered, &response_schema)
            .await?;
        debug!(
            job_id = %job.id,
            duration_ms = provider_started.elapsed().as_millis() as u64,
            "Provider responded"
        );

        let ValidatedContent {
            content,
            title,
            summary,
        } = schema::validate(job.kind, response)?;

        let completed = self
            .repos
            .jobs
            .update(caller, job_id, &|job: &mut GenerationJob| {
                job.complete(content.clone(), title.clone(), summary.clone())
            })
            .await?;
        info!(
            job_id = %completed.id,
            kind = %completed.kind,
            duration_ms = started.elapsed().as_millis() as u64,
            "Generation completed"
        );
        Ok(completed)
    }
}
