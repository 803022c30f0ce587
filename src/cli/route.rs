//! CLI route: single route table and run context. Dispatches to the coach API and presentation.

use crate::api::{CoachApi, GenerationRequest, GoalEvaluationRequest, JobFilter, SubmittedJob};
use crate::config::{AppConfig, ConfigLoader};
use crate::error::{ApiError, StorageError};
use crate::job::{JobKind, JobStatus, RelatedIds};
use crate::model::{AthleteUpdate, NewAssistant, NewAthlete, NewGoal, NewSessionLog};
use crate::notify::{NotificationBus, Subscription};
use crate::prompt::TemplateStore;
use crate::provider::ProviderRegistry;
use crate::store::Repositories;
use crate::types::{CallerId, EntityId, JobId};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::cli::command_name;
use crate::cli::parse::{
    AssistantCommands, AthleteCommands, Commands, GenerationArgs, GoalCommands, JobCommands,
    LogCommands, PlanCommands, ProgressCommands, ProviderCommands,
};
use crate::cli::presentation::{
    format_assistant, format_assistants, format_athlete, format_athletes, format_goal,
    format_event, format_goals, format_job, format_jobs, format_provider_list, format_session_log,
    format_session_logs, format_status_change, format_submitted, OutputFormat,
};
use crate::generation::JobHandle;

/// Runtime context for CLI execution: config, caller and the coach API.
/// Built from the workspace path and optional config override using ConfigLoader only.
pub struct RunContext {
    api: CoachApi,
    config: AppConfig,
    caller: Option<CallerId>,
    /// Runs started without `--wait`; drained before the process exits.
    pending: Mutex<Vec<JobHandle>>,
}

impl RunContext {
    pub fn new(
        workspace_root: PathBuf,
        config_path: Option<PathBuf>,
        caller: Option<String>,
    ) -> Result<Self, ApiError> {
        let config = ConfigLoader::load_with_override(&workspace_root, config_path.as_deref())?;
        if let Err(errors) = config.validate() {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            return Err(ApiError::ConfigError(messages.join("; ")));
        }

        let store_path = config.storage.resolve(&workspace_root);
        std::fs::create_dir_all(&store_path).map_err(StorageError::IoError)?;
        let repos = Repositories::open(&store_path)?;
        let bus = NotificationBus::new(config.generation.event_capacity);

        let mut api = CoachApi::new(repos, bus, config.generation.clone());
        if let Some(provider_name) = &config.generation.provider {
            let mut registry = ProviderRegistry::new();
            registry.load_from_config(&config);
            let provider = registry.generation_provider(provider_name)?;
            let templates = TemplateStore::new(
                config
                    .generation
                    .templates_dir
                    .as_ref()
                    .map(|dir| workspace_root.join(dir)),
            );
            api = api.with_provider(Arc::new(templates), provider);
            debug!(provider = %provider_name, "Generation provider ready");
        }

        let caller = caller
            .or_else(|| config.caller.clone())
            .filter(|c| !c.trim().is_empty())
            .map(CallerId::new);

        Ok(Self {
            api,
            config,
            caller,
            pending: Mutex::new(Vec::new()),
        })
    }

    pub fn api(&self) -> &CoachApi {
        &self.api
    }

    fn caller(&self) -> Option<&CallerId> {
        self.caller.as_ref()
    }

    /// Execute a CLI command via the single route table.
    pub async fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        let started = Instant::now();
        let name = command_name(command);
        let result = self.execute_inner(command).await;
        match &result {
            Ok(_) => info!(
                command = %name,
                duration_ms = started.elapsed().as_millis() as u64,
                "Command finished"
            ),
            Err(e) => warn!(
                command = %name,
                duration_ms = started.elapsed().as_millis() as u64,
                error = %e,
                "Command failed"
            ),
        }
        result
    }

    /// Wait for generation runs the command started but did not wait for.
    pub async fn drain(&self) {
        let handles = std::mem::take(&mut *self.pending.lock());
        for handle in handles {
            let job_id = handle.job_id().clone();
            match handle.wait().await {
                Ok(event) => debug!(job_id = %job_id, topic = %event.topic, "Background run finished"),
                Err(e) => warn!(job_id = %job_id, error = %e, "Background run did not finish"),
            }
        }
    }

    async fn execute_inner(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Athlete { command } => self.handle_athlete_command(command).await,
            Commands::Goal { command } => self.handle_goal_command(command).await,
            Commands::Log { command } => self.handle_log_command(command).await,
            Commands::Assistant { command } => self.handle_assistant_command(command).await,
            Commands::Plan { command } => self.handle_plan_command(command).await,
            Commands::Progress { command } => self.handle_progress_command(command).await,
            Commands::Job { command } => self.handle_job_command(command).await,
            Commands::Provider { command } => self.handle_provider_command(command),
        }
    }

    async fn handle_athlete_command(&self, command: &AthleteCommands) -> Result<String, ApiError> {
        match command {
            AthleteCommands::Add {
                name,
                sport,
                level,
                notes,
                format,
            } => {
                let format = OutputFormat::parse(format)?;
                let athlete = self
                    .api
                    .create_athlete(
                        self.caller(),
                        NewAthlete {
                            name: name.clone(),
                            sport: sport.clone(),
                            level: level.clone(),
                            notes: notes.clone(),
                        },
                    )
                    .await?;
                format_athlete(&athlete, format)
            }
            AthleteCommands::List { format } => {
                let format = OutputFormat::parse(format)?;
                let athletes = self.api.list_athletes(self.caller()).await?;
                format_athletes(&athletes, format)
            }
            AthleteCommands::Update {
                id,
                name,
                sport,
                level,
                notes,
                format,
            } => {
                let format = OutputFormat::parse(format)?;
                let update = AthleteUpdate {
                    name: name.clone(),
                    sport: sport.clone(),
                    level: level.clone(),
                    notes: notes.clone(),
                };
                let athlete = self
                    .api
                    .update_athlete(self.caller(), &EntityId::from(id.as_str()), update)
                    .await?;
                format_athlete(&athlete, format)
            }
            AthleteCommands::Remove { id } => {
                self.api
                    .delete_athlete(self.caller(), &EntityId::from(id.as_str()))
                    .await?;
                Ok(format!("Removed athlete {}", id))
            }
        }
    }

    async fn handle_goal_command(&self, command: &GoalCommands) -> Result<String, ApiError> {
        match command {
            GoalCommands::Add {
                athlete,
                title,
                description,
                target_date,
                format,
            } => {
                let format = OutputFormat::parse(format)?;
                let goal = self
                    .api
                    .create_goal(
                        self.caller(),
                        NewGoal {
                            athlete_id: EntityId::from(athlete.as_str()),
                            title: title.clone(),
                            description: description.clone(),
                            target_date: target_date.clone(),
                        },
                    )
                    .await?;
                format_goal(&goal, format)
            }
            GoalCommands::List { athlete, format } => {
                let format = OutputFormat::parse(format)?;
                let goals = self
                    .api
                    .list_goals(self.caller(), &EntityId::from(athlete.as_str()))
                    .await?;
                format_goals(&goals, format)
            }
            GoalCommands::Evaluate { goal, generation } => {
                let format = OutputFormat::parse(&generation.format)?;
                let request = GoalEvaluationRequest {
                    goal_id: EntityId::from(goal.as_str()),
                    assistant_ids: ids(&generation.assistants),
                    instructions: generation.instructions.clone(),
                };
                let completion = self.completion(generation.wait, generation.follow)?;
                let submitted = self.api.evaluate_goal(self.caller(), request).await?;
                self.finish_generation(submitted, completion, format).await
            }
        }
    }

    async fn handle_log_command(&self, command: &LogCommands) -> Result<String, ApiError> {
        match command {
            LogCommands::Add {
                athlete,
                date,
                minutes,
                effort,
                notes,
                format,
            } => {
                let format = OutputFormat::parse(format)?;
                let performed_on = date.clone().unwrap_or_else(|| {
                    chrono::Utc::now().date_naive().format("%Y-%m-%d").to_string()
                });
                let log = self
                    .api
                    .log_session(
                        self.caller(),
                        NewSessionLog {
                            athlete_id: EntityId::from(athlete.as_str()),
                            performed_on,
                            duration_minutes: *minutes,
                            perceived_effort: *effort,
                            notes: notes.clone(),
                        },
                    )
                    .await?;
                format_session_log(&log, format)
            }
            LogCommands::List { athlete, format } => {
                let format = OutputFormat::parse(format)?;
                let logs = self
                    .api
                    .list_session_logs(self.caller(), &EntityId::from(athlete.as_str()))
                    .await?;
                format_session_logs(&logs, format)
            }
        }
    }

    async fn handle_assistant_command(
        &self,
        command: &AssistantCommands,
    ) -> Result<String, ApiError> {
        match command {
            AssistantCommands::Add {
                name,
                instructions,
                format,
            } => {
                let format = OutputFormat::parse(format)?;
                let assistant = self
                    .api
                    .create_assistant(
                        self.caller(),
                        NewAssistant {
                            name: name.clone(),
                            instructions: instructions.clone(),
                        },
                    )
                    .await?;
                format_assistant(&assistant, format)
            }
            AssistantCommands::List { format } => {
                let format = OutputFormat::parse(format)?;
                let assistants = self.api.list_assistants(self.caller()).await?;
                format_assistants(&assistants, format)
            }
        }
    }

    async fn handle_plan_command(&self, command: &PlanCommands) -> Result<String, ApiError> {
        match command {
            PlanCommands::Training {
                athlete,
                generation,
            } => {
                let format = OutputFormat::parse(&generation.format)?;
                let request = generation_request(athlete, generation, None);
                let completion = self.completion(generation.wait, generation.follow)?;
                let submitted = self
                    .api
                    .create_training_plan(self.caller(), request)
                    .await?;
                self.finish_generation(submitted, completion, format).await
            }
            PlanCommands::Session {
                athlete,
                training_plan,
                generation,
            } => {
                let format = OutputFormat::parse(&generation.format)?;
                let request = generation_request(athlete, generation, training_plan.as_deref());
                let completion = self.completion(generation.wait, generation.follow)?;
                let submitted = self.api.create_session_plan(self.caller(), request).await?;
                self.finish_generation(submitted, completion, format).await
            }
        }
    }

    async fn handle_progress_command(&self, command: &ProgressCommands) -> Result<String, ApiError> {
        match command {
            ProgressCommands::Analyze {
                athlete,
                generation,
            } => {
                let format = OutputFormat::parse(&generation.format)?;
                let request = generation_request(athlete, generation, None);
                let completion = self.completion(generation.wait, generation.follow)?;
                let submitted = self.api.analyze_progress(self.caller(), request).await?;
                self.finish_generation(submitted, completion, format).await
            }
        }
    }

    async fn handle_job_command(&self, command: &JobCommands) -> Result<String, ApiError> {
        match command {
            JobCommands::Show { id, format } => {
                let format = OutputFormat::parse(format)?;
                let job = self
                    .api
                    .get_job(self.caller(), &JobId::from(id.as_str()))
                    .await?;
                format_job(&job, format)
            }
            JobCommands::List {
                athlete,
                kind,
                status,
                format,
            } => {
                let format = OutputFormat::parse(format)?;
                let filter = JobFilter {
                    athlete_id: athlete.as_deref().map(EntityId::from),
                    kind: kind.as_deref().map(parse_kind).transpose()?,
                    status: status.as_deref().map(parse_status).transpose()?,
                };
                let jobs = self.api.list_jobs(self.caller(), &filter).await?;
                format_jobs(&jobs, format)
            }
            JobCommands::Retry {
                id,
                wait,
                follow,
                format,
            } => {
                let format = OutputFormat::parse(format)?;
                let completion = self.completion(*wait, *follow)?;
                let submitted = self
                    .api
                    .resubmit_job(self.caller(), &JobId::from(id.as_str()))
                    .await?;
                self.finish_generation(submitted, completion, format).await
            }
        }
    }

    fn handle_provider_command(&self, command: &ProviderCommands) -> Result<String, ApiError> {
        match command {
            ProviderCommands::List { format } => {
                let format = OutputFormat::parse(format)?;
                let mut registry = ProviderRegistry::new();
                registry.load_from_config(&self.config);
                format_provider_list(
                    &registry.list_all(),
                    self.config.generation.provider.as_deref(),
                    format,
                )
            }
        }
    }

    /// Subscribe before the mutation when following so the terminal event cannot be missed.
    fn completion(&self, wait: bool, follow: bool) -> Result<Completion, ApiError> {
        if follow {
            return Ok(Completion::Follow(self.api.subscribe(self.caller(), None)?));
        }
        Ok(if wait {
            Completion::Wait
        } else {
            Completion::Detach
        })
    }

    async fn finish_generation(
        &self,
        submitted: SubmittedJob,
        completion: Completion,
        format: OutputFormat,
    ) -> Result<String, ApiError> {
        match completion {
            Completion::Detach => {
                let output = format_submitted(&submitted.job, format)?;
                self.pending.lock().push(submitted.handle);
                Ok(output)
            }
            Completion::Wait => {
                let event = submitted.handle.wait().await?;
                let job = self.api.get_job(self.caller(), &event.job_id).await?;
                format_job(&job, format)
            }
            Completion::Follow(mut events) => {
                let job_id = submitted.job.id.clone();
                let mut lines = vec![format_status_change(&submitted.job, format)?];
                self.pending.lock().push(submitted.handle);
                let event = events.wait_for(&job_id).await.ok_or_else(|| {
                    ApiError::TaskAborted(format!("event stream closed before job {} finished", job_id))
                })?;
                lines.push(format_event(&event, format)?);
                Ok(lines.join("\n"))
            }
        }
    }
}

/// How a generation command finishes after the placeholder is written.
enum Completion {
    Detach,
    Wait,
    Follow(Subscription),
}

fn ids(values: &[String]) -> Vec<EntityId> {
    values.iter().map(|v| EntityId::from(v.as_str())).collect()
}

fn generation_request(
    athlete: &str,
    generation: &GenerationArgs,
    training_plan: Option<&str>,
) -> GenerationRequest {
    GenerationRequest {
        subject_id: EntityId::from(athlete),
        related: RelatedIds {
            goal_ids: ids(&generation.goals),
            assistant_ids: ids(&generation.assistants),
            training_plan_id: training_plan.map(JobId::from),
        },
        instructions: generation.instructions.clone(),
    }
}

fn parse_kind(value: &str) -> Result<JobKind, ApiError> {
    JobKind::parse(value).ok_or_else(|| {
        let known: Vec<&str> = JobKind::ALL.iter().map(|k| k.as_str()).collect();
        ApiError::InvalidInput(format!(
            "unknown job kind '{}', expected one of: {}",
            value,
            known.join(", ")
        ))
    })
}

fn parse_status(value: &str) -> Result<JobStatus, ApiError> {
    JobStatus::parse(value).ok_or_else(|| {
        ApiError::InvalidInput(format!(
            "unknown job status '{}', expected pending, generating, generated or error",
            value
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;
    use tempfile::TempDir;

    fn context(temp: &TempDir, caller: Option<&str>) -> RunContext {
        RunContext::new(
            temp.path().to_path_buf(),
            None,
            caller.map(str::to_string),
        )
        .unwrap()
    }

    async fn run(ctx: &RunContext, args: &[&str]) -> Result<String, ApiError> {
        let mut argv = vec!["coachgen"];
        argv.extend_from_slice(args);
        let cli = Cli::try_parse_from(argv).unwrap();
        ctx.execute(&cli.command).await
    }

    #[tokio::test]
    async fn test_athlete_add_and_list_json() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp, Some("coach-1"));
        run(&ctx, &["athlete", "add", "Ada", "--sport", "running"])
            .await
            .unwrap();

        let out = run(&ctx, &["athlete", "list", "--format", "json"]).await.unwrap();
        let list: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(list[0]["name"], "Ada");
        assert_eq!(list[0]["sport"], "running");
    }

    #[tokio::test]
    async fn test_missing_caller_is_unauthenticated() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp, None);
        let err = run(&ctx, &["athlete", "list"]).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated));
    }

    #[tokio::test]
    async fn test_generation_without_provider_is_reported() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp, Some("coach-1"));
        let err = run(&ctx, &["plan", "training", "a1"]).await.unwrap_err();
        assert!(matches!(err, ApiError::ProviderNotConfigured(_)));
    }

    #[tokio::test]
    async fn test_job_list_rejects_unknown_kind() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp, Some("coach-1"));
        let err = run(&ctx, &["job", "list", "--kind", "meal_plan"]).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));
        assert_eq!(run(&ctx, &["job", "list"]).await.unwrap(), "No jobs.");
    }

    #[tokio::test]
    async fn test_provider_list_hides_keys() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("config")).unwrap();
        std::fs::write(
            temp.path().join("config").join("config.toml"),
            "caller = \"coach-1\"\n\n[providers.main]\nprovider_type = \"openai\"\nmodel = \"gpt-4o-mini\"\napi_key = \"sk-secret\"\n",
        )
        .unwrap();
        let ctx = context(&temp, None);
        let out = run(&ctx, &["provider", "list", "--format", "json"]).await.unwrap();
        assert!(out.contains("gpt-4o-mini"));
        assert!(!out.contains("sk-secret"));
    }
}
