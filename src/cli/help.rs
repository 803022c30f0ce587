//! Command-name contract for logging and routing.

use crate::cli::parse::{
    AssistantCommands, AthleteCommands, Commands, GoalCommands, JobCommands, LogCommands,
    PlanCommands, ProgressCommands, ProviderCommands,
};

/// Command name string for logs (e.g. "athlete.add", "plan.training").
pub fn command_name(command: &Commands) -> String {
    match command {
        Commands::Athlete { command } => format!("athlete.{}", athlete_command_name(command)),
        Commands::Goal { command } => format!("goal.{}", goal_command_name(command)),
        Commands::Log { command } => format!("log.{}", log_command_name(command)),
        Commands::Assistant { command } => {
            format!("assistant.{}", assistant_command_name(command))
        }
        Commands::Plan { command } => format!("plan.{}", plan_command_name(command)),
        Commands::Progress { command } => format!("progress.{}", progress_command_name(command)),
        Commands::Job { command } => format!("job.{}", job_command_name(command)),
        Commands::Provider { command } => format!("provider.{}", provider_command_name(command)),
    }
}

pub fn athlete_command_name(command: &AthleteCommands) -> &'static str {
    match command {
        AthleteCommands::Add { .. } => "add",
        AthleteCommands::List { .. } => "list",
        AthleteCommands::Update { .. } => "update",
        AthleteCommands::Remove { .. } => "remove",
    }
}

pub fn goal_command_name(command: &GoalCommands) -> &'static str {
    match command {
        GoalCommands::Add { .. } => "add",
        GoalCommands::List { .. } => "list",
        GoalCommands::Evaluate { .. } => "evaluate",
    }
}

pub fn log_command_name(command: &LogCommands) -> &'static str {
    match command {
        LogCommands::Add { .. } => "add",
        LogCommands::List { .. } => "list",
    }
}

pub fn assistant_command_name(command: &AssistantCommands) -> &'static str {
    match command {
        AssistantCommands::Add { .. } => "add",
        AssistantCommands::List { .. } => "list",
    }
}

pub fn plan_command_name(command: &PlanCommands) -> &'static str {
    match command {
        PlanCommands::Training { .. } => "training",
        PlanCommands::Session { .. } => "session",
    }
}

pub fn progress_command_name(command: &ProgressCommands) -> &'static str {
    match command {
        ProgressCommands::Analyze { .. } => "analyze",
    }
}

pub fn job_command_name(command: &JobCommands) -> &'static str {
    match command {
        JobCommands::Show { .. } => "show",
        JobCommands::List { .. } => "list",
        JobCommands::Retry { .. } => "retry",
    }
}

pub fn provider_command_name(command: &ProviderCommands) -> &'static str {
    match command {
        ProviderCommands::List { .. } => "list",
    }
}
