//! CLI domain: parse, route, help, output, and presentation only.
//! No domain orchestration; single route table dispatches to the coach API.

mod help;
mod output;
mod parse;
mod presentation;
mod route;

pub use help::command_name;
pub use output::map_error;
pub use parse::{
    AssistantCommands, AthleteCommands, Cli, Commands, GenerationArgs, GoalCommands, JobCommands,
    LogCommands, PlanCommands, ProgressCommands, ProviderCommands,
};
pub use presentation::OutputFormat;
pub use route::RunContext;
