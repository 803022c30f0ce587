//! CLI parse: clap types for coachgen. No behavior; definitions only.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// coachgen CLI - AI coaching content with status-tracked generation jobs
#[derive(Parser)]
#[command(name = "coachgen")]
#[command(about = "Generate training plans, session plans, goal evaluations and progress analyses")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, global = true, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file layered over the workspace config
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Caller identity (overrides `caller` from config)
    #[arg(long, global = true)]
    pub caller: Option<String>,

    /// Enable verbose logging
    #[arg(long, global = true, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long, global = true)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage athletes
    Athlete {
        #[command(subcommand)]
        command: AthleteCommands,
    },
    /// Manage goals and request goal evaluations
    Goal {
        #[command(subcommand)]
        command: GoalCommands,
    },
    /// Record and list training sessions
    Log {
        #[command(subcommand)]
        command: LogCommands,
    },
    /// Manage coaching assistants
    Assistant {
        #[command(subcommand)]
        command: AssistantCommands,
    },
    /// Generate training and session plans
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Generate progress analyses
    Progress {
        #[command(subcommand)]
        command: ProgressCommands,
    },
    /// Inspect and retry generation jobs
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },
    /// Inspect configured providers
    Provider {
        #[command(subcommand)]
        command: ProviderCommands,
    },
}

#[derive(Subcommand)]
pub enum AthleteCommands {
    /// Add an athlete
    Add {
        name: String,
        #[arg(long)]
        sport: Option<String>,
        #[arg(long)]
        level: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// List athletes
    List {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Update athlete fields
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        sport: Option<String>,
        #[arg(long)]
        level: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Soft-delete an athlete
    Remove { id: String },
}

#[derive(Subcommand)]
pub enum GoalCommands {
    /// Add a goal for an athlete
    Add {
        athlete: String,
        title: String,
        #[arg(long)]
        description: Option<String>,
        /// Target date (YYYY-MM-DD)
        #[arg(long)]
        target_date: Option<String>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// List an athlete's goals
    List {
        athlete: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Evaluate progress towards a goal
    Evaluate {
        goal: String,
        #[command(flatten)]
        generation: GenerationArgs,
    },
}

#[derive(Subcommand)]
pub enum LogCommands {
    /// Record a training session
    Add {
        athlete: String,
        /// Session date (YYYY-MM-DD, default today)
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        minutes: Option<u32>,
        /// Perceived effort, 1 to 10
        #[arg(long)]
        effort: Option<u8>,
        #[arg(long)]
        notes: Option<String>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// List an athlete's sessions
    List {
        athlete: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

#[derive(Subcommand)]
pub enum AssistantCommands {
    /// Add an assistant persona
    Add {
        name: String,
        #[arg(long)]
        instructions: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// List assistants
    List {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

#[derive(Subcommand)]
pub enum PlanCommands {
    /// Generate a training plan
    Training {
        athlete: String,
        #[command(flatten)]
        generation: GenerationArgs,
    },
    /// Generate a session plan
    Session {
        athlete: String,
        /// Parent training plan job (default: latest generated plan)
        #[arg(long)]
        training_plan: Option<String>,
        #[command(flatten)]
        generation: GenerationArgs,
    },
}

#[derive(Subcommand)]
pub enum ProgressCommands {
    /// Generate a progress analysis
    Analyze {
        athlete: String,
        #[command(flatten)]
        generation: GenerationArgs,
    },
}

#[derive(Subcommand)]
pub enum JobCommands {
    /// Show one job
    Show {
        id: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// List jobs
    List {
        #[arg(long)]
        athlete: Option<String>,
        /// training_plan, session_plan, goal_evaluation or progress_analysis
        #[arg(long)]
        kind: Option<String>,
        /// pending, generating, generated or error
        #[arg(long)]
        status: Option<String>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Resubmit a finished job
    Retry {
        id: String,
        /// Wait for the run to finish and print the final job
        #[arg(long, conflicts_with = "follow")]
        wait: bool,
        /// Print the job's status line, then its terminal event
        #[arg(long)]
        follow: bool,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

#[derive(Subcommand)]
pub enum ProviderCommands {
    /// List configured providers
    List {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

/// Options shared by the generation commands.
#[derive(Args, Clone)]
pub struct GenerationArgs {
    /// Goal to include in context (repeatable)
    #[arg(long = "goal")]
    pub goals: Vec<String>,
    /// Assistant whose instructions are folded in (repeatable)
    #[arg(long = "assistant")]
    pub assistants: Vec<String>,
    /// Extra instructions for this request
    #[arg(long)]
    pub instructions: Option<String>,
    /// Wait for the run to finish and print the final job
    #[arg(long, conflicts_with = "follow")]
    pub wait: bool,
    /// Print the job's status line, then its terminal event
    #[arg(long)]
    pub follow: bool,
    /// Output format (text or json)
    #[arg(long, default_value = "text")]
    pub format: String,
}
