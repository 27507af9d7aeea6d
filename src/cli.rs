use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Study planner.
///
/// Builds a prompt from a task list and available study time, sends it to a
/// text-generation backend, prints the weekly plan it returns and exports
/// the plan's table as CSV.
#[derive(Debug, Parser)]
#[command(name = "studyplan", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Generate a weekly study plan and optionally export its table as CSV.
    Plan(PlanArgs),

    /// Print the prompt `plan` would send, without calling any backend.
    Prompt(PromptArgs),

    /// Extract the first Markdown table of a document and write it as CSV.
    Extract(ExtractArgs),

    /// Show or edit the saved session (task list, language, theme).
    Session(SessionArgs),
}

/// Flags shared by every subcommand.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct CommonArgs {
    /// Path to a TOML configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory holding session.json (default: ".studyplan").
    #[arg(long)]
    pub state_dir: Option<PathBuf>,

    /// Output language, "es" or "en" (default: "es").
    #[arg(long)]
    pub language: Option<String>,

    /// Log level filter (default: "info"). Supports tracing directives
    /// (e.g. "debug", "studyplan=trace,warn"). Overridden by STUDYPLAN_LOG.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to a log file. When set, structured JSON logs are appended here
    /// in addition to the human-readable stderr output.
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// What to plan. Without `--request` or `--task`, the session's task list
/// is used.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct RequestArgs {
    /// TOML request file (hours_per_day, best_time, blocked_days, [[tasks]]).
    #[arg(long)]
    pub request: Option<PathBuf>,

    /// A task as "name;YYYY-MM-DD;difficulty;energy". Repeatable; replaces
    /// the task list of the session or request file.
    #[arg(long = "task", value_name = "NAME;DEADLINE;DIFFICULTY;ENERGY")]
    pub tasks: Vec<String>,

    /// Study hours available per day (1-24, default: 3).
    #[arg(long)]
    pub hours: Option<u32>,

    /// Best time of day to study: morning, afternoon or night.
    #[arg(long)]
    pub best_time: Option<String>,

    /// A weekday with no study at all. Repeatable.
    #[arg(long = "block-day", value_name = "DAY")]
    pub blocked_days: Vec<String>,
}

/// Generation backend overrides.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct BackendArgs {
    /// Generation backend: "gemini" (default) or "command".
    #[arg(long)]
    pub backend: Option<String>,

    /// Gemini model name (default: "gemini-2.5-flash").
    #[arg(long)]
    pub model: Option<String>,

    /// Base URL of the Gemini REST API.
    #[arg(long)]
    pub api_base_url: Option<String>,

    /// Sampling temperature, 0.0 to 2.0 (default: 0.5).
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Request timeout in seconds (default: 120).
    #[arg(long)]
    pub request_timeout_sec: Option<u64>,

    /// Program run by the command backend, by name or path (default: "llm").
    #[arg(long)]
    pub agent_cmd: Option<String>,
}

/// Table extraction overrides.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ExtractorArgs {
    /// Locate the table by this header token instead of by its shape.
    #[arg(long)]
    pub header_marker: Option<String>,

    /// What to do with rows whose cell count differs from the header:
    /// "repair" (default) or "drop".
    #[arg(long)]
    pub row_policy: Option<String>,
}

#[derive(Debug, Clone, clap::Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub request: RequestArgs,

    #[command(flatten)]
    pub backend: BackendArgs,

    #[command(flatten)]
    pub extractor: ExtractorArgs,

    /// Write the plan's table as CSV to this file (or into this directory).
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// Always call the backend; neither read nor write the response cache.
    #[arg(long)]
    pub no_cache: bool,
}

#[derive(Debug, Clone, clap::Args)]
pub struct PromptArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub request: RequestArgs,

    /// Write the prompt to this file instead of stdout.
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, clap::Args)]
pub struct ExtractArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub extractor: ExtractorArgs,

    /// Markdown document to read; "-" reads stdin. Defaults to the last
    /// generated plan.
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Write CSV to this file (or into this directory) instead of stdout.
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, clap::Args)]
pub struct SessionArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(subcommand)]
    pub action: SessionCommand,
}

#[derive(Debug, Clone, Subcommand)]
pub enum SessionCommand {
    /// Print the session.
    Show,

    /// Append a task. Omitted fields take placeholder values.
    AddTask(AddTaskArgs),

    /// Remove the last task (the list always keeps one).
    RemoveTask,

    /// Reset the task list to a single placeholder task.
    Clear,

    /// Change the session language or theme.
    Set(SetArgs),
}

#[derive(Debug, Clone, Default, clap::Args)]
pub struct AddTaskArgs {
    #[arg(long)]
    pub name: Option<String>,

    /// Deadline as YYYY-MM-DD.
    #[arg(long)]
    pub deadline: Option<String>,

    /// Difficulty from 1 to 10.
    #[arg(long)]
    pub difficulty: Option<u8>,

    /// Energy the task needs: high, medium or low.
    #[arg(long)]
    pub energy: Option<String>,
}

impl AddTaskArgs {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.deadline.is_none()
            && self.difficulty.is_none()
            && self.energy.is_none()
    }
}

#[derive(Debug, Clone, Default, clap::Args)]
pub struct SetArgs {
    #[arg(long)]
    pub language: Option<String>,

    /// "light" or "dark".
    #[arg(long)]
    pub theme: Option<String>,
}
