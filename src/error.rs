use std::path::PathBuf;

use crate::generate::GenerationError;

/// User-facing failures of the planner outside the table extractor, which
/// never fails.
#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    #[error("Request file not found: {path}")]
    RequestFileNotFound { path: PathBuf },

    #[error("Invalid request file {path}: {detail}")]
    InvalidRequestFile { path: PathBuf, detail: String },

    #[error("Please add at least one task.")]
    NoTasks,

    #[error("Task {index}: {detail}")]
    InvalidTask { index: usize, detail: String },

    #[error("Invalid task '{spec}': {detail} (expected \"name;YYYY-MM-DD;difficulty;energy\")")]
    InvalidTaskSpec { spec: String, detail: String },

    #[error("Daily study hours must be between 1 and 24 (got {hours})")]
    InvalidHours { hours: u32 },

    #[error("Every day of the week is blocked; nothing can be scheduled")]
    AllDaysBlocked,

    #[error("Invalid {field} value '{value}' (expected {expected})")]
    InvalidValue {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("Failed to parse environment variable '{var}': {detail}")]
    ConfigEnvParseError { var: String, detail: String },

    #[error("Temperature must be between 0.0 and 2.0 (got {value})")]
    InvalidTemperature { value: f32 },

    #[error(
        "No API key configured. Set GEMINI_API_KEY or STUDYPLAN_API_KEY, \
         or add api_key to the config file."
    )]
    MissingApiKey,

    #[error("Generation command '{cmd}' not found on PATH")]
    AgentCmdNotFound { cmd: String },

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Failed to read session file {path}: {detail}")]
    SessionReadFailed { path: PathBuf, detail: String },

    #[error("Failed to write session file {path}: {detail}")]
    SessionWriteFailed { path: PathBuf, detail: String },

    #[error("Failed to write cache entry {path}: {detail}")]
    CacheWriteFailed { path: PathBuf, detail: String },

    #[error("No table found in the generated plan; nothing to export.")]
    NothingToExport,

    #[error("Failed to write export file {path}: {detail}")]
    ExportWriteFailed { path: PathBuf, detail: String },

    #[error("No generated plan in the session; run `studyplan plan` first or pass --input")]
    NoLastPlan,
}
