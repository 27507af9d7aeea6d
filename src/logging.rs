//! Diagnostics for `studyplan` runs.
//!
//! stdout belongs to the command's product (the Markdown plan, the prompt,
//! the CSV from `extract`), so every event goes to stderr. Planner events
//! carry `backend`, `prompt_len`, `duration_ms`, `rows` and `degraded_rows`
//! fields; the optional `log_file` keeps them as JSON lines for later review
//! of slow or degraded generations.

use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Once;

use anyhow::Context;

use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const DEFAULT_LOG_LEVEL: &str = "info";
/// Overrides `log_level` from the CLI or config file when set.
const LOG_ENV_VAR: &str = "STUDYPLAN_LOG";

static INIT: Once = Once::new();

/// Install the subscriber for this process.
///
/// The stderr filter comes from `STUDYPLAN_LOG`, else the resolved
/// `log_level` setting, else `info`. The JSON file layer, when `log_file` is
/// set, records every level so a quiet terminal run still leaves the backend
/// timings on disk.
///
/// `main` calls this once per command; repeated calls (tests running several
/// commands in one process) keep the first subscriber.
pub fn init(log_level: Option<&str>, log_file: Option<&Path>) -> anyhow::Result<()> {
    let mut init_err: Option<anyhow::Error> = None;

    INIT.call_once(|| {
        if let Err(e) = try_init(log_level, log_file) {
            init_err = Some(e);
        }
    });

    match init_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn try_init(log_level: Option<&str>, log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = build_filter(log_level);

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_ansi(true)
        .compact()
        .with_filter(filter);

    let file_layer = match log_file {
        Some(path) => {
            let file = open_log_file(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(file.with_max_level(Level::TRACE))
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(false)
                    .json(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install studyplan log subscriber: {e}"))
}

fn build_filter(log_level: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(log_level.unwrap_or(DEFAULT_LOG_LEVEL)))
}

/// Append-mode handle on the JSON log, creating its directory first.
fn open_log_file(path: &Path) -> anyhow::Result<File> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(dir) = dir {
        fs::create_dir_all(dir).with_context(|| {
            format!("failed to create log directory {}", dir.display())
        })?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))
}
