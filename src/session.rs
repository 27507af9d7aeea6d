use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::PlannerError;
use crate::i18n::Language;
use crate::request::TaskRecord;

const SESSION_FILE_NAME: &str = "session.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Theme::Light => f.write_str("light"),
            Theme::Dark => f.write_str("dark"),
        }
    }
}

impl FromStr for Theme {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "light" | "claro" => Ok(Theme::Light),
            "dark" | "oscuro" => Ok(Theme::Dark),
            _ => Err(PlannerError::InvalidValue {
                field: "theme",
                value: s.to_owned(),
                expected: "\"light\" or \"dark\"",
            }),
        }
    }
}

/// Form state carried between invocations, serialized to
/// `<state_dir>/session.json`.
///
/// The task list never drops below one entry, mirroring a form that always
/// shows at least one task row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub language: Language,

    #[serde(default)]
    pub theme: Theme,

    tasks: Vec<TaskRecord>,

    /// Markdown of the most recently generated plan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_plan: Option<String>,
}

impl SessionState {
    /// A fresh session with a single placeholder task due `today`.
    pub fn new(language: Language, today: NaiveDate) -> Self {
        Self {
            language,
            theme: Theme::default(),
            tasks: vec![TaskRecord::placeholder(1, language, today)],
            last_plan: None,
        }
    }

    pub fn tasks(&self) -> &[TaskRecord] {
        &self.tasks
    }

    /// Append `task`, or a placeholder numbered after the current last task.
    pub fn add_task(&mut self, task: Option<TaskRecord>, today: NaiveDate) {
        let task = task
            .unwrap_or_else(|| TaskRecord::placeholder(self.tasks.len() + 1, self.language, today));
        self.tasks.push(task);
    }

    /// Remove the last task unless it is the only one. Returns the removed task.
    pub fn remove_last_task(&mut self) -> Option<TaskRecord> {
        if self.tasks.len() > 1 {
            self.tasks.pop()
        } else {
            None
        }
    }

    /// Reset the task list to a single placeholder.
    pub fn clear_tasks(&mut self, today: NaiveDate) {
        self.tasks = vec![TaskRecord::placeholder(1, self.language, today)];
    }

    pub fn session_file_path(state_dir: &Path) -> PathBuf {
        state_dir.join(SESSION_FILE_NAME)
    }
}

/// Load the session from `state_dir/session.json`.
///
/// Returns `Ok(None)` when the file is missing or holds invalid JSON (the
/// latter with a warning). Other I/O errors are returned.
pub fn load_session(state_dir: &Path) -> Result<Option<SessionState>, PlannerError> {
    let path = SessionState::session_file_path(state_dir);

    let contents = match fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(PlannerError::SessionReadFailed {
                path,
                detail: e.to_string(),
            });
        }
    };

    match serde_json::from_str::<SessionState>(&contents) {
        Ok(session) if session.tasks.is_empty() => {
            warn!(path = %path.display(), "ignoring session with no tasks");
            Ok(None)
        }
        Ok(session) => Ok(Some(session)),
        Err(e) => {
            warn!(
                path = %path.display(),
                err = %e,
                "ignoring invalid session file"
            );
            Ok(None)
        }
    }
}

/// Load the session, or start a fresh one in `language` on first access.
pub fn load_or_default(
    state_dir: &Path,
    language: Language,
    today: NaiveDate,
) -> Result<SessionState, PlannerError> {
    Ok(load_session(state_dir)?.unwrap_or_else(|| SessionState::new(language, today)))
}

/// Persist the session, creating `state_dir` when needed.
///
/// Writes a temp file and renames it into place; falls back to a direct
/// write when the rename fails.
pub fn save_session(session: &SessionState, state_dir: &Path) -> Result<(), PlannerError> {
    let path = SessionState::session_file_path(state_dir);
    let write_err = |path: &Path, detail: String| PlannerError::SessionWriteFailed {
        path: path.to_path_buf(),
        detail,
    };

    fs::create_dir_all(state_dir)
        .map_err(|e| write_err(state_dir, format!("failed to create directory: {e}")))?;

    let json = serde_json::to_string_pretty(session)
        .map_err(|e| write_err(&path, format!("serialization failed: {e}")))?;

    let tmp_path = state_dir.join(format!("{SESSION_FILE_NAME}.tmp"));
    let written = (|| -> std::io::Result<()> {
        let mut f = fs::File::create(&tmp_path)?;
        f.write_all(json.as_bytes())?;
        f.flush()
    })();
    written.map_err(|e| write_err(&tmp_path, e.to_string()))?;

    if fs::rename(&tmp_path, &path).is_err() {
        fs::write(&path, &json).map_err(|e| write_err(&path, e.to_string()))?;
        let _ = fs::remove_file(&tmp_path);
    }

    debug!(
        path = %path.display(),
        tasks = session.tasks.len(),
        "session saved"
    );
    Ok(())
}
