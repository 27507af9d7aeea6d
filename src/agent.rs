//! Command backend: a local LLM CLI invoked once per prompt.
//!
//! The configured command is resolved on `PATH` up front so a missing binary
//! is reported before any work starts. The prompt is passed as the final
//! positional argument and stdout is taken as the generated text. Logs never
//! include the prompt itself, only `<prompt len=N>`.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::PlannerError;
use crate::generate::{GenerationBackend, GenerationError};
use crate::subprocess;

/// Placeholder in `agent_args` replaced by the sampling temperature.
pub const TEMPERATURE_PLACEHOLDER: &str = "{temperature}";

#[derive(Debug, Clone)]
pub struct CommandBackend {
    program: PathBuf,
    args: Vec<String>,
    /// `program args...` as a single string.
    command_line: String,
    cwd: PathBuf,
    timeout: Duration,
}

impl CommandBackend {
    /// Resolve `cmd` and build a backend that runs it in `cwd`.
    pub fn new(
        cmd: &str,
        args: Vec<String>,
        cwd: PathBuf,
        timeout: Duration,
    ) -> Result<Self, PlannerError> {
        let program = resolve_command(cmd)?;
        let command_line = std::iter::once(program.display().to_string())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");
        Ok(Self {
            program,
            args,
            command_line,
            cwd,
            timeout,
        })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Full argv after the program name: configured args with the
    /// temperature substituted, then the prompt.
    fn argv(&self, prompt: &str, temperature: f32) -> Vec<String> {
        let temperature = temperature.to_string();
        let mut argv: Vec<String> = self
            .args
            .iter()
            .map(|a| a.replace(TEMPERATURE_PLACEHOLDER, &temperature))
            .collect();
        argv.push(prompt.to_owned());
        argv
    }
}

impl GenerationBackend for CommandBackend {
    fn name(&self) -> &str {
        "command"
    }

    fn model(&self) -> &str {
        &self.command_line
    }

    fn generate(&self, prompt: &str, temperature: f32) -> Result<String, GenerationError> {
        let argv = self.argv(prompt, temperature);
        info!(
            program = %self.program.display(),
            timeout_sec = self.timeout.as_secs(),
            "invoking generation command"
        );
        debug!(args = ?args_for_log(&argv), "generation command argv");

        let start = Instant::now();
        let out = subprocess::run_captured(&self.program, &argv, &self.cwd, Some(self.timeout))
            .map_err(|e| GenerationError::Transient {
                detail: format!("failed to start {}: {e}", self.program.display()),
            })?;
        debug!(
            exit_code = ?out.exit_code,
            timed_out = out.timed_out,
            duration_ms = start.elapsed().as_millis() as u64,
            stdout_len = out.stdout.len(),
            "generation command finished"
        );

        if out.timed_out {
            return Err(GenerationError::Transient {
                detail: format!("command timed out after {}s", self.timeout.as_secs()),
            });
        }
        if !out.success() {
            return Err(GenerationError::Command {
                exit_code: out.exit_code,
                stderr: out.stderr.trim().to_owned(),
            });
        }
        if out.stdout.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(out.stdout)
    }
}

/// `argv` with the trailing prompt replaced by `<prompt len=N>`.
fn args_for_log(argv: &[String]) -> Vec<String> {
    let mut out = argv.to_vec();
    if let Some(last) = out.last_mut() {
        *last = format!("<prompt len={}>", last.len());
    }
    out
}

/// Resolve `cmd` to an executable path.
///
/// A value containing a path separator is checked directly; a bare name is
/// searched for in each `PATH` directory.
pub fn resolve_command(cmd: &str) -> Result<PathBuf, PlannerError> {
    resolve_command_with(cmd, std::env::var_os("PATH"))
}

fn resolve_command_with(
    cmd: &str,
    path_var: Option<std::ffi::OsString>,
) -> Result<PathBuf, PlannerError> {
    let not_found = || PlannerError::AgentCmdNotFound {
        cmd: cmd.to_owned(),
    };

    if cmd.trim().is_empty() {
        return Err(not_found());
    }

    if cmd.contains(std::path::MAIN_SEPARATOR) || cmd.contains('/') {
        let p = PathBuf::from(cmd);
        return if is_executable(&p) { Ok(p) } else { Err(not_found()) };
    }

    let paths = path_var.ok_or_else(not_found)?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(cmd))
        .find(|candidate| is_executable(candidate))
        .ok_or_else(not_found)
}

/// A regular file, with an execute bit on Unix.
fn is_executable(path: &Path) -> bool {
    let Ok(meta) = path.metadata() else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }

    #[cfg(not(unix))]
    {
        true
    }
}
