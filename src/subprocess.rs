//! Child-process execution for command backends (exec-style, no shell).
//!
//! The program is spawned directly, its stdout/stderr are drained on
//! dedicated threads into bounded buffers, and the child is killed when the
//! deadline passes.

use std::ffi::OsStr;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Cap on bytes kept from each of stdout / stderr (10 MiB).
const MAX_OUTPUT_BYTES: u64 = 10 * 1024 * 1024;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// What a finished (or killed) child left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the child was killed on timeout or ended by a signal.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl CapturedOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }
}

/// Run `program args...` in `cwd`, killing it after `timeout` when given.
pub fn run_captured<S: AsRef<OsStr>>(
    program: &Path,
    args: &[S],
    cwd: &Path,
    timeout: Option<Duration>,
) -> std::io::Result<CapturedOutput> {
    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    // Drain both pipes concurrently so a full stderr buffer cannot block a
    // child that is still writing stdout.
    let stdout_reader = drain(child.stdout.take(), "stdout")?;
    let stderr_reader = drain(child.stderr.take(), "stderr")?;

    let (timed_out, exit_code) = wait_until(&mut child, timeout)?;

    Ok(CapturedOutput {
        stdout: join_reader(stdout_reader, "stdout")?,
        stderr: join_reader(stderr_reader, "stderr")?,
        exit_code,
        timed_out,
    })
}

fn drain<R: Read + Send + 'static>(
    pipe: Option<R>,
    name: &str,
) -> std::io::Result<JoinHandle<std::io::Result<String>>> {
    let pipe = pipe.ok_or_else(|| std::io::Error::other(format!("child {name} was not piped")))?;
    Ok(std::thread::spawn(move || read_bounded(pipe)))
}

fn join_reader(handle: JoinHandle<std::io::Result<String>>, name: &str) -> std::io::Result<String> {
    handle
        .join()
        .map_err(|e| std::io::Error::other(format!("{name} reader thread panicked: {e:?}")))?
}

/// Wait for exit, polling against the deadline when `timeout` is set.
///
/// A child that exits right at the deadline may still be reported as timed
/// out.
fn wait_until(child: &mut Child, timeout: Option<Duration>) -> std::io::Result<(bool, Option<i32>)> {
    let Some(timeout) = timeout else {
        let status = child.wait()?;
        return Ok((false, status.code()));
    };

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok((false, status.code()));
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Ok((true, None));
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn read_bounded(reader: impl Read) -> std::io::Result<String> {
    let mut buf = Vec::new();
    reader.take(MAX_OUTPUT_BYTES).read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn tmp_dir() -> PathBuf {
        std::env::temp_dir()
    }

    #[test]
    fn captures_stdout() {
        let out = run_captured(Path::new("echo"), &["hello", "world"], &tmp_dir(), None).unwrap();

        assert_eq!(out.stdout.trim(), "hello world");
        assert!(out.stderr.is_empty());
        assert!(out.success());
    }

    #[test]
    fn captures_stderr_and_exit_code() {
        let out = run_captured(
            Path::new("sh"),
            &["-c", "echo boom >&2; exit 3"],
            &tmp_dir(),
            None,
        )
        .unwrap();

        assert_eq!(out.stderr.trim(), "boom");
        assert_eq!(out.exit_code, Some(3));
        assert!(!out.success());
    }

    #[test]
    fn timeout_kills_child() {
        let out = run_captured(
            Path::new("sleep"),
            &["30"],
            &tmp_dir(),
            Some(Duration::from_millis(200)),
        )
        .unwrap();

        assert!(out.timed_out);
        assert_eq!(out.exit_code, None);
        assert!(!out.success());
    }

    #[test]
    fn fast_child_finishes_before_timeout() {
        let out = run_captured(Path::new("true"), &[] as &[&str], &tmp_dir(), Some(Duration::from_secs(5)))
            .unwrap();
        assert!(!out.timed_out);
        assert!(out.success());
    }

    #[test]
    fn missing_program_is_not_found() {
        let err = run_captured(
            Path::new("studyplan-no-such-binary-xyz"),
            &[] as &[&str],
            &tmp_dir(),
            None,
        )
        .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn stdin_is_closed() {
        // `cat` with no args reads stdin; a null stdin makes it exit at once.
        let out = run_captured(Path::new("cat"), &[] as &[&str], &tmp_dir(), Some(Duration::from_secs(5)))
            .unwrap();
        assert!(!out.timed_out);
        assert!(out.stdout.is_empty());
    }
}
