//! Blocking subprocess execution with captured output and a hard timeout.
//!
//! Every external tool the engine touches (git, doxygen, the compilers)
//! goes through [`run_command`]. The runner never writes to the filesystem;
//! callers own their scratch directories.

use std::ffi::OsStr;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Spawn-level failure, distinct from a process that ran and exited non-zero.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Captured result of a finished (or killed) subprocess.
#[derive(Debug)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was killed before reporting one.
    pub status_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status_code == Some(0)
    }
}

/// Run `program` with `args`, blocking until exit or `timeout`.
///
/// Output pipes are drained on dedicated threads so a chatty child never
/// deadlocks on a full pipe. On timeout the child is killed and the output
/// collected so far is returned with `timed_out` set.
pub fn run_command<I, S>(
    program: &str,
    args: I,
    cwd: Option<&Path>,
    envs: &[(String, String)],
    timeout: Duration,
) -> Result<CommandOutput, ProcessError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    for (key, value) in envs {
        cmd.env(key, value);
    }

    let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
        program: program.to_string(),
        source,
    })?;

    let stdout = child.stdout.take().expect("stdout was piped");
    let stderr = child.stderr.take().expect("stderr was piped");

    let stdout_handle = thread::spawn(move || drain(stdout));
    let stderr_handle = thread::spawn(move || drain(stderr));

    let start = Instant::now();
    let mut timed_out = false;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) => {
                if start.elapsed() >= timeout {
                    timed_out = true;
                    tracing::warn!(program, timeout_secs = timeout.as_secs(), "killing timed-out subprocess");
                    let _ = child.kill();
                    break child.wait().ok();
                }
                thread::sleep(Duration::from_millis(25));
            }
            Err(source) => {
                return Err(ProcessError::Wait {
                    program: program.to_string(),
                    source,
                })
            }
        }
    };

    let stdout_bytes = stdout_handle.join().unwrap_or_default();
    let stderr_bytes = stderr_handle.join().unwrap_or_default();

    Ok(CommandOutput {
        status_code: status.and_then(|s| s.code()),
        stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
        stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
        timed_out,
    })
}

fn drain(mut pipe: impl Read) -> Vec<u8> {
    let mut buf = Vec::new();
    let _ = pipe.read_to_end(&mut buf);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_and_exit_code() {
        let out = run_command(
            "sh",
            ["-c", "echo hello"],
            None,
            &[],
            Duration::from_secs(10),
        )
        .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[test]
    fn nonzero_exit_is_not_a_spawn_error() {
        let out = run_command(
            "sh",
            ["-c", "echo oops >&2; exit 3"],
            None,
            &[],
            Duration::from_secs(10),
        )
        .unwrap();
        assert!(!out.success());
        assert_eq!(out.status_code, Some(3));
        assert_eq!(out.stderr.trim(), "oops");
    }

    #[test]
    fn missing_binary_is_a_spawn_error() {
        let err = run_command(
            "levelup-no-such-binary",
            ["--version"],
            None,
            &[],
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }

    #[test]
    fn timeout_kills_the_child() {
        let start = Instant::now();
        let out = run_command(
            "sh",
            ["-c", "sleep 30"],
            None,
            &[],
            Duration::from_millis(200),
        )
        .unwrap();
        assert!(out.timed_out);
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
