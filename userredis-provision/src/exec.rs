//! Bounded external command execution.
//!
//! Every shell-out (`systemctl`, `redis-cli`, the panel's listing commands,
//! `id`) goes through [`run`], which kills the child once the timeout elapses.
//! stdout and stderr are drained on their own threads so a chatty child can
//! never block on a full pipe while we poll.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::ProvisionError;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// `Err(CommandFailed)` unless the exit status is zero.
    pub fn check(self, program: &str) -> Result<Self, ProvisionError> {
        if self.success() {
            return Ok(self);
        }
        Err(ProvisionError::CommandFailed {
            program: program.to_owned(),
            status: self.status.to_string(),
            stderr: self.stderr.trim().to_owned(),
        })
    }
}

/// Run `program args…` with stdin closed, capturing output, killing it after `timeout`.
pub fn run<S: AsRef<str>>(
    program: &str,
    args: &[S],
    timeout: Duration,
) -> Result<CommandOutput, ProvisionError> {
    tracing::debug!(
        program,
        args = ?args.iter().map(AsRef::as_ref).collect::<Vec<_>>(),
        "running external command"
    );

    let mut child = Command::new(program)
        .args(args.iter().map(AsRef::as_ref))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ProvisionError::Spawn {
            program: program.to_owned(),
            source,
        })?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match wait_until(&mut child, timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            let _ = child.kill();
            let _ = child.wait();
            tracing::warn!(program, ?timeout, "external command timed out, killed");
            return Err(ProvisionError::Timeout {
                program: program.to_owned(),
                timeout,
            });
        }
        Err(source) => {
            let _ = child.kill();
            return Err(ProvisionError::Spawn {
                program: program.to_owned(),
                source,
            });
        }
    };

    Ok(CommandOutput {
        status,
        stdout: join(stdout),
        stderr: join(stderr),
    })
}

/// Split an argv vector into program and arguments and [`run`] it.
pub fn run_argv(argv: &[String], timeout: Duration) -> Result<CommandOutput, ProvisionError> {
    let Some((program, args)) = argv.split_first() else {
        return Err(ProvisionError::Spawn {
            program: String::new(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
        });
    };
    run(program, args, timeout)
}

fn wait_until(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join(handle: Option<JoinHandle<String>>) -> String {
    handle
        .map(|h| h.join().unwrap_or_default())
        .unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_and_status() {
        let out = run("sh", &["-c", "echo hello; echo oops >&2"], Duration::from_secs(5)).unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
    }

    #[test]
    fn nonzero_exit_is_reported_by_check() {
        let out = run("sh", &["-c", "echo bad >&2; exit 3"], Duration::from_secs(5)).unwrap();
        assert!(!out.success());
        let err = out.check("sh").unwrap_err();
        assert!(matches!(err, ProvisionError::CommandFailed { .. }));
        assert!(err.to_string().contains("bad"));
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let err = run::<&str>("/nonexistent/userredis-test-bin", &[], Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Spawn { .. }));
    }

    #[test]
    fn slow_program_is_killed_at_timeout() {
        let started = Instant::now();
        let err = run("sleep", &["5"], Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, ProvisionError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn empty_argv_is_rejected() {
        assert!(run_argv(&[], Duration::from_secs(1)).is_err());
    }
}
