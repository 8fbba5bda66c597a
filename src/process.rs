//! Scoped external processes.
//!
//! Every child spawned through [`ProcessRunner`] is owned by a guard that
//! kills and reaps it on drop, so success, error, early return and
//! cancellation all release the process and its pipes. Output streams are
//! drained on helper threads while the caller polls for exit or cancellation.

use std::io::{self, Read, Write};
use std::process::{Child, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::command::Invocation;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Cooperative cancellation flag shared between a caller and a run.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ProcessError {
    #[error("program not found: {0}")]
    NotFound(String),
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("process I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("process was cancelled")]
    Cancelled,
}

/// Captured result of a finished process.
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Best diagnostic text: stderr, else stdout.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Spawns processes and counts how many it has started.
///
/// Clones share the counter, which lets tests prove a dry run never spawns.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    spawned: Arc<AtomicUsize>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of processes spawned so far by this runner and its clones.
    pub fn spawn_count(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    /// Run `invocation` to completion, streaming `stdin` into it.
    ///
    /// Blocks until the process exits or `cancel` fires. A cancelled process
    /// is killed and reaped before this returns.
    pub fn run(
        &self,
        invocation: &Invocation,
        stdin: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutput, ProcessError> {
        if cancel.is_cancelled() {
            return Err(ProcessError::Cancelled);
        }

        let mut child = ScopedChild::spawn(invocation, stdin.is_some())?;
        self.spawned.fetch_add(1, Ordering::SeqCst);
        log::debug!("spawned: {}", invocation.command_line());

        if let Some(text) = stdin {
            child.feed_stdin(text);
        }

        child.wait(cancel)
    }
}

/// Owns a running child, its stdin writer and its output readers.
struct ScopedChild {
    child: Child,
    stdin: Option<JoinHandle<io::Result<()>>>,
    stdout: Option<JoinHandle<Vec<u8>>>,
    stderr: Option<JoinHandle<Vec<u8>>>,
    reaped: bool,
}

impl ScopedChild {
    fn spawn(invocation: &Invocation, pipe_stdin: bool) -> Result<Self, ProcessError> {
        let program = invocation.program().display().to_string();
        let mut cmd = invocation.to_command();
        cmd.stdin(if pipe_stdin {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                ProcessError::NotFound(program.clone())
            } else {
                ProcessError::Spawn { program, source: e }
            }
        })?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        Ok(Self {
            child,
            stdin: None,
            stdout,
            stderr,
            reaped: false,
        })
    }

    /// Write the payload on a helper thread, closing stdin afterwards so the
    /// child sees EOF. The caller is free to poll for cancellation meanwhile.
    fn feed_stdin(&mut self, text: &str) {
        if let Some(mut stdin) = self.child.stdin.take() {
            let payload = text.as_bytes().to_vec();
            self.stdin = Some(thread::spawn(move || stdin.write_all(&payload)));
        }
    }

    fn wait(mut self, cancel: &CancellationToken) -> Result<ProcessOutput, ProcessError> {
        let status = loop {
            if cancel.is_cancelled() {
                // Drop kills and reaps.
                return Err(ProcessError::Cancelled);
            }
            if let Some(status) = self.child.try_wait()? {
                break status;
            }
            thread::sleep(POLL_INTERVAL);
        };
        self.reaped = true;

        if let Some(Ok(Err(e))) = self.stdin.take().map(JoinHandle::join) {
            // Child exited without reading everything; its status tells the story.
            if e.kind() != io::ErrorKind::BrokenPipe {
                return Err(ProcessError::Io(e));
            }
        }

        let stdout = join_reader(self.stdout.take());
        let stderr = join_reader(self.stderr.take());

        Ok(ProcessOutput {
            status,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }
}

impl Drop for ScopedChild {
    fn drop(&mut self) {
        drop(self.child.stdin.take());
        if !self.reaped {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
        // Helper threads end once the pipes close (the writer with
        // BrokenPipe); a grandchild still holding them must not block the drop.
        self.stdin.take();
        self.stdout.take();
        self.stderr.take();
    }
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        buf
    })
}

fn join_reader(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    fn sh(script: &str) -> Invocation {
        Invocation::new("sh").arg("-c").arg(script)
    }

    #[test]
    fn streams_stdin_and_captures_stdout() {
        let runner = ProcessRunner::new();
        let out = runner
            .run(&Invocation::new("cat"), Some("Hello world."), &CancellationToken::new())
            .expect("cat should run");
        assert!(out.success());
        assert_eq!(out.stdout, "Hello world.");
        assert_eq!(runner.spawn_count(), 1);
    }

    #[test]
    fn reports_exit_code_and_stderr() {
        let runner = ProcessRunner::new();
        let out = runner
            .run(&sh("echo broken model >&2; exit 3"), None, &CancellationToken::new())
            .expect("sh should run");
        assert!(!out.success());
        assert_eq!(out.status.code(), Some(3));
        assert_eq!(out.diagnostic(), "broken model");
    }

    #[test]
    fn missing_program_is_not_found() {
        let runner = ProcessRunner::new();
        let err = runner
            .run(
                &Invocation::new("definitely-not-a-real-binary-4821"),
                None,
                &CancellationToken::new(),
            )
            .unwrap_err();
        assert!(matches!(err, ProcessError::NotFound(_)));
        assert_eq!(runner.spawn_count(), 0);
    }

    #[test]
    fn cancellation_kills_the_child() {
        let runner = ProcessRunner::new();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            trigger.cancel();
        });

        let started = Instant::now();
        let err = runner
            .run(&Invocation::new("sleep").arg("30"), None, &cancel)
            .unwrap_err();
        canceller.join().unwrap();

        assert!(matches!(err, ProcessError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn cancellation_is_not_blocked_by_unread_stdin() {
        let runner = ProcessRunner::new();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            trigger.cancel();
        });

        // far beyond any pipe buffer, and `sleep` never reads it
        let text = "Hello world. ".repeat(100_000);
        let started = Instant::now();
        let err = runner
            .run(&Invocation::new("sleep").arg("30"), Some(&text), &cancel)
            .unwrap_err();
        canceller.join().unwrap();

        assert!(matches!(err, ProcessError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn large_stdin_is_fully_delivered() {
        let text = "Hello world. ".repeat(50_000);
        let out = ProcessRunner::new()
            .run(&Invocation::new("cat"), Some(&text), &CancellationToken::new())
            .expect("cat should run");
        assert_eq!(out.stdout.len(), text.len());
    }

    #[test]
    fn pre_cancelled_token_never_spawns() {
        let runner = ProcessRunner::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = runner.run(&Invocation::new("cat"), Some("x"), &cancel).unwrap_err();
        assert!(matches!(err, ProcessError::Cancelled));
        assert_eq!(runner.spawn_count(), 0);
    }
}
