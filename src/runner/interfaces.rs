//! Compiler invocation boundary.
//!
//! The job runner never spawns processes itself; it goes through [`Invoker`]. The default implementation runs the
//! compiler as a subprocess, and tests substitute scripted outcomes.

use std::future::Future;
use std::io::{self, PipeReader, Read};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};

/// Outcome of one compiler invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// The process ran to completion.
    Exited {
        success: bool,
        /// Combined stdout and stderr
        output: String,
    },
    /// The process was killed after exceeding its wall-clock limit.
    TimedOut(Duration),
}

impl Invocation {
    pub fn success(output: impl Into<String>) -> Self {
        Invocation::Exited {
            success: true,
            output: output.into(),
        }
    }

    pub fn failure(output: impl Into<String>) -> Self {
        Invocation::Exited {
            success: false,
            output: output.into(),
        }
    }
}

/// Run the compiler and capture its result.
pub trait Invoker: Send + Sync + 'static {
    /// Run `exe` with `args`, killing it after `timeout`.
    fn invoke(&self, exe: &Path, args: &[String], timeout: Duration) -> impl Future<Output = Invocation> + Send;
}

/// Subprocess-based invocation (current behavior).
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessInvoker;

/// Spawn `exe` with stdout and stderr sharing one pipe, so the output keeps the order it was written in.
///
/// The command is dropped before returning, which closes the parent's copies of the write end.
fn spawn_combined(exe: &Path, args: &[String]) -> io::Result<(Child, PipeReader)> {
    let (reader, writer) = io::pipe()?;
    let mut command = Command::new(exe);
    command
        .args(args)
        .stdin(Stdio::null())
        .stderr(writer.try_clone()?)
        .stdout(writer)
        .kill_on_drop(true);
    let child = command.spawn()?;
    Ok((child, reader))
}

impl Invoker for ProcessInvoker {
    async fn invoke(&self, exe: &Path, args: &[String], timeout: Duration) -> Invocation {
        let (mut child, mut reader) = match spawn_combined(exe, args) {
            Ok(spawned) => spawned,
            Err(e) => return Invocation::failure(format!("failed to run '{}': {}", exe.display(), e)),
        };

        let read = tokio::task::spawn_blocking(move || {
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf).map(|_| buf)
        });

        // Dropping the future on timeout drops the child, which kills it and closes the pipe.
        let finished = tokio::time::timeout(timeout, async move {
            let status = child.wait().await?;
            let bytes = read.await.map_err(io::Error::other)??;
            Ok::<_, io::Error>((status, bytes))
        })
        .await;
        let (status, bytes) = match finished {
            Ok(Ok(done)) => done,
            Ok(Err(e)) => return Invocation::failure(format!("failed to wait for '{}': {}", exe.display(), e)),
            Err(_) => return Invocation::TimedOut(timeout),
        };

        let combined = String::from_utf8_lossy(&bytes).into_owned();
        if status.success() {
            Invocation::success(combined)
        } else if combined.is_empty() {
            Invocation::failure(status.to_string())
        } else {
            Invocation::failure(combined)
        }
    }
}
