//! Subprocess execution with line streaming.
//!
//! Shared by the controller's local tasks and the agent. stdout and stderr
//! share one pipe, so lines come out in the order the child wrote them.

use std::io::{BufRead, BufReader, PipeReader};
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::protocol::FAILED_EXIT_CODE;

/// Result of running one command to completion.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    pub exit_code: i32,
    /// Set when the command could not be started or its output could not be read.
    pub error: Option<String>,
}

impl CommandOutcome {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            exit_code: FAILED_EXIT_CODE,
            error: Some(message.into()),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.exit_code == 0
    }
}

/// Spawn `argv` and call `on_line` for every newline-stripped output line.
///
/// Never returns an error: spawn and read failures are folded into the
/// outcome with exit code -1.
pub async fn run_streaming<F>(argv: &[String], mut on_line: F) -> CommandOutcome
where
    F: FnMut(String),
{
    let Some((program, args)) = argv.split_first() else {
        return CommandOutcome::failed("Invalid command payload");
    };

    let (reader, stdout_writer) = match std::io::pipe() {
        Ok(pipe) => pipe,
        Err(e) => {
            tracing::warn!("Failed to create output pipe for {}: {}", program, e);
            return CommandOutcome::failed(e.to_string());
        }
    };
    let stderr_writer = match stdout_writer.try_clone() {
        Ok(writer) => writer,
        Err(e) => {
            tracing::warn!("Failed to create output pipe for {}: {}", program, e);
            return CommandOutcome::failed(e.to_string());
        }
    };

    // The builder owns the parent's write ends; it must be dropped right
    // after spawn or the reader never sees EOF.
    let spawned = {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(stdout_writer)
            .stderr(stderr_writer);
        let spawned = command.spawn();
        spawned
    };
    let mut child = match spawned {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("Executable not found: {}", program);
            return CommandOutcome::failed("Executable not found.");
        }
        Err(e) => {
            tracing::warn!("Failed to spawn {}: {}", program, e);
            return CommandOutcome::failed(e.to_string());
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<std::io::Result<String>>();
    tokio::task::spawn_blocking(move || pump_lines(reader, tx));

    while let Some(line) = rx.recv().await {
        match line {
            Ok(line) => on_line(line),
            Err(e) => {
                tracing::warn!("Lost output of {}: {}", program, e);
                return CommandOutcome::failed(e.to_string());
            }
        }
    }

    match child.wait().await {
        Ok(status) => CommandOutcome {
            exit_code: status.code().unwrap_or(FAILED_EXIT_CODE),
            error: None,
        },
        Err(e) => CommandOutcome::failed(e.to_string()),
    }
}

fn pump_lines(reader: PipeReader, tx: mpsc::UnboundedSender<std::io::Result<String>>) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                if buf.ends_with(b"\n") {
                    buf.pop();
                    if buf.ends_with(b"\r") {
                        buf.pop();
                    }
                }
                let line = String::from_utf8_lossy(&buf).into_owned();
                if tx.send(Ok(line)).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = tx.send(Err(e));
                break;
            }
        }
    }
}
