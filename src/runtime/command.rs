//! Subprocess helpers for driving the platform and engine binaries

use crate::{CommandFailure, LocalshiftError, Result};
use std::collections::VecDeque;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;

/// Lines of output kept for error reports
pub const TAIL_LINES: usize = 20;

/// Exit status and output of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Describe this output as a failure of `command`
    pub fn failure(&self, command: impl Into<String>) -> CommandFailure {
        let combined = format!("{}\n{}", self.stdout, self.stderr);
        CommandFailure {
            command: command.into(),
            status: self.status,
            output_tail: tail(&combined, TAIL_LINES),
        }
    }
}

/// Render a command line for messages
pub fn describe(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Last `n` non-empty lines of `text`
pub fn tail(text: &str, n: usize) -> Vec<String> {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    lines[lines.len().saturating_sub(n)..]
        .iter()
        .map(|l| l.to_string())
        .collect()
}

fn spawn_error(program: &str) -> impl FnOnce(std::io::Error) -> LocalshiftError + '_ {
    move |source| LocalshiftError::Spawn {
        program: program.to_string(),
        source,
    }
}

/// Run a command to completion, capturing its output
pub async fn capture(program: &str, args: &[String], input: Option<&[u8]>) -> Result<CommandOutput> {
    tracing::debug!("Running {}", describe(program, args));

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(spawn_error(program))?;

    if let (Some(input), Some(mut stdin)) = (input, child.stdin.take()) {
        stdin.write_all(input).await.map_err(spawn_error(program))?;
        // Dropping stdin closes the pipe so the child sees EOF
    }

    let output = child.wait_with_output().await.map_err(spawn_error(program))?;

    Ok(CommandOutput {
        status: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

/// Run a long command, relaying its output as it arrives and keeping the tail
pub async fn stream(program: &str, args: &[String]) -> Result<(Option<i32>, Vec<String>)> {
    tracing::debug!("Running {}", describe(program, args));

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(spawn_error(program))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let (out_tail, err_tail) = tokio::join!(relay(stdout, false), relay(stderr, true));

    let status = child.wait().await.map_err(spawn_error(program))?;

    let mut combined: Vec<String> = out_tail.into_iter().chain(err_tail).collect();
    let excess = combined.len().saturating_sub(TAIL_LINES);
    combined.drain(..excess);

    Ok((status.code(), combined))
}

async fn relay<R: AsyncRead + Unpin>(reader: Option<R>, to_stderr: bool) -> VecDeque<String> {
    let mut kept = VecDeque::with_capacity(TAIL_LINES);
    let Some(reader) = reader else {
        return kept;
    };

    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if to_stderr {
            eprintln!("{}", line);
        } else {
            println!("{}", line);
        }
        if kept.len() == TAIL_LINES {
            kept.pop_front();
        }
        kept.push_back(line);
    }
    kept
}

/// Run a command attached to the caller's terminal
pub async fn interactive(program: &str, args: &[String]) -> Result<Option<i32>> {
    tracing::debug!("Running {}", describe(program, args));

    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .map_err(spawn_error(program))?;

    Ok(status.code())
}
