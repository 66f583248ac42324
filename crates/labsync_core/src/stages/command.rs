//! External command runner shared by the command-backed stages.
//!
//! Runs a program with a wall-clock limit, captures its output, and turns
//! stderr lines tagged `ERROR` / `WARNING` into stage log entries.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::{StageError, StageResult};
use crate::logging::{EntryKind, StageLog};

/// Number of stderr lines kept in `CommandFailed` messages.
const STDERR_TAIL_LINES: usize = 20;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn wait_with_timeout(
    child: &mut Child,
    program: &str,
    timeout: Option<Duration>,
) -> StageResult<Option<i32>> {
    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status.code()),
            Ok(None) => {}
            Err(e) => return Err(StageError::io(format!("waiting for {}", program), e)),
        }
        if let Some(limit) = timeout {
            if started.elapsed() >= limit {
                let _ = child.kill();
                let _ = child.wait();
                return Err(StageError::timeout(program, limit.as_secs()));
            }
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Run `program` with `args`, killing it after `timeout`.
pub fn run_command(
    program: &str,
    args: &[String],
    timeout: Option<Duration>,
) -> StageResult<CommandOutput> {
    tracing::debug!("Running: {} {}", program, args.join(" "));

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| StageError::spawn(program, e))?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let exit_code = wait_with_timeout(&mut child, program, timeout)?;

    Ok(CommandOutput {
        exit_code,
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
    })
}

/// Classify one stderr line by its level tag.
pub fn classify_line(line: &str) -> Option<(EntryKind, &str)> {
    let trimmed = line.trim_start();
    const ERROR_TAGS: [&str; 2] = ["[ERROR]", "ERROR"];
    const WARNING_TAGS: [&str; 4] = ["[WARNING]", "WARNING", "[WARN]", "WARN"];

    let strip = |tags: &[&str]| {
        tags.iter().find_map(|tag| {
            trimmed
                .strip_prefix(tag)
                .map(|rest| rest.trim_start_matches([':', ' ', '-']).trim_end())
        })
    };

    if let Some(msg) = strip(&ERROR_TAGS) {
        Some((EntryKind::Error, msg))
    } else {
        strip(&WARNING_TAGS).map(|msg| (EntryKind::Warning, msg))
    }
}

/// Last `STDERR_TAIL_LINES` non-empty lines of `stderr`.
pub fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Run a stage command and record its diagnostics against `key`.
///
/// A non-zero exit adds an error entry to `log` and fails with
/// `CommandFailed`.
pub fn run_stage_command(
    stage: &str,
    key: &str,
    program: &str,
    args: &[String],
    timeout: Option<Duration>,
    log: &mut StageLog,
) -> StageResult<CommandOutput> {
    let output = run_command(program, args, timeout)?;

    for line in output.stderr.lines() {
        match classify_line(line) {
            Some((EntryKind::Error, msg)) if !msg.is_empty() => log.add_error(key, msg),
            Some((EntryKind::Warning, msg)) if !msg.is_empty() => log.add_warning(key, msg),
            _ => {}
        }
    }

    if !output.success() {
        let exit_code = output.exit_code.unwrap_or(-1);
        log.add_error(
            key,
            format!("{} exited with status {}", stage, exit_code),
        );
        return Err(StageError::command_failed(
            program,
            exit_code,
            stderr_tail(&output.stderr),
        ));
    }

    Ok(output)
}
