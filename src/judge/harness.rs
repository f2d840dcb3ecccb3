//! Harness plumbing shared by every language
//!
//! A harness is a small generated script that loads the submission, calls the
//! entry point once and writes a single result line:
//!
//! ```text
//! @@judge-result:<tag>@@ {"ok":true,"value":5}
//! ```
//!
//! The tag is derived from the run's inputs, so the same submission and test
//! case always produce the same harness text. Only the last line carrying the
//! tag is trusted.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::constants::ERROR_MESSAGE_MAX_CHARS;
use crate::judge::sandbox::{ExecutionOutcome, ProcessOutput};
use crate::judge::verdict::TestErrorKind;
use crate::models::EntryPoint;

const MARKER_PREFIX: &str = "@@judge-result:";

/// Generated harness for one (submission, test case) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Harness {
    pub file_name: String,
    pub text: String,
    pub tag: String,
}

/// Result line payload written by a harness
#[derive(Debug, Clone, Deserialize)]
pub struct HarnessResult {
    pub ok: bool,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
}

/// What one test run produced, before comparison with the expected value
#[derive(Debug, Clone, PartialEq)]
pub enum RunReport {
    Returned {
        value: Value,
        elapsed: Duration,
    },
    Failed {
        kind: TestErrorKind,
        message: String,
        elapsed: Duration,
    },
}

impl RunReport {
    pub fn failed(kind: TestErrorKind, message: impl Into<String>, elapsed: Duration) -> Self {
        Self::Failed {
            kind,
            message: message.into(),
            elapsed,
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            Self::Returned { elapsed, .. } | Self::Failed { elapsed, .. } => *elapsed,
        }
    }
}

/// Digest of everything that determines a harness
pub fn harness_tag(language: &str, source: &str, entry: &EntryPoint, input: &Value) -> String {
    let input = input.to_string();
    let mut hasher = Sha256::new();
    for part in [language, source, entry.name.as_str(), input.as_str()] {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    hex::encode(&hasher.finalize()[..8])
}

pub fn result_marker(tag: &str) -> String {
    format!("{}{}@@ ", MARKER_PREFIX, tag)
}

/// Positional arguments for an input value: arrays are spread
pub fn positional_arguments(input: &Value) -> Vec<Value> {
    match input {
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}

/// Arguments encoded as a JSON string literal, valid in Python and JavaScript
/// source. The harness decodes it at runtime.
pub fn arguments_literal(input: &Value) -> String {
    let arguments = Value::Array(positional_arguments(input)).to_string();
    Value::String(arguments).to_string()
}

/// Find the last result line carrying `tag`
pub fn parse_result_line(
    stdout: &str,
    tag: &str,
) -> Option<Result<HarnessResult, serde_json::Error>> {
    let marker = result_marker(tag);
    stdout
        .lines()
        .rev()
        .find_map(|line| line.strip_prefix(marker.as_str()))
        .map(serde_json::from_str)
}

/// Turn a raw sandbox outcome into a run report
pub fn interpret(outcome: ExecutionOutcome, tag: &str) -> RunReport {
    match outcome {
        ExecutionOutcome::SpawnFailed(reason) => {
            RunReport::failed(TestErrorKind::InternalError, reason, Duration::ZERO)
        }
        ExecutionOutcome::TimedOut { elapsed } => {
            RunReport::failed(TestErrorKind::TimedOut, "time limit exceeded", elapsed)
        }
        ExecutionOutcome::Cancelled { elapsed } => {
            RunReport::failed(TestErrorKind::Cancelled, "cancelled: exam time expired", elapsed)
        }
        ExecutionOutcome::Completed(output) => interpret_output(&output, tag),
    }
}

fn interpret_output(output: &ProcessOutput, tag: &str) -> RunReport {
    let elapsed = output.elapsed;

    if output.signal == Some(nix::sys::signal::Signal::SIGXCPU as i32) {
        return RunReport::failed(TestErrorKind::TimedOut, "cpu time limit exceeded", elapsed);
    }
    if output.truncated {
        return RunReport::failed(TestErrorKind::RuntimeError, "output limit exceeded", elapsed);
    }

    match parse_result_line(&output.stdout, tag) {
        Some(Ok(result)) if result.ok && output.success() => RunReport::Returned {
            value: result.value,
            elapsed,
        },
        Some(Ok(result)) if result.ok => {
            RunReport::failed(TestErrorKind::RuntimeError, describe_exit(output), elapsed)
        }
        Some(Ok(result)) => {
            let kind = match result.kind.as_deref() {
                Some("memory") => TestErrorKind::MemoryLimitExceeded,
                _ => TestErrorKind::RuntimeError,
            };
            let message = result.error.unwrap_or_else(|| "runtime error".to_string());
            RunReport::failed(kind, truncate_tail(&message), elapsed)
        }
        Some(Err(e)) => RunReport::failed(
            TestErrorKind::InternalError,
            format!("malformed harness result: {}", e),
            elapsed,
        ),
        None if output.success() => RunReport::failed(
            TestErrorKind::InternalError,
            "harness produced no result",
            elapsed,
        ),
        None => RunReport::failed(TestErrorKind::RuntimeError, describe_exit(output), elapsed),
    }
}

/// Human-readable reason for an abnormal exit
pub fn describe_exit(output: &ProcessOutput) -> String {
    let stderr = output.stderr.trim();
    if !stderr.is_empty() {
        return truncate_tail(stderr);
    }
    match (output.signal, output.exit_code) {
        (Some(signal), _) => format!("killed by signal {}", signal),
        (None, Some(code)) => format!("process exited with code {}", code),
        (None, None) => "process exited abnormally".to_string(),
    }
}

/// Keep the end of a message, where tracebacks put the actual error
fn truncate_tail(message: &str) -> String {
    match message.char_indices().rev().nth(ERROR_MESSAGE_MAX_CHARS - 1) {
        Some((start, _)) if start > 0 => format!("...{}", &message[start..]),
        _ => message.to_string(),
    }
}
