//! JavaScript (Node.js) runner

use async_trait::async_trait;
use nix::sys::signal::Signal;
use serde_json::Value;

use super::{Artifact, PrepareError, Runner, run_check};
use crate::config::CommandTemplate;
use crate::constants::languages;
use crate::judge::ExecutionLimits;
use crate::judge::cancel::CancelSignal;
use crate::judge::harness::{self, Harness, RunReport};
use crate::judge::sandbox::{ExecutionOutcome, LaunchSpec, ProcessOutput, Sandbox, WorkspaceFile};
use crate::judge::verdict::TestErrorKind;
use crate::models::EntryPoint;

const SOURCE_FILE: &str = "solution.js";
const HARNESS_FILE: &str = "harness.js";

pub struct JavaScriptRunner {
    command: CommandTemplate,
}

impl JavaScriptRunner {
    pub fn new(command: CommandTemplate) -> Self {
        Self { command }
    }
}

#[async_trait]
impl Runner for JavaScriptRunner {
    fn language(&self) -> &'static str {
        languages::JAVASCRIPT
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["js", "node"]
    }

    async fn prepare(
        &self,
        source: &str,
        sandbox: &Sandbox,
        limits: &ExecutionLimits,
        cancel: CancelSignal,
    ) -> Result<Artifact, PrepareError> {
        let spec = LaunchSpec {
            program: self.command.program.clone(),
            args: vec!["--check".to_string(), SOURCE_FILE.to_string()],
            files: vec![WorkspaceFile::new(SOURCE_FILE, source)],
            ..LaunchSpec::default()
        };
        run_check(sandbox, &spec, limits, cancel).await?;
        Ok(Artifact::new(self.language(), SOURCE_FILE, source))
    }

    fn harness(&self, artifact: &Artifact, entry: &EntryPoint, input: &Value) -> Harness {
        let tag = harness::harness_tag(artifact.language, &artifact.source, entry, input);
        Harness {
            file_name: HARNESS_FILE.to_string(),
            text: render(artifact.file_name, &entry.name, &harness::result_marker(&tag), input),
            tag,
        }
    }

    // V8 reserves far more address space than it uses, so the heap is
    // bounded with `--max-old-space-size` instead of RLIMIT_AS.
    fn invocation_command(
        &self,
        artifact: &Artifact,
        harness: &Harness,
        limits: &ExecutionLimits,
    ) -> LaunchSpec {
        LaunchSpec {
            program: self.command.program.clone(),
            args: self.command.render(&harness.file_name, limits.memory_limit_mb),
            env: Vec::new(),
            files: vec![
                WorkspaceFile::new(artifact.file_name, artifact.source.as_ref()),
                WorkspaceFile::new(harness.file_name.clone(), harness.text.clone()),
            ],
            address_space_limit_bytes: None,
        }
    }

    fn parse_output(&self, harness: &Harness, outcome: ExecutionOutcome) -> RunReport {
        if let ExecutionOutcome::Completed(output) = &outcome {
            if is_heap_exhaustion(output, &harness.tag) {
                return RunReport::failed(
                    TestErrorKind::MemoryLimitExceeded,
                    "JavaScript heap out of memory",
                    output.elapsed,
                );
            }
        }
        harness::interpret(outcome, &harness.tag)
    }
}

/// V8 aborts on heap exhaustion after printing a `FATAL ERROR:` line. The
/// text alone is writable by user code, so it only counts together with an
/// abort and no result line from the harness.
fn is_heap_exhaustion(output: &ProcessOutput, tag: &str) -> bool {
    let aborted = output.signal == Some(Signal::SIGABRT as i32) || output.exit_code == Some(134);
    aborted
        && harness::parse_result_line(&output.stdout, tag).is_none()
        && output.stderr.lines().any(|line| {
            line.starts_with("FATAL ERROR:")
                && (line.contains("heap out of memory") || line.contains("Allocation failed"))
        })
}

fn render(source_file: &str, entry: &str, marker: &str, input: &Value) -> String {
    let mut text = String::from("'use strict';\n");
    text.push_str(&format!("const MARKER = {};\n", Value::String(marker.to_string())));
    text.push_str(&format!("const SOURCE = {};\n", Value::String(source_file.to_string())));
    text.push_str(&format!("const ENTRY = {};\n", Value::String(entry.to_string())));
    text.push_str(&format!("const ARGS = {};\n", harness::arguments_literal(input)));
    text.push_str(&JAVASCRIPT_BODY.replace("__ENTRY_IDENT__", entry));
    text
}

const JAVASCRIPT_BODY: &str = r#"const fs = require('fs');
const path = require('path');
const vm = require('vm');
const write = fs.writeSync.bind(fs, 1);

function strictReplacer(key, value) {
  if (typeof value === 'number' && !Number.isFinite(value)) {
    throw new TypeError('non-finite number ' + value);
  }
  return value;
}

function emit(payload) {
  let line;
  try {
    line = JSON.stringify(payload, strictReplacer);
  } catch (err) {
    line = JSON.stringify({
      ok: false,
      kind: 'runtime',
      error: 'return value is not JSON serializable: ' + err.message,
    });
  }
  write('\n' + MARKER + line + '\n');
}

function describe(err) {
  if (err instanceof Error) {
    return err.name + ': ' + err.message;
  }
  return String(err);
}

async function main() {
  const args = JSON.parse(ARGS);
  const userModule = { exports: {} };
  globalThis.module = userModule;
  globalThis.exports = userModule.exports;
  globalThis.require = require;

  try {
    const source = fs.readFileSync(path.join(__dirname, SOURCE), 'utf8');
    vm.runInThisContext(source, { filename: SOURCE });
    let entry = vm.runInThisContext(
      'typeof __ENTRY_IDENT__ === "function" ? __ENTRY_IDENT__ : undefined');
    if (entry === undefined) {
      const exported = userModule.exports;
      if (exported && typeof exported[ENTRY] === 'function') {
        entry = exported[ENTRY];
      } else if (typeof exported === 'function') {
        entry = exported;
      }
    }
    if (typeof entry !== 'function') {
      emit({ ok: false, kind: 'runtime', error: "function '" + ENTRY + "' is not defined" });
    } else {
      let value = await entry(...args);
      if (value === undefined) {
        value = null;
      }
      emit({ ok: true, value: value });
    }
  } catch (err) {
    emit({ ok: false, kind: 'runtime', error: describe(err) });
  }
  process.exit(0);
}

main();
"#;
