//! Python runner

use async_trait::async_trait;
use serde_json::Value;

use super::{Artifact, PrepareError, Runner, run_check};
use crate::config::CommandTemplate;
use crate::constants::languages;
use crate::judge::ExecutionLimits;
use crate::judge::cancel::CancelSignal;
use crate::judge::harness::{self, Harness};
use crate::judge::sandbox::{LaunchSpec, Sandbox, WorkspaceFile};
use crate::models::EntryPoint;

const SOURCE_FILE: &str = "solution.py";
const HARNESS_FILE: &str = "harness.py";

/// Compiles the file without executing it
const CHECK_SCRIPT: &str =
    "import sys; compile(open(sys.argv[1], encoding='utf-8').read(), sys.argv[1], 'exec')";

pub struct PythonRunner {
    command: CommandTemplate,
}

impl PythonRunner {
    pub fn new(command: CommandTemplate) -> Self {
        Self { command }
    }
}

#[async_trait]
impl Runner for PythonRunner {
    fn language(&self) -> &'static str {
        languages::PYTHON
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["py", "python3"]
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
            args: vec![
                "-I".to_string(),
                "-c".to_string(),
                CHECK_SCRIPT.to_string(),
                SOURCE_FILE.to_string(),
            ],
            files: vec![WorkspaceFile::new(SOURCE_FILE, source)],
            address_space_limit_bytes: Some(limits.memory_limit_bytes()),
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
            address_space_limit_bytes: Some(limits.memory_limit_bytes()),
        }
    }
}

fn render(source_file: &str, entry: &str, marker: &str, input: &Value) -> String {
    let mut text = String::from("import json, os, sys\n\n");
    text.push_str(&format!("_MARKER = {}\n", Value::String(marker.to_string())));
    text.push_str(&format!("_SOURCE = {}\n", Value::String(source_file.to_string())));
    text.push_str(&format!("_ENTRY = {}\n", Value::String(entry.to_string())));
    text.push_str(&format!("_ARGS = {}\n", harness::arguments_literal(input)));
    text.push_str(PYTHON_BODY);
    text
}

const PYTHON_BODY: &str = r#"_out = os.fdopen(os.dup(1), "w", encoding="utf-8")


def _emit(payload):
    try:
        line = json.dumps(payload, allow_nan=False)
    except (TypeError, ValueError, RecursionError) as exc:
        line = json.dumps({"ok": False, "kind": "runtime",
                           "error": "return value is not JSON serializable: %s" % exc})
    try:
        sys.stdout.flush()
    except BaseException:
        pass
    _out.write("\n" + _MARKER + line + "\n")
    _out.flush()


def _main():
    args = json.loads(_ARGS)
    namespace = {"__name__": "__solution__"}
    try:
        with open(_SOURCE, encoding="utf-8") as f:
            code = compile(f.read(), _SOURCE, "exec")
        exec(code, namespace)
        entry = namespace.get(_ENTRY)
        if not callable(entry):
            _emit({"ok": False, "kind": "runtime",
                   "error": "function '%s' is not defined" % _ENTRY})
            return
        value = entry(*args)
    except MemoryError:
        _emit({"ok": False, "kind": "memory", "error": "MemoryError"})
        return
    except BaseException as exc:
        _emit({"ok": False, "kind": "runtime",
               "error": "%s: %s" % (type(exc).__name__, exc)})
        return
    _emit({"ok": True, "value": value})


_main()
"#;
