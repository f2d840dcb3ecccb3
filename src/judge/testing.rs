//! Shell-script runner used by engine and service tests
//!
//! Each test case input is a shell snippet; whatever it prints becomes the
//! returned value. Only `sh` is needed, so these tests run anywhere.

use std::path::Path;
use std::sync::OnceLock;

use async_trait::async_trait;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::config::{SandboxConfig, SandboxIsolation};
use crate::judge::ExecutionLimits;
use crate::judge::cancel::CancelSignal;
use crate::judge::harness::{self, Harness};
use crate::judge::languages::{Artifact, PrepareError, Runner};
use crate::judge::sandbox::{LaunchSpec, Sandbox, WorkspaceFile};
use crate::models::{EntryPoint, TestCase};

pub struct ScriptRunner;

#[async_trait]
impl Runner for ScriptRunner {
    fn language(&self) -> &'static str {
        "script"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["sh"]
    }

    async fn prepare(
        &self,
        source: &str,
        _sandbox: &Sandbox,
        _limits: &ExecutionLimits,
        _cancel: CancelSignal,
    ) -> Result<Artifact, PrepareError> {
        if source.contains("syntax error") {
            return Err(PrepareError::Compilation("syntax error near line 1".to_string()));
        }
        Ok(Artifact::new("script", "solution.sh", source))
    }

    fn harness(&self, artifact: &Artifact, entry: &EntryPoint, input: &Value) -> Harness {
        let tag = harness::harness_tag(artifact.language, &artifact.source, entry, input);
        let script = input.as_str().unwrap_or("exit 97");
        let text = format!(
            "set -e\nvalue=$({})\nprintf '\\n%s{{\"ok\":true,\"value\":%s}}\\n' '{}' \"$value\"\n",
            script,
            harness::result_marker(&tag)
        );
        Harness {
            file_name: "harness.sh".to_string(),
            text,
            tag,
        }
    }

    fn invocation_command(
        &self,
        _artifact: &Artifact,
        harness: &Harness,
        _limits: &ExecutionLimits,
    ) -> LaunchSpec {
        LaunchSpec {
            program: "sh".to_string(),
            args: vec![harness.file_name.clone()],
            files: vec![WorkspaceFile::new(harness.file_name.clone(), harness.text.clone())],
            ..LaunchSpec::default()
        }
    }
}

/// Test case whose input is a shell snippet
pub fn script_case(order: i32, script: &str, expected: i64) -> TestCase {
    TestCase {
        id: Uuid::new_v4(),
        problem_id: Uuid::nil(),
        name: format!("case {}", order),
        input: Value::String(script.to_string()),
        expected_output: json!(expected),
        is_hidden: false,
        points: 1,
        order,
    }
}

/// Whether this host can create the sandbox namespaces. Checked once per
/// test binary, on its own runtime.
pub fn isolation_available() -> bool {
    static AVAILABLE: OnceLock<bool> = OnceLock::new();
    *AVAILABLE.get_or_init(|| {
        std::thread::spawn(|| {
            let root = tempfile::tempdir().unwrap();
            let sandbox = Sandbox::new(SandboxConfig {
                workspace_root: root.path().to_path_buf(),
                ..SandboxConfig::default()
            });
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            match runtime.block_on(sandbox.verify_isolation()) {
                Ok(()) => true,
                Err(e) => {
                    eprintln!("sandbox tests run without isolation: {}", e);
                    false
                }
            }
        })
        .join()
        .unwrap_or(false)
    })
}

/// Sandbox configuration rooted at `root`, isolated where the host allows it
pub fn sandbox_config(root: &Path) -> SandboxConfig {
    let mut config = SandboxConfig {
        workspace_root: root.to_path_buf(),
        ..SandboxConfig::default()
    };
    if !isolation_available() {
        config.isolation = SandboxIsolation::Disabled;
        config.isolate_network = false;
    }
    config
}
