//! Language runners
//!
//! A [`Runner`] knows how to check, wrap and launch code for one language.
//! Nothing outside this module branches on the language name: the rest of
//! the engine goes through the registry and the trait.

pub mod javascript;
pub mod python;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::RuntimeConfig;
use crate::judge::cancel::CancelSignal;
use crate::judge::harness::{self, Harness, RunReport};
use crate::judge::sandbox::{ExecutionOutcome, LaunchSpec, Sandbox};
use crate::judge::{ExecutionLimits, JudgeError};
use crate::models::EntryPoint;

pub use javascript::JavaScriptRunner;
pub use python::PythonRunner;

/// Checked submission, ready to be wrapped in harnesses
#[derive(Debug, Clone)]
pub struct Artifact {
    pub language: &'static str,
    /// Name of the source file inside the workspace
    pub file_name: &'static str,
    pub source: Arc<str>,
}

impl Artifact {
    pub fn new(language: &'static str, file_name: &'static str, source: &str) -> Self {
        Self {
            language,
            file_name,
            source: Arc::from(source),
        }
    }
}

/// Why a submission could not be prepared
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PrepareError {
    /// The submission itself is invalid
    #[error("{0}")]
    Compilation(String),

    #[error("cancelled before the submission was checked")]
    Cancelled,

    /// The checker could not run
    #[error("{0}")]
    Internal(String),
}

#[async_trait]
pub trait Runner: Send + Sync {
    /// Canonical language name
    fn language(&self) -> &'static str;

    /// Other names accepted for this language
    fn aliases(&self) -> &'static [&'static str] {
        &[]
    }

    /// Syntax-check the source and produce an artifact
    async fn prepare(
        &self,
        source: &str,
        sandbox: &Sandbox,
        limits: &ExecutionLimits,
        cancel: CancelSignal,
    ) -> Result<Artifact, PrepareError>;

    /// Harness that calls `entry` once with `input`
    fn harness(&self, artifact: &Artifact, entry: &EntryPoint, input: &Value) -> Harness;

    /// Process that runs `harness`
    fn invocation_command(
        &self,
        artifact: &Artifact,
        harness: &Harness,
        limits: &ExecutionLimits,
    ) -> LaunchSpec;

    fn parse_output(&self, harness: &Harness, outcome: ExecutionOutcome) -> RunReport {
        harness::interpret(outcome, &harness.tag)
    }
}

/// Runners by language name and alias
#[derive(Clone, Default)]
pub struct RunnerRegistry {
    runners: HashMap<String, Arc<dyn Runner>>,
    languages: Vec<&'static str>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every supported language
    pub fn with_defaults(runtimes: &RuntimeConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PythonRunner::new(runtimes.python.clone())));
        registry.register(Arc::new(JavaScriptRunner::new(runtimes.javascript.clone())));
        registry
    }

    pub fn register(&mut self, runner: Arc<dyn Runner>) {
        let language = runner.language();
        self.languages.push(language);
        for name in std::iter::once(language).chain(runner.aliases().iter().copied()) {
            self.runners.insert(name.to_ascii_lowercase(), runner.clone());
        }
    }

    /// Look up a runner by name or alias, ignoring case
    pub fn resolve(&self, language: &str) -> Result<Arc<dyn Runner>, JudgeError> {
        self.runners
            .get(&language.trim().to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| JudgeError::UnsupportedLanguage(language.to_string()))
    }

    /// Canonical names of the registered languages
    pub fn languages(&self) -> &[&'static str] {
        &self.languages
    }
}

impl std::fmt::Debug for RunnerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerRegistry")
            .field("languages", &self.languages)
            .finish()
    }
}

/// Run a syntax check; a non-zero exit means the source is invalid
pub(crate) async fn run_check(
    sandbox: &Sandbox,
    spec: &LaunchSpec,
    limits: &ExecutionLimits,
    cancel: CancelSignal,
) -> Result<(), PrepareError> {
    match sandbox.run(spec, limits.check_time_limit, cancel).await {
        ExecutionOutcome::Completed(output) if output.success() => Ok(()),
        ExecutionOutcome::Completed(output) => {
            Err(PrepareError::Compilation(harness::describe_exit(&output)))
        }
        ExecutionOutcome::TimedOut { .. } => {
            Err(PrepareError::Internal("syntax check timed out".to_string()))
        }
        ExecutionOutcome::Cancelled { .. } => Err(PrepareError::Cancelled),
        ExecutionOutcome::SpawnFailed(reason) => Err(PrepareError::Internal(reason)),
    }
}
