//! Application configuration management
//!
//! This module handles loading and validating configuration from environment variables.
//! All configuration is loaded at startup and validated before the application runs.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::constants::{
    self, DEFAULT_JUDGE_WORKERS, DEFAULT_LOG_FILTER, DEFAULT_MAX_PROCESSES,
    DEFAULT_MAX_SOURCE_BYTES, DEFAULT_OUTPUT_LIMIT_BYTES, DEFAULT_PREPARE_TIME_LIMIT_MS,
    DEFAULT_PROBLEMS_FILE, DEFAULT_READ_ONLY_PATHS, DEFAULT_SANDBOX_PATH, DEFAULT_SERVER_HOST,
    DEFAULT_SERVER_PORT, DEFAULT_STALE_WORKSPACE_SECS, DEFAULT_WORKSPACE_ROOT,
};

/// Global application configuration (lazily initialized)
pub static CONFIG: LazyLock<Config> = LazyLock::new(|| {
    Config::from_env().expect("Failed to load configuration from environment")
});

/// Main application configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub judge: JudgeConfig,
    pub sandbox: SandboxConfig,
    pub runtimes: RuntimeConfig,
    pub storage: StorageConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub rust_log: String,
    /// Emit JSON log lines instead of the human-readable format
    pub json_logs: bool,
}

/// Judging behaviour
#[derive(Debug, Clone)]
pub struct JudgeConfig {
    /// Concurrent sandbox runs per evaluation
    pub workers: usize,
    /// Largest accepted source file
    pub max_source_bytes: usize,
    /// Deadline for the syntax check of a submission
    pub prepare_time_limit_ms: u64,
    /// What a second submit on a submitted session does
    pub resubmission: ResubmissionPolicy,
    /// Cancel in-flight runs when the exam time runs out mid-evaluation
    pub cancel_on_expiry: bool,
}

/// Resubmission policy for sessions that are already submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResubmissionPolicy {
    /// A submitted session is terminal
    #[default]
    Reject,
    /// An unexpired submitted session may be re-judged; the latest score wins
    Overwrite,
}

impl FromStr for ResubmissionPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "overwrite" => Ok(Self::Overwrite),
            _ => Err(ConfigError::InvalidValue("RESUBMISSION_POLICY".to_string())),
        }
    }
}

/// How sandboxed runs are separated from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SandboxIsolation {
    /// Fresh user, mount, PID and IPC namespaces over a read-only root
    #[default]
    Namespaces,
    /// Process group and rlimits only; runs see the host filesystem
    Disabled,
}

impl FromStr for SandboxIsolation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "namespaces" => Ok(Self::Namespaces),
            "none" | "disabled" => Ok(Self::Disabled),
            _ => Err(ConfigError::InvalidValue("SANDBOX_ISOLATION".to_string())),
        }
    }
}

/// Sandbox execution configuration
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Parent directory of per-run workspaces
    pub workspace_root: PathBuf,
    /// Captured bytes per output stream
    pub output_limit_bytes: u64,
    /// `PATH` inside the sandbox
    pub path_env: String,
    pub isolation: SandboxIsolation,
    /// Host paths visible read-only inside an isolated run
    pub read_only_paths: Vec<PathBuf>,
    /// Give each run an empty network namespace
    pub isolate_network: bool,
    /// Unprivileged uid/gid for children (requires running as root)
    pub run_as_uid: Option<u32>,
    pub run_as_gid: Option<u32>,
    /// `RLIMIT_NPROC` for children. Without isolation it is only applied
    /// under `run_as_uid`, since the count covers every process of the uid.
    pub max_processes: Option<u64>,
    /// Age after which leftover workspaces are purged
    pub stale_workspace_secs: u64,
}

/// Interpreter invocation for one language
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    pub program: String,
    /// Argument template; `{file}` and `{memory_mb}` are substituted per run
    pub args: Vec<String>,
}

impl CommandTemplate {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Render the argument template for one invocation
    pub fn render(&self, file: &str, memory_mb: u64) -> Vec<String> {
        let memory_mb = memory_mb.to_string();
        self.args
            .iter()
            .map(|arg| arg.replace("{memory_mb}", &memory_mb).replace("{file}", file))
            .collect()
    }
}

/// Language runtimes
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub python: CommandTemplate,
    pub javascript: CommandTemplate,
}

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub problems_file: PathBuf,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            server: ServerConfig::from_env()?,
            judge: JudgeConfig::from_env()?,
            sandbox: SandboxConfig::from_env()?,
            runtimes: RuntimeConfig::from_env()?,
            storage: StorageConfig::from_env()?,
        })
    }
}

impl ServerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
            port: parse_var("SERVER_PORT", DEFAULT_SERVER_PORT)?,
            rust_log: env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string()),
            json_logs: env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")),
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SERVER_HOST.to_string(),
            port: DEFAULT_SERVER_PORT,
            rust_log: DEFAULT_LOG_FILTER.to_string(),
            json_logs: false,
        }
    }
}

impl JudgeConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let workers: usize = parse_var("JUDGE_WORKERS", DEFAULT_JUDGE_WORKERS)?;
        if workers == 0 {
            return Err(ConfigError::InvalidValue("JUDGE_WORKERS".to_string()));
        }

        Ok(Self {
            workers,
            max_source_bytes: parse_var("MAX_SOURCE_BYTES", DEFAULT_MAX_SOURCE_BYTES)?,
            prepare_time_limit_ms: parse_var(
                "PREPARE_TIME_LIMIT_MS",
                DEFAULT_PREPARE_TIME_LIMIT_MS,
            )?,
            resubmission: match env::var("RESUBMISSION_POLICY") {
                Ok(value) => value.parse()?,
                Err(_) => ResubmissionPolicy::default(),
            },
            cancel_on_expiry: parse_var("JUDGE_CANCEL_ON_EXPIRY", true)?,
        })
    }
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_JUDGE_WORKERS,
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
            prepare_time_limit_ms: DEFAULT_PREPARE_TIME_LIMIT_MS,
            resubmission: ResubmissionPolicy::default(),
            cancel_on_expiry: true,
        }
    }
}

impl SandboxConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            workspace_root: PathBuf::from(
                env::var("SANDBOX_WORKSPACE_ROOT")
                    .unwrap_or_else(|_| DEFAULT_WORKSPACE_ROOT.to_string()),
            ),
            output_limit_bytes: parse_var(
                "SANDBOX_OUTPUT_LIMIT_BYTES",
                DEFAULT_OUTPUT_LIMIT_BYTES,
            )?,
            path_env: env::var("SANDBOX_PATH")
                .unwrap_or_else(|_| DEFAULT_SANDBOX_PATH.to_string()),
            isolation: match env::var("SANDBOX_ISOLATION") {
                Ok(value) => value.parse()?,
                Err(_) => SandboxIsolation::default(),
            },
            read_only_paths: match env::var("SANDBOX_READ_ONLY_PATHS") {
                Ok(value) => env::split_paths(&value).collect(),
                Err(_) => default_read_only_paths(),
            },
            isolate_network: parse_var("SANDBOX_ISOLATE_NETWORK", true)?,
            run_as_uid: parse_optional_var("SANDBOX_UID")?,
            run_as_gid: parse_optional_var("SANDBOX_GID")?,
            // 0 lifts the limit
            max_processes: Some(parse_var("SANDBOX_MAX_PROCESSES", DEFAULT_MAX_PROCESSES)?)
                .filter(|&count| count > 0),
            stale_workspace_secs: parse_var(
                "SANDBOX_STALE_WORKSPACE_SECS",
                DEFAULT_STALE_WORKSPACE_SECS,
            )?,
        })
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from(DEFAULT_WORKSPACE_ROOT),
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
            path_env: DEFAULT_SANDBOX_PATH.to_string(),
            isolation: SandboxIsolation::default(),
            read_only_paths: default_read_only_paths(),
            isolate_network: true,
            run_as_uid: None,
            run_as_gid: None,
            max_processes: Some(DEFAULT_MAX_PROCESSES),
            stale_workspace_secs: DEFAULT_STALE_WORKSPACE_SECS,
        }
    }
}

fn default_read_only_paths() -> Vec<PathBuf> {
    DEFAULT_READ_ONLY_PATHS.iter().map(PathBuf::from).collect()
}

impl RuntimeConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            python: template_from_env("PYTHON_BIN", "PYTHON_ARGS", defaults.python),
            javascript: template_from_env("NODE_BIN", "NODE_ARGS", defaults.javascript),
        })
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            python: CommandTemplate::new(
                constants::runtimes::PYTHON_BIN,
                constants::runtimes::PYTHON_ARGS,
            ),
            javascript: CommandTemplate::new(
                constants::runtimes::NODE_BIN,
                constants::runtimes::NODE_ARGS,
            ),
        }
    }
}

impl StorageConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            problems_file: PathBuf::from(
                env::var("PROBLEMS_FILE").unwrap_or_else(|_| DEFAULT_PROBLEMS_FILE.to_string()),
            ),
        })
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            problems_file: PathBuf::from(DEFAULT_PROBLEMS_FILE),
        }
    }
}

fn parse_var<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        Err(_) => Ok(default),
    }
}

fn parse_optional_var<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        _ => Ok(None),
    }
}

fn template_from_env(bin_key: &str, args_key: &str, default: CommandTemplate) -> CommandTemplate {
    CommandTemplate {
        program: env::var(bin_key).unwrap_or(default.program),
        args: env::var(args_key)
            .map(|v| v.split_whitespace().map(str::to_string).collect())
            .unwrap_or(default.args),
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.judge.workers, DEFAULT_JUDGE_WORKERS);
        assert_eq!(config.judge.resubmission, ResubmissionPolicy::Reject);
        assert!(config.judge.cancel_on_expiry);
    }

    #[test]
    fn test_resubmission_policy_parse() {
        assert_eq!("reject".parse::<ResubmissionPolicy>().unwrap(), ResubmissionPolicy::Reject);
        assert_eq!(
            " Overwrite ".parse::<ResubmissionPolicy>().unwrap(),
            ResubmissionPolicy::Overwrite
        );
        assert!("sometimes".parse::<ResubmissionPolicy>().is_err());
    }

    #[test]
    fn test_sandbox_isolates_by_default() {
        let sandbox = SandboxConfig::default();
        assert_eq!(sandbox.isolation, SandboxIsolation::Namespaces);
        assert!(sandbox.isolate_network);
        assert_eq!(sandbox.max_processes, Some(DEFAULT_MAX_PROCESSES));
        assert!(sandbox.read_only_paths.contains(&PathBuf::from("/usr")));
        let exposes = |prefix: &str| sandbox.read_only_paths.iter().any(|p| p.starts_with(prefix));
        assert!(!exposes("/home") && !exposes("/tmp"));

        assert_eq!("none".parse::<SandboxIsolation>().unwrap(), SandboxIsolation::Disabled);
        assert!("chroot".parse::<SandboxIsolation>().is_err());
    }

    #[test]
    fn test_command_template_render() {
        let node = RuntimeConfig::default().javascript;
        assert_eq!(
            node.render("harness.js", 128),
            vec!["--max-old-space-size=128".to_string(), "harness.js".to_string()]
        );

        let python = RuntimeConfig::default().python;
        assert_eq!(python.render("harness.py", 64).last().map(String::as_str), Some("harness.py"));
    }
}
