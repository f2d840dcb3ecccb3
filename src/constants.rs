//! Application-wide constants
//!
//! This module contains all constant values used throughout the application.
//! Constants are grouped by their purpose for better organization.

// =============================================================================
// SERVER DEFAULTS
// =============================================================================

/// Default server host address
pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";

/// Default server port
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Default tracing filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "examjudge=debug,tower_http=info";

/// Maximum accepted request body (source code plus JSON framing)
pub const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024;

// =============================================================================
// JUDGE DEFAULTS
// =============================================================================

/// Default number of concurrent sandbox workers per evaluation
pub const DEFAULT_JUDGE_WORKERS: usize = 4;

/// Maximum source code size in bytes
pub const DEFAULT_MAX_SOURCE_BYTES: usize = 64 * 1024;

/// Hard cap on submitted code in a request, in characters
pub const MAX_CODE_LENGTH: u64 = 1024 * 1024;

/// Longest accepted language name or alias in a request
pub const MAX_LANGUAGE_LENGTH: u64 = 32;

/// Longest accepted user or contest reference
pub const MAX_REFERENCE_LENGTH: u64 = 128;

/// Deadline for the syntax check that produces an artifact
pub const DEFAULT_PREPARE_TIME_LIMIT_MS: u64 = 10_000;

/// Per-test execution deadline when a problem does not declare one
pub const DEFAULT_TIME_LIMIT_MS: u64 = 10_000;

/// Memory ceiling when a problem does not declare one
pub const DEFAULT_MEMORY_LIMIT_MB: u64 = 256;

/// Exam duration when a problem does not declare one (5 minutes)
pub const DEFAULT_EXAM_DURATION_SECS: u64 = 300;

/// Points for a test case that does not declare a weight
pub const DEFAULT_TEST_CASE_POINTS: u32 = 1;

// =============================================================================
// SANDBOX DEFAULTS
// =============================================================================

/// Root directory for per-run workspaces
pub const DEFAULT_WORKSPACE_ROOT: &str = "/tmp/examjudge";

/// Prefix of every per-run workspace directory
pub const WORKSPACE_PREFIX: &str = "run-";

/// Captured bytes per stream (stdout, stderr)
pub const DEFAULT_OUTPUT_LIMIT_BYTES: u64 = 1024 * 1024;

/// `PATH` handed to sandboxed processes
pub const DEFAULT_SANDBOX_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Host paths a sandboxed run can read: interpreters and their libraries
pub const DEFAULT_READ_ONLY_PATHS: &[&str] = &["/usr", "/bin", "/lib", "/lib64", "/etc"];

/// `RLIMIT_NPROC` for sandboxed runs
pub const DEFAULT_MAX_PROCESSES: u64 = 64;

/// Workspaces older than this are purged at startup
pub const DEFAULT_STALE_WORKSPACE_SECS: u64 = 3600;

/// Grace period for draining pipes after the process group is killed
pub const PIPE_DRAIN_GRACE_MS: u64 = 500;

/// Characters of stderr kept in runtime error messages
pub const ERROR_MESSAGE_MAX_CHARS: usize = 2000;

// =============================================================================
// STORAGE DEFAULTS
// =============================================================================

/// Default problem catalogue location
pub const DEFAULT_PROBLEMS_FILE: &str = "data/problems.json";

// =============================================================================
// SUPPORTED LANGUAGES
// =============================================================================

/// Language identifiers
pub mod languages {
    pub const PYTHON: &str = "python";
    pub const JAVASCRIPT: &str = "javascript";

    /// All supported language identifiers
    pub const ALL: &[&str] = &[PYTHON, JAVASCRIPT];
}

/// Default interpreter invocations
pub mod runtimes {
    pub const PYTHON_BIN: &str = "python3";
    pub const PYTHON_ARGS: &[&str] = &["-I", "-B", "{file}"];
    pub const NODE_BIN: &str = "node";
    pub const NODE_ARGS: &[&str] = &["--max-old-space-size={memory_mb}", "{file}"];
}
