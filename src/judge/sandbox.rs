//! Sandboxed process executor
//!
//! Every run gets a fresh workspace directory, a cleared environment, its own
//! process group and kernel resource limits. With namespace isolation (the
//! default) the run also gets its own user, mount, PID and network namespaces
//! and sees only the workspace plus read-only runtimes; see [`isolation`].
//! The deadline is enforced here by killing the whole group, so a run always
//! ends within `deadline` plus a short pipe-drain grace period, whatever the
//! child does.
//!
//! [`isolation`]: crate::judge::isolation

use std::io;
use std::os::unix::fs::{PermissionsExt, chown};
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant, SystemTime};

use nix::sched::{CloneFlags, unshare};
use nix::sys::resource::{Resource, setrlimit};
use nix::sys::signal::{Signal, killpg};
use nix::unistd::{Pid, getgid, getuid};
use tempfile::TempDir;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::config::{SandboxConfig, SandboxIsolation};
use crate::constants::{PIPE_DRAIN_GRACE_MS, WORKSPACE_PREFIX};
use crate::judge::cancel::CancelSignal;
use crate::judge::isolation::{Plan, WORK_DIR};
use crate::judge::metrics;

/// Holds the run's files; bound at `/work` when isolated
const WORK_SUBDIR: &str = "work";
/// Mount point of the isolated root
const ROOT_SUBDIR: &str = "root";

/// File placed into the workspace before the process starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceFile {
    pub name: String,
    pub contents: String,
}

impl WorkspaceFile {
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }
}

/// Everything needed to start one sandboxed process
#[derive(Debug, Clone, Default)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Extra environment on top of the sandbox `PATH`
    pub env: Vec<(String, String)>,
    pub files: Vec<WorkspaceFile>,
    /// `RLIMIT_AS` ceiling, if the runtime tolerates one
    pub address_space_limit_bytes: Option<u64>,
}

/// Output of a process that exited on its own
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
    /// Either stream exceeded the capture limit
    pub truncated: bool,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Result of one sandboxed run; the sandbox never returns an error
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    Completed(ProcessOutput),
    TimedOut { elapsed: Duration },
    Cancelled { elapsed: Duration },
    SpawnFailed(String),
}

impl ExecutionOutcome {
    pub fn elapsed(&self) -> Duration {
        match self {
            Self::Completed(output) => output.elapsed,
            Self::TimedOut { elapsed } | Self::Cancelled { elapsed } => *elapsed,
            Self::SpawnFailed(_) => Duration::ZERO,
        }
    }
}

/// The host cannot create the sandbox namespaces
#[derive(Debug, thiserror::Error)]
#[error("namespace isolation is unavailable: {0}")]
pub struct IsolationUnavailable(pub String);

/// Kernel limits applied in the child between fork and exec
#[derive(Debug, Clone, Copy)]
struct ResourceLimits {
    address_space_bytes: Option<u64>,
    cpu_secs: u64,
    file_size_bytes: u64,
    max_processes: Option<u64>,
    /// Network-only isolation for runs without the full namespace set
    unshare_network: bool,
}

impl ResourceLimits {
    fn apply(&self) -> io::Result<()> {
        if self.unshare_network {
            unshare(CloneFlags::CLONE_NEWUSER | CloneFlags::CLONE_NEWNET)?;
        }
        if let Some(bytes) = self.address_space_bytes {
            setrlimit(Resource::RLIMIT_AS, bytes, bytes)?;
        }
        setrlimit(Resource::RLIMIT_CPU, self.cpu_secs, self.cpu_secs + 1)?;
        setrlimit(Resource::RLIMIT_FSIZE, self.file_size_bytes, self.file_size_bytes)?;
        setrlimit(Resource::RLIMIT_CORE, 0, 0)?;
        if let Some(count) = self.max_processes {
            setrlimit(Resource::RLIMIT_NPROC, count, count)?;
        }
        Ok(())
    }
}

/// Statistics from a workspace purge
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub dirs_scanned: u64,
    pub dirs_deleted: u64,
    pub errors: u64,
}

#[derive(Debug, Default)]
struct Captured {
    text: String,
    truncated: bool,
}

enum Waited {
    Exited(io::Result<std::process::ExitStatus>),
    TimedOut,
    Cancelled,
}

/// Process sandbox
#[derive(Debug, Clone)]
pub struct Sandbox {
    config: SandboxConfig,
}

impl Sandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    fn isolated(&self) -> bool {
        self.config.isolation == SandboxIsolation::Namespaces
    }

    /// Start one trivial isolated run, so a host without user namespaces is
    /// caught at startup instead of failing every submission
    pub async fn verify_isolation(&self) -> Result<(), IsolationUnavailable> {
        if !self.isolated() {
            return Ok(());
        }
        let spec = LaunchSpec {
            program: "true".to_string(),
            ..LaunchSpec::default()
        };
        match self.run(&spec, Duration::from_secs(10), CancelSignal::never()).await {
            ExecutionOutcome::Completed(output) if output.success() => Ok(()),
            ExecutionOutcome::Completed(output) => Err(IsolationUnavailable(format!(
                "test run exited with {:?}: {}",
                output.exit_code,
                output.stderr.trim()
            ))),
            ExecutionOutcome::SpawnFailed(reason) => Err(IsolationUnavailable(reason)),
            other => Err(IsolationUnavailable(format!("test run did not finish: {:?}", other))),
        }
    }

    /// Run one process to completion, deadline or cancellation
    pub async fn run(
        &self,
        spec: &LaunchSpec,
        deadline: Duration,
        mut cancel: CancelSignal,
    ) -> ExecutionOutcome {
        if cancel.is_cancelled() {
            return ExecutionOutcome::Cancelled {
                elapsed: Duration::ZERO,
            };
        }

        let workspace = match self.create_workspace(spec).await {
            Ok(workspace) => workspace,
            Err(e) => {
                tracing::error!(error = %e, "Failed to prepare sandbox workspace");
                metrics::SPAWN_FAILURES.inc();
                return ExecutionOutcome::SpawnFailed(format!("workspace setup failed: {}", e));
            }
        };

        let outcome = self.execute(spec, workspace.path(), deadline, &mut cancel).await;
        close_workspace(workspace).await;
        outcome
    }

    async fn create_workspace(&self, spec: &LaunchSpec) -> io::Result<TempDir> {
        fs::create_dir_all(&self.config.workspace_root).await?;
        // Created 0700
        let workspace = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(&self.config.workspace_root)?;
        let work = workspace.path().join(WORK_SUBDIR);
        fs::create_dir(&work).await?;
        fs::set_permissions(&work, std::fs::Permissions::from_mode(0o700)).await?;
        fs::create_dir(workspace.path().join(ROOT_SUBDIR)).await?;

        for file in &spec.files {
            fs::write(work.join(&file.name), &file.contents).await?;
        }

        // Owned by the run uid, still private to it
        let (uid, gid) = (self.config.run_as_uid, self.config.run_as_gid);
        if uid.is_some() || gid.is_some() {
            chown(workspace.path(), uid, gid)?;
            chown(&work, uid, gid)?;
            chown(workspace.path().join(ROOT_SUBDIR), uid, gid)?;
            for file in &spec.files {
                chown(work.join(&file.name), uid, gid)?;
            }
        }

        Ok(workspace)
    }

    fn isolation_plan(&self, spec: &LaunchSpec, workspace: &Path) -> io::Result<Plan> {
        let mut read_only = self.config.read_only_paths.clone();
        read_only.extend(runtime_dir(&spec.program));
        Plan::new(
            &workspace.join(WORK_SUBDIR),
            &workspace.join(ROOT_SUBDIR),
            &read_only,
            self.config.isolate_network,
            self.config.run_as_uid.unwrap_or_else(|| getuid().as_raw()),
            self.config.run_as_gid.unwrap_or_else(|| getgid().as_raw()),
        )
    }

    async fn execute(
        &self,
        spec: &LaunchSpec,
        workspace: &Path,
        deadline: Duration,
        cancel: &mut CancelSignal,
    ) -> ExecutionOutcome {
        let isolated = self.isolated();
        let plan = if isolated {
            match self.isolation_plan(spec, workspace) {
                Ok(plan) => Some(plan),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to plan sandbox isolation");
                    metrics::SPAWN_FAILURES.inc();
                    return ExecutionOutcome::SpawnFailed(format!(
                        "isolation setup failed: {}",
                        e
                    ));
                }
            }
        } else {
            None
        };

        let limits = ResourceLimits {
            address_space_bytes: spec.address_space_limit_bytes,
            cpu_secs: deadline.as_secs() + 1,
            file_size_bytes: self.config.output_limit_bytes,
            max_processes: self
                .config
                .max_processes
                .filter(|_| isolated || self.config.run_as_uid.is_some()),
            unshare_network: !isolated && self.config.isolate_network,
        };

        let workdir = workspace.join(WORK_SUBDIR);
        let home = if isolated { PathBuf::from(WORK_DIR) } else { workdir.clone() };

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .current_dir(&workdir)
            .env_clear()
            .env("PATH", &self.config.path_env)
            .env("HOME", &home)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);
        if let Some(uid) = self.config.run_as_uid {
            command.uid(uid);
        }
        if let Some(gid) = self.config.run_as_gid {
            command.gid(gid);
        }
        // SAFETY: the closure only issues syscalls and does not allocate; the
        // plan was built before the fork.
        unsafe {
            command.pre_exec(move || {
                if let Some(plan) = &plan {
                    plan.enter()?;
                }
                limits.apply()
            });
        }

        let started = Instant::now();
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(
                    program = %spec.program,
                    error = %e,
                    "Failed to spawn sandboxed process"
                );
                metrics::SPAWN_FAILURES.inc();
                return ExecutionOutcome::SpawnFailed(format!(
                    "failed to start {}: {}",
                    spec.program, e
                ));
            }
        };

        let group = child.id().and_then(|pid| i32::try_from(pid).ok()).map(Pid::from_raw);
        let limit = self.config.output_limit_bytes;
        let mut stdout_task = tokio::spawn(read_bounded(child.stdout.take(), limit));
        let mut stderr_task = tokio::spawn(read_bounded(child.stderr.take(), limit));

        let waited = tokio::select! {
            status = child.wait() => Waited::Exited(status),
            _ = tokio::time::sleep(deadline) => Waited::TimedOut,
            _ = cancel.cancelled() => Waited::Cancelled,
        };
        let elapsed = started.elapsed();

        // Kills the namespace init too, which takes every descendant with it
        if let Some(group) = group {
            let _ = killpg(group, Signal::SIGKILL);
        }
        if !matches!(waited, Waited::Exited(_)) {
            let _ = child.kill().await;
        }

        let grace = Duration::from_millis(PIPE_DRAIN_GRACE_MS);
        let stdout = collect(&mut stdout_task, grace).await;
        let stderr = collect(&mut stderr_task, grace).await;

        match waited {
            Waited::Exited(Ok(status)) => ExecutionOutcome::Completed(ProcessOutput {
                exit_code: status.code(),
                signal: status.signal(),
                truncated: stdout.truncated || stderr.truncated,
                stdout: stdout.text,
                stderr: stderr.text,
                elapsed,
            }),
            Waited::Exited(Err(e)) => ExecutionOutcome::SpawnFailed(format!(
                "failed to wait for {}: {}",
                spec.program, e
            )),
            Waited::TimedOut => ExecutionOutcome::TimedOut { elapsed },
            Waited::Cancelled => ExecutionOutcome::Cancelled { elapsed },
        }
    }

    /// Remove workspaces left behind by a previous process
    pub async fn purge_stale_workspaces(&self) -> CleanupStats {
        let mut stats = CleanupStats::default();
        let root = &self.config.workspace_root;
        let max_age = Duration::from_secs(self.config.stale_workspace_secs);

        let mut entries = match fs::read_dir(root).await {
            Ok(entries) => entries,
            Err(_) => {
                tracing::debug!("Workspace root does not exist, skipping purge");
                return stats;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Error reading workspace entry: {}", e);
                    stats.errors += 1;
                    break;
                }
            };

            let name = entry.file_name();
            if !name.to_string_lossy().starts_with(WORKSPACE_PREFIX) {
                continue;
            }
            stats.dirs_scanned += 1;

            let age = entry
                .metadata()
                .await
                .and_then(|m| m.modified())
                .ok()
                .map(|modified| SystemTime::now().duration_since(modified).unwrap_or_default());
            if !age.is_some_and(|age| age >= max_age) {
                continue;
            }

            match fs::remove_dir_all(entry.path()).await {
                Ok(()) => {
                    stats.dirs_deleted += 1;
                    tracing::info!("Deleted stale workspace: {:?}", entry.path());
                }
                Err(e) => {
                    tracing::error!("Failed to delete {:?}: {}", entry.path(), e);
                    stats.errors += 1;
                }
            }
        }

        tracing::info!(
            "Workspace purge complete: {} of {} dirs deleted",
            stats.dirs_deleted,
            stats.dirs_scanned
        );
        stats
    }
}

/// Installation directory of an interpreter given by absolute path, e.g.
/// `/opt/python` for `/opt/python/bin/python3`
fn runtime_dir(program: &str) -> Option<PathBuf> {
    let path = Path::new(program);
    if !path.is_absolute() {
        return None;
    }
    let resolved = std::fs::canonicalize(path).ok()?;
    let dir = resolved.parent()?.parent()?;
    dir.parent().map(|_| dir.to_path_buf())
}

/// Read a stream to EOF, keeping at most `limit` bytes
async fn read_bounded<R: AsyncRead + Unpin>(
    reader: Option<R>,
    limit: u64,
) -> io::Result<Captured> {
    let Some(mut reader) = reader else {
        return Ok(Captured::default());
    };

    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 8192];
    let mut truncated = false;

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        let room = limit.saturating_sub(buffer.len());
        if n > room {
            truncated = true;
        }
        buffer.extend_from_slice(&chunk[..n.min(room)]);
    }

    Ok(Captured {
        text: String::from_utf8_lossy(&buffer).into_owned(),
        truncated,
    })
}

async fn collect(task: &mut JoinHandle<io::Result<Captured>>, grace: Duration) -> Captured {
    match tokio::time::timeout(grace, &mut *task).await {
        Ok(Ok(Ok(captured))) => captured,
        Ok(Ok(Err(e))) => {
            tracing::warn!("Failed to read sandbox output: {}", e);
            Captured::default()
        }
        Ok(Err(e)) => {
            tracing::warn!("Output reader task failed: {}", e);
            Captured::default()
        }
        Err(_) => {
            task.abort();
            Captured::default()
        }
    }
}

async fn close_workspace(workspace: TempDir) {
    let path = workspace.path().to_path_buf();
    match tokio::task::spawn_blocking(move || workspace.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("Failed to cleanup workspace {:?}: {}", path, e),
        Err(e) => tracing::warn!("Workspace cleanup task failed for {:?}: {}", path, e),
    }
}
