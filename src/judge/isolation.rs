//! Namespace isolation for sandboxed runs
//!
//! The spawned process becomes a relay: it unshares user, mount, PID and IPC
//! namespaces (plus network, when configured) and forks the namespace init.
//! The init builds a fresh root on a tmpfs with read-only binds of the host
//! runtimes and the workspace at `/work`, then forks the program. The init
//! reports the program's status to the relay and exits, and the kernel kills
//! whatever is left in the PID namespace. Nothing a run starts outlives it,
//! whatever session or process group it moves to.
//!
//! Everything the child side needs is built by [`Plan::new`] in the parent;
//! between fork and exec only syscalls are issued.

use std::collections::BTreeSet;
use std::ffi::{CStr, CString};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::{Component, Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::{AT_FDCWD, OFlag, open};
use nix::mount::{MntFlags, MsFlags, mount, umount2};
use nix::sched::{CloneFlags, unshare};
use nix::sys::prctl;
use nix::sys::resource::{Resource, getrlimit, setrlimit};
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::stat::Mode;
use nix::sys::statvfs::{FsFlags, statvfs};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, chdir, fork, mkdir, pipe, pivot_root, symlinkat};

/// Working directory of the program inside the namespace
pub const WORK_DIR: &str = "/work";

/// uid and gid of the program inside the namespace. Not 0, so exec drops
/// every capability the namespace grants.
const INNER_ID: u32 = 1000;

const DEVICES: &[&str] = &["/dev/null", "/dev/zero", "/dev/random", "/dev/urandom"];

const ROOT_TMPFS: &CStr = c"size=1m,mode=0755";
const TMP_TMPFS: &CStr = c"size=64m,mode=1777";

const STATUS_EXITED: u8 = 0;
const STATUS_SIGNALED: u8 = 1;
/// Exit code of the relay when the init died without reporting
const STATUS_LOST: u8 = 255;

const NONE: Option<&'static CStr> = None;

/// Namespace setup for one run, prepared before the fork
#[derive(Debug)]
pub struct Plan {
    flags: CloneFlags,
    uid_map: String,
    gid_map: String,
    /// Host directory the tmpfs root is mounted on
    root: CString,
    /// Directories to create in the new root, parents first
    dirs: Vec<CString>,
    /// Empty files to create as bind targets
    files: Vec<CString>,
    /// (link contents, link path)
    links: Vec<(CString, CString)>,
    /// (host source, target) pairs, bound read-only
    read_only: Vec<(CString, CString)>,
    devices: Vec<(CString, CString)>,
    workspace: (CString, CString),
    tmp: CString,
    proc: CString,
}

impl Plan {
    /// * `workdir` - host directory bound read-write at [`WORK_DIR`]
    /// * `mount_root` - empty host directory for the tmpfs root
    /// * `read_only` - host paths exposed read-only; missing ones are skipped
    /// * `outer_uid`, `outer_gid` - ids the child runs as on the host
    pub fn new(
        workdir: &Path,
        mount_root: &Path,
        read_only: &[PathBuf],
        isolate_network: bool,
        outer_uid: u32,
        outer_gid: u32,
    ) -> io::Result<Self> {
        let mut flags = CloneFlags::CLONE_NEWUSER
            | CloneFlags::CLONE_NEWNS
            | CloneFlags::CLONE_NEWPID
            | CloneFlags::CLONE_NEWIPC;
        if isolate_network {
            flags |= CloneFlags::CLONE_NEWNET;
        }

        let mut dirs = BTreeSet::new();
        let mut files = Vec::new();
        let mut links = Vec::new();
        let mut binds = Vec::new();

        for source in exposed_paths(read_only) {
            let Ok(meta) = std::fs::symlink_metadata(&source) else {
                continue;
            };
            let target = inside(mount_root, &source);
            add_ancestors(&mut dirs, mount_root, &target);
            if meta.file_type().is_symlink() {
                links.push((c_path(&std::fs::read_link(&source)?)?, c_path(&target)?));
                continue;
            }
            if meta.is_dir() {
                dirs.insert(target.clone());
            } else {
                files.push(c_path(&target)?);
            }
            binds.push((c_path(&source)?, c_path(&target)?));
        }

        let mut devices = Vec::new();
        for device in DEVICES.iter().map(Path::new).filter(|d| d.exists()) {
            let target = inside(mount_root, device);
            add_ancestors(&mut dirs, mount_root, &target);
            files.push(c_path(&target)?);
            devices.push((c_path(device)?, c_path(&target)?));
        }

        let work = inside(mount_root, Path::new(WORK_DIR));
        let tmp = mount_root.join("tmp");
        let proc = mount_root.join("proc");
        for dir in [&work, &tmp, &proc] {
            dirs.insert(dir.clone());
        }

        Ok(Self {
            flags,
            uid_map: format!("{} {} 1\n", INNER_ID, outer_uid),
            gid_map: format!("{} {} 1\n", INNER_ID, outer_gid),
            root: c_path(mount_root)?,
            dirs: dirs.iter().map(|d| c_path(d)).collect::<io::Result<_>>()?,
            files,
            links,
            read_only: binds,
            devices,
            workspace: (c_path(workdir)?, c_path(&work)?),
            tmp: c_path(&tmp)?,
            proc: c_path(&proc)?,
        })
    }

    /// Enter the namespaces. Called between fork and exec; returns only in
    /// the program process, the relay and the init never return.
    pub fn enter(&self) -> io::Result<()> {
        setrlimit(Resource::RLIMIT_CORE, 0, 0)?;
        unshare(self.flags)?;
        match write_proc("/proc/self/setgroups", b"deny") {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            other => other?,
        }
        write_proc("/proc/self/uid_map", self.uid_map.as_bytes())?;
        write_proc("/proc/self/gid_map", self.gid_map.as_bytes())?;

        let (status_read, status_write) = pipe()?;
        // SAFETY: the forked child of a spawn is single-threaded
        match unsafe { fork() }? {
            ForkResult::Parent { .. } => {
                drop(status_write);
                relay(status_read)
            }
            ForkResult::Child => drop(status_read),
        }

        // PID 1 of the new namespace from here on
        prctl::set_pdeathsig(Signal::SIGKILL)?;
        self.build_root()?;

        // SAFETY: as above
        match unsafe { fork() }? {
            ForkResult::Parent { child } => reap(child, status_write),
            ForkResult::Child => drop(status_write),
        }
        prctl::set_no_new_privs()?;
        Ok(())
    }

    fn build_root(&self) -> io::Result<()> {
        mount(NONE, c"/", NONE, MsFlags::MS_REC | MsFlags::MS_PRIVATE, NONE)?;
        mount(
            Some(c"tmpfs"),
            self.root.as_c_str(),
            Some(c"tmpfs"),
            MsFlags::MS_NOSUID | MsFlags::MS_NODEV,
            Some(ROOT_TMPFS),
        )?;

        let mode = Mode::from_bits_truncate(0o755);
        for dir in &self.dirs {
            mkdir(dir.as_c_str(), mode)?;
        }
        for file in &self.files {
            let flags = OFlag::O_CREAT | OFlag::O_WRONLY | OFlag::O_CLOEXEC;
            drop(open(file.as_c_str(), flags, Mode::from_bits_truncate(0o644))?);
        }
        for (contents, link) in &self.links {
            symlinkat(contents.as_c_str(), AT_FDCWD, link.as_c_str())?;
        }
        for (source, target) in &self.read_only {
            bind(source, target, MsFlags::MS_REC)?;
            remount_read_only(target)?;
        }
        for (source, target) in &self.devices {
            bind(source, target, MsFlags::empty())?;
        }
        bind(&self.workspace.0, &self.workspace.1, MsFlags::empty())?;
        mount(
            Some(c"tmpfs"),
            self.tmp.as_c_str(),
            Some(c"tmpfs"),
            MsFlags::MS_NOSUID | MsFlags::MS_NODEV,
            Some(TMP_TMPFS),
        )?;
        // Refused where the host masks parts of its own /proc
        let _ = mount(
            Some(c"proc"),
            self.proc.as_c_str(),
            Some(c"proc"),
            MsFlags::MS_NOSUID | MsFlags::MS_NODEV | MsFlags::MS_NOEXEC,
            NONE,
        );

        chdir(self.root.as_c_str())?;
        pivot_root(c".", c".")?;
        umount2(c".", MntFlags::MNT_DETACH)?;
        mount(
            NONE,
            c"/",
            NONE,
            MsFlags::MS_REMOUNT
                | MsFlags::MS_BIND
                | MsFlags::MS_RDONLY
                | MsFlags::MS_NOSUID
                | MsFlags::MS_NODEV,
            NONE,
        )?;
        chdir(c"/work")?;
        Ok(())
    }
}

/// Configured paths that can be exposed, dropping any already covered by
/// another entry
fn exposed_paths(read_only: &[PathBuf]) -> Vec<PathBuf> {
    let mut candidates: Vec<&PathBuf> = read_only
        .iter()
        .filter(|p| p.is_absolute() && p.parent().is_some())
        .filter(|p| !p.components().any(|c| c == Component::ParentDir))
        .collect();
    candidates.sort();

    let mut kept: Vec<PathBuf> = Vec::new();
    for path in candidates {
        if !kept.iter().any(|k| path.starts_with(k)) {
            kept.push(path.clone());
        }
    }
    kept
}

/// Where a host path lands under the new root
fn inside(root: &Path, path: &Path) -> PathBuf {
    let relative: PathBuf = path
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect();
    root.join(relative)
}

fn add_ancestors(dirs: &mut BTreeSet<PathBuf>, root: &Path, target: &Path) {
    let mut current = target.parent();
    while let Some(dir) = current {
        if dir == root || !dir.starts_with(root) {
            break;
        }
        dirs.insert(dir.to_path_buf());
        current = dir.parent();
    }
}

fn c_path(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte"))
}

fn write_proc(path: &str, contents: &[u8]) -> io::Result<()> {
    OpenOptions::new().write(true).open(path)?.write_all(contents)
}

fn bind(source: &CStr, target: &CStr, extra: MsFlags) -> io::Result<()> {
    mount(Some(source), target, NONE, MsFlags::MS_BIND | extra, NONE)?;
    Ok(())
}

/// Remount a bind read-only, carrying over the flags the host may have
/// locked on the source mount
fn remount_read_only(target: &CStr) -> io::Result<()> {
    let current = statvfs(target)?.flags();
    let mut flags = MsFlags::MS_REMOUNT
        | MsFlags::MS_BIND
        | MsFlags::MS_RDONLY
        | MsFlags::MS_NOSUID
        | MsFlags::MS_NODEV;
    for (host, remount) in [
        (FsFlags::ST_NOEXEC, MsFlags::MS_NOEXEC),
        (FsFlags::ST_NOATIME, MsFlags::MS_NOATIME),
        (FsFlags::ST_NODIRATIME, MsFlags::MS_NODIRATIME),
    ] {
        if current.contains(host) {
            flags |= remount;
        }
    }
    mount(NONE, target, NONE, flags, NONE)?;
    Ok(())
}

/// Close every descriptor but `keep`. The processes that never exec would
/// otherwise hold the spawn error pipe and other runs' output pipes open.
fn close_fds_except(keep: RawFd) {
    let keep = keep as libc::c_uint;
    // SAFETY: closing descriptors owned by this single-threaded child
    let closed = unsafe {
        (keep == 0 || libc::syscall(libc::SYS_close_range, 0 as libc::c_uint, keep - 1, 0) == 0)
            && libc::syscall(libc::SYS_close_range, keep + 1, libc::c_uint::MAX, 0) == 0
    };
    if closed {
        return;
    }
    let max = getrlimit(Resource::RLIMIT_NOFILE).map_or(1024, |(soft, _)| soft.min(65536));
    for fd in 0..max as libc::c_uint {
        if fd != keep {
            // SAFETY: as above
            unsafe { libc::close(fd as RawFd) };
        }
    }
}

/// Relay: wait for the init's report and exit the same way the program did
fn relay(status: OwnedFd) -> ! {
    close_fds_except(status.as_raw_fd());

    let mut report = [0u8; 2];
    let mut filled = 0;
    while filled < report.len() {
        match nix::unistd::read(&status, &mut report[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(Errno::EINTR) => continue,
            Err(_) => break,
        }
    }

    match (filled == report.len(), report) {
        (true, [STATUS_SIGNALED, number]) => {
            if let Ok(sig) = Signal::try_from(i32::from(number)) {
                // SAFETY: restores the default action in a single-threaded child
                let _ = unsafe { signal::signal(sig, SigHandler::SigDfl) };
                let _ = signal::raise(sig);
            }
            exit(128 + i32::from(number))
        }
        (true, [_, code]) => exit(i32::from(code)),
        (false, _) => exit(i32::from(STATUS_LOST)),
    }
}

/// Init: reap until the program exits, then report its status
fn reap(program: Pid, status: OwnedFd) -> ! {
    close_fds_except(status.as_raw_fd());

    let report = loop {
        match waitpid(None::<Pid>, None) {
            Ok(WaitStatus::Exited(pid, code)) if pid == program => {
                break [STATUS_EXITED, code as u8];
            }
            Ok(WaitStatus::Signaled(pid, sig, _)) if pid == program => {
                break [STATUS_SIGNALED, sig as i32 as u8];
            }
            Ok(_) | Err(Errno::EINTR) => continue,
            Err(_) => break [STATUS_EXITED, STATUS_LOST],
        }
    };
    let _ = nix::unistd::write(&status, &report);
    exit(0)
}

fn exit(code: i32) -> ! {
    // SAFETY: `_exit` skips atexit handlers and stdio flushing, which belong
    // to the parent's copy of this address space
    unsafe { libc::_exit(code) }
}
