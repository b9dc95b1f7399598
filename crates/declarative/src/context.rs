//! Reconciliation session and cancellation
//!
//! A [`Session`] is what every Load/Resolve/Apply receives: the host to act
//! on, a cancellation token, and the width of concurrent fan-out. Its helper
//! methods wrap raw host calls with cancellation checks and attach the
//! operation and path to I/O errors.

use log::debug;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{CommandFailure, Error, Result};
use crate::host::{FileStat, Host, NodeType};
use crate::types::{Command, CommandOutput};

/// Default number of concurrent fan-out tasks.
pub const DEFAULT_JOBS: usize = 4;

/// Shared cancellation flag.
///
/// Clones observe the same flag. Hosts that run long operations may poll it
/// to abort work in flight.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fail with [`Error::Cancelled`] once cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Outcome of removing a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Removed,
    /// Nothing existed at the path
    Missing,
    /// The directory still has entries
    NotEmpty,
}

/// Context passed to resource operations
pub struct Session<'a> {
    host: &'a dyn Host,
    cancel: CancelToken,
    jobs: usize,
}

impl<'a> Session<'a> {
    /// Create a session on `host` with a fresh cancellation token.
    pub fn new(host: &'a dyn Host) -> Self {
        Self {
            host,
            cancel: CancelToken::new(),
            jobs: DEFAULT_JOBS,
        }
    }

    /// Use an existing cancellation token.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Set the fan-out width (at least 1).
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn host(&self) -> &'a dyn Host {
        self.host
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// Stat a path; `None` when nothing exists there.
    pub fn lstat(&self, path: &Path) -> Result<Option<FileStat>> {
        self.cancel.check()?;
        match self.host.lstat(path) {
            Ok(stat) => Ok(Some(stat)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io("lstat", path, e)),
        }
    }

    pub fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        self.cancel.check()?;
        self.host
            .read_file(path)
            .map_err(|e| Error::io("read", path, e))
    }

    pub fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.cancel.check()?;
        debug!("write {} ({} bytes)", path.display(), contents.len());
        self.host
            .write_file(path, contents)
            .map_err(|e| Error::io("write", path, e))
    }

    pub fn read_dir(&self, path: &Path) -> Result<Vec<String>> {
        self.cancel.check()?;
        self.host
            .read_dir(path)
            .map_err(|e| Error::io("readdir", path, e))
    }

    pub fn read_link(&self, path: &Path) -> Result<PathBuf> {
        self.cancel.check()?;
        self.host
            .read_link(path)
            .map_err(|e| Error::io("readlink", path, e))
    }

    pub fn symlink(&self, target: &Path, path: &Path) -> Result<()> {
        self.cancel.check()?;
        debug!("symlink {} -> {}", path.display(), target.display());
        self.host
            .symlink(target, path)
            .map_err(|e| Error::io("symlink", path, e))
    }

    pub fn mknod(&self, path: &Path, node: NodeType, rdev: u64) -> Result<()> {
        self.cancel.check()?;
        debug!("mknod {} {:?} {}", path.display(), node, rdev);
        self.host
            .mknod(path, node, rdev)
            .map_err(|e| Error::io("mknod", path, e))
    }

    pub fn mkdir(&self, path: &Path) -> Result<()> {
        self.cancel.check()?;
        debug!("mkdir {}", path.display());
        self.host
            .mkdir(path)
            .map_err(|e| Error::io("mkdir", path, e))
    }

    /// Remove a single node, reporting absence and non-empty directories
    /// as outcomes rather than errors.
    pub fn remove(&self, path: &Path) -> Result<Removal> {
        self.cancel.check()?;
        debug!("remove {}", path.display());
        match self.host.remove(path) {
            Ok(()) => Ok(Removal::Removed),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Removal::Missing),
            Err(e) if e.kind() == io::ErrorKind::DirectoryNotEmpty => Ok(Removal::NotEmpty),
            Err(e) => Err(Error::io("remove", path, e)),
        }
    }

    pub fn chmod(&self, path: &Path, mode: u32) -> Result<()> {
        self.cancel.check()?;
        debug!("chmod {:o} {}", mode, path.display());
        self.host
            .chmod(path, mode)
            .map_err(|e| Error::io("chmod", path, e))
    }

    pub fn chown(&self, path: &Path, uid: u32, gid: u32) -> Result<()> {
        self.cancel.check()?;
        debug!("chown {uid}:{gid} {}", path.display());
        self.host
            .chown(path, uid, gid)
            .map_err(|e| Error::io("chown", path, e))
    }

    pub fn lchown(&self, path: &Path, uid: u32, gid: u32) -> Result<()> {
        self.cancel.check()?;
        debug!("lchown {uid}:{gid} {}", path.display());
        self.host
            .lchown(path, uid, gid)
            .map_err(|e| Error::io("lchown", path, e))
    }

    /// Resolve a user name, failing if the host does not know it.
    pub fn lookup_user(&self, name: &str) -> Result<u32> {
        self.cancel.check()?;
        self.host
            .lookup_user(name)
            .map_err(|e| Error::io("getpwnam", name, e))?
            .ok_or_else(|| Error::UnknownUser(name.to_string()))
    }

    /// Resolve a group name, failing if the host does not know it.
    pub fn lookup_group(&self, name: &str) -> Result<u32> {
        self.cancel.check()?;
        self.host
            .lookup_group(name)
            .map_err(|e| Error::io("getgrnam", name, e))?
            .ok_or_else(|| Error::UnknownGroup(name.to_string()))
    }

    /// Run a command and return its output whatever the exit status.
    pub fn run(&self, command: &Command) -> Result<CommandOutput> {
        self.cancel.check()?;
        debug!("run {command}");
        match self.host.run(command) {
            Ok(output) => Ok(output),
            Err(_) if self.cancel.is_cancelled() => Err(Error::Cancelled),
            Err(e) => Err(Error::io("exec", &command.program, e)),
        }
    }

    /// Run a command and fail unless it exits with code 0.
    pub fn run_checked(&self, command: &Command) -> Result<CommandOutput> {
        let output = self.run(command)?;
        if !output.status.success() {
            return Err(CommandFailure::new(command, &output).into());
        }
        Ok(output)
    }
}
