//! The machine keel runs on
//!
//! [`LocalHost`] implements [`Host`] with `std::fs`, the Unix extensions of
//! std, and libc for the calls std does not cover (`mknod`, passwd and group
//! lookups). Commands run as child processes that are polled, so cancelling
//! the token kills whatever is in flight.

use declarative::{CancelToken, Command, CommandOutput, ExitStatus, FileStat, Host, NodeType};
use std::ffi::CString;
use std::fs;
use std::io::{self, Read, Write};
use std::mem::MaybeUninit;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Interval between checks of a running child.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Permission bits of freshly created special nodes, before any chmod.
const NODE_PERMISSIONS: u32 = 0o644;

const LOOKUP_BUFFER: usize = 1024;
const LOOKUP_BUFFER_MAX: usize = 1 << 20;

/// The local machine.
#[derive(Debug, Clone, Default)]
pub struct LocalHost {
    cancel: CancelToken,
}

impl LocalHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill running commands once `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn wait(&self, child: &mut Child) -> io::Result<std::process::ExitStatus> {
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if self.cancel.is_cancelled() {
                log::warn!("killing pid {} after cancellation", child.id());
                child.kill()?;
                child.wait()?;
                return Err(io::Error::new(io::ErrorKind::Interrupted, "cancelled"));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

fn c_path(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

fn c_name(name: &str) -> io::Result<CString> {
    CString::new(name).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

/// Call a reentrant lookup, growing the buffer while it reports `ERANGE`.
fn with_lookup_buffer<F>(mut lookup: F) -> io::Result<Option<u32>>
where
    F: FnMut(&mut [libc::c_char]) -> std::result::Result<Option<u32>, libc::c_int>,
{
    let mut buffer: Vec<libc::c_char> = vec![0; LOOKUP_BUFFER];
    loop {
        match lookup(&mut buffer) {
            Ok(id) => return Ok(id),
            Err(libc::ERANGE) if buffer.len() < LOOKUP_BUFFER_MAX => {
                let grown = buffer.len() * 2;
                buffer.resize(grown, 0);
            }
            // "not found" is reported several ways depending on the libc
            Err(libc::ENOENT | libc::ESRCH) => return Ok(None),
            Err(code) => return Err(io::Error::from_raw_os_error(code)),
        }
    }
}

fn lookup_uid(name: &str) -> io::Result<Option<u32>> {
    let name = c_name(name)?;
    with_lookup_buffer(|buffer| {
        let mut entry = MaybeUninit::<libc::passwd>::uninit();
        let mut found: *mut libc::passwd = std::ptr::null_mut();
        // SAFETY: every pointer is valid for the duration of the call and
        // `buffer.len()` is the real length of `buffer`. `found` is only read
        // when the call reports success.
        let code = unsafe {
            libc::getpwnam_r(
                name.as_ptr(),
                entry.as_mut_ptr(),
                buffer.as_mut_ptr(),
                buffer.len(),
                &raw mut found,
            )
        };
        if code != 0 {
            return Err(code);
        }
        // SAFETY: a non-null result points at `entry`, which is initialised
        if found.is_null() {
            Ok(None)
        } else {
            Ok(Some(unsafe { (*found).pw_uid }))
        }
    })
}

fn lookup_gid(name: &str) -> io::Result<Option<u32>> {
    let name = c_name(name)?;
    with_lookup_buffer(|buffer| {
        let mut entry = MaybeUninit::<libc::group>::uninit();
        let mut found: *mut libc::group = std::ptr::null_mut();
        // SAFETY: as in lookup_uid
        let code = unsafe {
            libc::getgrnam_r(
                name.as_ptr(),
                entry.as_mut_ptr(),
                buffer.as_mut_ptr(),
                buffer.len(),
                &raw mut found,
            )
        };
        if code != 0 {
            return Err(code);
        }
        // SAFETY: a non-null result points at `entry`, which is initialised
        if found.is_null() {
            Ok(None)
        } else {
            Ok(Some(unsafe { (*found).gr_gid }))
        }
    })
}

fn drain<R: Read + Send + 'static>(source: Option<R>) -> JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut collected = Vec::new();
        if let Some(mut source) = source {
            source.read_to_end(&mut collected)?;
        }
        Ok(collected)
    })
}

fn joined(handle: JoinHandle<io::Result<Vec<u8>>>) -> io::Result<Vec<u8>> {
    handle
        .join()
        .map_err(|_| io::Error::other("output reader panicked"))?
}

fn exit_status(status: std::process::ExitStatus) -> ExitStatus {
    match (status.code(), status.signal()) {
        (Some(code), _) => ExitStatus::Exited(code),
        (None, Some(signal)) => ExitStatus::Terminated(format!("signal {signal}")),
        (None, None) => ExitStatus::Terminated(status.to_string()),
    }
}

impl Host for LocalHost {
    fn lstat(&self, path: &Path) -> io::Result<FileStat> {
        let meta = fs::symlink_metadata(path)?;
        Ok(FileStat {
            mode: meta.mode(),
            uid: meta.uid(),
            gid: meta.gid(),
            rdev: meta.rdev(),
            size: meta.size(),
        })
    }

    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        fs::write(path, contents)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<String>> {
        fs::read_dir(path)?
            .map(|entry| Ok(entry?.file_name().to_string_lossy().into_owned()))
            .collect()
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        fs::read_link(path)
    }

    fn symlink(&self, target: &Path, path: &Path) -> io::Result<()> {
        std::os::unix::fs::symlink(target, path)
    }

    fn mknod(&self, path: &Path, node: NodeType, rdev: u64) -> io::Result<()> {
        let path = c_path(path)?;
        let mode = node.file_type().type_bits() | NODE_PERMISSIONS;
        // SAFETY: `path` is a valid NUL-terminated string for the call
        let code = unsafe { libc::mknod(path.as_ptr(), mode as libc::mode_t, rdev as libc::dev_t) };
        if code != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn mkdir(&self, path: &Path) -> io::Result<()> {
        fs::create_dir(path)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        if fs::symlink_metadata(path)?.is_dir() {
            fs::remove_dir(path)
        } else {
            fs::remove_file(path)
        }
    }

    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()> {
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
    }

    fn chown(&self, path: &Path, uid: u32, gid: u32) -> io::Result<()> {
        std::os::unix::fs::chown(path, Some(uid), Some(gid))
    }

    fn lchown(&self, path: &Path, uid: u32, gid: u32) -> io::Result<()> {
        std::os::unix::fs::lchown(path, Some(uid), Some(gid))
    }

    fn lookup_user(&self, name: &str) -> io::Result<Option<u32>> {
        lookup_uid(name)
    }

    fn lookup_group(&self, name: &str) -> io::Result<Option<u32>> {
        lookup_gid(name)
    }

    fn run(&self, command: &Command) -> io::Result<CommandOutput> {
        let mut child = std::process::Command::new(&command.program)
            .args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k, v)))
            .stdin(if command.stdin.is_empty() {
                Stdio::null()
            } else {
                Stdio::piped()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let writer = child.stdin.take().map(|mut stdin| {
            let input = command.stdin.clone();
            // a child that exits early closes the pipe; that is not our failure
            thread::spawn(move || {
                let _ = stdin.write_all(&input);
            })
        });
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = self.wait(&mut child)?;
        if let Some(writer) = writer {
            let _ = writer.join();
        }
        Ok(CommandOutput {
            status: exit_status(status),
            stdout: joined(stdout)?,
            stderr: joined(stderr)?,
        })
    }
}
