//! Host capability contract
//!
//! Resources never touch the machine directly. Everything they read or
//! change goes through a [`Host`], which lets the same reconcilers run
//! against the local machine, a remote agent, or an in-memory fake.

use std::io;
use std::path::{Path, PathBuf};

use crate::types::{Command, CommandOutput};

/// File type bit mask in `st_mode`.
pub const S_IFMT: u32 = 0o170_000;
pub const S_IFSOCK: u32 = 0o140_000;
pub const S_IFLNK: u32 = 0o120_000;
pub const S_IFREG: u32 = 0o100_000;
pub const S_IFBLK: u32 = 0o060_000;
pub const S_IFDIR: u32 = 0o040_000;
pub const S_IFCHR: u32 = 0o020_000;
pub const S_IFIFO: u32 = 0o010_000;

/// Permission bits (including setuid, setgid and sticky).
pub const PERMISSION_BITS: u32 = 0o7777;

/// Type of a filesystem node as reported by `lstat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Socket,
    Symlink,
    Regular,
    BlockDevice,
    Directory,
    CharDevice,
    Fifo,
}

impl FileType {
    /// Classify a raw `st_mode`.
    pub fn from_mode(mode: u32) -> Option<Self> {
        match mode & S_IFMT {
            S_IFSOCK => Some(Self::Socket),
            S_IFLNK => Some(Self::Symlink),
            S_IFREG => Some(Self::Regular),
            S_IFBLK => Some(Self::BlockDevice),
            S_IFDIR => Some(Self::Directory),
            S_IFCHR => Some(Self::CharDevice),
            S_IFIFO => Some(Self::Fifo),
            _ => None,
        }
    }

    /// The `st_mode` type bits for this file type.
    pub fn type_bits(self) -> u32 {
        match self {
            Self::Socket => S_IFSOCK,
            Self::Symlink => S_IFLNK,
            Self::Regular => S_IFREG,
            Self::BlockDevice => S_IFBLK,
            Self::Directory => S_IFDIR,
            Self::CharDevice => S_IFCHR,
            Self::Fifo => S_IFIFO,
        }
    }
}

/// Special node kinds created with `mknod`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Socket,
    BlockDevice,
    CharDevice,
    Fifo,
}

impl NodeType {
    /// The matching [`FileType`].
    pub fn file_type(self) -> FileType {
        match self {
            Self::Socket => FileType::Socket,
            Self::BlockDevice => FileType::BlockDevice,
            Self::CharDevice => FileType::CharDevice,
            Self::Fifo => FileType::Fifo,
        }
    }
}

/// Result of `lstat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileStat {
    /// Raw `st_mode` (type bits and permission bits)
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    /// Device number for block and character devices
    pub rdev: u64,
    pub size: u64,
}

impl FileStat {
    /// The node type, if it is one we know.
    pub fn file_type(&self) -> Option<FileType> {
        FileType::from_mode(self.mode)
    }

    /// Permission bits only.
    pub fn permissions(&self) -> u32 {
        self.mode & PERMISSION_BITS
    }
}

/// Operations a reconciler may perform on a host.
///
/// All methods take `&self` so a single host can be shared by concurrent
/// tasks. Implementations report non-existence with
/// [`io::ErrorKind::NotFound`] and removal of a non-empty directory with
/// [`io::ErrorKind::DirectoryNotEmpty`]; callers rely on both.
pub trait Host: Send + Sync {
    /// Stat a path without following a final symlink.
    fn lstat(&self, path: &Path) -> io::Result<FileStat>;

    /// Read a whole regular file.
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Create or truncate a regular file with `contents`.
    fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Names of the entries of a directory, excluding `.` and `..`.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<String>>;

    /// Target of a symbolic link.
    fn read_link(&self, path: &Path) -> io::Result<PathBuf>;

    /// Create a symbolic link at `path` pointing to `target`.
    fn symlink(&self, target: &Path, path: &Path) -> io::Result<()>;

    /// Create a special node.
    fn mknod(&self, path: &Path, node: NodeType, rdev: u64) -> io::Result<()>;

    /// Create a single directory.
    fn mkdir(&self, path: &Path) -> io::Result<()>;

    /// Remove a single node; directories must be empty.
    fn remove(&self, path: &Path) -> io::Result<()>;

    /// Set permission bits.
    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()>;

    /// Set ownership, following symlinks.
    fn chown(&self, path: &Path, uid: u32, gid: u32) -> io::Result<()>;

    /// Set ownership of the node itself, not following symlinks.
    fn lchown(&self, path: &Path, uid: u32, gid: u32) -> io::Result<()>;

    /// Look up a user id by name.
    fn lookup_user(&self, name: &str) -> io::Result<Option<u32>>;

    /// Look up a group id by name.
    fn lookup_group(&self, name: &str) -> io::Result<Option<u32>>;

    /// Run a process to completion.
    fn run(&self, command: &Command) -> io::Result<CommandOutput>;
}
