//! File resource - recursive filesystem tree reconciliation
//!
//! A `File` declares one node and, for directories, its complete list of
//! children. Applying it converges the whole subtree: wrong node types are
//! removed and recreated, undeclared children are pruned, and mode and
//! ownership are fixed up afterwards.

mod apply;
mod load;
mod plan;
mod spec;

use declarative::merge::{merge_option, merge_option_by};
use declarative::{
    Error, FileType, MergeConflict, NodeType, PERMISSION_BITS, Resource, Result, Session, Shape,
    SingleResource,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

pub use plan::{Op, plan};

/// A file, directory, link or special node at an absolute path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "spec::FileSpec", into = "spec::FileSpec")]
pub struct File {
    /// Absolute, lexically clean path
    pub path: String,
    pub absent: bool,
    /// Node shape; `None` only for absent files and bare prototypes
    pub kind: Option<FileKind>,
    /// Permission bits (not applicable to symlinks)
    pub mode: Option<u32>,
    pub uid: Option<u32>,
    /// Owner name, resolved to `uid` before apply
    pub user: Option<String>,
    pub gid: Option<u32>,
    /// Group name, resolved to `gid` before apply
    pub group: Option<String>,
}

/// The shape of a present file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileKind {
    Socket,
    /// Link target
    Symlink(String),
    /// Contents; `None` accepts any contents
    RegularFile(Option<Content>),
    BlockDevice(Device),
    /// Complete list of children
    Directory(Vec<File>),
    CharDevice(Device),
    Fifo,
}

impl FileKind {
    /// Shape name as used in manifests.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Socket => "socket",
            Self::Symlink(_) => "symbolic_link",
            Self::RegularFile(_) => "regular_file",
            Self::BlockDevice(_) => "block_device",
            Self::Directory(_) => "directory",
            Self::CharDevice(_) => "char_device",
            Self::Fifo => "fifo",
        }
    }

    pub fn file_type(&self) -> FileType {
        match self {
            Self::Socket => FileType::Socket,
            Self::Symlink(_) => FileType::Symlink,
            Self::RegularFile(_) => FileType::Regular,
            Self::BlockDevice(_) => FileType::BlockDevice,
            Self::Directory(_) => FileType::Directory,
            Self::CharDevice(_) => FileType::CharDevice,
            Self::Fifo => FileType::Fifo,
        }
    }

    /// Node type and device number for shapes created with `mknod`.
    pub fn node(&self) -> Option<(NodeType, u64)> {
        match self {
            Self::Socket => Some((NodeType::Socket, 0)),
            Self::Fifo => Some((NodeType::Fifo, 0)),
            Self::BlockDevice(device) => Some((NodeType::BlockDevice, device.rdev())),
            Self::CharDevice(device) => Some((NodeType::CharDevice, device.rdev())),
            Self::Symlink(_) | Self::RegularFile(_) | Self::Directory(_) => None,
        }
    }
}

/// Major/minor device numbers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Device {
    pub major: u32,
    pub minor: u32,
}

impl Device {
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Encode as a Linux `dev_t`.
    pub fn rdev(self) -> u64 {
        let major = u64::from(self.major);
        let minor = u64::from(self.minor);
        ((major & 0xffff_f000) << 32)
            | ((major & 0x0000_0fff) << 8)
            | ((minor & 0xffff_ff00) << 12)
            | (minor & 0x0000_00ff)
    }

    /// Decode a Linux `dev_t`.
    pub fn from_rdev(rdev: u64) -> Self {
        let major = ((rdev >> 32) & 0xffff_f000) | ((rdev >> 8) & 0x0000_0fff);
        let minor = ((rdev >> 12) & 0xffff_ff00) | (rdev & 0x0000_00ff);
        Self {
            major: major as u32,
            minor: minor as u32,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.major, self.minor)
    }
}

/// Regular file contents, compared byte-wise.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Content(pub Vec<u8>);

impl Content {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Contents as text, if they are valid UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Self(text.as_bytes().to_vec())
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_text() {
            Some(text) => write!(f, "{text:?}"),
            None => write!(f, "<{} bytes>", self.0.len()),
        }
    }
}

fn invalid(path: &str, field: &str, message: impl Into<String>) -> Error {
    Error::validation(File::TYPE_NAME, path, field, message)
}

/// Whether `path` is absolute and lexically clean.
pub fn is_clean_path(path: &str) -> bool {
    if path == "/" {
        return true;
    }
    match path.strip_prefix('/') {
        Some(rest) => rest
            .split('/')
            .all(|part| !part.is_empty() && part != "." && part != ".."),
        None => false,
    }
}

fn render_mode(mode: &u32) -> String {
    format!("{mode:#o}")
}

impl File {
    /// A regular file with the given contents.
    pub fn regular(path: &str, contents: &str) -> Self {
        Self {
            kind: Some(FileKind::RegularFile(Some(Content::from(contents)))),
            ..Self::named(path)
        }
    }

    /// A directory with the given children.
    pub fn directory(path: &str, children: Vec<Self>) -> Self {
        Self {
            kind: Some(FileKind::Directory(children)),
            ..Self::named(path)
        }
    }

    /// A symbolic link to `target`.
    pub fn symlink(path: &str, target: &str) -> Self {
        Self {
            kind: Some(FileKind::Symlink(target.to_string())),
            ..Self::named(path)
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    #[must_use]
    pub fn with_owner(mut self, uid: u32, gid: u32) -> Self {
        self.uid = Some(uid);
        self.gid = Some(gid);
        self
    }

    pub fn children(&self) -> &[Self] {
        match &self.kind {
            Some(FileKind::Directory(children)) => children,
            _ => &[],
        }
    }

    fn has_attributes(&self) -> bool {
        self.mode.is_some()
            || self.uid.is_some()
            || self.user.is_some()
            || self.gid.is_some()
            || self.group.is_some()
    }

    fn validate_ids(&self) -> Result<()> {
        if self.uid.is_some() && self.user.is_some() {
            return Err(invalid(&self.path, "user", "uid and user are mutually exclusive"));
        }
        if self.gid.is_some() && self.group.is_some() {
            return Err(invalid(&self.path, "group", "gid and group are mutually exclusive"));
        }
        if self.user.as_deref() == Some("") {
            return Err(invalid(&self.path, "user", "must not be empty"));
        }
        if self.group.as_deref() == Some("") {
            return Err(invalid(&self.path, "group", "must not be empty"));
        }
        Ok(())
    }

    fn validate_children(&self, children: &[Self]) -> Result<()> {
        let mut seen = BTreeSet::new();
        for child in children {
            if Path::new(&child.path).parent() != Some(Path::new(&self.path)) {
                return Err(invalid(
                    &self.path,
                    "directory",
                    format!("{:?} is not a direct child", child.path),
                ));
            }
            if !seen.insert(child.path.as_str()) {
                return Err(invalid(
                    &self.path,
                    "directory",
                    format!("{:?} is declared twice", child.path),
                ));
            }
            child.validate()?;
        }
        Ok(())
    }

    /// Whether `current` holds exactly the present children of `target`,
    /// each satisfying its declaration, and none of the absent ones.
    fn children_satisfy(current: &[Self], target: &[Self]) -> bool {
        let live: BTreeMap<&str, &Self> = current
            .iter()
            .filter(|c| !c.absent)
            .map(|c| (c.path.as_str(), c))
            .collect();
        if live.len() != target.iter().filter(|t| !t.absent).count() {
            return false;
        }
        target.iter().all(|t| match live.get(t.path.as_str()) {
            Some(c) => !t.absent && c.satisfies(t),
            None => t.absent,
        })
    }

    fn kind_satisfies(current: &FileKind, target: &FileKind) -> bool {
        match (current, target) {
            (FileKind::Socket, FileKind::Socket) | (FileKind::Fifo, FileKind::Fifo) => true,
            (FileKind::Symlink(c), FileKind::Symlink(t)) => c == t,
            (FileKind::RegularFile(c), FileKind::RegularFile(t)) => t.is_none() || c == t,
            (FileKind::BlockDevice(c), FileKind::BlockDevice(t))
            | (FileKind::CharDevice(c), FileKind::CharDevice(t)) => c == t,
            (FileKind::Directory(c), FileKind::Directory(t)) => Self::children_satisfy(c, t),
            _ => false,
        }
    }

    fn merge_kind(
        left: &FileKind,
        right: &FileKind,
    ) -> std::result::Result<FileKind, MergeConflict> {
        match (left, right) {
            (FileKind::RegularFile(l), FileKind::RegularFile(r)) => Ok(FileKind::RegularFile(
                merge_option_by("regular_file", l, r, |c| format!("{c:?}"))?,
            )),
            (FileKind::Directory(l), FileKind::Directory(r)) => {
                let mut merged: Vec<Self> = l.clone();
                for child in r {
                    match merged.iter_mut().find(|m| m.path == child.path) {
                        Some(existing) => {
                            *existing = existing
                                .merge(child)
                                .map_err(|c| c.within(&format!("directory[{}]", child.path)))?;
                        }
                        None => merged.push(child.clone()),
                    }
                }
                Ok(FileKind::Directory(merged))
            }
            (l, r) if l == r => Ok(l.clone()),
            (l, r) if l.name() == r.name() => Err(MergeConflict::new(
                l.name(),
                format!("{l:?}"),
                format!("{r:?}"),
            )),
            (l, r) => Err(MergeConflict::new("kind", l.name(), r.name())),
        }
    }
}

impl Resource for File {
    const TYPE_NAME: &'static str = "file";
    const ID_FIELD: &'static str = "path";
    const SHAPE: Shape = Shape::Single;
    const SAMPLE_ID: &'static str = "/etc/motd";

    fn id(&self) -> &str {
        &self.path
    }

    fn is_absent(&self) -> bool {
        self.absent
    }

    fn named(id: &str) -> Self {
        Self {
            path: id.to_string(),
            ..Self::default()
        }
    }

    fn absent(id: &str) -> Self {
        Self {
            absent: true,
            ..Self::named(id)
        }
    }

    fn validate(&self) -> Result<()> {
        if !is_clean_path(&self.path) {
            return Err(invalid(
                &self.path,
                "path",
                "must be absolute and lexically clean",
            ));
        }

        if self.absent {
            if let Some(kind) = &self.kind {
                return Err(invalid(&self.path, kind.name(), "must not be set when absent"));
            }
            if self.has_attributes() {
                return Err(invalid(
                    &self.path,
                    "absent",
                    "mode, owner and group must not be set when absent",
                ));
            }
            return Ok(());
        }

        let Some(kind) = &self.kind else {
            return Err(invalid(&self.path, "kind", "exactly one file shape must be set"));
        };

        if let Some(mode) = self.mode {
            if matches!(kind, FileKind::Symlink(_)) {
                return Err(invalid(&self.path, "mode", "not supported for symbolic links"));
            }
            if mode & !PERMISSION_BITS != 0 {
                return Err(invalid(
                    &self.path,
                    "mode",
                    format!("{mode:#o} has bits outside {PERMISSION_BITS:#o}"),
                ));
            }
        }

        self.validate_ids()?;

        match kind {
            FileKind::Symlink(target) if target.is_empty() => {
                Err(invalid(&self.path, "symbolic_link", "target must not be empty"))
            }
            FileKind::Directory(children) => self.validate_children(children),
            _ => Ok(()),
        }
    }

    /// Attributes unset in `target` are wildcards; directory children must
    /// match one to one.
    fn satisfies(&self, target: &Self) -> bool {
        if target.absent {
            return self.absent;
        }
        if self.absent {
            return target.kind.is_none() && !target.has_attributes();
        }

        if let Some(kind) = &target.kind {
            match &self.kind {
                Some(current) if Self::kind_satisfies(current, kind) => {}
                _ => return false,
            }
        }

        let matches = |target: Option<u32>, current: Option<u32>| target.is_none() || target == current;
        matches(target.mode, self.mode)
            && matches(target.uid, self.uid)
            && matches(target.gid, self.gid)
            && (target.user.is_none() || target.user == self.user)
            && (target.group.is_none() || target.group == self.group)
    }

    fn merge(&self, other: &Self) -> std::result::Result<Self, MergeConflict> {
        if self.absent != other.absent {
            return Err(MergeConflict::new(
                "absent",
                self.absent.to_string(),
                other.absent.to_string(),
            ));
        }

        let kind = match (&self.kind, &other.kind) {
            (Some(l), Some(r)) => Some(Self::merge_kind(l, r)?),
            (Some(k), None) | (None, Some(k)) => Some(k.clone()),
            (None, None) => None,
        };

        Ok(Self {
            path: self.path.clone(),
            absent: self.absent,
            kind,
            mode: merge_option_by("mode", &self.mode, &other.mode, render_mode)?,
            uid: merge_option("uid", &self.uid, &other.uid)?,
            user: merge_option("user", &self.user, &other.user)?,
            gid: merge_option("gid", &self.gid, &other.gid)?,
            group: merge_option("group", &self.group, &other.group)?,
        })
    }
}

impl SingleResource for File {
    fn load(&self, session: &Session<'_>) -> Result<Self> {
        load::load_path(session, &self.path)
    }

    /// Resolve owner and group names to ids, recursively.
    ///
    /// Present files without an owner or group default to 0.
    fn resolve(&mut self, session: &Session<'_>) -> Result<()> {
        if self.absent {
            return Ok(());
        }
        if let Some(FileKind::Directory(children)) = &mut self.kind {
            for child in children.iter_mut() {
                child.resolve(session)?;
            }
        }

        if let Some(user) = self.user.take() {
            self.uid = Some(session.lookup_user(&user)?);
        }
        if let Some(group) = self.group.take() {
            self.gid = Some(session.lookup_group(&group)?);
        }
        self.uid.get_or_insert(0);
        self.gid.get_or_insert(0);
        Ok(())
    }

    fn apply(&self, session: &Session<'_>) -> Result<()> {
        apply::apply(session, self)
    }
}
