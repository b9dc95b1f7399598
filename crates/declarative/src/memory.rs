//! In-memory host for tests
//!
//! [`MemoryHost`] keeps a filesystem tree, user and group tables, and a
//! scripted command responder. Every mutating call is appended to a journal,
//! so tests can assert exactly what a reconciler changed (or that a second
//! run changed nothing).

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::host::{FileStat, FileType, Host, NodeType, PERMISSION_BITS};
use crate::types::{Command, CommandOutput};

type Responder = Box<dyn Fn(&Command) -> CommandOutput + Send + Sync>;

/// One recorded filesystem mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    WriteFile(PathBuf),
    Mkdir(PathBuf),
    Symlink { path: PathBuf, target: PathBuf },
    Mknod { path: PathBuf, node: NodeType, rdev: u64 },
    Remove(PathBuf),
    Chmod { path: PathBuf, mode: u32 },
    Chown { path: PathBuf, uid: u32, gid: u32 },
    Lchown { path: PathBuf, uid: u32, gid: u32 },
}

#[derive(Debug, Clone)]
enum Data {
    Bytes(Vec<u8>),
    Link(PathBuf),
    Device(u64),
    Empty,
}

#[derive(Debug, Clone)]
struct Node {
    file_type: FileType,
    permissions: u32,
    uid: u32,
    gid: u32,
    data: Data,
}

impl Node {
    fn new(file_type: FileType, permissions: u32, data: Data) -> Self {
        Self {
            file_type,
            permissions,
            uid: 0,
            gid: 0,
            data,
        }
    }

    fn stat(&self) -> FileStat {
        let (rdev, size) = match &self.data {
            Data::Bytes(bytes) => (0, bytes.len() as u64),
            Data::Link(target) => (0, target.as_os_str().len() as u64),
            Data::Device(rdev) => (*rdev, 0),
            Data::Empty => (0, 0),
        };
        FileStat {
            mode: self.file_type.type_bits() | self.permissions,
            uid: self.uid,
            gid: self.gid,
            rdev,
            size,
        }
    }
}

#[derive(Default)]
struct State {
    nodes: BTreeMap<PathBuf, Node>,
    users: BTreeMap<String, u32>,
    groups: BTreeMap<String, u32>,
    mutations: Vec<Mutation>,
    commands: Vec<Command>,
}

impl State {
    fn node(&self, path: &Path) -> io::Result<&Node> {
        self.nodes.get(path).ok_or_else(|| not_found(path))
    }

    fn node_mut(&mut self, path: &Path) -> io::Result<&mut Node> {
        self.nodes.get_mut(path).ok_or_else(|| not_found(path))
    }

    /// Follow symlinks until a non-link node.
    fn follow(&self, path: &Path) -> io::Result<PathBuf> {
        let mut current = path.to_path_buf();
        for _ in 0..40 {
            match &self.node(&current)?.data {
                Data::Link(target) => {
                    current = match current.parent() {
                        Some(parent) if target.is_relative() => parent.join(target),
                        _ => target.clone(),
                    };
                }
                _ => return Ok(current),
            }
        }
        Err(io::Error::other(format!(
            "too many levels of symbolic links: {}",
            path.display()
        )))
    }

    fn has_children(&self, path: &Path) -> bool {
        self.nodes.keys().any(|k| k.parent() == Some(path))
    }

    /// Fail unless `path` is free and its parent is an existing directory.
    fn check_create(&self, path: &Path) -> io::Result<()> {
        if self.nodes.contains_key(path) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", path.display()),
            ));
        }
        let parent = path.parent().ok_or_else(|| not_found(path))?;
        match self.nodes.get(parent) {
            Some(node) if node.file_type == FileType::Directory => Ok(()),
            Some(_) => Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("{} is not a directory", parent.display()),
            )),
            None => Err(not_found(parent)),
        }
    }

    fn create(&mut self, path: &Path, node: Node) -> io::Result<()> {
        self.check_create(path)?;
        self.nodes.insert(path.to_path_buf(), node);
        Ok(())
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{}: no such file or directory", path.display()),
    )
}

/// In-memory [`Host`] implementation.
pub struct MemoryHost {
    state: Mutex<State>,
    responder: Responder,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHost {
    /// An empty host: just `/`, user and group `root` with id 0, and a
    /// responder that fails every command with exit code 127.
    pub fn new() -> Self {
        let mut state = State::default();
        state.nodes.insert(
            PathBuf::from("/"),
            Node::new(FileType::Directory, 0o755, Data::Empty),
        );
        state.users.insert("root".to_string(), 0);
        state.groups.insert("root".to_string(), 0);
        Self {
            state: Mutex::new(state),
            responder: Box::new(|command: &Command| {
                CommandOutput::failure(127, "", format!("{}: command not found", command.program))
            }),
        }
    }

    #[must_use]
    pub fn with_user(self, name: &str, uid: u32) -> Self {
        self.lock().users.insert(name.to_string(), uid);
        self
    }

    #[must_use]
    pub fn with_group(self, name: &str, gid: u32) -> Self {
        self.lock().groups.insert(name.to_string(), gid);
        self
    }

    /// Answer commands with `responder`.
    #[must_use]
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&Command) -> CommandOutput + Send + Sync + 'static,
    {
        self.responder = Box::new(responder);
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn seed(&self, path: &Path, node: Node) {
        let mut state = self.lock();
        let mut missing = Vec::new();
        let mut parent = path.parent();
        while let Some(dir) = parent {
            if state.nodes.contains_key(dir) {
                break;
            }
            missing.push(dir.to_path_buf());
            parent = dir.parent();
        }
        for dir in missing.into_iter().rev() {
            state
                .nodes
                .insert(dir, Node::new(FileType::Directory, 0o755, Data::Empty));
        }
        state.nodes.insert(path.to_path_buf(), node);
    }

    /// Seed a directory (and any missing parents) without journaling.
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        self.seed(
            path.as_ref(),
            Node::new(FileType::Directory, 0o755, Data::Empty),
        );
    }

    /// Seed a regular file without journaling.
    pub fn add_file(&self, path: impl AsRef<Path>, contents: impl Into<Vec<u8>>) {
        self.seed(
            path.as_ref(),
            Node::new(FileType::Regular, 0o644, Data::Bytes(contents.into())),
        );
    }

    /// Seed a symlink without journaling.
    pub fn add_symlink(&self, path: impl AsRef<Path>, target: impl Into<PathBuf>) {
        self.seed(
            path.as_ref(),
            Node::new(FileType::Symlink, 0o777, Data::Link(target.into())),
        );
    }

    /// Seed a special node without journaling.
    pub fn add_node(&self, path: impl AsRef<Path>, node: NodeType, rdev: u64) {
        let data = match node {
            NodeType::BlockDevice | NodeType::CharDevice => Data::Device(rdev),
            NodeType::Socket | NodeType::Fifo => Data::Empty,
        };
        self.seed(path.as_ref(), Node::new(node.file_type(), 0o644, data));
    }

    /// Change seeded metadata without journaling.
    pub fn set_meta(&self, path: impl AsRef<Path>, permissions: u32, uid: u32, gid: u32) {
        if let Some(node) = self.lock().nodes.get_mut(path.as_ref()) {
            node.permissions = permissions & PERMISSION_BITS;
            node.uid = uid;
            node.gid = gid;
        }
    }

    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.lock().nodes.contains_key(path.as_ref())
    }

    /// `lstat` without going through the [`Host`] trait.
    pub fn stat(&self, path: impl AsRef<Path>) -> Option<FileStat> {
        self.lock().nodes.get(path.as_ref()).map(Node::stat)
    }

    /// Contents of a regular file.
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        match &self.lock().nodes.get(path.as_ref())?.data {
            Data::Bytes(bytes) => Some(bytes.clone()),
            _ => None,
        }
    }

    /// Every path below (and including) `root`, sorted.
    pub fn paths_under(&self, root: impl AsRef<Path>) -> Vec<PathBuf> {
        let root = root.as_ref();
        self.lock()
            .nodes
            .keys()
            .filter(|p| p.starts_with(root))
            .cloned()
            .collect()
    }

    /// Filesystem mutations recorded so far.
    pub fn mutations(&self) -> Vec<Mutation> {
        self.lock().mutations.clone()
    }

    /// Commands run so far, in order.
    pub fn commands(&self) -> Vec<Command> {
        self.lock().commands.clone()
    }

    /// Forget recorded mutations and commands.
    pub fn clear_journal(&self) {
        let mut state = self.lock();
        state.mutations.clear();
        state.commands.clear();
    }
}

impl Host for MemoryHost {
    fn lstat(&self, path: &Path) -> io::Result<FileStat> {
        Ok(self.lock().node(path)?.stat())
    }

    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        let state = self.lock();
        let resolved = state.follow(path)?;
        match &state.node(&resolved)?.data {
            Data::Bytes(bytes) => Ok(bytes.clone()),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            )),
        }
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut state = self.lock();
        match state.nodes.get_mut(path) {
            Some(node) if node.file_type == FileType::Regular => {
                node.data = Data::Bytes(contents.to_vec());
            }
            Some(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::IsADirectory,
                    format!("{} is not a regular file", path.display()),
                ));
            }
            None => state.create(
                path,
                Node::new(FileType::Regular, 0o644, Data::Bytes(contents.to_vec())),
            )?,
        }
        state.mutations.push(Mutation::WriteFile(path.to_path_buf()));
        Ok(())
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<String>> {
        let state = self.lock();
        if state.node(path)?.file_type != FileType::Directory {
            return Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("{} is not a directory", path.display()),
            ));
        }
        Ok(state
            .nodes
            .keys()
            .filter(|k| k.parent() == Some(path))
            .filter_map(|k| k.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect())
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        match &self.lock().node(path)?.data {
            Data::Link(target) => Ok(target.clone()),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a symlink", path.display()),
            )),
        }
    }

    fn symlink(&self, target: &Path, path: &Path) -> io::Result<()> {
        let mut state = self.lock();
        state.create(
            path,
            Node::new(FileType::Symlink, 0o777, Data::Link(target.to_path_buf())),
        )?;
        state.mutations.push(Mutation::Symlink {
            path: path.to_path_buf(),
            target: target.to_path_buf(),
        });
        Ok(())
    }

    fn mknod(&self, path: &Path, node: NodeType, rdev: u64) -> io::Result<()> {
        let data = match node {
            NodeType::BlockDevice | NodeType::CharDevice => Data::Device(rdev),
            NodeType::Socket | NodeType::Fifo => Data::Empty,
        };
        let mut state = self.lock();
        state.create(path, Node::new(node.file_type(), 0o644, data))?;
        state.mutations.push(Mutation::Mknod {
            path: path.to_path_buf(),
            node,
            rdev,
        });
        Ok(())
    }

    fn mkdir(&self, path: &Path) -> io::Result<()> {
        let mut state = self.lock();
        state.create(path, Node::new(FileType::Directory, 0o755, Data::Empty))?;
        state.mutations.push(Mutation::Mkdir(path.to_path_buf()));
        Ok(())
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        let mut state = self.lock();
        let node = state.node(path)?;
        if path.parent().is_none() {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "cannot remove /",
            ));
        }
        if node.file_type == FileType::Directory && state.has_children(path) {
            return Err(io::Error::new(
                io::ErrorKind::DirectoryNotEmpty,
                format!("{}: directory not empty", path.display()),
            ));
        }
        state.nodes.remove(path);
        state.mutations.push(Mutation::Remove(path.to_path_buf()));
        Ok(())
    }

    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()> {
        let mut state = self.lock();
        let resolved = state.follow(path)?;
        state.node_mut(&resolved)?.permissions = mode & PERMISSION_BITS;
        state.mutations.push(Mutation::Chmod {
            path: path.to_path_buf(),
            mode,
        });
        Ok(())
    }

    fn chown(&self, path: &Path, uid: u32, gid: u32) -> io::Result<()> {
        let mut state = self.lock();
        let resolved = state.follow(path)?;
        let node = state.node_mut(&resolved)?;
        node.uid = uid;
        node.gid = gid;
        state.mutations.push(Mutation::Chown {
            path: path.to_path_buf(),
            uid,
            gid,
        });
        Ok(())
    }

    fn lchown(&self, path: &Path, uid: u32, gid: u32) -> io::Result<()> {
        let mut state = self.lock();
        let node = state.node_mut(path)?;
        node.uid = uid;
        node.gid = gid;
        state.mutations.push(Mutation::Lchown {
            path: path.to_path_buf(),
            uid,
            gid,
        });
        Ok(())
    }

    fn lookup_user(&self, name: &str) -> io::Result<Option<u32>> {
        Ok(self.lock().users.get(name).copied())
    }

    fn lookup_group(&self, name: &str) -> io::Result<Option<u32>> {
        Ok(self.lock().groups.get(name).copied())
    }

    fn run(&self, command: &Command) -> io::Result<CommandOutput> {
        self.lock().commands.push(command.clone());
        Ok((self.responder)(command))
    }
}
