//! Pure diff from a loaded tree to a resolved target tree.

use declarative::{NodeType, Resource};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use super::{File, FileKind};

/// One host mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Remove(PathBuf),
    Mkdir(PathBuf),
    WriteFile { path: PathBuf, contents: Vec<u8> },
    Symlink { path: PathBuf, target: PathBuf },
    Mknod { path: PathBuf, node: NodeType, rdev: u64 },
    Chmod { path: PathBuf, mode: u32 },
    Lchown { path: PathBuf, uid: u32, gid: u32 },
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remove(path) => write!(f, "remove {}", path.display()),
            Self::Mkdir(path) => write!(f, "mkdir {}", path.display()),
            Self::WriteFile { path, contents } => {
                write!(f, "write {} ({} bytes)", path.display(), contents.len())
            }
            Self::Symlink { path, target } => {
                write!(f, "symlink {} -> {}", path.display(), target.display())
            }
            Self::Mknod { path, node, rdev } => {
                write!(f, "mknod {} {node:?} {rdev:#x}", path.display())
            }
            Self::Chmod { path, mode } => write!(f, "chmod {mode:04o} {}", path.display()),
            Self::Lchown { path, uid, gid } => write!(f, "lchown {uid}:{gid} {}", path.display()),
        }
    }
}

/// Operations converging `current` to `target`, in execution order.
///
/// `target` must be validated and resolved. Removals are post-order;
/// a node's mode and ownership are fixed after its children.
pub fn plan(current: &File, target: &File) -> Vec<Op> {
    let mut ops = Vec::new();
    plan_node(current, target, &mut ops);
    ops
}

/// Post-order removal of everything in `current`.
pub fn removal(current: &File) -> Vec<Op> {
    let mut ops = Vec::new();
    remove_tree(current, &mut ops);
    ops
}

fn remove_tree(current: &File, ops: &mut Vec<Op>) {
    if current.absent {
        return;
    }
    for child in current.children() {
        remove_tree(child, ops);
    }
    ops.push(Op::Remove(PathBuf::from(&current.path)));
}

/// Whether the existing node can be kept and adjusted in place.
fn reusable(current: &FileKind, target: &FileKind) -> bool {
    match (current, target) {
        (FileKind::Symlink(c), FileKind::Symlink(t)) => c == t,
        (FileKind::BlockDevice(c), FileKind::BlockDevice(t))
        | (FileKind::CharDevice(c), FileKind::CharDevice(t)) => c == t,
        (FileKind::RegularFile(c), FileKind::RegularFile(t)) => t.is_none() || c == t,
        (FileKind::Directory(_), FileKind::Directory(_))
        | (FileKind::Socket, FileKind::Socket)
        | (FileKind::Fifo, FileKind::Fifo) => true,
        _ => false,
    }
}

fn create(path: &str, kind: &FileKind, ops: &mut Vec<Op>) {
    let path = PathBuf::from(path);
    let op = match kind {
        FileKind::Directory(_) => Op::Mkdir(path),
        FileKind::RegularFile(content) => Op::WriteFile {
            path,
            contents: content.as_ref().map(|c| c.0.clone()).unwrap_or_default(),
        },
        FileKind::Symlink(target) => Op::Symlink {
            path,
            target: PathBuf::from(target),
        },
        FileKind::Socket | FileKind::Fifo | FileKind::BlockDevice(_) | FileKind::CharDevice(_) => {
            let Some((node, rdev)) = kind.node() else {
                return;
            };
            Op::Mknod { path, node, rdev }
        }
    };
    ops.push(op);
}

fn plan_node(current: &File, target: &File, ops: &mut Vec<Op>) {
    if target.absent {
        remove_tree(current, ops);
        return;
    }
    let Some(kind) = &target.kind else {
        return;
    };

    let existing = match &current.kind {
        Some(current_kind) if !current.absent && reusable(current_kind, kind) => Some(current),
        _ => None,
    };
    if existing.is_none() {
        remove_tree(current, ops);
        create(&target.path, kind, ops);
    }

    if let FileKind::Directory(children) = kind {
        plan_children(existing.map_or(&[][..], File::children), children, ops);
    }

    plan_attributes(existing, target, ops);
}

fn plan_children(current: &[File], target: &[File], ops: &mut Vec<Op>) {
    let declared: BTreeMap<&str, &File> = target.iter().map(|t| (t.path.as_str(), t)).collect();
    for extra in current.iter().filter(|c| !declared.contains_key(c.path.as_str())) {
        remove_tree(extra, ops);
    }

    let live: BTreeMap<&str, &File> = current.iter().map(|c| (c.path.as_str(), c)).collect();
    for child in target {
        match live.get(child.path.as_str()) {
            Some(existing) => plan_node(existing, child, ops),
            None => plan_node(&File::absent(&child.path), child, ops),
        }
    }
}

/// `existing` is `None` for a freshly created node.
fn plan_attributes(existing: Option<&File>, target: &File, ops: &mut Vec<Op>) {
    let path = PathBuf::from(&target.path);
    let is_link = matches!(target.kind, Some(FileKind::Symlink(_)));

    if let Some(mode) = target.mode
        && !is_link
        && existing.is_none_or(|e| e.mode != Some(mode))
    {
        ops.push(Op::Chmod {
            path: path.clone(),
            mode,
        });
    }

    let changed = |want: Option<u32>, have: Option<u32>| want.is_some() && want != have;
    let needs_chown = match existing {
        None => true,
        Some(e) => changed(target.uid, e.uid) || changed(target.gid, e.gid),
    };
    if needs_chown {
        let fallback = |want: Option<u32>, have: Option<u32>| want.or(have).unwrap_or(0);
        let (have_uid, have_gid) = existing.map_or((None, None), |e| (e.uid, e.gid));
        ops.push(Op::Lchown {
            path,
            uid: fallback(target.uid, have_uid),
            gid: fallback(target.gid, have_gid),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::file::Device;

    fn p(path: &str) -> PathBuf {
        PathBuf::from(path)
    }

    fn live_file(path: &str, contents: &str) -> File {
        File::regular(path, contents).with_mode(0o644).with_owner(0, 0)
    }

    #[test]
    fn test_create_regular_file() {
        let target = File::regular("/tmp/x", "hi").with_mode(0o644).with_owner(0, 0);
        let ops = plan(&File::absent("/tmp/x"), &target);
        assert_eq!(
            ops,
            vec![
                Op::WriteFile {
                    path: p("/tmp/x"),
                    contents: b"hi".to_vec()
                },
                Op::Chmod {
                    path: p("/tmp/x"),
                    mode: 0o644
                },
                Op::Lchown {
                    path: p("/tmp/x"),
                    uid: 0,
                    gid: 0
                },
            ]
        );
    }

    #[test]
    fn test_satisfied_plans_nothing() {
        let live = live_file("/tmp/x", "hi");
        let target = File::regular("/tmp/x", "hi").with_owner(0, 0);
        assert!(plan(&live, &target).is_empty());
    }

    #[test]
    fn test_content_change_recreates() {
        let live = live_file("/tmp/x", "old");
        let target = File::regular("/tmp/x", "new").with_mode(0o600).with_owner(0, 0);
        assert_eq!(
            plan(&live, &target),
            vec![
                Op::Remove(p("/tmp/x")),
                Op::WriteFile {
                    path: p("/tmp/x"),
                    contents: b"new".to_vec()
                },
                Op::Chmod {
                    path: p("/tmp/x"),
                    mode: 0o600
                },
                Op::Lchown {
                    path: p("/tmp/x"),
                    uid: 0,
                    gid: 0
                },
            ]
        );
    }

    #[test]
    fn test_any_contents_keeps_file() {
        let live = live_file("/tmp/x", "whatever");
        let target = File {
            kind: Some(FileKind::RegularFile(None)),
            ..File::named("/tmp/x")
        }
        .with_owner(0, 0);
        assert!(plan(&live, &target).is_empty());
    }

    #[test]
    fn test_absent_target_removes_post_order() {
        let live = File::directory(
            "/d",
            vec![
                File::directory("/d/sub", vec![live_file("/d/sub/f", "")]),
                live_file("/d/x", ""),
            ],
        );
        assert_eq!(
            plan(&live, &File::absent("/d")),
            vec![
                Op::Remove(p("/d/sub/f")),
                Op::Remove(p("/d/sub")),
                Op::Remove(p("/d/x")),
                Op::Remove(p("/d")),
            ]
        );
        assert!(plan(&File::absent("/d"), &File::absent("/d")).is_empty());
    }

    #[test]
    fn test_type_change_recreates() {
        let live = File::directory("/x", vec![live_file("/x/f", "")]).with_owner(0, 0);
        let target = File::symlink("/x", "/target").with_owner(0, 0);
        assert_eq!(
            plan(&live, &target),
            vec![
                Op::Remove(p("/x/f")),
                Op::Remove(p("/x")),
                Op::Symlink {
                    path: p("/x"),
                    target: p("/target")
                },
                Op::Lchown {
                    path: p("/x"),
                    uid: 0,
                    gid: 0
                },
            ]
        );
    }

    #[test]
    fn test_symlink_retarget_recreates() {
        let live = File::symlink("/l", "/a").with_owner(0, 0);
        let target = File::symlink("/l", "/b").with_owner(0, 0);
        let ops = plan(&live, &target);
        assert_eq!(ops[0], Op::Remove(p("/l")));
        assert!(matches!(&ops[1], Op::Symlink { target, .. } if target == &p("/b")));
    }

    #[test]
    fn test_device_number_change_recreates() {
        let live = File {
            kind: Some(FileKind::CharDevice(Device::new(1, 3))),
            ..File::named("/n")
        }
        .with_owner(0, 0);
        let target = File {
            kind: Some(FileKind::CharDevice(Device::new(1, 5))),
            ..File::named("/n")
        }
        .with_owner(0, 0);
        let ops = plan(&live, &target);
        assert_eq!(ops[0], Op::Remove(p("/n")));
        assert_eq!(
            ops[1],
            Op::Mknod {
                path: p("/n"),
                node: NodeType::CharDevice,
                rdev: Device::new(1, 5).rdev()
            }
        );
    }

    #[test]
    fn test_directory_prunes_undeclared_children() {
        let live = File::directory("/d", vec![live_file("/d/a", "1"), live_file("/d/junk", "")])
            .with_owner(0, 0);
        let target = File::directory("/d", vec![File::regular("/d/a", "1").with_owner(0, 0)])
            .with_owner(0, 0);
        assert_eq!(plan(&live, &target), vec![Op::Remove(p("/d/junk"))]);
    }

    #[test]
    fn test_ownership_change() {
        let live = live_file("/x", "");
        let target = File::regular("/x", "").with_owner(1000, 0);
        assert_eq!(
            plan(&live, &target),
            vec![Op::Lchown {
                path: p("/x"),
                uid: 1000,
                gid: 0
            }]
        );
    }

    #[test]
    fn test_op_display() {
        assert_eq!(
            Op::Chmod {
                path: p("/x"),
                mode: 0o644
            }
            .to_string(),
            "chmod 0644 /x"
        );
        assert_eq!(Op::Remove(p("/x")).to_string(), "remove /x");
    }
}
