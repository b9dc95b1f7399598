use declarative::{Error, Removal, Resource, Result, Session, SingleResource};
use log::{debug, warn};
use std::io;
use std::path::Path;

use super::load::load_path;
use super::plan::{Op, plan, removal};
use super::File;

/// Attempts at removing a directory that keeps gaining entries.
const REMOVE_ATTEMPTS: usize = 3;

pub fn apply(session: &Session<'_>, target: &File) -> Result<()> {
    target.validate()?;
    let mut target = target.clone();
    target.resolve(session)?;

    let current = load_path(session, &target.path)?;
    let ops = plan(&current, &target);
    if ops.is_empty() {
        debug!("file {} is up to date", target.path);
        return Ok(());
    }

    debug!("file {}: {} operations", target.path, ops.len());
    for op in &ops {
        execute(session, op)?;
    }
    Ok(())
}

fn execute(session: &Session<'_>, op: &Op) -> Result<()> {
    debug!("{op}");
    match op {
        Op::Remove(path) => remove_path(session, path),
        Op::Mkdir(path) => session.mkdir(path),
        Op::WriteFile { path, contents } => session.write_file(path, contents),
        Op::Symlink { path, target } => session.symlink(target, path),
        Op::Mknod { path, node, rdev } => session.mknod(path, *node, *rdev),
        Op::Chmod { path, mode } => session.chmod(path, *mode),
        Op::Lchown { path, uid, gid } => session.lchown(path, *uid, *gid),
    }
}

/// Remove `path`, emptying it again if entries appeared since it was loaded.
fn remove_path(session: &Session<'_>, path: &Path) -> Result<()> {
    for attempt in 1..=REMOVE_ATTEMPTS {
        match session.remove(path)? {
            Removal::Removed | Removal::Missing => return Ok(()),
            Removal::NotEmpty => {
                warn!(
                    "{} is not empty (attempt {attempt}/{REMOVE_ATTEMPTS}), removing new entries",
                    path.display()
                );
                let live = load_path(session, &path.to_string_lossy())?;
                for child in live.children() {
                    for op in removal(child) {
                        if let Op::Remove(child_path) = op {
                            session.remove(&child_path)?;
                        }
                    }
                }
            }
        }
    }
    Err(Error::io(
        "remove",
        path,
        io::Error::new(
            io::ErrorKind::DirectoryNotEmpty,
            format!("still not empty after {REMOVE_ATTEMPTS} attempts"),
        ),
    ))
}
