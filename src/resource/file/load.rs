use declarative::{Error, FileType, Resource, Result, Session};
use std::io;
use std::path::Path;

use super::{Content, Device, File, FileKind};

/// Path of the entry `name` inside directory `dir`.
pub fn child_path(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Read the live node at `path`, recursing into directories.
///
/// Children are sorted by path. Symlinks never report a mode.
pub fn load_path(session: &Session<'_>, path: &str) -> Result<File> {
    let fs_path = Path::new(path);
    let Some(stat) = session.lstat(fs_path)? else {
        return Ok(File::absent(path));
    };
    let file_type = stat.file_type().ok_or_else(|| {
        Error::io(
            "lstat",
            fs_path,
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown file type in mode {:#o}", stat.mode),
            ),
        )
    })?;

    let mut mode = Some(stat.permissions());
    let kind = match file_type {
        FileType::Socket => FileKind::Socket,
        FileType::Fifo => FileKind::Fifo,
        FileType::Symlink => {
            mode = None;
            let target = session.read_link(fs_path)?;
            FileKind::Symlink(target.to_string_lossy().into_owned())
        }
        FileType::Regular => FileKind::RegularFile(Some(Content(session.read_file(fs_path)?))),
        FileType::BlockDevice => FileKind::BlockDevice(Device::from_rdev(stat.rdev)),
        FileType::CharDevice => FileKind::CharDevice(Device::from_rdev(stat.rdev)),
        FileType::Directory => {
            let mut names = session.read_dir(fs_path)?;
            names.sort();
            let children = names
                .iter()
                .map(|name| load_path(session, &child_path(path, name)))
                .collect::<Result<Vec<_>>>()?;
            FileKind::Directory(children)
        }
    };

    Ok(File {
        path: path.to_string(),
        absent: false,
        kind: Some(kind),
        mode,
        uid: Some(stat.uid),
        user: None,
        gid: Some(stat.gid),
        group: None,
    })
}
