//! Manifest representation of [`File`]
//!
//! In manifests the node shape is one of several mutually exclusive keys
//! (`regular_file`, `directory`, ...) rather than a tagged enum:
//!
//! ```toml
//! [[file]]
//! path = "/etc/motd"
//! regular_file = "hello\n"
//! mode = "0644"
//! user = "root"
//! ```

use declarative::is_false;
use serde::{Deserialize, Serialize};

use super::{Content, Device, File, FileKind};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileSpec {
    path: String,
    #[serde(default, skip_serializing_if = "is_false")]
    absent: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    socket: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    symbolic_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    regular_file: Option<RegularFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    block_device: Option<Device>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    directory: Option<Vec<File>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    char_device: Option<Device>,
    #[serde(default, skip_serializing_if = "is_false")]
    fifo: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mode: Option<Mode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    uid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    gid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    group: Option<String>,
}

/// `regular_file = true` accepts any contents; a string pins them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RegularFile {
    Any(bool),
    Contents(String),
}

/// Permission bits as an integer or an octal string ("0644", "0o644").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum Mode {
    Bits(u32),
    Octal(String),
}

impl Mode {
    fn bits(&self) -> Result<u32, String> {
        match self {
            Self::Bits(bits) => Ok(*bits),
            Self::Octal(text) => {
                let digits = text.strip_prefix("0o").unwrap_or(text);
                u32::from_str_radix(digits, 8).map_err(|_| format!("invalid octal mode {text:?}"))
            }
        }
    }
}

impl TryFrom<FileSpec> for File {
    type Error = String;

    fn try_from(spec: FileSpec) -> Result<Self, Self::Error> {
        let mut kinds = Vec::new();
        if spec.socket {
            kinds.push(FileKind::Socket);
        }
        if let Some(target) = spec.symbolic_link {
            kinds.push(FileKind::Symlink(target));
        }
        match spec.regular_file {
            Some(RegularFile::Any(true)) => kinds.push(FileKind::RegularFile(None)),
            Some(RegularFile::Contents(text)) => {
                kinds.push(FileKind::RegularFile(Some(Content(text.into_bytes()))));
            }
            Some(RegularFile::Any(false)) | None => {}
        }
        if let Some(device) = spec.block_device {
            kinds.push(FileKind::BlockDevice(device));
        }
        if let Some(children) = spec.directory {
            kinds.push(FileKind::Directory(children));
        }
        if let Some(device) = spec.char_device {
            kinds.push(FileKind::CharDevice(device));
        }
        if spec.fifo {
            kinds.push(FileKind::Fifo);
        }

        if kinds.len() > 1 {
            let names: Vec<&str> = kinds.iter().map(FileKind::name).collect();
            return Err(format!(
                "{}: only one of {} may be set",
                spec.path,
                names.join(", ")
            ));
        }

        Ok(Self {
            path: spec.path,
            absent: spec.absent,
            kind: kinds.pop(),
            mode: spec.mode.as_ref().map(Mode::bits).transpose()?,
            uid: spec.uid,
            user: spec.user,
            gid: spec.gid,
            group: spec.group,
        })
    }
}

impl From<File> for FileSpec {
    fn from(file: File) -> Self {
        let mut spec = Self {
            path: file.path,
            absent: file.absent,
            mode: file.mode.map(|bits| Mode::Octal(format!("{bits:04o}"))),
            uid: file.uid,
            user: file.user,
            gid: file.gid,
            group: file.group,
            ..Self::default()
        };
        match file.kind {
            Some(FileKind::Socket) => spec.socket = true,
            Some(FileKind::Symlink(target)) => spec.symbolic_link = Some(target),
            Some(FileKind::RegularFile(None)) => spec.regular_file = Some(RegularFile::Any(true)),
            Some(FileKind::RegularFile(Some(content))) => {
                spec.regular_file = Some(RegularFile::Contents(
                    String::from_utf8_lossy(content.as_bytes()).into_owned(),
                ));
            }
            Some(FileKind::BlockDevice(device)) => spec.block_device = Some(device),
            Some(FileKind::Directory(children)) => spec.directory = Some(children),
            Some(FileKind::CharDevice(device)) => spec.char_device = Some(device),
            Some(FileKind::Fifo) => spec.fifo = true,
            None => {}
        }
        spec
    }
}
