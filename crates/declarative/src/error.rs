//! Error types for resource reconciliation.
//!
//! Errors are grouped the way callers need to react to them: validation
//! problems are fatal for one resource and never retried, host and command
//! failures carry everything needed to diagnose them, and fan-out failures are
//! joined so the caller sees every failing item rather than the first one.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::merge::MergeError;
use crate::types::{Command, CommandOutput, ExitStatus};

/// Errors that can occur while loading, resolving or applying resources.
#[derive(Debug, Error)]
pub enum Error {
    /// The resource specification is structurally invalid
    #[error("invalid {kind} {id:?}: {field}: {message}")]
    Validation {
        /// Resource type name (e.g. "file")
        kind: &'static str,
        /// Identifying value of the offending resource
        id: String,
        /// Name of the offending field
        field: String,
        /// What is wrong with it
        message: String,
    },

    /// A host filesystem or identity operation failed
    #[error("{op} {}: {source}", .path.display())]
    Io {
        /// Host operation that failed (e.g. "lstat", "mkdir")
        op: &'static str,
        /// Path the operation was applied to
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// An external tool exited unsuccessfully or wrote unexpected diagnostics
    #[error(transparent)]
    Command(#[from] CommandFailure),

    /// An external tool produced output that does not match its grammar
    #[error("unexpected {tool} output: {message}")]
    Parse {
        /// Tool whose output could not be parsed
        tool: &'static str,
        /// Description of the mismatch
        message: String,
    },

    /// Two declarations of the same resource disagree
    #[error(transparent)]
    Merge(#[from] MergeError),

    /// A user name could not be resolved on the host
    #[error("unknown user: {0}")]
    UnknownUser(String),

    /// A group name could not be resolved on the host
    #[error("unknown group: {0}")]
    UnknownGroup(String),

    /// No resource type is registered under this name
    #[error("unknown resource type: {0}")]
    UnknownType(String),

    /// A declaration could not be decoded into its resource type
    #[error("cannot decode {kind}: {message}")]
    Decode {
        /// Resource type name
        kind: String,
        /// Decoder message
        message: String,
    },

    /// The session was cancelled before or during a host call
    #[error("operation cancelled")]
    Cancelled,

    /// The fan-out worker pool could not be created
    #[error("failed to create worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    /// Several independent tasks failed
    #[error("{} operations failed:{}", .0.len(), JoinedDisplay(.0))]
    Joined(Vec<Error>),
}

impl Error {
    /// Create a validation error.
    pub fn validation(
        kind: &'static str,
        id: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation {
            kind,
            id: id.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a host I/O error for `op` on `path`.
    pub fn io(op: &'static str, path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create a parse error for output of `tool`.
    pub fn parse(tool: &'static str, message: impl Into<String>) -> Self {
        Self::Parse {
            tool,
            message: message.into(),
        }
    }

    /// Join a list of errors.
    ///
    /// A single error is returned as-is; several are wrapped in
    /// [`Error::Joined`].
    pub fn join(mut errors: Vec<Error>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Self::Joined(errors)),
        }
    }

    /// Whether this error (or every joined error) is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Joined(errors) => errors.iter().all(Error::is_cancelled),
            _ => false,
        }
    }
}

struct JoinedDisplay<'a>(&'a [Error]);

impl fmt::Display for JoinedDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for error in self.0 {
            write!(f, "\n  - {error}")?;
        }
        Ok(())
    }
}

/// A command that exited unsuccessfully, with everything it printed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("`{}` {status}\nstdout: {}\nstderr: {}", .argv.join(" "), .stdout.trim_end(), .stderr.trim_end())]
pub struct CommandFailure {
    /// Full argument vector, program first
    pub argv: Vec<String>,
    /// How the process ended
    pub status: ExitStatus,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl CommandFailure {
    /// Build a failure from a command and its output.
    pub fn new(command: &Command, output: &CommandOutput) -> Self {
        Self {
            argv: command.argv(),
            status: output.status.clone(),
            stdout: output.stdout_str(),
            stderr: output.stderr_str(),
        }
    }
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;
