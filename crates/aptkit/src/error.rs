//! Error types for Debian tool output and arguments.

use thiserror::Error;

/// Errors that can occur while parsing tool output or validating arguments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Tool output does not match the expected grammar
    #[error("unexpected {tool} output at line {line}: {message}")]
    Parse {
        /// Tool that produced the output
        tool: &'static str,
        /// 1-based line number
        line: usize,
        /// Description of the mismatch
        message: String,
    },

    /// Not a valid Debian package name
    #[error("invalid package name: {0:?}")]
    InvalidPackageName(String),

    /// Not a valid Debian version string
    #[error("invalid version: {0:?}")]
    InvalidVersion(String),

    /// Not a valid architecture name
    #[error("invalid architecture: {0:?}")]
    InvalidArchitecture(String),

    /// Not a valid debconf question name
    #[error("invalid debconf question: {0:?}")]
    InvalidQuestion(String),

    /// A debconf answer that would break the line protocol
    #[error("invalid answer for debconf question {question}: {answer:?} spans several lines")]
    InvalidAnswer {
        /// Question the answer belongs to
        question: String,
        /// The rejected answer
        answer: String,
    },

    /// `debconf-communicate` answered with a non-zero status
    #[error("debconf replied {code}: {message}")]
    DebconfReply {
        /// Status code from the reply
        code: String,
        /// Rest of the reply line
        message: String,
    },
}

impl Error {
    pub(crate) fn parse(tool: &'static str, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            tool,
            line,
            message: message.into(),
        }
    }
}

/// Result type for aptkit operations.
pub type Result<T> = std::result::Result<T, Error>;
