//! Process execution types shared by hosts and resources

use serde::{Deserialize, Serialize};
use std::fmt;

/// A process invocation on the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    /// Program to execute (looked up in `PATH` by the host)
    pub program: String,
    /// Arguments, not including the program
    pub args: Vec<String>,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
    /// Bytes written to the process' standard input
    pub stdin: Vec<u8>,
}

impl Command {
    /// Create a command for `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Provide standard input.
    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = input.into();
        self
    }

    /// The full argument vector, program first.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv().join(" "))
    }
}

/// How a process ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitStatus {
    /// The process exited with this code
    Exited(i32),
    /// The process was terminated some other way (signal, etc.)
    Terminated(String),
}

impl ExitStatus {
    /// Whether the process exited with code 0.
    pub fn success(&self) -> bool {
        matches!(self, Self::Exited(0))
    }

    /// The exit code, if the process exited normally.
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Exited(code) => Some(*code),
            Self::Terminated(_) => None,
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exited with code {code}"),
            Self::Terminated(how) => write!(f, "terminated: {how}"),
        }
    }
}

/// Output from a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    /// A successful exit with the given standard output.
    pub fn success(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            status: ExitStatus::Exited(0),
            stdout: stdout.into(),
            stderr: Vec::new(),
        }
    }

    /// A failed exit with the given code and output.
    pub fn failure(code: i32, stdout: impl Into<Vec<u8>>, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            status: ExitStatus::Exited(code),
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let command = Command::new("apt-get")
            .arg("--yes")
            .args(["install", "curl"])
            .env("DEBIAN_FRONTEND", "noninteractive");

        assert_eq!(command.argv(), vec!["apt-get", "--yes", "install", "curl"]);
        assert_eq!(command.to_string(), "apt-get --yes install curl");
        assert_eq!(command.env.len(), 1);
    }

    #[test]
    fn test_exit_status() {
        assert!(ExitStatus::Exited(0).success());
        assert!(!ExitStatus::Exited(1).success());
        assert_eq!(ExitStatus::Exited(2).code(), Some(2));
        assert_eq!(ExitStatus::Terminated("signal 9".into()).code(), None);
        assert!(!ExitStatus::Terminated("signal 9".into()).success());
    }
}
