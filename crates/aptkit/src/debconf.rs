//! `debconf-show` output and the `debconf-communicate` protocol.

use crate::error::{Error, Result};

/// Lists the questions of a package.
pub const SHOW_PROGRAM: &str = "debconf-show";

/// Reads and writes the debconf database over stdin/stdout.
pub const COMMUNICATE_PROGRAM: &str = "debconf-communicate";

/// Placeholder `debconf-show` prints instead of password answers.
pub const PASSWORD_OMITTED: &str = "(password omitted)";

/// One question/answer pair of a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Question name (e.g. "tzdata/Areas")
    pub question: String,
    /// Current answer, possibly [`PASSWORD_OMITTED`]
    pub answer: String,
    /// Whether the question was shown to the user
    pub seen: bool,
}

impl Selection {
    /// Whether the answer was redacted and must be read with `get`.
    pub fn is_redacted(&self) -> bool {
        self.answer == PASSWORD_OMITTED
    }
}

/// Parse `debconf-show <package>` output.
///
/// Each line is `* question: answer` for seen questions and
/// `  question: answer` otherwise.
pub fn parse_show(stdout: &str) -> Result<Vec<Selection>> {
    let mut selections = Vec::new();
    for (index, line) in stdout.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let line_no = index + 1;

        let (seen, rest) = if let Some(rest) = line.strip_prefix("* ") {
            (true, rest)
        } else if let Some(rest) = line.strip_prefix("  ") {
            (false, rest)
        } else {
            return Err(Error::parse(
                SHOW_PROGRAM,
                line_no,
                format!("expected '* ' or '  ' marker, got {line:?}"),
            ));
        };

        let Some((question, answer)) = rest.split_once(':') else {
            return Err(Error::parse(
                SHOW_PROGRAM,
                line_no,
                format!("expected question: answer, got {line:?}"),
            ));
        };
        if question.is_empty() || question.contains(char::is_whitespace) {
            return Err(Error::parse(
                SHOW_PROGRAM,
                line_no,
                format!("invalid question name {question:?}"),
            ));
        }

        selections.push(Selection {
            question: question.to_string(),
            answer: answer.strip_prefix(' ').unwrap_or(answer).to_string(),
            seen,
        });
    }
    Ok(selections)
}

/// Request reading the answer to `question`.
pub fn get_request(question: &str) -> String {
    format!("get {question}\n")
}

/// Request setting the answer to `question`.
pub fn set_request(question: &str, answer: &str) -> String {
    format!("set {question} {answer}\n")
}

/// Request setting the `seen` flag of `question`.
pub fn seen_request(question: &str, seen: bool) -> String {
    format!("fset {question} seen {seen}\n")
}

/// Parse a single reply line.
///
/// `0` and `0 <value>` are success; any other status code is an error.
pub fn parse_reply(stdout: &str) -> Result<String> {
    let line = stdout.lines().next().unwrap_or("");
    let (code, value) = match line.split_once(' ') {
        Some((code, value)) => (code, value),
        None => (line, ""),
    };
    if code == "0" {
        Ok(value.to_string())
    } else {
        Err(Error::DebconfReply {
            code: code.to_string(),
            message: value.to_string(),
        })
    }
}
