use aptkit::debconf as protocol;
use declarative::{Command, CommandFailure, Result, Session};
use std::collections::BTreeMap;

use super::DebconfAnswer;
use crate::resource::tool_error;

/// Current debconf answers of `package`.
///
/// Redacted answers are read back one by one with `get`.
pub fn selections(session: &Session<'_>, package: &str) -> Result<BTreeMap<String, DebconfAnswer>> {
    let command = Command::new(protocol::SHOW_PROGRAM).arg(package);
    let output = session.run_checked(&command)?;

    let mut answers = BTreeMap::new();
    for selection in protocol::parse_show(&output.stdout_str()).map_err(tool_error)? {
        let answer = if selection.is_redacted() {
            get(session, package, &selection.question)?
        } else {
            selection.answer
        };
        answers.insert(selection.question, DebconfAnswer::new(answer, selection.seen));
    }
    Ok(answers)
}

/// Read one answer from the debconf database.
pub fn get(session: &Session<'_>, package: &str, question: &str) -> Result<String> {
    communicate(session, package, protocol::get_request(question))
}

/// Store an answer and its seen flag.
pub fn set(
    session: &Session<'_>,
    package: &str,
    question: &str,
    answer: &DebconfAnswer,
) -> Result<()> {
    communicate(session, package, protocol::set_request(question, &answer.answer))?;
    communicate(session, package, protocol::seen_request(question, answer.seen))?;
    Ok(())
}

/// Send one request; anything on stderr counts as failure.
fn communicate(session: &Session<'_>, package: &str, request: String) -> Result<String> {
    let command = Command::new(protocol::COMMUNICATE_PROGRAM)
        .arg(package)
        .stdin(request);
    let output = session.run(&command)?;
    if !output.status.success() || !output.stderr.is_empty() {
        return Err(CommandFailure::new(&command, &output).into());
    }
    protocol::parse_reply(&output.stdout_str()).map_err(tool_error)
}
