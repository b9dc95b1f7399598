//! Syntax checks for package names, versions, architectures and debconf
//! questions.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{Error, Result};

static PACKAGE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9+.-]+$").expect("hardcoded regex pattern is valid")
});

// [epoch:]upstream[-revision]
static VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[0-9]+:)?[0-9][A-Za-z0-9.+~-]*$").expect("hardcoded regex pattern is valid")
});

static ARCHITECTURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9-]+$").expect("hardcoded regex pattern is valid"));

/// Check a Debian package name.
pub fn package_name(name: &str) -> Result<()> {
    if PACKAGE_NAME.is_match(name) {
        Ok(())
    } else {
        Err(Error::InvalidPackageName(name.to_string()))
    }
}

/// Check a Debian version string.
pub fn version(version: &str) -> Result<()> {
    if VERSION.is_match(version) && !version.ends_with('-') {
        Ok(())
    } else {
        Err(Error::InvalidVersion(version.to_string()))
    }
}

/// Check an architecture name (e.g. "amd64", "all").
pub fn architecture(arch: &str) -> Result<()> {
    if ARCHITECTURE.is_match(arch) {
        Ok(())
    } else {
        Err(Error::InvalidArchitecture(arch.to_string()))
    }
}

/// Check a debconf question name.
pub fn question(question: &str) -> Result<()> {
    if question.is_empty() || question.contains(char::is_whitespace) {
        Err(Error::InvalidQuestion(question.to_string()))
    } else {
        Ok(())
    }
}

/// Check a debconf answer.
///
/// Answers travel as one `set` line to `debconf-communicate`, so they must
/// not contain line breaks.
pub fn answer(question: &str, answer: &str) -> Result<()> {
    if answer.contains(['\n', '\r']) {
        Err(Error::InvalidAnswer {
            question: question.to_string(),
            answer: answer.to_string(),
        })
    } else {
        Ok(())
    }
}
