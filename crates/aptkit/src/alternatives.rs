//! `update-alternatives` query output and commands.
//!
//! `--query` prints a header stanza followed by one stanza per choice:
//!
//! ```text
//! Name: editor
//! Link: /usr/bin/editor
//! Slaves:
//!  editor.1.gz /usr/share/man/man1/editor.1.gz
//! Status: auto
//! Best: /bin/nano
//! Value: /bin/nano
//!
//! Alternative: /bin/nano
//! Priority: 40
//! Slaves:
//!  editor.1.gz /usr/share/man/man1/nano.1.gz
//! ```

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Program name.
pub const PROGRAM: &str = "update-alternatives";

/// Exit code of `--query` for an unknown group.
pub const NO_ALTERNATIVES_EXIT: i32 = 2;

/// Parsed `--query` output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    /// Group name
    pub name: String,
    /// Generic link path
    pub link: String,
    /// Slave name to generic slave link path
    pub slaves: BTreeMap<String, String>,
    /// "auto" or "manual"
    pub status: String,
    /// Highest priority choice, if any
    pub best: Option<String>,
    /// Currently selected choice; `None` when dpkg reports "none"
    pub value: Option<String>,
    /// Every registered choice, in output order
    pub alternatives: Vec<QueryChoice>,
}

/// One registered choice of a group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryChoice {
    /// Path the generic link points to when this choice is selected
    pub path: String,
    /// Priority used in auto mode
    pub priority: i32,
    /// Slave name to slave target path
    pub slaves: BTreeMap<String, String>,
}

/// Whether `--query` diagnostics say the group does not exist.
pub fn is_no_alternatives(stderr: &str) -> bool {
    stderr.contains("no alternatives for")
}

fn field<'a>(line: &'a str, line_no: usize) -> Result<(&'a str, &'a str)> {
    let Some((key, value)) = line.split_once(':') else {
        return Err(Error::parse(PROGRAM, line_no, format!("expected Key: value, got {line:?}")));
    };
    Ok((key, value.trim()))
}

fn slave_line(line: &str, line_no: usize) -> Result<(String, String)> {
    match line.trim().split_once(' ') {
        Some((name, path)) if !name.is_empty() && !path.trim().is_empty() => {
            Ok((name.to_string(), path.trim().to_string()))
        }
        _ => Err(Error::parse(PROGRAM, line_no, format!("expected slave line, got {line:?}"))),
    }
}

fn require(value: Option<String>, key: &str, line_no: usize) -> Result<String> {
    value.ok_or_else(|| Error::parse(PROGRAM, line_no, format!("missing {key}")))
}

/// Parse `update-alternatives --query <name>` output.
pub fn parse_query(stdout: &str) -> Result<Query> {
    // Each line is numbered once; stanzas are separated by blank lines.
    let mut stanzas: Vec<Vec<(usize, &str)>> = vec![Vec::new()];
    for (index, line) in stdout.lines().enumerate() {
        if line.trim().is_empty() {
            if stanzas.last().is_some_and(|s| !s.is_empty()) {
                stanzas.push(Vec::new());
            }
        } else if let Some(stanza) = stanzas.last_mut() {
            stanza.push((index + 1, line));
        }
    }
    stanzas.retain(|s| !s.is_empty());

    let mut stanzas = stanzas.into_iter();
    let header = stanzas
        .next()
        .ok_or_else(|| Error::parse(PROGRAM, 1, "empty output"))?;

    let mut query = parse_header(&header)?;
    for stanza in stanzas {
        query.alternatives.push(parse_choice(&stanza)?);
    }
    Ok(query)
}

fn parse_header(lines: &[(usize, &str)]) -> Result<Query> {
    let mut name = None;
    let mut link = None;
    let mut status = None;
    let mut query = Query::default();
    let mut in_slaves = false;
    let last_line = lines.last().map_or(1, |(n, _)| *n);

    for &(line_no, line) in lines {
        if line.starts_with(' ') {
            if !in_slaves {
                return Err(Error::parse(PROGRAM, line_no, "indented line outside Slaves"));
            }
            let (slave, path) = slave_line(line, line_no)?;
            query.slaves.insert(slave, path);
            continue;
        }
        in_slaves = false;

        let (key, value) = field(line, line_no)?;
        match key {
            "Name" => name = Some(value.to_string()),
            "Link" => link = Some(value.to_string()),
            "Slaves" => in_slaves = true,
            "Status" => status = Some(value.to_string()),
            "Best" => query.best = Some(value.to_string()),
            "Value" => {
                query.value = (value != "none" && !value.is_empty()).then(|| value.to_string());
            }
            _ => {
                return Err(Error::parse(PROGRAM, line_no, format!("unknown field {key:?}")));
            }
        }
    }

    query.name = require(name, "Name", last_line)?;
    query.link = require(link, "Link", last_line)?;
    query.status = require(status, "Status", last_line)?;
    Ok(query)
}

fn parse_choice(lines: &[(usize, &str)]) -> Result<QueryChoice> {
    let mut path = None;
    let mut priority = None;
    let mut slaves = BTreeMap::new();
    let mut in_slaves = false;
    let last_line = lines.last().map_or(1, |(n, _)| *n);

    for &(line_no, line) in lines {
        if line.starts_with(' ') {
            if !in_slaves {
                return Err(Error::parse(PROGRAM, line_no, "indented line outside Slaves"));
            }
            let (slave, target) = slave_line(line, line_no)?;
            slaves.insert(slave, target);
            continue;
        }
        in_slaves = false;

        let (key, value) = field(line, line_no)?;
        match key {
            "Alternative" => path = Some(value.to_string()),
            "Priority" => {
                let parsed = value.parse::<i32>().map_err(|e| {
                    Error::parse(PROGRAM, line_no, format!("invalid priority {value:?}: {e}"))
                })?;
                priority = Some(parsed);
            }
            "Slaves" => in_slaves = true,
            _ => {
                return Err(Error::parse(PROGRAM, line_no, format!("unknown field {key:?}")));
            }
        }
    }

    Ok(QueryChoice {
        path: require(path, "Alternative", last_line)?,
        priority: priority
            .ok_or_else(|| Error::parse(PROGRAM, last_line, "missing Priority"))?,
        slaves,
    })
}

/// Arguments for `--query`.
pub fn query_args(name: &str) -> Vec<String> {
    vec!["--query".to_string(), name.to_string()]
}

/// One `--slave` triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlaveLink<'a> {
    /// Generic slave link path
    pub link: &'a str,
    /// Slave name
    pub name: &'a str,
    /// Target for this choice
    pub path: &'a str,
}

/// Arguments for registering one choice with its slaves.
pub fn install_args(
    link: &str,
    name: &str,
    path: &str,
    priority: i32,
    slaves: &[SlaveLink<'_>],
) -> Vec<String> {
    let mut args = vec![
        "--install".to_string(),
        link.to_string(),
        name.to_string(),
        path.to_string(),
        priority.to_string(),
    ];
    for slave in slaves {
        args.extend([
            "--slave".to_string(),
            slave.link.to_string(),
            slave.name.to_string(),
            slave.path.to_string(),
        ]);
    }
    args
}

/// Arguments for unregistering one choice.
pub fn remove_args(name: &str, path: &str) -> Vec<String> {
    vec!["--remove".to_string(), name.to_string(), path.to_string()]
}

/// Arguments for removing a whole group.
pub fn remove_all_args(name: &str) -> Vec<String> {
    vec!["--remove-all".to_string(), name.to_string()]
}

/// Arguments for returning a group to automatic mode.
pub fn auto_args(name: &str) -> Vec<String> {
    vec!["--auto".to_string(), name.to_string()]
}

/// Arguments for selecting a choice manually.
pub fn set_args(name: &str, path: &str) -> Vec<String> {
    vec!["--set".to_string(), name.to_string(), path.to_string()]
}
