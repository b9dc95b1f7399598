//! `dpkg-query --show` invocation and output.
//!
//! One query resolves a whole batch of packages. Each match prints a stanza:
//!
//! ```text
//! Package=curl
//! Architecture=amd64
//! Version=8.5.0-2ubuntu10
//! end
//! ```

use crate::error::{Error, Result};

/// Program name.
pub const PROGRAM: &str = "dpkg-query";

/// Output format passed to `--showformat`. The `\n` escapes are expanded
/// by dpkg-query itself.
pub const SHOW_FORMAT: &str =
    "Package=${Package}\\nArchitecture=${Architecture}\\nVersion=${Version}\\nend\\n";

/// Diagnostic printed for each query that matched nothing.
pub const NO_MATCH_PREFIX: &str = "dpkg-query: no packages found matching ";

/// One package as reported by dpkg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installed {
    /// Package name
    pub package: String,
    /// Architecture (e.g. "amd64", "all")
    pub architecture: String,
    /// Installed version; empty when dpkg only remembers the package
    pub version: String,
}

impl Installed {
    /// Whether a version of the package is actually installed.
    pub fn is_installed(&self) -> bool {
        !self.version.is_empty()
    }
}

/// Query term for a package, optionally restricted to one architecture.
pub fn query_for(name: &str, architecture: Option<&str>) -> String {
    match architecture {
        Some(arch) => format!("{name}:{arch}"),
        None => name.to_string(),
    }
}

/// Arguments for `dpkg-query` resolving every query at once.
pub fn show_args<I, S>(queries: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut args = vec!["--show".to_string(), format!("--showformat={SHOW_FORMAT}")];
    args.extend(queries.into_iter().map(Into::into));
    args
}

#[derive(Default)]
struct Stanza {
    package: Option<String>,
    architecture: Option<String>,
    version: Option<String>,
}

impl Stanza {
    fn is_empty(&self) -> bool {
        self.package.is_none() && self.architecture.is_none() && self.version.is_none()
    }
}

/// Parse the output of a `dpkg-query` run with [`SHOW_FORMAT`].
///
/// No-match diagnostics and blank lines are skipped. Anything else that
/// does not fit the stanza grammar is an error.
pub fn parse_show(stdout: &str) -> Result<Vec<Installed>> {
    let mut packages = Vec::new();
    let mut stanza = Stanza::default();

    for (index, line) in stdout.lines().enumerate() {
        let line_no = index + 1;
        if line.is_empty() || line.starts_with(NO_MATCH_PREFIX) {
            continue;
        }

        if line == "end" {
            let Stanza {
                package: Some(package),
                architecture: Some(architecture),
                version: Some(version),
            } = std::mem::take(&mut stanza)
            else {
                return Err(Error::parse(PROGRAM, line_no, "incomplete stanza before end"));
            };
            packages.push(Installed {
                package,
                architecture,
                version,
            });
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            return Err(Error::parse(PROGRAM, line_no, format!("expected key=value, got {line:?}")));
        };
        let slot = match key {
            "Package" => &mut stanza.package,
            "Architecture" => &mut stanza.architecture,
            "Version" => &mut stanza.version,
            _ => return Err(Error::parse(PROGRAM, line_no, format!("unknown field {key:?}"))),
        };
        if slot.is_some() {
            return Err(Error::parse(PROGRAM, line_no, format!("duplicate field {key:?}")));
        }
        *slot = Some(value.to_string());
    }

    if !stanza.is_empty() {
        return Err(Error::parse(
            PROGRAM,
            stdout.lines().count(),
            "missing end sentinel",
        ));
    }
    Ok(packages)
}

/// Queries reported as unmatched by a failed `--show`.
///
/// No-match lines are collected from both streams. Returns `None` when
/// stderr holds any other diagnostic, which means the failure is real.
pub fn unmatched_queries(stdout: &str, stderr: &str) -> Option<Vec<String>> {
    let mut queries: Vec<String> = stderr
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(no_match_query)
        .collect::<Option<_>>()?;
    queries.extend(stdout.lines().filter_map(no_match_query));
    Some(queries)
}

fn no_match_query(line: &str) -> Option<String> {
    line.strip_prefix(NO_MATCH_PREFIX).map(|q| q.trim().to_string())
}
