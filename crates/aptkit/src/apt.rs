//! `apt-get` and `apt-mark` arguments.

use std::collections::BTreeSet;

/// Package installer.
pub const APT_GET: &str = "apt-get";

/// Package selection marker.
pub const APT_MARK: &str = "apt-mark";

/// Environment that keeps apt-get from prompting.
pub const NONINTERACTIVE_ENV: (&str, &str) = ("DEBIAN_FRONTEND", "noninteractive");

/// Install argument for a package.
///
/// Renders `name`, `name=version`, `name:arch` or `name:arch=version`.
pub fn install_arg(name: &str, architecture: Option<&str>, version: Option<&str>) -> String {
    let mut arg = name.to_string();
    if let Some(arch) = architecture {
        arg.push(':');
        arg.push_str(arch);
    }
    if let Some(version) = version.filter(|v| !v.is_empty()) {
        arg.push('=');
        arg.push_str(version);
    }
    arg
}

/// Removal argument for a package (`name-`).
pub fn remove_arg(name: &str) -> String {
    format!("{name}-")
}

/// Arguments for refreshing the package lists.
pub fn update_args() -> Vec<String> {
    vec!["update".to_string()]
}

/// Arguments for one `apt-get install` covering every package argument.
pub fn install_args<I, S>(packages: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut args = vec!["--yes".to_string(), "install".to_string()];
    args.extend(packages.into_iter().map(Into::into));
    args
}

/// Arguments for listing which of `names` are held.
pub fn showhold_args<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut args = vec!["showhold".to_string()];
    args.extend(names.into_iter().map(Into::into));
    args
}

/// Arguments for holding (or releasing) packages.
pub fn mark_args<I, S>(hold: bool, names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let verb = if hold { "hold" } else { "unhold" };
    let mut args = vec![verb.to_string()];
    args.extend(names.into_iter().map(Into::into));
    args
}

/// Parse `apt-mark showhold` output into package names.
///
/// Architecture qualifiers (`libc6:i386`) are stripped.
pub fn parse_showhold(stdout: &str) -> BTreeSet<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| match line.split_once(':') {
            Some((name, _)) => name.to_string(),
            None => line.to_string(),
        })
        .collect()
}
