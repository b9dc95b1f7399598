//! Scripted dpkg, apt and debconf for tests

use declarative::{Command, CommandOutput, MemoryHost};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

const DEFAULT_ARCH: &str = "amd64";
const DEFAULT_VERSION: &str = "1.0";

/// Package database answering the commands the apt reconciler runs.
#[derive(Debug, Default)]
pub struct FakeApt {
    installed: BTreeMap<String, (String, String)>,
    held: BTreeSet<String>,
    answers: BTreeMap<String, BTreeMap<String, (String, bool)>>,
    passwords: BTreeSet<String>,
    broken_debconf: BTreeSet<String>,
}

impl FakeApt {
    #[must_use]
    pub fn with_package(mut self, name: &str, arch: &str, version: &str) -> Self {
        self.installed
            .insert(name.to_string(), (arch.to_string(), version.to_string()));
        self
    }

    #[must_use]
    pub fn held(mut self, name: &str) -> Self {
        self.held.insert(name.to_string());
        self
    }

    #[must_use]
    pub fn with_question(mut self, package: &str, question: &str, answer: &str, seen: bool) -> Self {
        self.answers
            .entry(package.to_string())
            .or_default()
            .insert(question.to_string(), (answer.to_string(), seen));
        self
    }

    /// `debconf-show` redacts this question.
    #[must_use]
    pub fn with_password(mut self, question: &str) -> Self {
        self.passwords.insert(question.to_string());
        self
    }

    /// `debconf-show` fails for this package.
    #[must_use]
    pub fn broken_debconf(mut self, package: &str) -> Self {
        self.broken_debconf.insert(package.to_string());
        self
    }

    pub fn into_host(self) -> (MemoryHost, Arc<Mutex<Self>>) {
        let fake = Arc::new(Mutex::new(self));
        let shared = Arc::clone(&fake);
        let host = MemoryHost::new()
            .with_responder(move |command: &Command| shared.lock().unwrap().respond(command));
        (host, fake)
    }

    pub fn is_held(&self, name: &str) -> bool {
        self.held.contains(name)
    }

    pub fn version(&self, name: &str) -> Option<String> {
        self.installed.get(name).map(|(_, version)| version.clone())
    }

    pub fn answer(&self, package: &str, question: &str) -> Option<(String, bool)> {
        self.answers.get(package)?.get(question).cloned()
    }

    fn respond(&mut self, command: &Command) -> CommandOutput {
        let args: Vec<&str> = command.args.iter().map(String::as_str).collect();
        match (command.program.as_str(), args.as_slice()) {
            ("dpkg-query", ["--show", _format, queries @ ..]) => self.dpkg_query(queries),
            ("apt-mark", ["showhold", names @ ..]) => {
                let held: String = names
                    .iter()
                    .filter(|n| self.held.contains(**n))
                    .map(|n| format!("{n}\n"))
                    .collect();
                CommandOutput::success(held)
            }
            ("apt-mark", [verb @ ("hold" | "unhold"), names @ ..]) => {
                for name in names {
                    if *verb == "hold" {
                        self.held.insert((*name).to_string());
                    } else {
                        self.held.remove(*name);
                    }
                }
                CommandOutput::success("")
            }
            ("apt-get", ["update"]) => CommandOutput::success("Reading package lists...\n"),
            ("apt-get", ["--yes", "install", packages @ ..]) => {
                for package in packages {
                    self.install(package);
                }
                CommandOutput::success("")
            }
            ("debconf-show", [package]) => self.debconf_show(package),
            ("debconf-communicate", [package]) => {
                let request = String::from_utf8_lossy(&command.stdin).into_owned();
                self.debconf_communicate(package, request.trim_end())
            }
            _ => CommandOutput::failure(127, "", format!("{command}: not scripted")),
        }
    }

    fn dpkg_query(&self, queries: &[&str]) -> CommandOutput {
        let mut stdout = String::new();
        let mut stderr = String::new();
        for query in queries {
            let (name, arch) = match query.split_once(':') {
                Some((name, arch)) => (name, Some(arch)),
                None => (*query, None),
            };
            match self.installed.get(name) {
                Some((installed_arch, version)) if arch.is_none_or(|a| a == installed_arch.as_str()) => {
                    let _ = write!(
                        stdout,
                        "Package={name}\nArchitecture={installed_arch}\nVersion={version}\nend\n"
                    );
                }
                _ => {
                    let _ = writeln!(stderr, "dpkg-query: no packages found matching {query}");
                }
            }
        }
        let code = i32::from(!stderr.is_empty());
        CommandOutput::failure(code, stdout, stderr)
    }

    fn install(&mut self, package: &str) {
        if let Some(name) = package.strip_suffix('-') {
            self.installed.remove(name);
            return;
        }
        let (spec, version) = match package.split_once('=') {
            Some((spec, version)) => (spec, Some(version)),
            None => (package, None),
        };
        let (name, arch) = spec.split_once(':').unwrap_or((spec, DEFAULT_ARCH));
        let version = version
            .map(str::to_string)
            .or_else(|| self.version(name))
            .unwrap_or_else(|| DEFAULT_VERSION.to_string());
        self.installed
            .insert(name.to_string(), (arch.to_string(), version));
    }

    fn debconf_show(&self, package: &str) -> CommandOutput {
        if self.broken_debconf.contains(package) {
            return CommandOutput::failure(1, "", format!("debconf-show: {package} is broken"));
        }
        let mut stdout = String::new();
        for (question, (answer, seen)) in self.answers.get(package).into_iter().flatten() {
            let marker = if *seen { '*' } else { ' ' };
            let shown = if self.passwords.contains(question) {
                "(password omitted)"
            } else {
                answer.as_str()
            };
            let _ = writeln!(stdout, "{marker} {question}: {shown}");
        }
        CommandOutput::success(stdout)
    }

    fn debconf_communicate(&mut self, package: &str, request: &str) -> CommandOutput {
        let words: Vec<&str> = request.splitn(3, ' ').collect();
        let answers = self.answers.entry(package.to_string()).or_default();
        match words.as_slice() {
            ["get", question] => match answers.get(*question) {
                Some((answer, _)) => CommandOutput::success(format!("0 {answer}\n")),
                None => CommandOutput::success(format!("10 {question} doesn't exist\n")),
            },
            ["set", question, answer] => {
                let seen = answers.get(*question).is_some_and(|(_, seen)| *seen);
                answers.insert((*question).to_string(), ((*answer).to_string(), seen));
                CommandOutput::success("0 value set\n")
            }
            ["fset", question, flag] => {
                let Some((name, value)) = flag.split_once(' ') else {
                    return CommandOutput::success("20 bad fset\n");
                };
                if name != "seen" {
                    return CommandOutput::success("20 unknown flag\n");
                }
                let entry = answers.entry((*question).to_string()).or_default();
                entry.1 = value == "true";
                CommandOutput::success("0 true\n")
            }
            _ => CommandOutput::success("20 unsupported\n"),
        }
    }
}
