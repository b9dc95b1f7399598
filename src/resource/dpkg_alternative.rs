//! dpkg alternative groups managed with `update-alternatives`

use aptkit::alternatives::{self, SlaveLink};
use declarative::merge::{merge_map, merge_option, merge_value};
use declarative::{
    Command, CommandFailure, Error, MergeConflict, Resource, Result, Session, Shape,
    SingleResource, is_false,
};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use crate::resource::tool_error;

/// How the generic link picks its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlternativeStatus {
    /// Highest priority choice wins
    Auto,
    /// `value` is pinned
    Manual,
}

impl fmt::Display for AlternativeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// One registered provider of the group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Choice {
    pub alternative: String,
    pub priority: i32,
    /// Slave name to this choice's target
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub slaves: BTreeMap<String, String>,
}

/// An alternative group such as "editor".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DpkgAlternative {
    pub name: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub absent: bool,
    /// Generic link (e.g. /usr/bin/editor)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AlternativeStatus>,
    /// Selected choice; only meaningful in manual mode
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
    /// Slave name to generic slave link
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub slaves: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<Choice>,
}

fn invalid(name: &str, field: &str, message: impl Into<String>) -> Error {
    Error::validation(DpkgAlternative::TYPE_NAME, name, field, message)
}

fn require_absolute(name: &str, field: &str, path: &str) -> Result<()> {
    if Path::new(path).is_absolute() {
        Ok(())
    } else {
        Err(invalid(name, field, format!("{path:?} is not an absolute path")))
    }
}

impl DpkgAlternative {
    fn choice(&self, path: &str) -> Option<&Choice> {
        self.alternatives.iter().find(|c| c.alternative == path)
    }

    fn sorted_choices(&self) -> Vec<&Choice> {
        let mut choices: Vec<&Choice> = self.alternatives.iter().collect();
        choices.sort_by(|a, b| a.alternative.cmp(&b.alternative));
        choices
    }

    fn install_command(&self, choice: &Choice) -> Command {
        let slaves: Vec<SlaveLink<'_>> = choice
            .slaves
            .iter()
            .filter_map(|(name, path)| {
                self.slaves.get(name).map(|link| SlaveLink {
                    link,
                    name,
                    path,
                })
            })
            .collect();
        Command::new(alternatives::PROGRAM).args(alternatives::install_args(
            &self.link,
            &self.name,
            &choice.alternative,
            choice.priority,
            &slaves,
        ))
    }

    fn merge_choices(&self, other: &Self) -> std::result::Result<Vec<Choice>, MergeConflict> {
        let mut merged = self.alternatives.clone();
        for choice in &other.alternatives {
            let field = format!("alternatives[{}]", choice.alternative);
            match merged.iter_mut().find(|c| c.alternative == choice.alternative) {
                Some(existing) => {
                    if existing.priority != choice.priority {
                        return Err(MergeConflict::new(
                            "priority",
                            existing.priority.to_string(),
                            choice.priority.to_string(),
                        )
                        .within(&field));
                    }
                    existing.slaves = merge_map("slaves", &existing.slaves, &choice.slaves, |l, r| {
                        merge_value("path", l, r)
                    })
                    .map_err(|c| c.within(&field))?;
                }
                None => merged.push(choice.clone()),
            }
        }
        Ok(merged)
    }
}

impl Resource for DpkgAlternative {
    const TYPE_NAME: &'static str = "dpkg_alternative";
    const ID_FIELD: &'static str = "name";
    const SHAPE: Shape = Shape::Single;
    const SAMPLE_ID: &'static str = "editor";

    fn id(&self) -> &str {
        &self.name
    }

    fn is_absent(&self) -> bool {
        self.absent
    }

    fn named(id: &str) -> Self {
        Self {
            name: id.to_string(),
            ..Self::default()
        }
    }

    fn absent(id: &str) -> Self {
        Self {
            absent: true,
            ..Self::named(id)
        }
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.name.contains(|c: char| c == '/' || c.is_whitespace()) {
            return Err(invalid(&self.name, "name", "must be a non-empty word"));
        }

        if self.absent {
            if !self.link.is_empty()
                || self.status.is_some()
                || !self.value.is_empty()
                || !self.slaves.is_empty()
                || !self.alternatives.is_empty()
            {
                return Err(invalid(
                    &self.name,
                    "absent",
                    "link, status, value, slaves and alternatives must not be set when absent",
                ));
            }
            return Ok(());
        }

        require_absolute(&self.name, "link", &self.link)?;
        if self.alternatives.is_empty() {
            return Err(invalid(&self.name, "alternatives", "at least one choice is required"));
        }
        for link in self.slaves.values() {
            require_absolute(&self.name, "slaves", link)?;
        }

        let mut paths = BTreeSet::new();
        let mut used_slaves = BTreeSet::new();
        for choice in &self.alternatives {
            require_absolute(&self.name, "alternatives", &choice.alternative)?;
            if !paths.insert(choice.alternative.as_str()) {
                return Err(invalid(
                    &self.name,
                    "alternatives",
                    format!("{:?} is declared twice", choice.alternative),
                ));
            }
            for (slave, path) in &choice.slaves {
                if !self.slaves.contains_key(slave) {
                    return Err(invalid(
                        &self.name,
                        "alternatives",
                        format!("slave {slave:?} of {:?} is not declared in slaves", choice.alternative),
                    ));
                }
                require_absolute(&self.name, "alternatives", path)?;
                used_slaves.insert(slave.as_str());
            }
        }
        if let Some(unused) = self.slaves.keys().find(|s| !used_slaves.contains(s.as_str())) {
            return Err(invalid(
                &self.name,
                "slaves",
                format!("slave {unused:?} is not provided by any alternative"),
            ));
        }

        match self.status {
            Some(AlternativeStatus::Manual) => {
                require_absolute(&self.name, "value", &self.value)?;
                if self.choice(&self.value).is_none() {
                    return Err(invalid(
                        &self.name,
                        "value",
                        format!("{:?} is not one of the alternatives", self.value),
                    ));
                }
            }
            Some(AlternativeStatus::Auto) | None if !self.value.is_empty() => {
                return Err(invalid(&self.name, "value", "only allowed in manual mode"));
            }
            _ => {}
        }
        Ok(())
    }

    fn satisfies(&self, target: &Self) -> bool {
        if target.absent || self.absent {
            return target.absent == self.absent;
        }
        if target.status.is_some_and(|status| Some(status) != self.status) {
            return false;
        }
        if target.status == Some(AlternativeStatus::Manual) && target.value != self.value {
            return false;
        }
        target.link == self.link
            && target.slaves == self.slaves
            && target.sorted_choices() == self.sorted_choices()
    }

    fn refresh_only(&self, target: &Self) -> bool {
        if self.absent || target.absent || self.satisfies(target) {
            return false;
        }
        let mut reprioritized = self.clone();
        for choice in &mut reprioritized.alternatives {
            if let Some(wanted) = target.choice(&choice.alternative) {
                choice.priority = wanted.priority;
            }
        }
        reprioritized.satisfies(target)
    }

    fn merge(&self, other: &Self) -> std::result::Result<Self, MergeConflict> {
        if self.absent != other.absent {
            return Err(MergeConflict::new(
                "absent",
                self.absent.to_string(),
                other.absent.to_string(),
            ));
        }
        Ok(Self {
            name: self.name.clone(),
            absent: self.absent,
            link: merge_value("link", &self.link, &other.link)?,
            status: merge_option("status", &self.status, &other.status)?,
            value: merge_value("value", &self.value, &other.value)?,
            slaves: merge_map("slaves", &self.slaves, &other.slaves, |l, r| {
                merge_value("link", l, r)
            })?,
            alternatives: self.merge_choices(other)?,
        })
    }
}

impl SingleResource for DpkgAlternative {
    fn load(&self, session: &Session<'_>) -> Result<Self> {
        let command = Command::new(alternatives::PROGRAM).args(alternatives::query_args(&self.name));
        let output = session.run(&command)?;
        if !output.status.success() {
            if output.status.code() == Some(alternatives::NO_ALTERNATIVES_EXIT)
                && alternatives::is_no_alternatives(&output.stderr_str())
            {
                debug!("no alternatives for {}", self.name);
                return Ok(Self::absent(&self.name));
            }
            return Err(CommandFailure::new(&command, &output).into());
        }

        let query = alternatives::parse_query(&output.stdout_str()).map_err(tool_error)?;
        let status = match query.status.as_str() {
            "auto" => AlternativeStatus::Auto,
            "manual" => AlternativeStatus::Manual,
            other => {
                return Err(Error::parse(
                    alternatives::PROGRAM,
                    format!("unknown status {other:?}"),
                ));
            }
        };

        let mut choices: Vec<Choice> = query
            .alternatives
            .into_iter()
            .map(|choice| Choice {
                alternative: choice.path,
                priority: choice.priority,
                slaves: choice.slaves,
            })
            .collect();
        choices.sort_by(|a, b| a.alternative.cmp(&b.alternative));

        Ok(Self {
            name: query.name,
            absent: false,
            link: query.link,
            status: Some(status),
            value: match status {
                AlternativeStatus::Manual => query.value.unwrap_or_default(),
                AlternativeStatus::Auto => String::new(),
            },
            slaves: query.slaves,
            alternatives: choices,
        })
    }

    fn apply(&self, session: &Session<'_>) -> Result<()> {
        self.validate()?;
        let current = self.load(session)?;
        if current.satisfies(self) {
            debug!("alternative {} is up to date", self.name);
            return Ok(());
        }

        let run = |args: Vec<String>| -> Result<()> {
            session.run_checked(&Command::new(alternatives::PROGRAM).args(args))?;
            Ok(())
        };

        if self.absent {
            info!("removing alternative group {}", self.name);
            return run(alternatives::remove_all_args(&self.name));
        }

        for stale in current
            .alternatives
            .iter()
            .filter(|c| self.choice(&c.alternative).is_none())
        {
            run(alternatives::remove_args(&self.name, &stale.alternative))?;
        }

        let group_changed = current.absent || current.link != self.link || current.slaves != self.slaves;
        for choice in &self.alternatives {
            if group_changed || current.choice(&choice.alternative) != Some(choice) {
                info!("registering {} for {}", choice.alternative, self.name);
                session.run_checked(&self.install_command(choice))?;
            }
        }

        match self.status {
            Some(AlternativeStatus::Auto) => run(alternatives::auto_args(&self.name))?,
            Some(AlternativeStatus::Manual) => {
                run(alternatives::set_args(&self.name, &self.value))?;
            }
            None => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{CommandOutput, MemoryHost};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, Default)]
    struct Group {
        link: String,
        slaves: BTreeMap<String, String>,
        manual: Option<String>,
        choices: BTreeMap<String, (i32, BTreeMap<String, String>)>,
    }

    /// Scripted `update-alternatives` over an in-memory database.
    #[derive(Debug, Default)]
    struct FakeAlternatives {
        groups: BTreeMap<String, Group>,
    }

    impl FakeAlternatives {
        fn into_host(self) -> (MemoryHost, Arc<Mutex<Self>>) {
            let fake = Arc::new(Mutex::new(self));
            let shared = Arc::clone(&fake);
            let host = MemoryHost::new()
                .with_responder(move |command: &Command| shared.lock().unwrap().respond(command));
            (host, fake)
        }

        fn respond(&mut self, command: &Command) -> CommandOutput {
            let args: Vec<&str> = command.args.iter().map(String::as_str).collect();
            match args.as_slice() {
                ["--query", name] => self.query(name),
                ["--install", link, name, path, priority, rest @ ..] => {
                    let group = self.groups.entry((*name).to_string()).or_default();
                    group.link = (*link).to_string();
                    let mut slaves = BTreeMap::new();
                    for slave in rest.chunks(4) {
                        let [_, slave_link, slave_name, slave_path] = slave else {
                            return CommandOutput::failure(2, "", "bad --slave");
                        };
                        group
                            .slaves
                            .insert((*slave_name).to_string(), (*slave_link).to_string());
                        slaves.insert((*slave_name).to_string(), (*slave_path).to_string());
                    }
                    let priority = priority.parse().unwrap_or(0);
                    group.choices.insert((*path).to_string(), (priority, slaves));
                    CommandOutput::success("")
                }
                ["--remove", name, path] => {
                    if let Some(group) = self.groups.get_mut(*name) {
                        group.choices.remove(*path);
                        if group.manual.as_deref() == Some(*path) {
                            group.manual = None;
                        }
                        if group.choices.is_empty() {
                            self.groups.remove(*name);
                        }
                    }
                    CommandOutput::success("")
                }
                ["--remove-all", name] => {
                    self.groups.remove(*name);
                    CommandOutput::success("")
                }
                ["--auto", name] => {
                    if let Some(group) = self.groups.get_mut(*name) {
                        group.manual = None;
                    }
                    CommandOutput::success("")
                }
                ["--set", name, path] => match self.groups.get_mut(*name) {
                    Some(group) if group.choices.contains_key(*path) => {
                        group.manual = Some((*path).to_string());
                        CommandOutput::success("")
                    }
                    _ => CommandOutput::failure(2, "", "alternative not registered"),
                },
                _ => CommandOutput::failure(127, "", "not scripted"),
            }
        }

        fn query(&self, name: &str) -> CommandOutput {
            let Some(group) = self.groups.get(name) else {
                return CommandOutput::failure(
                    2,
                    "",
                    format!("update-alternatives: error: no alternatives for {name}\n"),
                );
            };
            let best = group
                .choices
                .iter()
                .max_by_key(|(_, (priority, _))| *priority)
                .map(|(path, _)| path.clone());
            let status = if group.manual.is_some() { "manual" } else { "auto" };
            let value = group.manual.clone().or_else(|| best.clone());

            let mut out = format!("Name: {name}\nLink: {}\n", group.link);
            if !group.slaves.is_empty() {
                out.push_str("Slaves:\n");
                for (slave, link) in &group.slaves {
                    out.push_str(&format!(" {slave} {link}\n"));
                }
            }
            out.push_str(&format!("Status: {status}\n"));
            out.push_str(&format!("Best: {}\n", best.as_deref().unwrap_or("none")));
            out.push_str(&format!("Value: {}\n", value.as_deref().unwrap_or("none")));
            for (path, (priority, slaves)) in &group.choices {
                out.push_str(&format!("\nAlternative: {path}\nPriority: {priority}\n"));
                if !slaves.is_empty() {
                    out.push_str("Slaves:\n");
                    for (slave, target) in slaves {
                        out.push_str(&format!(" {slave} {target}\n"));
                    }
                }
            }
            CommandOutput::success(out)
        }
    }

    fn editor() -> DpkgAlternative {
        serde_json::from_value(json!({
            "name": "editor",
            "link": "/usr/bin/editor",
            "status": "manual",
            "value": "/usr/bin/vim.basic",
            "slaves": {"editor.1.gz": "/usr/share/man/man1/editor.1.gz"},
            "alternatives": [
                {
                    "alternative": "/usr/bin/vim.basic",
                    "priority": 30,
                    "slaves": {"editor.1.gz": "/usr/share/man/man1/vim.1.gz"},
                },
                {
                    "alternative": "/bin/nano",
                    "priority": 40,
                    "slaves": {"editor.1.gz": "/usr/share/man/man1/nano.1.gz"},
                },
            ],
        }))
        .unwrap()
    }

    fn invocations(host: &MemoryHost) -> Vec<String> {
        host.commands()
            .iter()
            .filter(|c| c.args.first().is_some_and(|a| a != "--query"))
            .map(|c| c.args.join(" "))
            .collect()
    }

    #[test]
    fn test_contract() {
        assert!(declarative::check_contract::<DpkgAlternative>().is_ok());
    }

    #[test]
    fn test_validate() {
        assert!(editor().validate().is_ok());
        assert!(DpkgAlternative::absent("editor").validate().is_ok());

        let mut auto_with_value = editor();
        auto_with_value.status = Some(AlternativeStatus::Auto);
        assert!(auto_with_value.validate().is_err());

        let mut unknown_value = editor();
        unknown_value.value = "/usr/bin/emacs".into();
        assert!(unknown_value.validate().is_err());

        let mut undeclared_slave = editor();
        undeclared_slave.alternatives[0]
            .slaves
            .insert("editor.fr.1.gz".into(), "/usr/share/man/fr/man1/vim.1.gz".into());
        let err = undeclared_slave.validate().unwrap_err();
        assert!(err.to_string().contains("editor.fr.1.gz"));

        let mut unused_slave = editor();
        unused_slave
            .slaves
            .insert("editor.fr.1.gz".into(), "/usr/share/man/fr/man1/editor.1.gz".into());
        assert!(unused_slave.validate().is_err());

        let mut relative = editor();
        relative.link = "usr/bin/editor".into();
        assert!(relative.validate().is_err());
    }

    #[test]
    fn test_load_missing_group_is_absent() {
        let (host, _) = FakeAlternatives::default().into_host();
        let session = Session::new(&host);
        let loaded = DpkgAlternative::named("pager").load(&session).unwrap();
        assert_eq!(loaded, DpkgAlternative::absent("pager"));
    }

    #[test]
    fn test_load_failure_is_reported() {
        let host = MemoryHost::new().with_responder(|_| CommandOutput::failure(2, "", "permission denied"));
        let session = Session::new(&host);
        assert!(matches!(
            DpkgAlternative::named("editor").load(&session),
            Err(Error::Command(_))
        ));
    }

    #[test]
    fn test_apply_creates_group_and_converges() {
        let (host, _) = FakeAlternatives::default().into_host();
        let session = Session::new(&host);
        let target = editor();

        target.apply(&session).unwrap();
        let commands = invocations(&host);
        assert_eq!(commands.len(), 3);
        assert!(commands[0].starts_with("--install /usr/bin/editor editor /usr/bin/vim.basic 30"));
        assert!(commands[1].starts_with("--install /usr/bin/editor editor /bin/nano 40"));
        assert_eq!(commands[2], "--set editor /usr/bin/vim.basic");

        let loaded = target.load(&session).unwrap();
        assert!(loaded.satisfies(&target));
        assert_eq!(loaded.alternatives[0].alternative, "/bin/nano");

        host.clear_journal();
        target.apply(&session).unwrap();
        assert!(invocations(&host).is_empty());
    }

    #[test]
    fn test_apply_removes_stale_choice_and_switches_to_auto() {
        let (host, _) = FakeAlternatives::default().into_host();
        let session = Session::new(&host);
        editor().apply(&session).unwrap();
        host.clear_journal();

        let mut target = editor();
        target.status = Some(AlternativeStatus::Auto);
        target.value.clear();
        target.alternatives.retain(|c| c.alternative == "/bin/nano");

        target.apply(&session).unwrap();
        assert_eq!(
            invocations(&host),
            vec!["--remove editor /usr/bin/vim.basic", "--auto editor"]
        );
        assert!(target.load(&session).unwrap().satisfies(&target));
    }

    #[test]
    fn test_apply_absent_removes_group() {
        let (host, fake) = FakeAlternatives::default().into_host();
        let session = Session::new(&host);
        editor().apply(&session).unwrap();
        host.clear_journal();

        DpkgAlternative::absent("editor").apply(&session).unwrap();
        assert_eq!(invocations(&host), vec!["--remove-all editor"]);
        assert!(fake.lock().unwrap().groups.is_empty());

        host.clear_journal();
        DpkgAlternative::absent("editor").apply(&session).unwrap();
        assert!(invocations(&host).is_empty());
    }

    #[test]
    fn test_priority_change_is_refresh() {
        let current = editor();
        let mut target = editor();
        target.alternatives[1].priority = 60;
        assert!(!current.satisfies(&target));
        assert!(current.refresh_only(&target));
        let action = declarative::Action::classify(declarative::Comparison {
            satisfied: current.satisfies(&target),
            refresh_only: current.refresh_only(&target),
            ..declarative::Comparison::default()
        });
        assert_eq!(action, declarative::Action::Refresh);

        target.link = "/usr/local/bin/editor".into();
        assert!(!current.refresh_only(&target));
        assert!(!current.refresh_only(&editor()));
        assert!(!DpkgAlternative::absent("editor").refresh_only(&editor()));
    }

    #[test]
    fn test_merge_choices() {
        let mut a = DpkgAlternative::named("editor");
        a.alternatives.push(Choice {
            alternative: "/bin/nano".into(),
            priority: 40,
            ..Choice::default()
        });
        let mut b = a.clone();
        b.alternatives[0].priority = 50;

        let conflict = a.merge(&b).unwrap_err();
        assert_eq!(conflict.field, "alternatives[/bin/nano].priority");
        assert_eq!((conflict.left.as_str(), conflict.right.as_str()), ("40", "50"));

        let mut c = DpkgAlternative::named("editor");
        c.link = "/usr/bin/editor".into();
        let merged = a.merge(&c).unwrap();
        assert_eq!(merged.link, "/usr/bin/editor");
        assert_eq!(merged.alternatives.len(), 1);
    }
}
