//! Planning: declarations in, classified actions out
//!
//! Nothing here mutates the host. Planning decodes nothing either; it takes
//! sourced declarations from the manifest loader and:
//! 1. validates each declaration
//! 2. merges duplicates by (type, id)
//! 3. resolves host-dependent fields
//! 4. loads current state (group types in one batch per type)
//! 5. classifies one [`Action`] per declaration

use anyhow::{Context as AnyhowContext, Result};
use declarative::{Action, ActionSummary, Comparison, Merged, Session, Sourced, merge_declarations};

use crate::resource::{self, AnyResource};

/// One declaration with its planned action.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedResource {
    /// The merged, resolved declaration
    pub target: AnyResource,
    /// Live state, `None` for declarations merged into another one
    pub current: Option<AnyResource>,
    pub action: Action,
    /// Manifest label of the declaration
    pub source: Option<String>,
    /// Index of the entry this declaration was merged into
    pub merged_into: Option<usize>,
}

impl PlannedResource {
    pub fn label(&self) -> String {
        format!("{}[{}]", self.target.type_name(), self.target.id())
    }
}

/// Planned actions in manifest order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub entries: Vec<PlannedResource>,
}

impl Plan {
    pub fn summary(&self) -> ActionSummary {
        self.entries.iter().map(|e| e.action).collect()
    }

    /// Entries that will mutate the host.
    pub fn actionable(&self) -> impl Iterator<Item = &PlannedResource> {
        self.entries.iter().filter(|e| e.action.is_actionable())
    }

    pub fn is_converged(&self) -> bool {
        self.actionable().next().is_none()
    }

    /// Keep only declarations of `type_name`.
    #[must_use]
    pub fn only_type(mut self, type_name: &str) -> Self {
        self.entries.retain(|e| e.target.type_name() == type_name);
        self
    }
}

fn label(source: Option<&str>, resource: &AnyResource) -> String {
    source.map_or_else(
        || format!("{}[{}]", resource.type_name(), resource.id()),
        str::to_string,
    )
}

/// Build the plan for `declarations` against the session's host.
pub fn plan(session: &Session<'_>, declarations: Vec<Sourced<AnyResource>>) -> Result<Plan> {
    for declaration in &declarations {
        declaration
            .resource
            .validate()
            .with_context(|| label(declaration.source.as_deref(), &declaration.resource))?;
    }

    let slots = merge_declarations(
        declarations,
        |r: &AnyResource| (r.type_name().to_string(), r.id().to_string()),
        AnyResource::merge,
    )?;

    let mut primaries: Vec<(usize, AnyResource, Option<String>)> = Vec::new();
    for (slot, merged) in slots.iter().enumerate() {
        if let Merged::Primary(primary) = merged {
            let mut target = primary.resource.clone();
            let name = label(primary.source.as_deref(), &target);
            target
                .validate()
                .with_context(|| format!("{name} after merging duplicates"))?;
            target
                .resolve(session)
                .with_context(|| format!("Failed to resolve {name}"))?;
            primaries.push((slot, target, primary.source.clone()));
        }
    }

    let targets: Vec<AnyResource> = primaries.iter().map(|(_, t, _)| t.clone()).collect();
    let current = resource::load_all(session, &targets).context("Failed to load current state")?;
    log::info!("loaded current state of {} resources", current.len());

    let mut entries: Vec<Option<PlannedResource>> = vec![None; slots.len()];
    for ((slot, target, source), current) in primaries.into_iter().zip(current) {
        let action = Action::classify(Comparison {
            satisfied: current.satisfies(&target),
            merged_away: false,
            refresh_only: current.refresh_only(&target),
            current_absent: current.is_absent(),
            target_absent: target.is_absent(),
        });
        log::debug!("{}[{}]: {action}", target.type_name(), target.id());
        entries[slot] = Some(PlannedResource {
            target,
            current: Some(current),
            action,
            source,
            merged_into: None,
        });
    }

    for (slot, merged) in slots.into_iter().enumerate() {
        if let Merged::Into { index, source } = merged {
            let target = entries[index]
                .as_ref()
                .map(|primary| primary.target.clone())
                .context("merged declaration points at a missing entry")?;
            entries[slot] = Some(PlannedResource {
                target,
                current: None,
                action: Action::MergedAway,
                source,
                merged_into: Some(index),
            });
        }
    }

    let entries = entries
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .context("plan has an unfilled slot")?;
    Ok(Plan { entries })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest;
    use crate::resource::apt_package::testing::FakeApt;
    use crate::resource::builtin_registry;

    fn declarations(content: &str) -> Vec<Sourced<AnyResource>> {
        manifest::parse("m.toml", content, &builtin_registry()).unwrap()
    }

    #[test]
    fn test_classifies_each_declaration() {
        let (host, _) = FakeApt::default()
            .with_package("curl", "amd64", "8.5.0-2")
            .with_package("nano", "amd64", "7.2")
            .into_host();
        host.add_file("/etc/motd", "welcome\n");
        let session = Session::new(&host);

        let plan = plan(
            &session,
            declarations(
                r#"
[[file]]
path = "/etc/motd"
regular_file = "welcome\n"
uid = 0
gid = 0

[[file]]
path = "/etc/issue"
regular_file = "keel\n"

[[apt_package]]
package = "curl"

[[apt_package]]
package = "nano"
absent = true
"#,
            ),
        )
        .unwrap();

        let actions: Vec<Action> = plan.entries.iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![
                Action::NoOp,
                Action::Reconfigure,
                Action::NoOp,
                Action::Destroy
            ]
        );
        assert_eq!(plan.summary().actionable(), 2);
        assert_eq!(plan.entries[1].source.as_deref(), Some("m.toml:file[1]"));
        assert!(plan.entries[1].current.as_ref().unwrap().is_absent());
        assert!(host.mutations().is_empty());
    }

    #[test]
    fn test_duplicates_merge_away() {
        let (host, _) = FakeApt::default().into_host();
        let session = Session::new(&host);

        let plan = plan(
            &session,
            declarations(
                r#"
[[file]]
path = "/etc/motd"
mode = "0644"
regular_file = "hi"

[[file]]
path = "/etc/motd"
regular_file = "hi"
uid = 0
"#,
            ),
        )
        .unwrap();

        assert_eq!(plan.entries[0].action, Action::Reconfigure);
        assert_eq!(plan.entries[1].action, Action::MergedAway);
        assert_eq!(plan.entries[1].merged_into, Some(0));
        assert_eq!(plan.entries[1].target, plan.entries[0].target);
        assert_eq!(plan.actionable().count(), 1);
    }

    #[test]
    fn test_merge_conflict_names_both_sources() {
        let (host, _) = FakeApt::default().into_host();
        let session = Session::new(&host);

        let err = plan(
            &session,
            declarations(
                r#"
[[file]]
path = "/etc/x"
mode = "0644"
regular_file = "a"

[[file]]
path = "/etc/x"
mode = "0600"
regular_file = "a"
"#,
            ),
        )
        .unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("m.toml:file[0]"), "{message}");
        assert!(message.contains("m.toml:file[1]"), "{message}");
        assert!(message.contains("0o644") && message.contains("0o600"), "{message}");
    }

    #[test]
    fn test_invalid_declaration_is_labelled() {
        let (host, _) = FakeApt::default().into_host();
        let session = Session::new(&host);

        let err = plan(
            &session,
            declarations("[[apt_package]]\npackage = \"wget\"\nversion = \"1.0\"\n"),
        )
        .unwrap_err();
        let message = format!("{err:#}");
        assert!(message.starts_with("m.toml:apt_package[0]"), "{message}");
        assert!(message.contains("hold must be set when version is set"), "{message}");
        assert!(host.commands().is_empty());
    }

    #[test]
    fn test_unknown_owner_fails_resolution() {
        let (host, _) = FakeApt::default().into_host();
        let session = Session::new(&host);

        let err = plan(
            &session,
            declarations("[[file]]\npath = \"/etc/x\"\nregular_file = \"a\"\nuser = \"nobody\"\n"),
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("unknown user: nobody"));
    }

    #[test]
    fn test_only_type() {
        let (host, _) = FakeApt::default().into_host();
        let session = Session::new(&host);
        let plan = plan(
            &session,
            declarations(
                "[[file]]\npath = \"/etc/x\"\nregular_file = \"a\"\n\n[[apt_package]]\npackage = \"curl\"\n",
            ),
        )
        .unwrap()
        .only_type("apt_package");
        assert_eq!(plan.entries.len(), 1);
        assert_eq!(plan.entries[0].target.id(), "curl");
    }
}
