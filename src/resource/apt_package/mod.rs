//! APT packages, reconciled as one batch
//!
//! apt resolves conflicts and dependencies across everything it is asked to
//! change, so every declared package is loaded with a single `dpkg-query`
//! and applied with a single `apt-get install`.

mod apply;
mod debconf;
mod load;
#[cfg(test)]
pub mod testing;

use aptkit::validate;
use declarative::merge::{merge_flag, merge_map, merge_value};
use declarative::{
    Error, GroupResource, MergeConflict, Resource, Result, Session, Shape, is_false,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One Debian package.
///
/// A pinned `version` always comes with `hold`, so "pin this build" and
/// "keep whatever is installed" cannot be confused.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AptPackage {
    pub package: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub absent: bool,
    /// Empty means the system default architecture
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub architectures: BTreeSet<String>,
    /// Empty means any installed version
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub hold: bool,
    /// Question name to answer
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub debconf_selections: BTreeMap<String, DebconfAnswer>,
}

/// A debconf answer and whether the question counts as seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DebconfAnswer {
    pub answer: String,
    #[serde(default = "default_seen")]
    pub seen: bool,
}

const fn default_seen() -> bool {
    true
}

impl DebconfAnswer {
    pub fn new(answer: impl Into<String>, seen: bool) -> Self {
        Self {
            answer: answer.into(),
            seen,
        }
    }

    fn merge(&self, other: &Self) -> std::result::Result<Self, MergeConflict> {
        if self.answer != other.answer {
            return Err(MergeConflict::new("answer", &self.answer, &other.answer));
        }
        if self.seen != other.seen {
            return Err(MergeConflict::new(
                "seen",
                self.seen.to_string(),
                other.seen.to_string(),
            ));
        }
        Ok(self.clone())
    }
}

fn invalid(package: &str, field: &str, message: impl Into<String>) -> Error {
    Error::validation(AptPackage::TYPE_NAME, package, field, message)
}

impl AptPackage {
    /// Pin `version` and hold it.
    #[must_use]
    pub fn pinned(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self.hold = true;
        self
    }

    #[must_use]
    pub fn with_selection(mut self, question: &str, answer: &str) -> Self {
        self.debconf_selections
            .insert(question.to_string(), DebconfAnswer::new(answer, true));
        self
    }

    /// apt-get arguments for converging to this declaration.
    pub fn install_args(&self) -> Vec<String> {
        if self.absent {
            return vec![aptkit::apt::remove_arg(&self.package)];
        }
        let version = Some(self.version.as_str());
        if self.architectures.is_empty() {
            return vec![aptkit::apt::install_arg(&self.package, None, version)];
        }
        self.architectures
            .iter()
            .map(|arch| aptkit::apt::install_arg(&self.package, Some(arch), version))
            .collect()
    }

    /// dpkg-query terms covering this declaration.
    pub fn queries(&self) -> Vec<String> {
        if self.architectures.is_empty() {
            return vec![aptkit::dpkg::query_for(&self.package, None)];
        }
        self.architectures
            .iter()
            .map(|arch| aptkit::dpkg::query_for(&self.package, Some(arch)))
            .collect()
    }

    /// Questions whose declared answer differs from `current`.
    fn unsatisfied_selections<'a>(
        &'a self,
        current: &'a Self,
    ) -> impl Iterator<Item = (&'a String, &'a DebconfAnswer)> {
        self.debconf_selections
            .iter()
            .filter(|(question, answer)| current.debconf_selections.get(*question) != Some(*answer))
    }
}

impl Resource for AptPackage {
    const TYPE_NAME: &'static str = "apt_package";
    const ID_FIELD: &'static str = "package";
    const SHAPE: Shape = Shape::Group;
    const SAMPLE_ID: &'static str = "coreutils";

    fn id(&self) -> &str {
        &self.package
    }

    fn is_absent(&self) -> bool {
        self.absent
    }

    fn named(id: &str) -> Self {
        Self {
            package: id.to_string(),
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
        validate::package_name(&self.package)
            .map_err(|e| invalid(&self.package, "package", e.to_string()))?;

        if self.absent {
            if !self.architectures.is_empty()
                || !self.version.is_empty()
                || self.hold
                || !self.debconf_selections.is_empty()
            {
                return Err(invalid(
                    &self.package,
                    "absent",
                    "architectures, version, hold and debconf_selections must not be set when absent",
                ));
            }
            return Ok(());
        }

        if !self.version.is_empty() {
            validate::version(&self.version)
                .map_err(|e| invalid(&self.package, "version", e.to_string()))?;
            if !self.hold {
                return Err(invalid(&self.package, "hold", "hold must be set when version is set"));
            }
        } else if self.hold {
            return Err(invalid(&self.package, "version", "version must be set when hold is set"));
        }

        for arch in &self.architectures {
            validate::architecture(arch)
                .map_err(|e| invalid(&self.package, "architectures", e.to_string()))?;
        }
        for (question, selection) in &self.debconf_selections {
            validate::question(question)
                .and_then(|()| validate::answer(question, &selection.answer))
                .map_err(|e| invalid(&self.package, "debconf_selections", e.to_string()))?;
        }
        Ok(())
    }

    fn satisfies(&self, target: &Self) -> bool {
        if target.absent || self.absent {
            return target.absent == self.absent;
        }
        (target.version.is_empty() || target.version == self.version)
            && (target.architectures.is_empty() || target.architectures == self.architectures)
            && target.hold == self.hold
            && target.unsatisfied_selections(self).next().is_none()
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
            package: self.package.clone(),
            absent: self.absent,
            architectures: self.architectures.union(&other.architectures).cloned().collect(),
            version: merge_value("version", &self.version, &other.version)?,
            hold: merge_flag(self.hold, other.hold),
            debconf_selections: merge_map(
                "debconf_selections",
                &self.debconf_selections,
                &other.debconf_selections,
                DebconfAnswer::merge,
            )?,
        })
    }
}

impl GroupResource for AptPackage {
    fn load_group(session: &Session<'_>, resources: &[Self]) -> Result<Vec<Self>> {
        load::load(session, resources)
    }

    fn apply_group(session: &Session<'_>, resources: &[Self]) -> Result<()> {
        apply::apply(session, resources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_contract() {
        assert!(declarative::check_contract::<AptPackage>().is_ok());
    }

    #[test]
    fn test_version_requires_hold() {
        let package = AptPackage {
            version: "1.0".into(),
            ..AptPackage::named("wget")
        };
        let err = package.validate().unwrap_err();
        assert!(err.to_string().contains("hold must be set when version is set"));

        assert!(AptPackage::named("wget").pinned("1.0").validate().is_ok());
    }

    #[test]
    fn test_hold_requires_version() {
        let package = AptPackage {
            hold: true,
            ..AptPackage::named("wget")
        };
        let err = package.validate().unwrap_err();
        assert!(err.to_string().contains("version must be set when hold is set"));
    }

    #[test]
    fn test_absent_rejects_attributes() {
        assert!(AptPackage::absent("curl").validate().is_ok());
        let held = AptPackage {
            hold: true,
            ..AptPackage::absent("curl")
        };
        assert!(held.validate().is_err());
    }

    #[test]
    fn test_validate_syntax() {
        assert!(AptPackage::named("Curl").validate().is_err());
        assert!(AptPackage::named("curl").pinned("not a version").validate().is_err());

        let mut arch = AptPackage::named("curl");
        arch.architectures.insert("AMD64".into());
        let err = arch.validate().unwrap_err();
        assert!(err.to_string().contains("architectures"));

        let question = AptPackage::named("tzdata").with_selection("bad question", "x");
        assert!(question.validate().is_err());
    }

    #[test]
    fn test_multiline_answer_is_rejected() {
        let package = AptPackage::named("tzdata")
            .with_selection("tzdata/Areas", "Europe\nset mysql-server/root_password x");
        let err = package.validate().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("debconf_selections"), "{message}");
        assert!(message.contains("tzdata/Areas"), "{message}");

        let ok = AptPackage::named("tzdata").with_selection("tzdata/Areas", "Europe");
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_install_args() {
        assert_eq!(AptPackage::named("curl").install_args(), vec!["curl"]);
        assert_eq!(AptPackage::absent("curl").install_args(), vec!["curl-"]);
        assert_eq!(
            AptPackage::named("curl").pinned("8.5.0-2").install_args(),
            vec!["curl=8.5.0-2"]
        );

        let mut multi = AptPackage::named("libc6");
        multi.architectures = ["amd64".to_string(), "i386".to_string()].into();
        assert_eq!(multi.install_args(), vec!["libc6:amd64", "libc6:i386"]);
        assert_eq!(multi.queries(), vec!["libc6:amd64", "libc6:i386"]);
    }

    fn installed(version: &str, arch: &str) -> AptPackage {
        AptPackage {
            version: version.into(),
            architectures: [arch.to_string()].into(),
            ..AptPackage::named("curl")
        }
    }

    #[test]
    fn test_satisfies_wildcards() {
        let current = installed("8.5.0-2", "amd64").with_selection("curl/q", "yes");
        assert!(current.satisfies(&AptPackage::named("curl")));
        assert!(!current.satisfies(&AptPackage::absent("curl")));
        assert!(AptPackage::absent("curl").satisfies(&AptPackage::absent("curl")));
        assert!(!AptPackage::absent("curl").satisfies(&AptPackage::named("curl")));

        assert!(current.satisfies(&AptPackage::named("curl").with_selection("curl/q", "yes")));
        assert!(!current.satisfies(&AptPackage::named("curl").with_selection("curl/q", "no")));
        assert!(!current.satisfies(&AptPackage::named("curl").pinned("8.5.0-2")));

        let held = AptPackage {
            hold: true,
            ..current
        };
        assert!(held.satisfies(&AptPackage::named("curl").pinned("8.5.0-2")));
        assert!(!held.satisfies(&AptPackage::named("curl")));
    }

    #[test]
    fn test_merge() {
        let mut a = AptPackage::named("tzdata").with_selection("tzdata/Areas", "Europe");
        a.architectures.insert("amd64".into());
        let mut b = AptPackage::named("tzdata").pinned("2024a-1");
        b.architectures.insert("i386".into());

        let merged = a.merge(&b).unwrap();
        assert_eq!(merged.architectures.len(), 2);
        assert_eq!(merged.version, "2024a-1");
        assert!(merged.hold);
        assert_eq!(merged.debconf_selections.len(), 1);

        let c = AptPackage::named("tzdata").with_selection("tzdata/Areas", "Asia");
        let conflict = a.merge(&c).unwrap_err();
        assert_eq!(conflict.field, "debconf_selections[tzdata/Areas].answer");

        let d = AptPackage::named("tzdata").pinned("2023c-1");
        assert_eq!(b.merge(&d).unwrap_err().field, "version");
        assert_eq!(a.merge(&AptPackage::absent("tzdata")).unwrap_err().field, "absent");
    }

    #[test]
    fn test_decode() {
        let package: AptPackage = serde_json::from_value(json!({
            "package": "tzdata",
            "debconf_selections": {
                "tzdata/Areas": {"answer": "Europe"},
                "tzdata/Zones/Europe": {"answer": "Berlin", "seen": false},
            },
        }))
        .unwrap();
        assert!(package.debconf_selections["tzdata/Areas"].seen);
        assert!(!package.debconf_selections["tzdata/Zones/Europe"].seen);
    }
}
