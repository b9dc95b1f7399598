//! Concrete resource types for keel
//!
//! Every type keel can converge is a variant of [`AnyResource`]. The union
//! is what the registry decodes into and what the engine plans over; each
//! variant keeps its own reconciler:
//! - `file` converges one path (and its subtree) at a time
//! - `apt_package` is loaded and applied as one batch per run
//! - `dpkg_alternative` converges one alternative group at a time

pub mod apt_package;
pub mod dpkg_alternative;
pub mod file;

use declarative::{
    Error, GroupResource, MergeConflict, Registry, Resource, Result, Session, Shape,
    SingleResource,
};
use serde::Serialize;
use std::slice;

pub use apt_package::AptPackage;
pub use dpkg_alternative::DpkgAlternative;
pub use file::File;

/// Registry of every resource type keel ships with.
pub fn builtin_registry() -> Registry<AnyResource> {
    Registry::new()
        .register::<File>(AnyResource::File)
        .register::<AptPackage>(AnyResource::AptPackage)
        .register::<DpkgAlternative>(AnyResource::DpkgAlternative)
}

/// Map an aptkit failure onto the reconciler error taxonomy.
pub(crate) fn tool_error(error: aptkit::Error) -> Error {
    match error {
        aptkit::Error::Parse {
            tool,
            line,
            message,
        } => Error::parse(tool, format!("line {line}: {message}")),
        aptkit::Error::DebconfReply { .. } => {
            Error::parse(aptkit::debconf::COMMUNICATE_PROGRAM, error.to_string())
        }
        other => Error::parse("aptkit", other.to_string()),
    }
}

/// Closed set of resource types.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnyResource {
    File(File),
    AptPackage(AptPackage),
    DpkgAlternative(DpkgAlternative),
}

macro_rules! each {
    ($value:expr, $r:ident => $body:expr) => {
        match $value {
            AnyResource::File($r) => $body,
            AnyResource::AptPackage($r) => $body,
            AnyResource::DpkgAlternative($r) => $body,
        }
    };
}

fn type_name_of<R: Resource>(_: &R) -> &'static str {
    R::TYPE_NAME
}

fn shape_of<R: Resource>(_: &R) -> Shape {
    R::SHAPE
}

impl AnyResource {
    pub fn type_name(&self) -> &'static str {
        each!(self, r => type_name_of(r))
    }

    pub fn id(&self) -> &str {
        each!(self, r => r.id())
    }

    pub fn is_absent(&self) -> bool {
        each!(self, r => r.is_absent())
    }

    pub fn shape(&self) -> Shape {
        each!(self, r => shape_of(r))
    }

    pub fn validate(&self) -> Result<()> {
        each!(self, r => r.validate())
    }

    /// Whether `self` (current state) meets `target`. Different types never do.
    pub fn satisfies(&self, target: &Self) -> bool {
        match (self, target) {
            (Self::File(current), Self::File(target)) => current.satisfies(target),
            (Self::AptPackage(current), Self::AptPackage(target)) => current.satisfies(target),
            (Self::DpkgAlternative(current), Self::DpkgAlternative(target)) => {
                current.satisfies(target)
            }
            _ => false,
        }
    }

    pub fn refresh_only(&self, target: &Self) -> bool {
        match (self, target) {
            (Self::File(current), Self::File(target)) => current.refresh_only(target),
            (Self::AptPackage(current), Self::AptPackage(target)) => current.refresh_only(target),
            (Self::DpkgAlternative(current), Self::DpkgAlternative(target)) => {
                current.refresh_only(target)
            }
            _ => false,
        }
    }

    pub fn merge(&self, other: &Self) -> std::result::Result<Self, MergeConflict> {
        match (self, other) {
            (Self::File(l), Self::File(r)) => l.merge(r).map(Self::File),
            (Self::AptPackage(l), Self::AptPackage(r)) => l.merge(r).map(Self::AptPackage),
            (Self::DpkgAlternative(l), Self::DpkgAlternative(r)) => {
                l.merge(r).map(Self::DpkgAlternative)
            }
            _ => Err(MergeConflict::new(
                "type",
                self.type_name(),
                other.type_name(),
            )),
        }
    }

    /// Pretty JSON rendering, as declared in a manifest.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("<unserializable: {e}>"))
    }

    /// Fill in host-dependent fields.
    pub fn resolve(&mut self, session: &Session<'_>) -> Result<()> {
        match self {
            Self::File(file) => file.resolve(session),
            Self::AptPackage(package) => {
                AptPackage::resolve_group(session, slice::from_mut(package))
            }
            Self::DpkgAlternative(alternative) => alternative.resolve(session),
        }
    }

    /// Read live state for this declaration alone.
    pub fn load(&self, session: &Session<'_>) -> Result<Self> {
        let mut loaded = load_all(session, slice::from_ref(self))?;
        loaded
            .pop()
            .ok_or_else(|| Error::parse(self.type_name(), "load returned no state"))
    }

    /// Converge the host to this declaration alone.
    pub fn apply(&self, session: &Session<'_>) -> Result<()> {
        match self {
            Self::File(file) => file.apply(session),
            Self::AptPackage(package) => AptPackage::apply_group(session, slice::from_ref(package)),
            Self::DpkgAlternative(alternative) => alternative.apply(session),
        }
    }
}

/// Load current state for every declaration, keeping input order.
///
/// Single resources are loaded one at a time; every group type is loaded
/// with one batched call.
pub fn load_all(session: &Session<'_>, resources: &[AnyResource]) -> Result<Vec<AnyResource>> {
    let mut loaded: Vec<Option<AnyResource>> = vec![None; resources.len()];

    let mut packages = Vec::new();
    let mut package_slots = Vec::new();
    for (slot, resource) in resources.iter().enumerate() {
        match resource {
            AnyResource::File(file) => loaded[slot] = Some(AnyResource::File(file.load(session)?)),
            AnyResource::DpkgAlternative(alternative) => {
                loaded[slot] = Some(AnyResource::DpkgAlternative(alternative.load(session)?));
            }
            AnyResource::AptPackage(package) => {
                packages.push(package.clone());
                package_slots.push(slot);
            }
        }
    }

    if !packages.is_empty() {
        let current = AptPackage::load_group(session, &packages)?;
        for (slot, package) in package_slots.into_iter().zip(current) {
            loaded[slot] = Some(AnyResource::AptPackage(package));
        }
    }

    loaded
        .into_iter()
        .zip(resources)
        .map(|(state, resource)| {
            state.ok_or_else(|| {
                Error::parse(resource.type_name(), format!("no state loaded for {}", resource.id()))
            })
        })
        .collect()
}

/// Converge all declarations of one group type together.
pub fn apply_group(session: &Session<'_>, batch: &[AnyResource]) -> Result<()> {
    let packages = batch
        .iter()
        .map(|resource| match resource {
            AnyResource::AptPackage(package) => Ok(package.clone()),
            other => Err(Error::validation(
                other.type_name(),
                other.id(),
                "type",
                "cannot be applied as part of an apt_package batch",
            )),
        })
        .collect::<Result<Vec<_>>>()?;
    AptPackage::apply_group(session, &packages)
}
