//! Resource traits for declarative state management
//!
//! A resource is a typed, identified unit of desired host state. Every
//! resource type has exactly one identifying field and one `absent` flag;
//! when `absent` is set, every other field must be at its zero value.
//!
//! Two reconciliation shapes exist:
//!
//! - [`SingleResource`]: each instance converges on its own.
//! - [`GroupResource`]: all instances of the type are loaded and applied
//!   together, because the underlying tool reasons about the whole set
//!   (e.g. package conflicts).

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;

use crate::context::Session;
use crate::error::Result;
use crate::merge::MergeConflict;

/// How instances of a resource type are reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    /// Independently convergeable, one instance at a time
    Single,
    /// Loaded and applied as one batch per type
    Group,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::Group => write!(f, "group"),
        }
    }
}

/// Serde helper: skip a `bool` field when it is `false`.
pub fn is_false(value: &bool) -> bool {
    !*value
}

/// Core contract shared by every resource type.
///
/// The `Default` value of a type is its prototype: only the identifying
/// field may appear when it is serialized, which is checked when the type
/// is registered (see [`crate::Registry`]).
///
/// # Example
///
/// ```ignore
/// #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// struct Motd {
///     path: String,
///     #[serde(default, skip_serializing_if = "is_false")]
///     absent: bool,
///     #[serde(default, skip_serializing_if = "String::is_empty")]
///     text: String,
/// }
///
/// impl Resource for Motd {
///     const TYPE_NAME: &'static str = "motd";
///     const ID_FIELD: &'static str = "path";
///     const SHAPE: Shape = Shape::Single;
///
///     fn id(&self) -> &str { &self.path }
///     fn is_absent(&self) -> bool { self.absent }
///     fn named(id: &str) -> Self { Self { path: id.into(), ..Self::default() } }
///     fn absent(id: &str) -> Self { Self { absent: true, ..Self::named(id) } }
///     fn validate(&self) -> Result<()> { Ok(()) }
/// }
/// ```
pub trait Resource:
    fmt::Debug + Clone + Default + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Registered type name (e.g. "file")
    const TYPE_NAME: &'static str;

    /// Name of the identifying field in the serialized form
    const ID_FIELD: &'static str;

    /// Reconciliation shape
    const SHAPE: Shape;

    /// A valid identifying value, used to check the type at registration
    const SAMPLE_ID: &'static str = "sample";

    /// Identifying value
    fn id(&self) -> &str;

    /// Whether this resource declares non-existence
    fn is_absent(&self) -> bool;

    /// An instance with only the identifying field set.
    fn named(id: &str) -> Self;

    /// An instance declaring that `id` must not exist.
    fn absent(id: &str) -> Self;

    /// Check structural validity.
    fn validate(&self) -> Result<()>;

    /// Whether `self` (current state) meets every attribute set in `target`.
    ///
    /// Attributes left unset in `target` are wildcards. The default is full
    /// structural equality.
    fn satisfies(&self, target: &Self) -> bool {
        self == target
    }

    /// Whether the difference to `target` only needs an in-place refresh.
    ///
    /// Only consulted when `satisfies` is false. The default never refreshes.
    fn refresh_only(&self, _target: &Self) -> bool {
        false
    }

    /// Combine two declarations of the same resource.
    ///
    /// The default accepts identical declarations and rejects anything else.
    fn merge(&self, other: &Self) -> std::result::Result<Self, MergeConflict> {
        if self == other {
            Ok(self.clone())
        } else {
            Err(MergeConflict::new(
                Self::TYPE_NAME,
                render_json(self),
                render_json(other),
            ))
        }
    }
}

fn render_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!("<unserializable: {e}>"))
}

/// A resource converged one instance at a time.
pub trait SingleResource: Resource {
    /// Read live state for `self.id()`.
    ///
    /// Non-existence yields [`Resource::absent`], not an error.
    fn load(&self, session: &Session<'_>) -> Result<Self>;

    /// Fill in host-dependent fields (e.g. name to id lookups) without
    /// changing what the declaration means.
    fn resolve(&mut self, _session: &Session<'_>) -> Result<()> {
        Ok(())
    }

    /// Converge the host to `self`.
    fn apply(&self, session: &Session<'_>) -> Result<()>;
}

/// A resource whose instances must be loaded and applied together.
pub trait GroupResource: Resource {
    /// Read live state for every input, returning one output per input in
    /// the same order.
    fn load_group(session: &Session<'_>, resources: &[Self]) -> Result<Vec<Self>>;

    /// Resolve host-dependent fields of the whole batch.
    fn resolve_group(_session: &Session<'_>, _resources: &mut [Self]) -> Result<()> {
        Ok(())
    }

    /// Converge the host to the whole batch.
    fn apply_group(session: &Session<'_>, resources: &[Self]) -> Result<()>;
}
