//! Merging duplicate declarations
//!
//! The same resource may be declared in several manifests. Declarations are
//! combined field by field: a field set on one side only is carried over,
//! equal values are kept, and differing concrete values are a conflict.
//! A conflict never picks a winner.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use thiserror::Error;

/// Two declarations set the same field to different values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {left} conflicts with {right}")]
pub struct MergeConflict {
    /// Dotted path of the conflicting field
    pub field: String,
    /// Rendered value from the first declaration
    pub left: String,
    /// Rendered value from the second declaration
    pub right: String,
}

impl MergeConflict {
    pub fn new(field: impl Into<String>, left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            left: left.into(),
            right: right.into(),
        }
    }

    /// Prefix the field path, for conflicts found inside nested values.
    #[must_use]
    pub fn within(mut self, parent: &str) -> Self {
        self.field = format!("{parent}.{}", self.field);
        self
    }
}

/// Merge two optional values; `None` is unset.
pub fn merge_option<T>(
    field: &str,
    left: &Option<T>,
    right: &Option<T>,
) -> Result<Option<T>, MergeConflict>
where
    T: Clone + PartialEq + fmt::Debug,
{
    merge_option_by(field, left, right, |value| format!("{value:?}"))
}

/// Merge two optional values, rendering conflicts with `render`.
pub fn merge_option_by<T, F>(
    field: &str,
    left: &Option<T>,
    right: &Option<T>,
    render: F,
) -> Result<Option<T>, MergeConflict>
where
    T: Clone + PartialEq,
    F: Fn(&T) -> String,
{
    match (left, right) {
        (Some(l), Some(r)) if l != r => Err(MergeConflict::new(field, render(l), render(r))),
        (Some(value), _) | (None, Some(value)) => Ok(Some(value.clone())),
        (None, None) => Ok(None),
    }
}

/// Merge two values where the zero value means unset.
pub fn merge_value<T>(field: &str, left: &T, right: &T) -> Result<T, MergeConflict>
where
    T: Clone + Default + PartialEq + fmt::Debug,
{
    let zero = T::default();
    if *left == zero {
        Ok(right.clone())
    } else if *right == zero || left == right {
        Ok(left.clone())
    } else {
        Err(MergeConflict::new(field, format!("{left:?}"), format!("{right:?}")))
    }
}

/// Merge two flags where `false` means unset.
pub fn merge_flag(left: bool, right: bool) -> bool {
    left || right
}

/// Merge two maps key by key, combining shared keys with `merge`.
pub fn merge_map<K, V, F>(
    field: &str,
    left: &BTreeMap<K, V>,
    right: &BTreeMap<K, V>,
    merge: F,
) -> Result<BTreeMap<K, V>, MergeConflict>
where
    K: Ord + Clone + fmt::Display,
    V: Clone,
    F: Fn(&V, &V) -> Result<V, MergeConflict>,
{
    let mut merged = left.clone();
    for (key, value) in right {
        let combined = match left.get(key) {
            Some(existing) => merge(existing, value).map_err(|c| c.within(&format!("{field}[{key}]")))?,
            None => value.clone(),
        };
        merged.insert(key.clone(), combined);
    }
    Ok(merged)
}

/// A merge conflict between two declarations, with where they came from.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "conflicting declarations of {kind} {id:?}: {} is {} in {} but {} in {}",
    .conflict.field, .conflict.left, SourceDisplay(.left_source.as_deref()),
    .conflict.right, SourceDisplay(.right_source.as_deref())
)]
pub struct MergeError {
    /// Resource type name
    pub kind: String,
    /// Identifying value
    pub id: String,
    pub conflict: MergeConflict,
    /// Source of the first declaration
    pub left_source: Option<String>,
    /// Source of the second declaration
    pub right_source: Option<String>,
}

struct SourceDisplay<'a>(Option<&'a str>);

impl fmt::Display for SourceDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(source) => write!(f, "{source}"),
            None => write!(f, "<unknown source>"),
        }
    }
}

/// A declaration together with its source label.
#[derive(Debug, Clone, PartialEq)]
pub struct Sourced<R> {
    pub resource: R,
    /// e.g. "base.toml:file[2]"
    pub source: Option<String>,
}

impl<R> Sourced<R> {
    pub fn new(resource: R, source: impl Into<String>) -> Self {
        Self {
            resource,
            source: Some(source.into()),
        }
    }

    pub fn unsourced(resource: R) -> Self {
        Self {
            resource,
            source: None,
        }
    }
}

/// One slot of a merged declaration list.
#[derive(Debug, Clone, PartialEq)]
pub enum Merged<R> {
    /// First declaration of a resource, holding the merge of all of them
    Primary(Sourced<R>),
    /// A later declaration, folded into the primary at this index
    Into { index: usize, source: Option<String> },
}

/// Merge duplicate declarations, keeping one slot per input.
///
/// `key` returns the `(type name, id)` pair identifying a declaration.
/// Declarations with the same key are folded into the first one; the later
/// ones become [`Merged::Into`] slots.
pub fn merge_declarations<R, K, F>(
    declarations: Vec<Sourced<R>>,
    key: K,
    merge: F,
) -> Result<Vec<Merged<R>>, MergeError>
where
    K: Fn(&R) -> (String, String),
    F: Fn(&R, &R) -> Result<R, MergeConflict>,
{
    let mut slots: Vec<Merged<R>> = Vec::with_capacity(declarations.len());
    let mut primaries: HashMap<(String, String), usize> = HashMap::new();

    for declaration in declarations {
        let identity = key(&declaration.resource);
        match primaries.get(&identity) {
            Some(&index) => {
                if let Merged::Primary(primary) = &mut slots[index] {
                    primary.resource = merge(&primary.resource, &declaration.resource).map_err(
                        |conflict| MergeError {
                            kind: identity.0.clone(),
                            id: identity.1.clone(),
                            conflict,
                            left_source: primary.source.clone(),
                            right_source: declaration.source.clone(),
                        },
                    )?;
                }
                slots.push(Merged::Into {
                    index,
                    source: declaration.source,
                });
            }
            None => {
                primaries.insert(identity, slots.len());
                slots.push(Merged::Primary(declaration));
            }
        }
    }
    Ok(slots)
}
