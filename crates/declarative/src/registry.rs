//! Resource type registry
//!
//! Maps a type name to its prototype, shape and decoder. A registry is built
//! once at startup and passed by reference to whatever decodes and plans
//! resources. It is generic over the application's closed resource union
//! `A`, so lookups hand back values the application can match on.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::resource::{Resource, Shape};

type Prototype<A> = Box<dyn Fn(&str) -> A + Send + Sync>;
type Decoder<A> = Box<dyn Fn(serde_json::Value) -> Result<A> + Send + Sync>;

struct Entry<A> {
    shape: Shape,
    id_field: &'static str,
    instantiate: Prototype<A>,
    decode: Decoder<A>,
}

/// Registry of resource types wrapped into the union `A`.
pub struct Registry<A> {
    entries: BTreeMap<&'static str, Entry<A>>,
}

impl<A> Default for Registry<A> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<A: 'static> Registry<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register resource type `R`, wrapped into `A` by `wrap`.
    ///
    /// # Panics
    ///
    /// Panics if the type name is already registered or `R` breaks the
    /// structural contract checked by [`check_contract`]. Both are
    /// programming defects, not runtime conditions.
    #[must_use]
    pub fn register<R: Resource>(mut self, wrap: fn(R) -> A) -> Self {
        if let Err(message) = check_contract::<R>() {
            panic!("resource type {:?} breaks the contract: {message}", R::TYPE_NAME);
        }
        assert!(
            !self.entries.contains_key(R::TYPE_NAME),
            "resource type {:?} registered twice",
            R::TYPE_NAME
        );

        log::trace!("registered resource type {} ({})", R::TYPE_NAME, R::SHAPE);
        self.entries.insert(
            R::TYPE_NAME,
            Entry {
                shape: R::SHAPE,
                id_field: R::ID_FIELD,
                instantiate: Box::new(move |id: &str| wrap(R::named(id))),
                decode: Box::new(move |value: serde_json::Value| {
                    serde_json::from_value::<R>(value)
                        .map(wrap)
                        .map_err(|e| Error::Decode {
                            kind: R::TYPE_NAME.to_string(),
                            message: e.to_string(),
                        })
                }),
            },
        );
        self
    }

    fn entry(&self, name: &str) -> Result<&Entry<A>> {
        self.entries
            .get(name)
            .ok_or_else(|| Error::UnknownType(name.to_string()))
    }

    /// Zero-valued instance of a type.
    pub fn prototype(&self, name: &str) -> Result<A> {
        self.instantiate(name, "")
    }

    /// Instance of a type with only its identifying field set.
    pub fn instantiate(&self, name: &str, id: &str) -> Result<A> {
        Ok((self.entry(name)?.instantiate)(id))
    }

    /// All registered type names, sorted.
    pub fn type_names(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }

    pub fn shape(&self, name: &str) -> Result<Shape> {
        Ok(self.entry(name)?.shape)
    }

    pub fn is_group(&self, name: &str) -> Result<bool> {
        Ok(self.shape(name)? == Shape::Group)
    }

    /// Name of the identifying field of a type.
    pub fn id_field(&self, name: &str) -> Result<&'static str> {
        Ok(self.entry(name)?.id_field)
    }

    /// Decode a structured value into the type registered as `name`.
    pub fn decode(&self, name: &str, value: serde_json::Value) -> Result<A> {
        (self.entry(name)?.decode)(value)
    }
}

/// Check the structural contract of a resource type.
///
/// - The `Default` value serializes to an object whose only key is the
///   identifying field; every other field is skipped when empty.
/// - The default id is empty and the default is not absent.
/// - [`Resource::absent`] of [`Resource::SAMPLE_ID`] yields an absent value
///   with that id that passes validation.
pub fn check_contract<R: Resource>() -> std::result::Result<(), String> {
    let prototype = R::default();
    let value = serde_json::to_value(&prototype).map_err(|e| e.to_string())?;
    let object = value
        .as_object()
        .ok_or_else(|| "prototype does not serialize to an object".to_string())?;

    let keys: Vec<&str> = object.keys().map(String::as_str).collect();
    if keys != [R::ID_FIELD] {
        return Err(format!(
            "prototype serializes fields {keys:?}, expected only {:?}",
            R::ID_FIELD
        ));
    }
    if !prototype.id().is_empty() {
        return Err("prototype id is not empty".to_string());
    }
    if prototype.is_absent() {
        return Err("prototype is absent".to_string());
    }

    let absent = R::absent(R::SAMPLE_ID);
    if !absent.is_absent() || absent.id() != R::SAMPLE_ID {
        return Err("absent() does not produce an absent value with the given id".to_string());
    }
    absent
        .validate()
        .map_err(|e| format!("absent value fails validation: {e}"))?;

    let named = serde_json::to_value(R::named(R::SAMPLE_ID)).map_err(|e| e.to_string())?;
    if named.get(R::ID_FIELD).and_then(serde_json::Value::as_str) != Some(R::SAMPLE_ID) {
        return Err(format!("identifying field {:?} is not a string", R::ID_FIELD));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::resource::is_false;
    use crate::resource::tests::Note;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq)]
    enum Any {
        Note(Note),
        Batch(Batch),
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Batch {
        key: String,
        #[serde(default, skip_serializing_if = "is_false")]
        absent: bool,
    }

    impl Resource for Batch {
        const TYPE_NAME: &'static str = "batch";
        const ID_FIELD: &'static str = "key";
        const SHAPE: Shape = Shape::Group;

        fn id(&self) -> &str {
            &self.key
        }
        fn is_absent(&self) -> bool {
            self.absent
        }
        fn named(id: &str) -> Self {
            Self {
                key: id.to_string(),
                absent: false,
            }
        }
        fn absent(id: &str) -> Self {
            Self {
                key: id.to_string(),
                absent: true,
            }
        }
        fn validate(&self) -> Result<()> {
            Ok(())
        }
    }

    /// Serializes every field, so it breaks the contract.
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Chatty {
        name: String,
        absent: bool,
    }

    impl Resource for Chatty {
        const TYPE_NAME: &'static str = "chatty";
        const ID_FIELD: &'static str = "name";
        const SHAPE: Shape = Shape::Single;

        fn id(&self) -> &str {
            &self.name
        }
        fn is_absent(&self) -> bool {
            self.absent
        }
        fn named(id: &str) -> Self {
            Self {
                name: id.to_string(),
                absent: false,
            }
        }
        fn absent(id: &str) -> Self {
            Self {
                name: id.to_string(),
                absent: true,
            }
        }
        fn validate(&self) -> Result<()> {
            Ok(())
        }
    }

    /// Only accepts absolute ids, so it needs its own sample id.
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Rooted {
        path: String,
        #[serde(default, skip_serializing_if = "is_false")]
        absent: bool,
    }

    impl Resource for Rooted {
        const TYPE_NAME: &'static str = "rooted";
        const ID_FIELD: &'static str = "path";
        const SHAPE: Shape = Shape::Single;
        const SAMPLE_ID: &'static str = "/srv";

        fn id(&self) -> &str {
            &self.path
        }
        fn is_absent(&self) -> bool {
            self.absent
        }
        fn named(id: &str) -> Self {
            Self {
                path: id.to_string(),
                absent: false,
            }
        }
        fn absent(id: &str) -> Self {
            Self {
                path: id.to_string(),
                absent: true,
            }
        }
        fn validate(&self) -> Result<()> {
            if self.path.starts_with('/') {
                Ok(())
            } else {
                Err(Error::validation("rooted", &self.path, "path", "must be absolute"))
            }
        }
    }

    fn registry() -> Registry<Any> {
        Registry::new()
            .register::<Note>(Any::Note)
            .register::<Batch>(Any::Batch)
    }

    #[test]
    fn test_type_names_sorted() {
        assert_eq!(registry().type_names(), vec!["batch", "note"]);
    }

    #[test]
    fn test_shape_lookup() {
        let registry = registry();
        assert!(registry.is_group("batch").unwrap());
        assert!(!registry.is_group("note").unwrap());
        assert!(matches!(
            registry.shape("missing"),
            Err(Error::UnknownType(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_prototype_and_instantiate() {
        let registry = registry();
        assert_eq!(registry.prototype("note").unwrap(), Any::Note(Note::default()));
        assert_eq!(
            registry.instantiate("batch", "k").unwrap(),
            Any::Batch(Batch::named("k"))
        );
        assert_eq!(registry.id_field("batch").unwrap(), "key");
    }

    #[test]
    fn test_decode() {
        let registry = registry();
        let decoded = registry
            .decode("note", serde_json::json!({"name": "n", "text": "hello"}))
            .unwrap();
        assert_eq!(
            decoded,
            Any::Note(Note {
                name: "n".into(),
                text: "hello".into(),
                ..Note::default()
            })
        );

        let err = registry
            .decode("note", serde_json::json!({"text": 3}))
            .unwrap_err();
        assert!(matches!(err, Error::Decode { kind, .. } if kind == "note"));
    }

    #[test]
    fn test_contract_rejects_unskipped_fields() {
        let message = check_contract::<Chatty>().unwrap_err();
        assert!(message.contains("absent"));
        assert!(check_contract::<Note>().is_ok());
    }

    #[test]
    fn test_contract_validates_sample_id() {
        assert!(check_contract::<Rooted>().is_ok());
        let registry = Registry::<Rooted>::new().register::<Rooted>(|r| r);
        assert_eq!(registry.type_names(), vec!["rooted"]);
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn test_duplicate_registration_panics() {
        let _ = registry().register::<Note>(Any::Note);
    }

    #[test]
    #[should_panic(expected = "breaks the contract")]
    fn test_contract_violation_panics() {
        let _ = Registry::<Chatty>::new().register::<Chatty>(|c| c);
    }
}
