//! Manifest files
//!
//! A manifest is a TOML document whose top-level keys are resource type
//! names, each holding an array of tables:
//!
//! ```toml
//! [[file]]
//! path = "/etc/motd"
//! regular_file = "welcome\n"
//! mode = "0644"
//!
//! [[apt_package]]
//! package = "curl"
//! ```
//!
//! Every declaration keeps a source label `"<file>:<type>[<index>]"` so
//! merge conflicts and failures point back at the manifest.

use declarative::{Registry, Sourced};
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::resource::AnyResource;

/// Errors that can occur while reading manifests
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest could not be read
    #[error("cannot read manifest {origin}: {source}")]
    Read {
        origin: String,
        #[source]
        source: io::Error,
    },

    /// The manifest is not valid TOML
    #[error("invalid TOML in {origin}: {source}")]
    Syntax {
        origin: String,
        #[source]
        source: toml::de::Error,
    },

    /// A top-level key does not hold an array of tables
    #[error("{origin}: {key} must be an array of tables")]
    Shape { origin: String, key: String },

    /// A declaration could not be decoded into its type
    #[error("{label}: {error}")]
    Declaration {
        label: String,
        #[source]
        error: declarative::Error,
    },
}

/// Result type for manifest operations
pub type Result<T> = std::result::Result<T, ManifestError>;

/// Decode the manifest text `content`, labelled `origin`.
pub fn parse(
    origin: &str,
    content: &str,
    registry: &Registry<AnyResource>,
) -> Result<Vec<Sourced<AnyResource>>> {
    let document: toml::Table = toml::from_str(content).map_err(|source| ManifestError::Syntax {
        origin: origin.to_string(),
        source,
    })?;

    let mut declarations = Vec::new();
    for (type_name, value) in document {
        let Some(entries) = value.as_array() else {
            return Err(ManifestError::Shape {
                origin: origin.to_string(),
                key: type_name,
            });
        };
        for (index, entry) in entries.iter().enumerate() {
            let label = format!("{origin}:{type_name}[{index}]");
            if !entry.is_table() {
                return Err(ManifestError::Shape {
                    origin: origin.to_string(),
                    key: format!("{type_name}[{index}]"),
                });
            }
            let resource = serde_json::to_value(entry)
                .map_err(|e| declarative::Error::Decode {
                    kind: type_name.clone(),
                    message: e.to_string(),
                })
                .and_then(|json| registry.decode(&type_name, json))
                .map_err(|error| ManifestError::Declaration {
                    label: label.clone(),
                    error,
                })?;
            declarations.push(Sourced::new(resource, label));
        }
    }

    log::debug!("{origin}: {} declarations", declarations.len());
    Ok(declarations)
}

/// Read and decode one manifest file.
pub fn load(path: &Path, registry: &Registry<AnyResource>) -> Result<Vec<Sourced<AnyResource>>> {
    let origin = path.display().to_string();
    let content = fs::read_to_string(path).map_err(|source| ManifestError::Read {
        origin: origin.clone(),
        source,
    })?;
    parse(&origin, &content, registry)
}

/// Read several manifests, concatenating their declarations in order.
pub fn load_all<P: AsRef<Path>>(
    paths: &[P],
    registry: &Registry<AnyResource>,
) -> Result<Vec<Sourced<AnyResource>>> {
    let mut declarations = Vec::new();
    for path in paths {
        declarations.extend(load(path.as_ref(), registry)?);
    }
    Ok(declarations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{AptPackage, File, builtin_registry};
    use declarative::Resource;

    const BASE: &str = r#"
[[file]]
path = "/etc/motd"
regular_file = "welcome\n"
mode = "0644"

[[file]]
path = "/srv"
directory = []

[[apt_package]]
package = "curl"

[[apt_package]]
package = "nano"
absent = true
"#;

    #[test]
    fn test_parse_keeps_order_and_labels() {
        let declarations = parse("base.toml", BASE, &builtin_registry()).unwrap();
        let labels: Vec<&str> = declarations
            .iter()
            .map(|d| d.source.as_deref().unwrap())
            .collect();
        assert_eq!(
            labels,
            vec![
                "base.toml:file[0]",
                "base.toml:file[1]",
                "base.toml:apt_package[0]",
                "base.toml:apt_package[1]",
            ]
        );
        assert_eq!(
            declarations[0].resource,
            AnyResource::File(File::regular("/etc/motd", "welcome\n").with_mode(0o644))
        );
        assert_eq!(
            declarations[3].resource,
            AnyResource::AptPackage(AptPackage::absent("nano"))
        );
    }

    #[test]
    fn test_unknown_type() {
        let err = parse("m.toml", "[[snap]]\nname = \"x\"\n", &builtin_registry()).unwrap_err();
        match err {
            ManifestError::Declaration { label, error } => {
                assert_eq!(label, "m.toml:snap[0]");
                assert!(matches!(error, declarative::Error::UnknownType(name) if name == "snap"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bad_field_names_the_declaration() {
        let err = parse(
            "m.toml",
            "[[apt_package]]\npackage = \"curl\"\nholdd = true\n",
            &builtin_registry(),
        )
        .unwrap_err();
        assert!(err.to_string().starts_with("m.toml:apt_package[0]: cannot decode apt_package"));
    }

    #[test]
    fn test_key_must_hold_tables() {
        let registry = builtin_registry();
        assert!(matches!(
            parse("m.toml", "file = \"/etc/motd\"\n", &registry),
            Err(ManifestError::Shape { key, .. }) if key == "file"
        ));
        assert!(matches!(
            parse("m.toml", "file = [1]\n", &registry),
            Err(ManifestError::Shape { key, .. }) if key == "file[0]"
        ));
        assert!(matches!(
            parse("m.toml", "[[file]\n", &registry),
            Err(ManifestError::Syntax { .. })
        ));
    }

    #[test]
    fn test_load_all_concatenates_files() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.toml");
        let second = dir.path().join("b.toml");
        fs::write(&first, "[[apt_package]]\npackage = \"curl\"\n").unwrap();
        fs::write(&second, "[[apt_package]]\npackage = \"git\"\n").unwrap();

        let declarations = load_all(&[&first, &second], &builtin_registry()).unwrap();
        let ids: Vec<&str> = declarations.iter().map(|d| d.resource.id()).collect();
        assert_eq!(ids, vec!["curl", "git"]);
        assert!(
            declarations[1]
                .source
                .as_deref()
                .unwrap()
                .ends_with("b.toml:apt_package[0]")
        );

        let missing = load(&dir.path().join("nope.toml"), &builtin_registry()).unwrap_err();
        assert!(matches!(missing, ManifestError::Read { .. }));
    }

    #[test]
    fn test_absent_file_prototype_validates() {
        let declarations = parse(
            "m.toml",
            "[[file]]\npath = \"/tmp/gone\"\nabsent = true\n",
            &builtin_registry(),
        )
        .unwrap();
        assert!(declarations[0].resource.is_absent());
        assert!(declarations[0].resource.validate().is_ok());
        assert!(File::absent("/tmp/gone").validate().is_ok());
    }
}
