//! Command implementations for the keel CLI

pub mod apply;
pub mod diff;
pub mod show;
pub mod types;

use anyhow::{Context as AnyhowContext, Result, bail};
use declarative::{Registry, Session};
use std::path::PathBuf;

use crate::config::Settings;
use crate::engine::{self, Plan};
use crate::manifest;
use crate::resource::AnyResource;

/// Manifests given on the command line, else the configured defaults.
pub(crate) fn manifest_paths(given: &[PathBuf], settings: &Settings) -> Result<Vec<PathBuf>> {
    let paths = if given.is_empty() {
        settings.manifest_paths()
    } else {
        given.to_vec()
    };
    if paths.is_empty() {
        bail!("No manifests given and none configured under `manifests` in config.toml");
    }
    Ok(paths)
}

/// Read `paths` and plan them against the session's host.
pub(crate) fn load_plan(
    session: &Session<'_>,
    registry: &Registry<AnyResource>,
    paths: &[PathBuf],
) -> Result<Plan> {
    let declarations = manifest::load_all(paths, registry)?;
    log::info!(
        "{} declarations from {} manifests",
        declarations.len(),
        paths.len()
    );
    engine::plan(session, declarations).context("Failed to plan")
}
