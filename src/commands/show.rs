//! `keel show <type> <id>`

use anyhow::{Context as AnyhowContext, Result};
use declarative::{Registry, Session};

use crate::Context;
use crate::cli::ShowArgs;
use crate::host::LocalHost;
use crate::resource::{AnyResource, builtin_registry};

/// Live state of the resource `id` of type `type_name`.
pub fn current_state(
    session: &Session<'_>,
    registry: &Registry<AnyResource>,
    type_name: &str,
    id: &str,
) -> Result<AnyResource> {
    let prototype = registry.instantiate(type_name, id)?;
    prototype
        .load(session)
        .with_context(|| format!("Failed to load {type_name} {id:?}"))
}

pub fn run(_ctx: &Context, args: &ShowArgs) -> Result<()> {
    let host = LocalHost::new();
    let session = Session::new(&host);
    let state = current_state(&session, &builtin_registry(), &args.resource_type, &args.id)?;
    println!("{}", state.to_json());
    Ok(())
}
