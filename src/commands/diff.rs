//! `keel diff` - preview what apply would change

use anyhow::Result;
use declarative::Session;

use super::{load_plan, manifest_paths};
use crate::Context;
use crate::cli::DiffArgs;
use crate::config::Settings;
use crate::engine::differ;
use crate::host::LocalHost;
use crate::resource::builtin_registry;
use crate::ui;

pub fn run(ctx: &Context, args: &DiffArgs) -> Result<()> {
    let settings = Settings::load()?;
    let paths = manifest_paths(&args.manifests, &settings)?;
    let registry = builtin_registry();
    if let Some(type_name) = &args.resource_type {
        registry.shape(type_name)?;
    }

    let host = LocalHost::new();
    let session = Session::new(&host).with_jobs(settings.jobs);
    let mut plan = load_plan(&session, &registry, &paths)?;
    if let Some(type_name) = &args.resource_type {
        plan = plan.only_type(type_name);
    }

    differ::display_plan(&plan);
    if !ctx.quiet && !plan.is_converged() {
        println!();
        ui::dim("Run `keel apply` to make these changes");
    }
    Ok(())
}
