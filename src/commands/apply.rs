//! `keel apply` - converge the host to the manifests

use anyhow::{Result, bail};
use declarative::{CancelToken, Session};

use super::{load_plan, manifest_paths};
use crate::Context;
use crate::cli::ApplyArgs;
use crate::config::Settings;
use crate::engine::{self, ExecuteOptions};
use crate::host::LocalHost;
use crate::resource::builtin_registry;
use crate::ui;

pub fn run(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    let settings = Settings::load()?;
    let paths = manifest_paths(&args.manifests, &settings)?;
    let jobs = args.jobs.unwrap_or(settings.jobs);

    if !ctx.quiet {
        ui::header("Applying Configuration");
        if args.dry_run {
            ui::warn("Dry run - no changes will be made");
        }
    }

    let cancel = CancelToken::new();
    let host = LocalHost::new().with_cancel(cancel.clone());
    let session = Session::new(&host).with_jobs(jobs).with_cancel(cancel);
    let plan = load_plan(&session, &builtin_registry(), &paths)?;

    let opts = ExecuteOptions {
        dry_run: args.dry_run,
        yes: args.yes || settings.assume_yes,
    };
    let summary = engine::execute(&session, &plan, &opts)?;
    if !summary.is_success() {
        bail!("{} resources failed to converge", summary.failed);
    }
    Ok(())
}
