//! Execution: apply a plan in manifest order
//!
//! Single resources are applied one at a time. A group type is applied once,
//! at the position of its first actionable declaration, with every
//! declaration of that type in the batch.

use anyhow::Result;
use colored::Colorize;
use declarative::{Session, Shape};
use std::collections::BTreeSet;

use super::differ::display_plan;
use super::planner::{Plan, PlannedResource};
use crate::progress;
use crate::resource::{self, AnyResource};

/// Options for execution
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Show the diff and stop
    pub dry_run: bool,
    /// Skip the confirmation prompt
    pub yes: bool,
}

/// Summary of execution results
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ExecuteSummary {
    pub applied: usize,
    pub failed: usize,
    pub skipped: usize,
    pub unchanged: usize,
}

impl ExecuteSummary {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// One call into a reconciler.
#[derive(Debug)]
pub(crate) enum Unit<'a> {
    Single(&'a PlannedResource),
    Group {
        type_name: &'static str,
        /// Every declaration of the type, not only the actionable ones
        batch: Vec<AnyResource>,
        /// Number of actionable declarations in the batch
        actionable: usize,
    },
}

impl Unit<'_> {
    fn name(&self) -> String {
        match self {
            Self::Single(entry) => entry.label(),
            Self::Group {
                type_name, batch, ..
            } => format!("{type_name} ({} declarations)", batch.len()),
        }
    }

    fn weight(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Group { actionable, .. } => *actionable,
        }
    }

    fn apply(&self, session: &Session<'_>) -> declarative::Result<()> {
        match self {
            Self::Single(entry) => entry.target.apply(session),
            Self::Group { batch, .. } => resource::apply_group(session, batch),
        }
    }
}

/// Split the actionable part of `plan` into reconciler calls, in order.
pub(crate) fn units(plan: &Plan) -> Vec<Unit<'_>> {
    let mut units = Vec::new();
    let mut grouped: BTreeSet<&str> = BTreeSet::new();

    for entry in plan.actionable() {
        let type_name = entry.target.type_name();
        match entry.target.shape() {
            Shape::Single => units.push(Unit::Single(entry)),
            Shape::Group if grouped.insert(type_name) => {
                let members = plan
                    .entries
                    .iter()
                    .filter(|e| e.merged_into.is_none() && e.target.type_name() == type_name);
                let batch = members.clone().map(|e| e.target.clone()).collect();
                let actionable = members.filter(|e| e.action.is_actionable()).count();
                units.push(Unit::Group {
                    type_name,
                    batch,
                    actionable,
                });
            }
            Shape::Group => {}
        }
    }
    units
}

/// Show the plan, confirm, and apply it.
pub fn execute(session: &Session<'_>, plan: &Plan, opts: &ExecuteOptions) -> Result<ExecuteSummary> {
    display_plan(plan);

    let unchanged = plan.entries.len() - plan.actionable().count();
    let pending = units(plan);
    if pending.is_empty() {
        return Ok(ExecuteSummary {
            unchanged,
            ..ExecuteSummary::default()
        });
    }

    let total: usize = pending.iter().map(Unit::weight).sum();
    if opts.dry_run {
        println!();
        println!("  {} Dry run - no changes made", "ℹ".blue());
        return Ok(ExecuteSummary {
            skipped: total,
            unchanged,
            ..ExecuteSummary::default()
        });
    }

    if !opts.yes && !confirm_proceed()? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(ExecuteSummary {
            skipped: total,
            unchanged,
            ..ExecuteSummary::default()
        });
    }

    let summary = apply_units(session, &pending, unchanged);
    print_summary(&summary);
    Ok(summary)
}

fn apply_units(session: &Session<'_>, pending: &[Unit<'_>], unchanged: usize) -> ExecuteSummary {
    let mut summary = ExecuteSummary {
        unchanged,
        ..ExecuteSummary::default()
    };

    let pb = progress::spinner("Applying...");
    for (index, unit) in pending.iter().enumerate() {
        pb.set_message(format!("Applying {}", unit.name()));
        match unit.apply(session) {
            Ok(()) => {
                log::info!("applied {}", unit.name());
                summary.applied += unit.weight();
            }
            Err(e) if e.is_cancelled() => {
                pb.suspend(|| println!("  {} Cancelled", "✗".red()));
                summary.skipped += pending[index..].iter().map(Unit::weight).sum::<usize>();
                break;
            }
            Err(e) => {
                pb.suspend(|| println!("  {} {}: {e}", "✗".red(), unit.name()));
                summary.failed += unit.weight();
            }
        }
    }
    pb.finish_and_clear();
    summary
}

/// Confirm with user
fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Apply these changes?")
        .default(true)
        .interact()?;

    Ok(confirmed)
}

/// Print final summary
fn print_summary(summary: &ExecuteSummary) {
    println!();
    if summary.is_success() {
        println!("  {} Configuration applied", "✓".green().bold());
    } else {
        println!(
            "  {} Configuration applied with errors",
            "⚠".yellow().bold()
        );
    }

    if summary.applied > 0 {
        println!("    • {} resources converged", summary.applied);
    }
    if summary.skipped > 0 {
        println!("    • {} resources skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "resources".red());
    }
}
