//! Diff display
//!
//! Renders the actionable part of a plan grouped by resource type. Regular
//! file contents get a unified diff, or a digest line when either side is
//! not text.

use colored::Colorize;
use declarative::Action;
use std::collections::BTreeMap;

use super::planner::{Plan, PlannedResource};
use crate::resource::AnyResource;
use crate::resource::file::{Content, File, FileKind};

/// Length of the digest prefix shown for binary contents
const DIGEST_LEN: usize = 16;

/// Change marker for an entry.
pub fn marker(entry: &PlannedResource) -> &'static str {
    match entry.action {
        Action::Reconfigure if entry.current.as_ref().is_none_or(AnyResource::is_absent) => "+",
        action => action.marker(),
    }
}

/// Short description of what applying the entry does.
pub fn describe(entry: &PlannedResource) -> String {
    let current = entry.current.as_ref();
    match (entry.action, &entry.target) {
        (Action::Destroy, _) => "(remove)".to_string(),
        (Action::Refresh, _) => "(refresh)".to_string(),
        (Action::Reconfigure, _) if current.is_none_or(AnyResource::is_absent) => {
            "(create)".to_string()
        }
        (Action::Reconfigure, AnyResource::AptPackage(target)) => match current {
            Some(AnyResource::AptPackage(current)) if !target.version.is_empty() => {
                format!("{} → {}", current.version, target.version)
            }
            _ => "(update)".to_string(),
        },
        (Action::MergedAway, _) => "(merged)".to_string(),
        _ => "(update)".to_string(),
    }
}

fn digest(content: &[u8]) -> String {
    let hex = blake3::hash(content).to_hex();
    hex.as_str()[..DIGEST_LEN].to_string()
}

/// Unified diff of `old` to `new` contents, or a digest line if either is binary.
pub fn content_diff(path: &str, old: Option<&Content>, new: &Content) -> String {
    let empty = Content::default();
    let old = old.unwrap_or(&empty);
    match (old.as_text(), new.as_text()) {
        (Some(before), Some(after)) => {
            let diff = similar::TextDiff::from_lines(before, after);
            let (from, to) = (format!("{path} (current)"), format!("{path} (desired)"));
            diff.unified_diff()
                .context_radius(3)
                .header(&from, &to)
                .to_string()
        }
        _ => format!(
            "binary {path}: {} ({} bytes) → {} ({} bytes)\n",
            digest(old.as_bytes()),
            old.as_bytes().len(),
            digest(new.as_bytes()),
            new.as_bytes().len()
        ),
    }
}

fn regular_contents(file: Option<&File>) -> Option<&Content> {
    match file.and_then(|f| f.kind.as_ref()) {
        Some(FileKind::RegularFile(content)) => content.as_ref(),
        _ => None,
    }
}

/// Content diffs for every regular file in `target` whose contents change.
pub fn file_changes(current: Option<&File>, target: &File) -> Vec<String> {
    let mut diffs = Vec::new();
    match &target.kind {
        Some(FileKind::RegularFile(Some(desired))) => {
            let existing = regular_contents(current);
            if existing != Some(desired) {
                diffs.push(content_diff(&target.path, existing, desired));
            }
        }
        Some(FileKind::Directory(children)) => {
            let live = current.map(File::children).unwrap_or_default();
            for child in children {
                let existing = live.iter().find(|c| c.path == child.path);
                diffs.extend(file_changes(existing, child));
            }
        }
        _ => {}
    }
    diffs
}

fn entry_details(entry: &PlannedResource) -> Vec<String> {
    match (&entry.target, &entry.current, entry.action) {
        (AnyResource::File(target), current, Action::Reconfigure) => {
            let current = match current {
                Some(AnyResource::File(file)) => Some(file),
                _ => None,
            };
            file_changes(current, target)
        }
        _ => Vec::new(),
    }
}

fn paint(marker: &str) -> colored::ColoredString {
    match marker {
        "+" => marker.green(),
        "-" => marker.red(),
        "~" => marker.yellow(),
        _ => marker.cyan(),
    }
}

fn paint_diff_line(line: &str) -> String {
    if line.starts_with("+++") || line.starts_with("---") {
        line.bold().to_string()
    } else if line.starts_with('+') {
        line.green().to_string()
    } else if line.starts_with('-') {
        line.red().to_string()
    } else if line.starts_with("@@") {
        line.cyan().to_string()
    } else {
        line.to_string()
    }
}

/// Print the actionable entries of `plan`.
pub fn display_plan(plan: &Plan) {
    if plan.is_converged() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    let mut by_type: BTreeMap<&str, Vec<&PlannedResource>> = BTreeMap::new();
    for entry in plan.actionable() {
        by_type.entry(entry.target.type_name()).or_default().push(entry);
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Configuration Diff".bold()
    );
    println!("│");

    for (type_name, entries) in &by_type {
        println!("│ {}", type_name.bold());
        for entry in entries {
            println!(
                "│   {} {:<40} {}",
                paint(marker(entry)),
                entry.target.id(),
                describe(entry).dimmed()
            );
            for diff in entry_details(entry) {
                for line in diff.lines() {
                    println!("│       {}", paint_diff_line(line));
                }
            }
        }
        println!("│");
    }

    let summary = plan.summary();
    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} changes ({} reconfigure, {} destroy, {} refresh), {} unchanged",
        summary.actionable().to_string().bold(),
        summary.reconfigure.to_string().yellow(),
        summary.destroy.to_string().red(),
        summary.refresh.to_string().cyan(),
        summary.no_op + summary.merged_away
    );
    println!("└─────────────────────────────────────────────────────┘");
}
