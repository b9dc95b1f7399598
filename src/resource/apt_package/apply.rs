use aptkit::apt;
use declarative::{Command, Resource, Result, Session};
use log::info;

use super::{AptPackage, debconf, load};

fn apt_get(args: Vec<String>) -> Command {
    let (key, value) = apt::NONINTERACTIVE_ENV;
    Command::new(apt::APT_GET).args(args).env(key, value)
}

fn mark(session: &Session<'_>, hold: bool, packages: &[&str]) -> Result<()> {
    let command = Command::new(apt::APT_MARK).args(apt::mark_args(hold, packages.iter().copied()));
    session.run_checked(&command)?;
    Ok(())
}

/// Converge every declared package with one `apt-get install`.
///
/// Nothing runs when the host already satisfies every declaration.
pub fn apply(session: &Session<'_>, targets: &[AptPackage]) -> Result<()> {
    for target in targets {
        target.validate()?;
    }
    if targets.is_empty() {
        return Ok(());
    }

    let current = load::load(session, targets)?;
    let pending: Vec<(&AptPackage, &AptPackage)> = targets
        .iter()
        .zip(&current)
        .filter(|(target, current)| !current.satisfies(target))
        .collect();
    if pending.is_empty() {
        info!("all {} packages up to date", targets.len());
        return Ok(());
    }

    for (target, current) in &pending {
        for (question, answer) in target.unsatisfied_selections(current) {
            debconf::set(session, &target.package, question, answer)?;
        }
    }

    // held packages cannot be changed by apt-get
    let released: Vec<&str> = pending
        .iter()
        .filter(|(_, current)| current.hold)
        .map(|(target, _)| target.package.as_str())
        .collect();
    if !released.is_empty() {
        info!("releasing hold on {}", released.join(", "));
        mark(session, false, &released)?;
    }

    info!("updating package lists");
    session.run_checked(&apt_get(apt::update_args()))?;

    let packages: Vec<String> = targets.iter().flat_map(AptPackage::install_args).collect();
    info!("apt-get install {}", packages.join(" "));
    session.run_checked(&apt_get(apt::install_args(packages)))?;

    let held: Vec<&str> = targets
        .iter()
        .zip(&current)
        .filter(|(target, current)| {
            target.hold && (!current.hold || released.contains(&target.package.as_str()))
        })
        .map(|(target, _)| target.package.as_str())
        .collect();
    if !held.is_empty() {
        info!("holding {}", held.join(", "));
        mark(session, true, &held)?;
    }
    Ok(())
}
