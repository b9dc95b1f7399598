use aptkit::{apt, dpkg};
use declarative::{Command, CommandFailure, Resource, Result, Session, join_all};
use log::{debug, info};

use super::{AptPackage, debconf};
use crate::resource::tool_error;

/// Read the installed state of every package in one batch.
///
/// Returns one value per input, in order. Packages dpkg does not report
/// stay absent.
pub fn load(session: &Session<'_>, resources: &[AptPackage]) -> Result<Vec<AptPackage>> {
    let mut loaded: Vec<AptPackage> = resources
        .iter()
        .map(|r| AptPackage::absent(&r.package))
        .collect();
    if loaded.is_empty() {
        return Ok(loaded);
    }

    query_installed(session, resources, &mut loaded)?;

    let present: Vec<String> = loaded
        .iter()
        .filter(|p| !p.absent)
        .map(|p| p.package.clone())
        .collect();
    info!(
        "{} of {} packages installed",
        present.len(),
        loaded.len()
    );
    if present.is_empty() {
        return Ok(loaded);
    }

    let command = Command::new(apt::APT_MARK).args(apt::showhold_args(&present));
    let held = apt::parse_showhold(&session.run_checked(&command)?.stdout_str());

    let selections = join_all(session, &present, |package| {
        debconf::selections(session, package)
    })?;

    for (name, answers) in present.iter().zip(selections) {
        for package in loaded.iter_mut().filter(|p| &p.package == name) {
            package.hold = held.contains(name);
            package.debconf_selections.clone_from(&answers);
        }
    }
    Ok(loaded)
}

fn query_installed(
    session: &Session<'_>,
    resources: &[AptPackage],
    loaded: &mut [AptPackage],
) -> Result<()> {
    let queries = resources.iter().flat_map(AptPackage::queries);
    let command = Command::new(dpkg::PROGRAM).args(dpkg::show_args(queries));
    let output = session.run(&command)?;

    if !output.status.success() {
        let unmatched = dpkg::unmatched_queries(&output.stdout_str(), &output.stderr_str())
            .filter(|queries| !queries.is_empty() && output.status.code() == Some(1));
        match unmatched {
            Some(queries) => debug!("not installed: {}", queries.join(", ")),
            None => return Err(CommandFailure::new(&command, &output).into()),
        }
    }

    for installed in dpkg::parse_show(&output.stdout_str()).map_err(tool_error)? {
        if !installed.is_installed() {
            debug!("{} is known to dpkg but not installed", installed.package);
            continue;
        }
        for package in loaded.iter_mut().filter(|p| p.package == installed.package) {
            package.absent = false;
            package.architectures.insert(installed.architecture.clone());
            package.version.clone_from(&installed.version);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::apt_package::DebconfAnswer;
    use crate::resource::apt_package::testing::FakeApt;
    use declarative::{CommandOutput, Error, MemoryHost};

    #[test]
    fn test_load_resets_and_populates() {
        let (host, _) = FakeApt::default()
            .with_package("curl", "amd64", "8.5.0-2")
            .held("curl")
            .with_question("curl", "curl/note", "hi", true)
            .into_host();
        let session = Session::new(&host);

        let declared = [
            AptPackage::absent("curl"),
            AptPackage::named("wget").pinned("1.21"),
        ];
        let loaded = load(&session, &declared).unwrap();

        assert_eq!(loaded.len(), 2);
        assert!(!loaded[0].absent);
        assert_eq!(loaded[0].version, "8.5.0-2");
        assert!(loaded[0].architectures.contains("amd64"));
        assert!(loaded[0].hold);
        assert_eq!(
            loaded[0].debconf_selections["curl/note"],
            DebconfAnswer::new("hi", true)
        );
        assert_eq!(loaded[1], AptPackage::absent("wget"));
    }

    #[test]
    fn test_load_uses_one_query() {
        let (host, _) = FakeApt::default()
            .with_package("curl", "amd64", "1")
            .with_package("git", "amd64", "2")
            .into_host();
        let session = Session::new(&host);

        let declared = [
            AptPackage::named("curl"),
            AptPackage::named("git"),
            AptPackage::named("nope"),
        ];
        load(&session, &declared).unwrap();

        let queries = host
            .commands()
            .iter()
            .filter(|c| c.program == dpkg::PROGRAM)
            .count();
        assert_eq!(queries, 1);
    }

    #[test]
    fn test_load_empty_runs_nothing() {
        let host = MemoryHost::new();
        let session = Session::new(&host);
        assert!(load(&session, &[]).unwrap().is_empty());
        assert!(host.commands().is_empty());
    }

    #[test]
    fn test_dpkg_failure_is_reported() {
        let host = MemoryHost::new()
            .with_responder(|_| CommandOutput::failure(2, "", "dpkg-query: error: database locked\n"));
        let session = Session::new(&host);

        let err = load(&session, &[AptPackage::named("curl")]).unwrap_err();
        match err {
            Error::Command(failure) => {
                assert_eq!(failure.argv[0], "dpkg-query");
                assert!(failure.stderr.contains("database locked"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_no_match_on_stdout_is_absent() {
        let host = MemoryHost::new().with_responder(|_| {
            CommandOutput::failure(1, "dpkg-query: no packages found matching curl\n", "")
        });
        let session = Session::new(&host);

        let loaded = load(&session, &[AptPackage::named("curl")]).unwrap();
        assert_eq!(loaded, vec![AptPackage::absent("curl")]);
        assert_eq!(host.commands().len(), 1);
    }

    #[test]
    fn test_malformed_output_is_parse_error() {
        let host = MemoryHost::new().with_responder(|_| CommandOutput::success("Status=ok\n"));
        let session = Session::new(&host);
        assert!(matches!(
            load(&session, &[AptPackage::named("curl")]),
            Err(Error::Parse { tool: "dpkg-query", .. })
        ));
    }

    #[test]
    fn test_debconf_failures_are_joined() {
        let (host, _) = FakeApt::default()
            .with_package("a1", "amd64", "1")
            .with_package("b2", "amd64", "1")
            .with_package("c3", "amd64", "1")
            .broken_debconf("a1")
            .broken_debconf("c3")
            .into_host();
        let session = Session::new(&host).with_jobs(2);

        let declared = [
            AptPackage::named("a1"),
            AptPackage::named("b2"),
            AptPackage::named("c3"),
        ];
        match load(&session, &declared).unwrap_err() {
            Error::Joined(errors) => {
                assert_eq!(errors.len(), 2);
                let message = Error::Joined(errors).to_string();
                assert!(message.contains("debconf-show a1"));
                assert!(message.contains("debconf-show c3"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
