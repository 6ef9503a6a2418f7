use std::path::Path;

use log::{debug, warn};
use types::HidslError;

use crate::exec::{Runner, ToolCommand};

const JOURNALCTL: &str = "/usr/bin/journalctl";
const SYSTEMCTL: &str = "/usr/bin/systemctl";

/// Exit code of `systemctl` for a unit that doesn't exist
const UNIT_NOT_FOUND: i32 = 4;

pub(crate) const COREDUMP_DIR: &str = "/var/lib/systemd/coredump";
pub(crate) const JOURNAL_DIR: &str = "/var/log/journal";
pub(crate) const JOURNAL_PATTERN: &str = "*/*.journal*";

fn systemctl(runner: &dyn Runner, verb: &str, unit: &str, root: &Path) -> Result<(), HidslError> {
    runner.run(
        &ToolCommand::new(SYSTEMCTL)
            .args([verb, unit])
            .arg("--root")
            .arg(root),
    )?;

    Ok(())
}

/// Disables a unit of the system at `root`
///
/// A unit that isn't installed is already as disabled as it gets, so that
/// failure alone is tolerated.
pub(crate) fn disable(runner: &dyn Runner, unit: &str, root: &Path) -> Result<(), HidslError> {
    match systemctl(runner, "disable", unit, root) {
        Err(HidslError::Subprocess {
            code: Some(UNIT_NOT_FOUND),
            ..
        }) => {
            warn!("Unit {unit} doesn't exist, nothing to disable");
            Ok(())
        }
        res => res,
    }
}

pub(crate) fn enable(runner: &dyn Runner, unit: &str, root: &Path) -> Result<(), HidslError> {
    systemctl(runner, "enable", unit, root)
}

fn journalctl(runner: &dyn Runner, args: &[&str], root: &Path) -> Result<(), HidslError> {
    runner.run(
        &ToolCommand::new(JOURNALCTL)
            .args(args)
            .arg("--root")
            .arg(root),
    )?;

    Ok(())
}

/// Shrinks the journal of the system at `root` to the bare minimum
pub(crate) fn vacuum(runner: &dyn Runner, root: &Path) -> Result<(), HidslError> {
    debug!("Vacuuming journal by size");
    journalctl(runner, &["--vacuum-size", "1"], root)?;

    debug!("Vacuuming journal by time");
    journalctl(runner, &["--vacuum-time", "1"], root)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use test_log::test;
    use types::HidslError;

    use super::{disable, enable, vacuum};
    use crate::testing::RecordingRunner;

    #[test]
    fn test_toggle_units() {
        let runner = RecordingRunner::new();
        let root = Path::new("/mnt");

        disable(&runner, "application.service", root).unwrap();
        enable(&runner, "unconfigured-warning.service", root).unwrap();

        assert_eq!(
            runner.calls(),
            vec![
                vec![
                    "/usr/bin/systemctl",
                    "disable",
                    "application.service",
                    "--root",
                    "/mnt"
                ],
                vec![
                    "/usr/bin/systemctl",
                    "enable",
                    "unconfigured-warning.service",
                    "--root",
                    "/mnt"
                ],
            ]
        );
    }

    #[test]
    fn test_disable_missing_unit_tolerated() {
        let runner = RecordingRunner::new().failing_on("disable", 4);

        disable(&runner, "application.service", Path::new("/mnt")).unwrap();
    }

    #[test]
    fn test_disable_other_failure_fatal() {
        let runner = RecordingRunner::new().failing_on("disable", 1);

        let err = disable(&runner, "application.service", Path::new("/mnt")).unwrap_err();
        assert!(matches!(err, HidslError::Subprocess { code: Some(1), .. }));
    }

    #[test]
    fn test_enable_missing_unit_fatal() {
        let runner = RecordingRunner::new().failing_on("enable", 4);

        enable(&runner, "unconfigured-warning.service", Path::new("/mnt")).unwrap_err();
    }

    #[test]
    fn test_vacuum() {
        let runner = RecordingRunner::new();

        vacuum(&runner, Path::new("/mnt")).unwrap();

        assert_eq!(
            runner.calls(),
            vec![
                vec!["/usr/bin/journalctl", "--vacuum-size", "1", "--root", "/mnt"],
                vec!["/usr/bin/journalctl", "--vacuum-time", "1", "--root", "/mnt"],
            ]
        );
    }
}
