use std::path::Path;

use types::HidslError;

use crate::exec::{Runner, ToolCommand};

const PACMAN: &str = "/usr/bin/pacman";

pub(crate) const LOCKFILE: &str = "/var/lib/pacman/db.lck";
pub(crate) const PACKAGE_CACHE_DIR: &str = "/var/cache/pacman/pkg";

/// Empties the package cache of the system at `root`, installed packages included
pub(crate) fn clean(runner: &dyn Runner, root: &Path) -> Result<(), HidslError> {
    runner.run(
        &ToolCommand::new(PACMAN)
            .args(["-S", "-c", "-c", "--noconfirm", "--sysroot"])
            .arg(root),
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use test_log::test;

    use super::clean;
    use crate::testing::RecordingRunner;

    #[test]
    fn test_clean() {
        let runner = RecordingRunner::new();

        clean(&runner, Path::new("/mnt")).unwrap();

        assert_eq!(
            runner.calls()[0],
            ["/usr/bin/pacman", "-S", "-c", "-c", "--noconfirm", "--sysroot", "/mnt"]
        );
    }
}
