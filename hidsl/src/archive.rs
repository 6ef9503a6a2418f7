use std::{
    fs,
    path::{Path, PathBuf},
};

use log::debug;
use types::{Compression, HidslError};

use crate::exec::{Runner, ToolCommand};

const BSDTAR: &str = "/usr/bin/bsdtar";

pub(crate) const DEFAULT_COMPRESSION_LEVEL: u8 = 9;

/// Unpacks a root file system archive into `target`, preserving permissions
pub(crate) fn extract(
    runner: &dyn Runner,
    tarball: &Path,
    target: &Path,
    verbose: bool,
) -> Result<(), HidslError> {
    let mut cmd = ToolCommand::new(BSDTAR).args(["-x", "-p", "-f"]).arg(tarball);

    if verbose {
        cmd = cmd.arg("-v");
    }

    runner.run(&cmd.arg("-C").arg(target))?;
    Ok(())
}

/// Archives everything below `root`
///
/// Top-level entries are listed one by one, so the archive holds `etc/...`
/// rather than `./etc/...`.
pub(crate) fn create(
    runner: &dyn Runner,
    tarball: &Path,
    root: &Path,
    compression: Compression,
    level: u8,
    verbose: bool,
) -> Result<(), HidslError> {
    let mut entries = fs::read_dir(root)?
        .map(|entry| entry.map(|e| PathBuf::from(e.file_name())))
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort();

    debug!(
        "Archiving {} entries of {} into {}",
        entries.len(),
        root.display(),
        tarball.display()
    );

    let mut cmd = ToolCommand::new(BSDTAR)
        .args(["-c", "-p", "-f"])
        .arg(tarball)
        .arg("-C")
        .arg(root);

    if verbose {
        cmd = cmd.arg("-v");
    }

    let cmd = cmd
        .arg(compression.bsdtar_arg())
        .arg("--options")
        .arg(format!("compression-level={level}"))
        .args(entries);

    runner.run(&cmd)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{
        fs::{self, File},
        path::Path,
    };

    use tempfile::TempDir;
    use test_log::test;
    use types::Compression;

    use super::{create, extract};
    use crate::testing::RecordingRunner;

    #[test]
    fn test_extract() {
        let runner = RecordingRunner::new();

        extract(
            &runner,
            Path::new("/opt/hidsl/ddb.bsdtar.lzop"),
            Path::new("/tmp/staging"),
            true,
        )
        .unwrap();

        assert_eq!(
            runner.calls()[0],
            [
                "/usr/bin/bsdtar",
                "-x",
                "-p",
                "-f",
                "/opt/hidsl/ddb.bsdtar.lzop",
                "-v",
                "-C",
                "/tmp/staging"
            ]
        );
    }

    #[test]
    fn test_create_lists_top_level_entries() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        for entry in ["usr", "etc", "boot"] {
            fs::create_dir(root.join(entry)).unwrap();
        }
        File::create(root.join("etc/hostname")).unwrap();

        let runner = RecordingRunner::new();
        create(
            &runner,
            Path::new("/srv/hidsl.tar.zst"),
            root,
            Compression::Zstd,
            3,
            false,
        )
        .unwrap();

        let mut expected = vec![
            "/usr/bin/bsdtar".to_owned(),
            "-c".to_owned(),
            "-p".to_owned(),
            "-f".to_owned(),
            "/srv/hidsl.tar.zst".to_owned(),
            "-C".to_owned(),
            root.display().to_string(),
            "--zstd".to_owned(),
            "--options".to_owned(),
            "compression-level=3".to_owned(),
        ];
        expected.extend(["boot", "etc", "usr"].map(ToOwned::to_owned));

        assert_eq!(runner.calls(), vec![expected]);
    }
}
