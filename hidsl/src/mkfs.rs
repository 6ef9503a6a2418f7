use std::path::Path;

use log::debug;
use types::{Filesystem, HidslError};

use crate::exec::{Runner, ToolCommand};

const MKFS: &str = "/usr/bin/mkfs";

/// Creates a file system on the device
///
/// ext4 is created with `-F`, overwriting whatever signature is present, and
/// vfat as FAT32. Other file systems are rejected before anything runs.
pub(crate) fn format(
    runner: &dyn Runner,
    device: &Path,
    filesystem: Filesystem,
    label: Option<&str>,
) -> Result<(), HidslError> {
    let (Some(args), Some(label_flag)) = (filesystem.mkfs_args(), filesystem.label_flag()) else {
        return Err(HidslError::UnsupportedFilesystem(filesystem));
    };

    debug!("Formatting {} with {filesystem}", device.display());

    let mut cmd = ToolCommand::new(MKFS).args(args);

    if let Some(label) = label {
        cmd = cmd.args([label_flag, label]);
    }

    runner.run(&cmd.arg(device))?;
    Ok(())
}
