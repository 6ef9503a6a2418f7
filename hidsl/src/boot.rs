use std::{io::Write as _, path::Path};

use types::HidslError;

use crate::{
    exec::{Runner, ToolCommand},
    utils::{create_file, rooted},
};

const ARCH_CHROOT: &str = "/usr/bin/arch-chroot";
const GENFSTAB: &str = "/usr/bin/genfstab";
const SYSLINUX_INSTALL_UPDATE: &str = "/usr/bin/syslinux-install_update";

/// Path of `mkinitcpio` within the target system
const MKINITCPIO: &str = "/usr/bin/mkinitcpio";

pub(crate) const FSTAB: &str = "/etc/fstab";
pub(crate) const SYSLINUX_AUTOUPDATE: &str = "/boot/syslinux/SYSLINUX_AUTOUPDATE";

pub(crate) const BOOT_DIR: &str = "/boot";
pub(crate) const INITRAMFS_PATTERN: &str = "initramfs-linux*.img";

/// Writes an fstab for everything currently mounted below `root`, by label
pub(crate) fn genfstab(runner: &dyn Runner, root: &Path) -> Result<(), HidslError> {
    let fstab = runner.run(
        &ToolCommand::new(GENFSTAB)
            .args(["-L", "-p"])
            .arg(root)
            .capture(),
    )?;

    create_file(&rooted(root, Path::new(FSTAB))?)?.write_all(&fstab)?;
    Ok(())
}

/// Installs syslinux into the MBR and boot partition of the system at `root`
pub(crate) fn install_syslinux(runner: &dyn Runner, root: &Path) -> Result<(), HidslError> {
    runner.run(
        &ToolCommand::new(SYSLINUX_INSTALL_UPDATE)
            .args(["-i", "-a", "-m", "-c"])
            .arg(root),
    )?;

    Ok(())
}

/// Rebuilds every initramfs preset from within the system at `root`
pub(crate) fn mkinitcpio(runner: &dyn Runner, root: &Path) -> Result<(), HidslError> {
    runner.run(
        &ToolCommand::new(ARCH_CHROOT)
            .arg(root)
            .args([MKINITCPIO, "-P"]),
    )?;

    Ok(())
}
