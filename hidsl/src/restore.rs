use std::path::{Path, PathBuf};

use log::{debug, info};
use types::HidslError;

use crate::{
    archive, boot,
    device::{is_block_device, BlockDevice},
    exec::Runner,
    identity, mkfs,
    mount::{with_mounts, MountOptions, Mounter, StagingDir},
    partitioner,
    utils::is_mount,
};

/// Where an image gets restored to
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum RestoreTarget {
    /// A whole disk, partitioned and formatted from scratch
    Device(BlockDevice),

    /// A root file system the caller already mounted
    Root(PathBuf),
}

impl RestoreTarget {
    /// Picks the restore target, an explicit root taking precedence over the device
    pub(crate) fn resolve(device: &Path, root: Option<&Path>) -> Result<Self, HidslError> {
        if let Some(root) = root {
            if !matches!(is_mount(root), Ok(true)) {
                return Err(HidslError::NotMountPointOrBlockDevice(root.to_path_buf()));
            }

            return Ok(Self::Root(root.to_path_buf()));
        }

        if !is_block_device(device) {
            return Err(HidslError::NotMountPointOrBlockDevice(device.to_path_buf()));
        }

        Ok(Self::Device(BlockDevice::identify(device)?))
    }
}

#[derive(Clone, Debug)]
pub(crate) struct RestoreOptions {
    pub(crate) image: PathBuf,
    pub(crate) efi: bool,
    pub(crate) efi_size: String,
    pub(crate) wipe: bool,
    pub(crate) authorized_keys: Option<PathBuf>,
    pub(crate) dsa_host_key: bool,
    pub(crate) verbose: bool,
}

/// Unpacks the image into `root` and gives the result its own identity
fn restore_image(
    runner: &dyn Runner,
    root: &Path,
    options: &RestoreOptions,
) -> Result<(), HidslError> {
    info!("Restoring image.");

    debug!("Extracting image archive.");
    archive::extract(runner, &options.image, root, options.verbose)?;

    debug!("Creating a unique host ID.");
    identity::mkhostid(root)?;

    debug!("Generating SSH host keys.");
    identity::generate_host_keys(runner, root, options.dsa_host_key)?;

    if let Some(manifest) = &options.authorized_keys {
        identity::restore_authorized_keys(root, manifest)?;
    }

    debug!("Generating fstab.");
    boot::genfstab(runner, root)?;

    if !options.efi {
        debug!("Installing syslinux.");
        boot::install_syslinux(runner, root)?;
    }

    debug!("Generating initramfs.");
    boot::mkinitcpio(runner, root)
}

fn check_inputs(options: &RestoreOptions) -> Result<(), HidslError> {
    if !options.image.is_file() {
        return Err(HidslError::Custom(format!(
            "Image file {} not found",
            options.image.display()
        )));
    }

    if let Some(manifest) = &options.authorized_keys {
        if !manifest.is_file() {
            return Err(HidslError::Custom(format!(
                "Authorized keys file {} not found",
                manifest.display()
            )));
        }
    }

    Ok(())
}

/// Restores the image onto the target
///
/// A device gets wiped if asked to, partitioned, formatted and mounted on a
/// private staging directory for the duration of the restore. A root is
/// restored into as it is and stays mounted.
pub(crate) fn restore(
    runner: &dyn Runner,
    mounter: &dyn Mounter,
    target: &RestoreTarget,
    options: &RestoreOptions,
) -> Result<(), HidslError> {
    check_inputs(options)?;

    let device = match target {
        RestoreTarget::Root(root) => return restore_image(runner, root, options),
        RestoreTarget::Device(device) => device,
    };

    if options.wipe {
        partitioner::wipefs(runner, device)?;
    }

    let partitions = partitioner::create_layout(runner, device, options.efi, &options.efi_size)?;

    info!("Creating file systems.");
    for partition in &partitions {
        debug!(
            "Formatting {} with {}.",
            partition.device().display(),
            partition.filesystem()
        );
        mkfs::format(
            runner,
            partition.device(),
            partition.filesystem(),
            partition.label(),
        )?;
    }

    info!("Mounting partitions.");
    let staging = StagingDir::new()?;

    with_mounts(
        mounter,
        staging.path(),
        &partitions,
        MountOptions::new(),
        |root| restore_image(runner, root, options),
    )
}
