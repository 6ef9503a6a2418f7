use log::{debug, info};
use types::{Filesystem, HidslError, Partition};

use crate::{
    device::BlockDevice,
    exec::{Runner, ToolCommand},
};

const SGDISK: &str = "/usr/bin/sgdisk";
const WIPEFS: &str = "/usr/bin/wipefs";

/// sgdisk type code of the EFI System Partition
const EFI_SYSTEM_PART_TYPE: &str = "ef00";

/// sgdisk type code of a generic Linux file system partition
const LINUX_FS_PART_TYPE: &str = "8300";

pub(crate) const DEFAULT_EFI_SIZE: &str = "500M";

/// Removes every file system, RAID and partition table signature from the device
pub(crate) fn wipefs(runner: &dyn Runner, device: &BlockDevice) -> Result<(), HidslError> {
    info!("Wiping file system signatures from {device}");

    runner.run(
        &ToolCommand::new(WIPEFS)
            .args(["-a", "-f"])
            .arg(device.path()),
    )?;

    Ok(())
}

fn sgdisk(runner: &dyn Runner, device: &BlockDevice, args: &[&str]) -> Result<(), HidslError> {
    runner.run(&ToolCommand::new(SGDISK).args(args).arg(device.path()))?;
    Ok(())
}

fn create_partition(
    runner: &dyn Runner,
    device: &BlockDevice,
    index: u32,
    size: Option<&str>,
    type_code: &str,
) -> Result<(), HidslError> {
    let extent = match size {
        Some(size) => format!("{index}::+{size}"),
        None => format!("{index}::"),
    };

    debug!("Creating partition {index} ({extent}) of type {type_code} on {device}");

    sgdisk(runner, device, &["-n", &extent])?;
    sgdisk(runner, device, &["-t", &format!("{index}:{type_code}")])
}

/// Lays out a fresh GPT on the device
///
/// With `efi`, partition 1 is an EFI System Partition of `efi_size` mounted
/// at `/boot` and partition 2 the root file system spanning the rest of the
/// disk. Without it, a single root partition spans the whole disk.
///
/// Partitions are created in number order, but the root descriptor is
/// returned first and `/boot` after it, the order they get mounted in. Each
/// table change is a separate sgdisk run and nothing is rolled back if one
/// fails.
pub(crate) fn create_layout(
    runner: &dyn Runner,
    device: &BlockDevice,
    efi: bool,
    efi_size: &str,
) -> Result<Vec<Partition>, HidslError> {
    info!("Partitioning disk: {device}");

    sgdisk(runner, device, &["-og"])?;

    let mut boot = None;
    let mut root_index = 1;

    if efi {
        create_partition(runner, device, 1, Some(efi_size), EFI_SYSTEM_PART_TYPE)?;
        boot = Some(Partition::new(
            device.partition(1)?,
            "/boot",
            Filesystem::Vfat,
            Some("EFI"),
        ));

        root_index = 2;
    }

    create_partition(runner, device, root_index, None, LINUX_FS_PART_TYPE)?;

    let mut partitions = vec![Partition::new(
        device.partition(root_index)?,
        "/",
        Filesystem::Ext4,
        Some("root"),
    )];
    partitions.extend(boot);

    for partition in &partitions {
        debug!("Created partition: {partition}");
    }

    Ok(partitions)
}
