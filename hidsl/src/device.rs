use core::fmt;
use std::{
    fs,
    os::unix::fs::FileTypeExt as _,
    path::{Path, PathBuf},
};

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use types::HidslError;

use crate::glob::Glob;

static SDX_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new("^sd[a-z]$").expect("Invalid regex"));
static NVME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new("^nvme[0-9]n[0-9]$").expect("Invalid regex"));
static EMMC_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new("^mmcblk[0-9]$").expect("Invalid regex"));

/// Whether `path` is, or links to, a block device node
pub(crate) fn is_block_device(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|m| m.file_type().is_block_device())
}

/// Naming convention of a block device and its partitions
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DeviceFamily {
    /// SCSI, SATA and USB disks: `/dev/sda`, partitions `/dev/sda1`
    Sdx,

    /// NVMe namespaces: `/dev/nvme0n1`, partitions `/dev/nvme0n1p1`
    Nvme,

    /// eMMC and SD cards: `/dev/mmcblk0`, partitions `/dev/mmcblk0p1`
    Emmc,
}

impl DeviceFamily {
    /// Families in the order they are tried
    pub(crate) const ALL: [Self; 3] = [Self::Sdx, Self::Nvme, Self::Emmc];

    fn regex(self) -> &'static Regex {
        match self {
            Self::Sdx => &SDX_REGEX,
            Self::Nvme => &NVME_REGEX,
            Self::Emmc => &EMMC_REGEX,
        }
    }

    /// Separator between the device name and the partition number
    pub(crate) fn infix(self) -> &'static str {
        match self {
            Self::Sdx => "",
            Self::Nvme | Self::Emmc => "p",
        }
    }

    /// Finds the family whose naming matches the path's file name
    pub(crate) fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;

        Self::ALL.into_iter().find(|family| family.regex().is_match(name))
    }
}

impl fmt::Display for DeviceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sdx => "sdX",
            Self::Nvme => "nvmeXnY",
            Self::Emmc => "mmcblkX",
        })
    }
}

/// A whole-disk block device of a known family
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct BlockDevice {
    path: PathBuf,
    family: DeviceFamily,
}

impl BlockDevice {
    /// Identifies `path` as a block device
    ///
    /// # Errors
    ///
    /// If the file name doesn't follow a known naming convention, or if the
    /// path isn't a block device.
    pub(crate) fn identify(path: &Path) -> Result<Self, HidslError> {
        let family = DeviceFamily::detect(path)
            .ok_or_else(|| HidslError::UnknownDeviceType(path.to_path_buf()))?;

        if !is_block_device(path) {
            return Err(HidslError::UnknownDeviceType(path.to_path_buf()));
        }

        debug!("{} is a {family} block device", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            family,
        })
    }

    #[cfg(test)]
    pub(crate) fn new_unchecked(path: impl Into<PathBuf>, family: DeviceFamily) -> Self {
        Self {
            path: path.into(),
            family,
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn parent(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new("/"))
    }

    /// Device path of the partition with the given number, counting from one
    ///
    /// # Errors
    ///
    /// If `index` is zero
    pub(crate) fn partition(&self, index: u32) -> Result<PathBuf, HidslError> {
        if index == 0 {
            return Err(HidslError::InvalidPartitionIndex(index));
        }

        Ok(self
            .parent()
            .join(format!("{}{}{index}", self.name(), self.family.infix())))
    }

    /// Partition devices currently present, looked up afresh on each call
    pub(crate) fn partitions(&self) -> Result<Glob, HidslError> {
        Glob::new(
            self.parent(),
            &format!("{}{}[0-9]", self.name(), self.family.infix()),
        )
    }
}

impl fmt::Display for BlockDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        fs::File,
        path::{Path, PathBuf},
    };

    use tempfile::TempDir;
    use test_log::test;
    use types::HidslError;

    use super::{BlockDevice, DeviceFamily};

    #[test]
    fn test_detect_families() {
        assert_eq!(
            DeviceFamily::detect(Path::new("/dev/sda")),
            Some(DeviceFamily::Sdx)
        );
        assert_eq!(
            DeviceFamily::detect(Path::new("/dev/nvme0n1")),
            Some(DeviceFamily::Nvme)
        );
        assert_eq!(
            DeviceFamily::detect(Path::new("/dev/mmcblk0")),
            Some(DeviceFamily::Emmc)
        );
    }

    #[test]
    fn test_detect_rejects_partitions_and_others() {
        for path in [
            "/dev/sda1",
            "/dev/nvme0n1p1",
            "/dev/mmcblk0p2",
            "/dev/loop0",
            "/dev/sdaa",
            "/dev/vda",
            "/",
        ] {
            assert_eq!(DeviceFamily::detect(Path::new(path)), None, "{path}");
        }
    }

    #[test]
    fn test_partition_paths() {
        let sdb = BlockDevice::new_unchecked("/dev/sdb", DeviceFamily::Sdx);
        assert_eq!(sdb.partition(1).unwrap(), PathBuf::from("/dev/sdb1"));

        let nvme = BlockDevice::new_unchecked("/dev/nvme0n1", DeviceFamily::Nvme);
        assert_eq!(nvme.partition(2).unwrap(), PathBuf::from("/dev/nvme0n1p2"));

        let emmc = BlockDevice::new_unchecked("/dev/mmcblk1", DeviceFamily::Emmc);
        assert_eq!(emmc.partition(1).unwrap(), PathBuf::from("/dev/mmcblk1p1"));
    }

    #[test]
    fn test_partition_zero() {
        let sda = BlockDevice::new_unchecked("/dev/sda", DeviceFamily::Sdx);

        assert!(matches!(
            sda.partition(0).unwrap_err(),
            HidslError::InvalidPartitionIndex(0)
        ));
    }

    #[test]
    fn test_identify_requires_block_device() {
        let dir = TempDir::new().unwrap();
        let fake = dir.path().join("sda");
        File::create(&fake).unwrap();

        assert!(matches!(
            BlockDevice::identify(&fake).unwrap_err(),
            HidslError::UnknownDeviceType(_)
        ));
        assert!(matches!(
            BlockDevice::identify(Path::new("/dev/null")).unwrap_err(),
            HidslError::UnknownDeviceType(_)
        ));
    }

    #[test]
    fn test_existing_partitions() {
        let dir = TempDir::new().unwrap();
        for name in ["nvme0n1", "nvme0n1p1", "nvme0n1p2", "nvme0n2p1", "nvme0n1p1-backup"] {
            File::create(dir.path().join(name)).unwrap();
        }

        let device = BlockDevice::new_unchecked(dir.path().join("nvme0n1"), DeviceFamily::Nvme);
        let partitions = device.partitions().unwrap();

        let expected = vec![dir.path().join("nvme0n1p1"), dir.path().join("nvme0n1p2")];
        assert_eq!(partitions.iter().collect::<Vec<_>>(), expected);

        File::create(dir.path().join("nvme0n1p3")).unwrap();
        assert_eq!(partitions.iter().count(), 3);
    }
}
