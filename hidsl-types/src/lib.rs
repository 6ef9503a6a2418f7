#![doc = include_str!("../README.md")]
#![allow(clippy::multiple_crate_versions)]

extern crate alloc;

use alloc::fmt;
use std::{
    io,
    path::{Component, Path, PathBuf},
};

use serde::Deserialize;

/// File systems a partition can carry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Filesystem {
    /// The Fourth Extended Filesystem
    Ext4,

    /// FAT32, used for the EFI System Partition
    Vfat,

    /// A CIFS/SMB network share
    Cifs,
}

impl Filesystem {
    /// Returns the file system type name the kernel knows it by
    #[must_use]
    pub fn as_mount_str(self) -> &'static str {
        match self {
            Self::Ext4 => "ext4",
            Self::Vfat => "vfat",
            Self::Cifs => "cifs",
        }
    }

    /// Returns the `mkfs` arguments selecting this file system, or `None` if
    /// the file system can't be created locally.
    #[must_use]
    pub fn mkfs_args(self) -> Option<&'static [&'static str]> {
        match self {
            Self::Ext4 => Some(&["-t", "ext4", "-F"]),
            Self::Vfat => Some(&["-t", "vfat", "-F32"]),
            Self::Cifs => None,
        }
    }

    /// Returns the `mkfs` flag used to set the volume label
    #[must_use]
    pub fn label_flag(self) -> Option<&'static str> {
        match self {
            Self::Ext4 => Some("-L"),
            Self::Vfat => Some("-n"),
            Self::Cifs => None,
        }
    }
}

impl fmt::Display for Filesystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_mount_str())
    }
}

/// Compression algorithms understood by bsdtar
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[clap(rename_all = "lower")]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// XZ
    Xz,

    /// BZip2
    Bzip2,

    /// Long Range ZIP
    Lrzip,

    /// LZ4
    Lz4,

    /// Zstandard
    Zstd,

    /// Legacy LZMA
    Lzma,

    /// LZO, fast to unpack on the endpoints
    #[default]
    Lzop,

    /// GZip
    Gzip,
}

impl Compression {
    /// Returns the name bsdtar uses for this algorithm
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Xz => "xz",
            Self::Bzip2 => "bzip2",
            Self::Lrzip => "lrzip",
            Self::Lz4 => "lz4",
            Self::Zstd => "zstd",
            Self::Lzma => "lzma",
            Self::Lzop => "lzop",
            Self::Gzip => "gzip",
        }
    }

    /// Returns the bsdtar command line flag selecting this algorithm
    #[must_use]
    pub fn bsdtar_arg(self) -> String {
        format!("--{}", self.as_str())
    }

    /// Returns the file name suffix of archives using this algorithm
    #[must_use]
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Xz => "xz",
            Self::Bzip2 => "bz2",
            Self::Lrzip => "lrz",
            Self::Lz4 => "lz4",
            Self::Zstd => "zst",
            Self::Lzma => "lzma",
            Self::Lzop => "lzo",
            Self::Gzip => "gz",
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A partition to format and mount
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Partition {
    device: PathBuf,
    mountpoint: PathBuf,
    filesystem: Filesystem,
    label: Option<String>,
}

impl Partition {
    /// Creates a new partition descriptor
    ///
    /// The mount point is an absolute path within the final root file system.
    #[must_use]
    pub fn new(
        device: impl Into<PathBuf>,
        mountpoint: impl Into<PathBuf>,
        filesystem: Filesystem,
        label: Option<&str>,
    ) -> Self {
        Self {
            device: device.into(),
            mountpoint: mountpoint.into(),
            filesystem,
            label: label.map(ToOwned::to_owned),
        }
    }

    /// Device (or network share) holding the file system
    #[must_use]
    pub fn device(&self) -> &Path {
        &self.device
    }

    /// Mount point within the final root file system
    #[must_use]
    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    /// File system of the partition
    #[must_use]
    pub fn filesystem(&self) -> Filesystem {
        self.filesystem
    }

    /// Volume label of the file system
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Number of path segments of the mount point, `/` being zero
    #[must_use]
    pub fn depth(&self) -> usize {
        self.mountpoint
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .count()
    }

    /// Whether this partition is mounted at the root of the file system
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.mountpoint.has_root() && self.depth() == 0
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) on {}",
            self.device.display(),
            self.filesystem,
            self.mountpoint.display()
        )?;

        if let Some(label) = &self.label {
            write!(f, " [{label}]")?;
        }

        Ok(())
    }
}

fn exit_status_suffix(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!(" with exit code {code}"),
        None => String::from(", killed by a signal"),
    }
}

/// Exit status reported when the target is neither a mount point nor a block device
pub const EXIT_PRECONDITION: u8 = 2;

/// Exit status reported when the user interrupted the run
pub const EXIT_ABORTED: u8 = 130;

/// Our Error Type
#[derive(thiserror::Error, Debug)]
pub enum HidslError {
    /// The path doesn't name a block device of a known family
    #[error("Unknown block device type: {}", .0.display())]
    UnknownDeviceType(PathBuf),

    /// Partitions are numbered from one
    #[error("Invalid partition index: {0}")]
    InvalidPartitionIndex(u32),

    /// The file system can't be created by this tool
    #[error("Unsupported file system: {0}")]
    UnsupportedFilesystem(Filesystem),

    /// A non-empty set of partitions was given without one mounted at `/`
    #[error("No partition is mounted at /")]
    MissingRootPartition,

    /// The target given is neither a mount point nor a block device
    #[error("{} is neither a mount point, nor a block device", .0.display())]
    NotMountPointOrBlockDevice(PathBuf),

    /// An external tool exited unsuccessfully
    #[error("{program} failed{}", exit_status_suffix(.code))]
    Subprocess {
        /// Absolute path of the tool
        program: String,

        /// Exit code, if the tool exited normally
        code: Option<i32>,

        /// Captured standard error output
        stderr: String,
    },

    /// Mounting a file system failed
    #[error("Couldn't mount {} on {}", .device.display(), .target.display())]
    Mount {
        /// Device or share that was to be mounted
        device: PathBuf,

        /// Mount point
        target: PathBuf,

        /// Underlying system error
        #[source]
        err: io::Error,
    },

    /// Unmounting a file system failed
    #[error("Couldn't unmount {}", .target.display())]
    Unmount {
        /// Mount point
        target: PathBuf,

        /// Underlying system error
        #[source]
        err: io::Error,
    },

    /// The run was interrupted by the user
    #[error("Aborted by user")]
    Aborted,

    /// An error has occurred when accessing the local filesystem or files
    #[error("I/O Error")]
    Io(#[from] io::Error),

    /// An error has occurred when parsing JSON data
    #[error("JSON Parsing Failure")]
    Json(#[from] serde_json::Error),

    /// An error has occurred when parsing TOML configuration files
    #[error("Configuration File Format Error")]
    Toml(#[from] toml::de::Error),

    /// An unknown error occurred
    #[error("Error: {0}")]
    Custom(String),
}

impl HidslError {
    /// Returns the process exit status this error should be reported with
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Subprocess {
                code: Some(code), ..
            } => u8::try_from(*code)
                .ok()
                .filter(|code| *code != 0)
                .unwrap_or(1),
            Self::NotMountPointOrBlockDevice(_) => EXIT_PRECONDITION,
            Self::Aborted => EXIT_ABORTED,
            Self::UnknownDeviceType(_)
            | Self::InvalidPartitionIndex(_)
            | Self::UnsupportedFilesystem(_)
            | Self::MissingRootPartition
            | Self::Subprocess { code: None, .. }
            | Self::Mount { .. }
            | Self::Unmount { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::Toml(_)
            | Self::Custom(_) => 1,
        }
    }
}
