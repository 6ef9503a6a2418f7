use core::fmt;
use std::{
    env, fs,
    os::unix::fs::DirBuilderExt as _,
    path::{Path, PathBuf},
};

use log::{debug, error, trace, warn};
use sys_mount::{FilesystemType, Mount, UnmountFlags};
use types::{HidslError, Partition};
use uuid::Uuid;

use crate::{
    exec::{Runner, ToolCommand},
    utils::rooted,
};

const MOUNT: &str = "/usr/bin/mount";
const UMOUNT: &str = "/usr/bin/umount";

/// Mount option never shown in logs nor passed on a command line
pub(crate) const PASSWORD: &str = "password";

/// Key/value options handed to every mount of a scope, such as share credentials
#[derive(Clone, Default, PartialEq, Eq)]
pub(crate) struct MountOptions(Vec<(String, String)>);

impl MountOptions {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(mut self, key: &str, value: &str) -> Self {
        self.0.push((key.to_owned(), value.to_owned()));
        self
    }

    pub(crate) fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The same options, minus `key`
    pub(crate) fn without(&self, key: &str) -> Self {
        Self(self.0.iter().filter(|(k, _)| k != key).cloned().collect())
    }

    /// Options in the `key=value,...` form the kernel expects
    pub(crate) fn to_data(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Debug for MountOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.iter().map(|(k, v)| {
                if k == PASSWORD {
                    (k.as_str(), "<redacted>")
                } else {
                    (k.as_str(), v.as_str())
                }
            }))
            .finish()
    }
}

/// Mounts and unmounts file systems
pub(crate) trait Mounter {
    fn mount(
        &self,
        partition: &Partition,
        target: &Path,
        options: &MountOptions,
    ) -> Result<(), HidslError>;

    fn unmount(&self, target: &Path) -> Result<(), HidslError>;
}

/// Mounts through the mount(2) and umount(2) system calls
#[derive(Debug)]
pub(crate) struct SysMounter;

impl Mounter for SysMounter {
    fn mount(
        &self,
        partition: &Partition,
        target: &Path,
        options: &MountOptions,
    ) -> Result<(), HidslError> {
        let data = options.to_data();

        let mount = Mount::builder()
            .fstype(FilesystemType::Manual(partition.filesystem().as_mount_str()))
            .data(&data)
            .mount(partition.device(), target)
            .map_err(|err| HidslError::Mount {
                device: partition.device().to_path_buf(),
                target: target.to_path_buf(),
                err,
            })?;

        trace!("Mount Successful on {}", mount.target_path().display());
        Ok(())
    }

    fn unmount(&self, target: &Path) -> Result<(), HidslError> {
        sys_mount::unmount(target, UnmountFlags::empty()).map_err(|err| HidslError::Unmount {
            target: target.to_path_buf(),
            err,
        })
    }
}

/// Mounts through mount(8), so that helpers such as `mount.cifs` do their part
///
/// A password option is handed over in the `PASSWD` environment variable,
/// which `mount.cifs` reads, rather than on the command line.
pub(crate) struct ToolMounter<'a> {
    runner: &'a dyn Runner,
}

impl<'a> ToolMounter<'a> {
    pub(crate) fn new(runner: &'a dyn Runner) -> Self {
        Self { runner }
    }
}

impl fmt::Debug for ToolMounter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolMounter").finish_non_exhaustive()
    }
}

impl Mounter for ToolMounter<'_> {
    fn mount(
        &self,
        partition: &Partition,
        target: &Path,
        options: &MountOptions,
    ) -> Result<(), HidslError> {
        let mut cmd =
            ToolCommand::new(MOUNT).args(["-t", partition.filesystem().as_mount_str()]);

        let data = options.without(PASSWORD).to_data();
        if !data.is_empty() {
            cmd = cmd.args(["-o", data.as_str()]);
        }

        cmd = cmd.arg(partition.device()).arg(target);

        if let Some(password) = options.get(PASSWORD) {
            cmd = cmd.env("PASSWD", password);
        }

        self.runner.run(&cmd)?;
        Ok(())
    }

    fn unmount(&self, target: &Path) -> Result<(), HidslError> {
        self.runner.run(&ToolCommand::new(UMOUNT).arg(target))?;
        Ok(())
    }
}

/// Sorts partitions so that parents come before what is mounted below them
///
/// Ties are broken on the mount point so the order never depends on the
/// caller's.
pub(crate) fn mount_order(partitions: &[Partition]) -> Vec<Partition> {
    let mut sorted = partitions.to_vec();
    sorted.sort_by(|a, b| {
        a.depth()
            .cmp(&b.depth())
            .then_with(|| a.mountpoint().cmp(b.mountpoint()))
    });
    sorted
}

/// A set of partitions mounted below a staging root
///
/// Mounting goes from `/` downwards, unmounting in exactly the reverse
/// order. Whatever got mounted is unmounted when the scope is released or,
/// failing that, dropped, including after a failed [`MountScope::mount_all`].
#[derive(Debug)]
pub(crate) struct MountScope<'a> {
    mounter: &'a dyn Mounter,
    root: PathBuf,
    partitions: Vec<Partition>,
    options: MountOptions,
    mounted: Vec<PathBuf>,
}

impl fmt::Debug for dyn Mounter + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Mounter")
    }
}

impl<'a> MountScope<'a> {
    pub(crate) fn new(
        mounter: &'a dyn Mounter,
        root: &Path,
        partitions: &[Partition],
        options: MountOptions,
    ) -> Self {
        Self {
            mounter,
            root: root.to_path_buf(),
            partitions: mount_order(partitions),
            options,
            mounted: Vec::new(),
        }
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    /// Mounts every partition, stopping at the first failure
    ///
    /// Partitions mounted before the failure stay mounted until the scope is
    /// released or dropped.
    pub(crate) fn mount_all(&mut self) -> Result<(), HidslError> {
        if !self.partitions.is_empty() && !self.partitions.iter().any(Partition::is_root) {
            return Err(HidslError::MissingRootPartition);
        }

        for partition in &self.partitions {
            let target = rooted(&self.root, partition.mountpoint())?;

            if !target.exists() {
                fs::DirBuilder::new()
                    .recursive(true)
                    .mode(0o755)
                    .create(&target)?;
            }

            debug!("Mounting {} to {}.", partition.device().display(), target.display());
            self.mounter.mount(partition, &target, &self.options)?;
            self.mounted.push(target);
        }

        Ok(())
    }

    /// Unmounts everything mounted so far, deepest first
    ///
    /// Every mount gets an unmount attempt even if earlier ones fail; the
    /// last failure is returned.
    pub(crate) fn release(&mut self) -> Result<(), HidslError> {
        let mut res = Ok(());

        while let Some(target) = self.mounted.pop() {
            debug!("Umounting {}.", target.display());

            if let Err(e) = self.mounter.unmount(&target) {
                warn!("Couldn't unmount {}: {e}", target.display());
                res = Err(e);
            }
        }

        res
    }
}

impl Drop for MountScope<'_> {
    fn drop(&mut self) {
        if self.mounted.is_empty() {
            return;
        }

        debug!("Mount scope dropped with active mounts");

        if let Err(e) = self.release() {
            error!("Couldn't release mounts below {}: {e}", self.root.display());
        }
    }
}

/// Runs `f` with the partitions mounted below `root`, unmounting afterwards
///
/// Unmounting happens on every path out, after a failed mount or a failed
/// `f` too. An error from `f` or from mounting takes precedence over an
/// unmount error.
pub(crate) fn with_mounts<T, F>(
    mounter: &dyn Mounter,
    root: &Path,
    partitions: &[Partition],
    options: MountOptions,
    f: F,
) -> Result<T, HidslError>
where
    F: FnOnce(&Path) -> Result<T, HidslError>,
{
    let mut scope = MountScope::new(mounter, root, partitions, options);

    let res = scope.mount_all().and_then(|()| f(scope.root()));
    let released = scope.release();

    let value = res?;
    released?;
    Ok(value)
}

/// A private, initially empty directory to mount file systems on
///
/// The directory is removed on drop, but only if it is empty again: it is
/// never deleted recursively, so a mount that couldn't be released keeps its
/// content.
#[derive(Debug)]
pub(crate) struct StagingDir {
    path: PathBuf,
}

impl StagingDir {
    pub(crate) fn new() -> Result<Self, HidslError> {
        let path = env::temp_dir().join(format!("hidsl-{}", Uuid::new_v4().simple()));

        fs::DirBuilder::new().mode(0o700).create(&path)?;
        debug!("Staging directory is {}", path.display());

        Ok(Self { path })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir(&self.path) {
            error!(
                "Couldn't remove staging directory {}: {e}",
                self.path.display()
            );
        }
    }
}
