use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use types::HidslError;

use crate::{
    boot::{BOOT_DIR, FSTAB, INITRAMFS_PATTERN, SYSLINUX_AUTOUPDATE},
    config::ResetConfig,
    exec::Runner,
    glob::Glob,
    identity::{HOSTNAME, HOST_ID, HOST_KEYS_PATTERN, MACHINE_ID, SSH_DIR},
    pacman::{self, LOCKFILE, PACKAGE_CACHE_DIR},
    passwd::passwd,
    systemd::{self, COREDUMP_DIR, JOURNAL_DIR, JOURNAL_PATTERN},
    utils::{is_mount, is_real_dir, remove_if_present, remove_subtree, rooted},
};

const OPENVPN_CLIENT_DIR: &str = "/etc/openvpn/client";

/// Per-install files removed from the image
const REMOVE_FILES: [&str; 6] = [
    SYSLINUX_AUTOUPDATE,
    FSTAB,
    HOST_ID,
    HOSTNAME,
    MACHINE_ID,
    LOCKFILE,
];

/// Directories and the patterns of what is removed from them
const REMOVE_GLOBS: [(&str, &str); 5] = [
    (BOOT_DIR, INITRAMFS_PATTERN),
    (SSH_DIR, HOST_KEYS_PATTERN),
    (PACKAGE_CACHE_DIR, "*"),
    (COREDUMP_DIR, "*"),
    (JOURNAL_DIR, JOURNAL_PATTERN),
];

#[derive(Clone, Debug)]
pub(crate) struct ResetOptions {
    pub(crate) root: PathBuf,
    pub(crate) force: bool,
    pub(crate) clean_homes: bool,
}

fn delete_client_config(root: &Path) -> Result<(), HidslError> {
    let clients = rooted(root, Path::new(OPENVPN_CLIENT_DIR))?;

    if !is_real_dir(&clients) {
        debug!("No OpenVPN client configuration at {}", clients.display());
        return Ok(());
    }

    remove_subtree(&clients)?;
    Ok(())
}

fn remove_files(root: &Path) -> Result<(), HidslError> {
    for file in REMOVE_FILES {
        let path = rooted(root, Path::new(file))?;

        if remove_if_present(&path)? {
            info!("Removed: {}", path.display());
        } else {
            debug!("Already absent: {}", path.display());
        }
    }

    Ok(())
}

fn remove_globs(root: &Path) -> Result<(), HidslError> {
    for (dir, pattern) in REMOVE_GLOBS {
        let base = rooted(root, Path::new(dir))?;

        if !is_real_dir(&base) {
            debug!("Nothing to remove below {}", base.display());
            continue;
        }

        let glob = Glob::new(base, pattern)?;
        let mut removed = 0_usize;

        for path in glob.iter() {
            debug!("Removing: {}", path.display());

            if remove_if_present(&path)? {
                removed += 1;
            }
        }

        info!(
            "Removed {removed} file(s) matching {}/{pattern}",
            glob.base().display()
        );
    }

    Ok(())
}

fn clean_homes(root: &Path, users: &[String]) -> Result<(), HidslError> {
    let entries = passwd(root)?;

    let mut users = users.to_vec();
    users.sort();

    for user in &users {
        let Some(entry) = entries.iter().find(|e| &e.name == user) else {
            warn!("User {user} doesn't exist, skipping.");
            continue;
        };

        if entry.uid == 0 || entry.home == Path::new("/") {
            warn!("Skipping home {} of {user}.", entry.home.display());
            continue;
        }

        let home = rooted(root, &entry.home)?;
        if !is_real_dir(&home) {
            debug!("User {user} has no home at {}", home.display());
            continue;
        }

        debug!("Cleaning home {} of user {user}.", home.display());
        remove_subtree(&home)?;
    }

    Ok(())
}

/// Turns the system mounted at the root into an unconfigured golden image
///
/// Every removal is a no-op for what is already gone, so running it again
/// leaves the same system behind.
pub(crate) fn reset(
    runner: &dyn Runner,
    options: &ResetOptions,
    config: &ResetConfig,
) -> Result<(), HidslError> {
    let root = options.root.as_path();

    if !options.force && !matches!(is_mount(root), Ok(true)) {
        return Err(HidslError::NotMountPointOrBlockDevice(root.to_path_buf()));
    }

    for unit in &config.disable {
        info!("Disabling {unit}.");
        systemd::disable(runner, unit, root)?;
    }

    info!("Enabling {}.", config.enable);
    systemd::enable(runner, &config.enable, root)?;

    info!("Removing OpenVPN client configuration.");
    delete_client_config(root)?;

    info!("Removing host specific files.");
    remove_files(root)?;
    remove_globs(root)?;

    info!("Clearing journal.");
    systemd::vacuum(runner, root)?;

    info!("Cleaning package cache.");
    pacman::clean(runner, root)?;

    if options.clean_homes {
        info!("Cleaning home directories.");
        clean_homes(root, &config.users)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{
        fs::{self, File},
        os,
        path::Path,
    };

    use tempfile::TempDir;
    use test_log::test;
    use types::HidslError;

    use super::{reset, ResetOptions};
    use crate::{config::ResetConfig, testing::RecordingRunner};

    const PASSWD: &str = "root:x:0:0::/root:/usr/bin/bash
digsig:x:1000:1000::/home/digsig:/usr/bin/bash
homeinfo:x:1001:1001::/:/usr/bin/bash
";

    fn touch(root: &Path, path: &str) {
        let path = root.join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        File::create(path).unwrap();
    }

    fn golden_image() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();

        for file in [
            "boot/vmlinuz-linux",
            "boot/initramfs-linux.img",
            "boot/initramfs-linux-fallback.img",
            "boot/syslinux/SYSLINUX_AUTOUPDATE",
            "etc/fstab",
            "etc/host-id",
            "etc/hostname",
            "etc/machine-id",
            "etc/openvpn/client/terminal.conf",
            "etc/openvpn/client/keys/terminal.key",
            "etc/ssh/sshd_config",
            "etc/ssh/ssh_host_rsa_key",
            "etc/ssh/ssh_host_rsa_key.pub",
            "etc/ssh/ssh_host_ed25519_key",
            "var/cache/pacman/pkg/linux-6.10.zst",
            "var/lib/pacman/db.lck",
            "var/lib/systemd/coredump/core.chromium.1000.zst",
            "var/log/journal/0123abcd/system.journal",
            "home/digsig/.bashrc",
            "home/digsig/.config/chromium/Default/Cookies",
            "root/.bash_history",
        ] {
            touch(root, file);
        }

        fs::write(root.join("etc/passwd"), PASSWD).unwrap();
        dir
    }

    fn options(root: &Path) -> ResetOptions {
        ResetOptions {
            root: root.to_path_buf(),
            force: true,
            clean_homes: true,
        }
    }

    fn remaining(root: &Path) -> Vec<String> {
        let mut found = Vec::new();
        let mut dirs = vec![root.to_path_buf()];

        while let Some(dir) = dirs.pop() {
            for entry in fs::read_dir(&dir).unwrap() {
                let path = entry.unwrap().path();
                found.push(path.strip_prefix(root).unwrap().display().to_string());

                if path.is_dir() && !path.is_symlink() {
                    dirs.push(path);
                }
            }
        }

        found.sort();
        found
    }

    #[test]
    fn test_reset() {
        let dir = golden_image();
        let root = dir.path();
        let runner = RecordingRunner::new();

        reset(&runner, &options(root), &ResetConfig::default()).unwrap();

        assert_eq!(
            remaining(root),
            vec![
                "boot",
                "boot/syslinux",
                "boot/vmlinuz-linux",
                "etc",
                "etc/openvpn",
                "etc/openvpn/client",
                "etc/passwd",
                "etc/ssh",
                "etc/ssh/sshd_config",
                "home",
                "home/digsig",
                "root",
                "root/.bash_history",
                "var",
                "var/cache",
                "var/cache/pacman",
                "var/cache/pacman/pkg",
                "var/lib",
                "var/lib/pacman",
                "var/lib/systemd",
                "var/lib/systemd/coredump",
                "var/log",
                "var/log/journal",
                "var/log/journal/0123abcd",
            ]
        );

        let root = root.display().to_string();
        let root = root.as_str();
        assert_eq!(
            runner.calls(),
            vec![
                vec![
                    "/usr/bin/systemctl",
                    "disable",
                    "application.service",
                    "--root",
                    root
                ],
                vec![
                    "/usr/bin/systemctl",
                    "enable",
                    "unconfigured-warning.service",
                    "--root",
                    root
                ],
                vec!["/usr/bin/journalctl", "--vacuum-size", "1", "--root", root],
                vec!["/usr/bin/journalctl", "--vacuum-time", "1", "--root", root],
                vec![
                    "/usr/bin/pacman",
                    "-S",
                    "-c",
                    "-c",
                    "--noconfirm",
                    "--sysroot",
                    root
                ],
            ]
        );
    }

    #[test]
    fn test_reset_twice() {
        let dir = golden_image();
        let root = dir.path();

        reset(&RecordingRunner::new(), &options(root), &ResetConfig::default()).unwrap();
        let once = remaining(root);

        reset(&RecordingRunner::new(), &options(root), &ResetConfig::default()).unwrap();
        assert_eq!(remaining(root), once);
    }

    #[test]
    fn test_missing_locations() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "etc/passwd");

        reset(
            &RecordingRunner::new(),
            &options(dir.path()),
            &ResetConfig::default(),
        )
        .unwrap();
    }

    #[test]
    fn test_skip_homes() {
        let dir = golden_image();
        let root = dir.path();

        let options = ResetOptions {
            clean_homes: false,
            ..options(root)
        };
        reset(&RecordingRunner::new(), &options, &ResetConfig::default()).unwrap();

        assert!(root.join("home/digsig/.bashrc").exists());
    }

    #[test]
    fn test_requires_mount_point() {
        let dir = golden_image();
        let runner = RecordingRunner::new();

        let options = ResetOptions {
            force: false,
            ..options(dir.path())
        };
        let err = reset(&runner, &options, &ResetConfig::default()).unwrap_err();

        assert!(matches!(err, HidslError::NotMountPointOrBlockDevice(_)));
        assert_eq!(err.exit_code(), 2);
        assert!(runner.calls().is_empty());
        assert!(dir.path().join("etc/host-id").exists());
    }

    #[test]
    fn test_missing_unit_tolerated() {
        let dir = golden_image();
        let runner = RecordingRunner::new().failing_on("disable", 4);

        reset(&runner, &options(dir.path()), &ResetConfig::default()).unwrap();
        assert!(!dir.path().join("etc/machine-id").exists());
    }

    #[test]
    fn test_failed_enable_stops_before_removal() {
        let dir = golden_image();
        let runner = RecordingRunner::new().failing_on("enable", 1);

        reset(&runner, &options(dir.path()), &ResetConfig::default()).unwrap_err();
        assert!(dir.path().join("etc/machine-id").exists());
    }

    #[test]
    fn test_symlinks_not_followed() {
        let outside = TempDir::new().unwrap();
        touch(outside.path(), "ssh_host_rsa_key");
        touch(outside.path(), "keep/me");

        let dir = golden_image();
        let root = dir.path();
        fs::remove_dir_all(root.join("etc/ssh")).unwrap();
        os::unix::fs::symlink(outside.path(), root.join("etc/ssh")).unwrap();
        fs::remove_dir_all(root.join("home/digsig")).unwrap();
        os::unix::fs::symlink(outside.path(), root.join("home/digsig")).unwrap();

        reset(&RecordingRunner::new(), &options(root), &ResetConfig::default()).unwrap();

        assert!(outside.path().join("ssh_host_rsa_key").exists());
        assert!(outside.path().join("keep/me").exists());
    }
}
