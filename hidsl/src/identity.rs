use std::{
    collections::BTreeMap,
    fs,
    io::{self, Write as _},
    os::unix::fs::{fchown, DirBuilderExt as _},
    path::Path,
};

use log::{debug, info};
use nix::unistd::{chown, Gid, Uid};
use types::HidslError;
use uuid::Uuid;

use crate::{
    exec::{Runner, ToolCommand},
    passwd::{get_user, PasswdEntry},
    utils::{create_file, is_real_dir, remove_if_present, rooted},
};

pub(crate) const HOST_ID: &str = "/etc/host-id";
pub(crate) const HOSTNAME: &str = "/etc/hostname";
pub(crate) const MACHINE_ID: &str = "/etc/machine-id";

pub(crate) const SSH_DIR: &str = "/etc/ssh";
pub(crate) const HOST_KEYS_PATTERN: &str = "ssh_host_*key*";

const SSH_KEYGEN: &str = "/usr/bin/ssh-keygen";

/// Host key algorithms generated on every restore
const CIPHERS: [&str; 3] = ["rsa", "ecdsa", "ed25519"];

/// Writes a fresh random host identifier to `/etc/host-id`
pub(crate) fn mkhostid(root: &Path) -> Result<Uuid, HidslError> {
    let id = Uuid::new_v4();
    let path = rooted(root, Path::new(HOST_ID))?;

    debug!("Writing host ID {} to {}", id.simple(), path.display());
    writeln!(create_file(&path)?, "{}", id.simple())?;

    Ok(id)
}

fn generate_host_key(runner: &dyn Runner, root: &Path, cipher: &str) -> Result<(), HidslError> {
    let path = rooted(root, &Path::new(SSH_DIR).join(format!("ssh_host_{cipher}_key")))?;

    debug!("Generating {cipher} host key at {}", path.display());

    // ssh-keygen writes through symlinks left in the image
    let public = rooted(root, &Path::new(SSH_DIR).join(format!("ssh_host_{cipher}_key.pub")))?;
    for key in [&path, &public] {
        if remove_if_present(key)? {
            debug!("Removed stale key {}", key.display());
        }
    }

    // ssh-keygen asks before overwriting an existing key
    runner.run(
        &ToolCommand::new(SSH_KEYGEN)
            .arg("-f")
            .arg(&path)
            .args(["-N", "", "-t", cipher])
            .stdin(b"y"),
    )?;

    Ok(())
}

/// Generates one SSH host key per supported algorithm, and a DSA key if asked to
pub(crate) fn generate_host_keys(
    runner: &dyn Runner,
    root: &Path,
    dsa: bool,
) -> Result<(), HidslError> {
    let legacy = dsa.then_some("dsa");

    for cipher in legacy.into_iter().chain(CIPHERS) {
        generate_host_key(runner, root, cipher)?;
    }

    Ok(())
}

fn chown_to(path: &Path, user: &PasswdEntry) -> Result<(), HidslError> {
    chown(
        path,
        Some(Uid::from_raw(user.uid)),
        Some(Gid::from_raw(user.gid)),
    )
    .map_err(|e| HidslError::Io(e.into()))
}

/// Replaces the user's `~/.ssh/authorized_keys` with the given keys
///
/// A `~/.ssh` or `authorized_keys` that is a symlink is refused.
pub(crate) fn install_authorized_keys(
    root: &Path,
    user: &str,
    keys: &[String],
) -> Result<(), HidslError> {
    let entry = get_user(root, user)?;
    let ssh_dir = rooted(root, &entry.home.join(".ssh"))?;

    match fs::symlink_metadata(&ssh_dir) {
        Ok(_) if is_real_dir(&ssh_dir) => {}
        Ok(_) => {
            return Err(HidslError::Custom(format!(
                "{} is not a directory",
                ssh_dir.display()
            )))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::DirBuilder::new().mode(0o700).create(&ssh_dir)?;
        }
        Err(e) => return Err(e.into()),
    }

    chown_to(&ssh_dir, &entry)?;

    let path = rooted(root, &entry.home.join(".ssh/authorized_keys"))?;
    let mut file = create_file(&path)?;
    for key in keys {
        writeln!(file, "{key}")?;
    }

    fchown(&file, Some(entry.uid), Some(entry.gid))?;

    debug!("Installed {} key(s) for {user}", keys.len());
    Ok(())
}

/// Installs the authorized keys of a JSON manifest mapping user names to keys
pub(crate) fn restore_authorized_keys(root: &Path, manifest: &Path) -> Result<(), HidslError> {
    info!("Restoring authorized keys from {}", manifest.display());

    let content = fs::read_to_string(manifest)?;
    let users: BTreeMap<String, Vec<String>> = serde_json::from_str(&content)?;

    for (user, keys) in &users {
        install_authorized_keys(root, user, keys)?;
    }

    Ok(())
}
