use std::{
    fs::{self, File, OpenOptions},
    io,
    os::unix::fs::{MetadataExt as _, OpenOptionsExt as _},
    path::{Component, Path, PathBuf},
};

use log::debug;
use nix::fcntl::OFlag;

fn is_dir_in_root(root: &Path, path: &Path) -> bool {
    debug!("Checking if {} is in {}", path.display(), root.display());

    if let Ok(p) = path.canonicalize() {
        debug!("File can be canonicalized: {}", p.display());

        return p.starts_with(root);
    }

    if let Some(p) = path.parent() {
        is_dir_in_root(root, p)
    } else {
        false
    }
}

/// Resolves `path` inside the file system mounted at `root`
///
/// Absolute paths are taken relative to `root`. Every directory leading to
/// the file must stay inside `root` once symlinks are resolved; the last
/// component itself is never followed, so that removing the returned path
/// removes a link rather than whatever it points to.
///
/// # Errors
///
/// If the path leaves the root, or if one of its existing ancestors can't be
/// resolved.
pub(crate) fn rooted(root: &Path, path: &Path) -> Result<PathBuf, io::Error> {
    let root = root.canonicalize()?;

    let mut joined = root.clone();
    for part in path.components() {
        match part {
            Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
            Component::ParentDir => joined.push(".."),
            Component::Normal(c) => joined.push(c),
        }
    }

    debug!("Joined Path {}", joined.display());

    if joined == root {
        return Ok(root);
    }

    let (Some(parent), Some(file_name)) = (joined.parent(), joined.file_name()) else {
        // Ends with `..`, resolve it as a whole
        let canonical = joined.canonicalize()?;
        if !canonical.starts_with(&root) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "path isn't contained in root",
            ));
        }

        return Ok(canonical);
    };

    let parent = match parent.canonicalize() {
        Ok(p) => p,
        Err(e) => {
            if e.kind() == io::ErrorKind::NotFound {
                debug!(
                    "Directory {} doesn't exist... Checking if its ancestors exist in the root dir",
                    parent.display()
                );

                let climbs = joined.components().any(|c| c == Component::ParentDir);
                if !climbs && is_dir_in_root(&root, parent) {
                    debug!("File ancestors in root.. Returning");
                    return Ok(joined);
                }
            }

            return Err(e);
        }
    };

    debug!("Canonicalized Parent {}", parent.display());

    if !parent.starts_with(&root) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "path isn't contained in root",
        ));
    }

    Ok(parent.join(file_name))
}

/// Creates or truncates `path` for writing, refusing to go through a symlink
///
/// Pairs with [`rooted`], which leaves the last component unresolved.
pub(crate) fn create_file(path: &Path) -> Result<File, io::Error> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .custom_flags(OFlag::O_NOFOLLOW.bits())
        .open(path)
}

/// Whether `path` is a directory itself rather than a link to one
///
/// Symlinked directories in a target root could point anywhere on the host,
/// so they are never descended into.
pub(crate) fn is_real_dir(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|m| m.is_dir())
}

/// Whether a file system is mounted at `path`
pub(crate) fn is_mount(path: &Path) -> Result<bool, io::Error> {
    let metadata = fs::symlink_metadata(path)?;
    if metadata.file_type().is_symlink() || !metadata.is_dir() {
        return Ok(false);
    }

    let parent = fs::metadata(path.join(".."))?;
    if parent.dev() != metadata.dev() {
        return Ok(true);
    }

    // Only the root directory is its own parent.
    Ok(parent.ino() == metadata.ino())
}

/// Removes a file, symlink or directory tree, treating absence as success
///
/// Returns whether something was removed.
pub(crate) fn remove_if_present(path: &Path) -> Result<bool, io::Error> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };

    let res = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    match res {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Removes everything below `dir`, keeping `dir` itself
pub(crate) fn remove_subtree(dir: &Path) -> Result<(), io::Error> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();

        debug!("Removing {}", path.display());
        remove_if_present(&path)?;
    }

    Ok(())
}
