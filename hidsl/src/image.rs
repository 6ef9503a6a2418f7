use std::path::{Path, PathBuf};

use jiff::civil::Date;
use log::info;
use types::{Compression, Filesystem, HidslError, Partition};

use crate::{
    archive,
    exec::Runner,
    mount::{with_mounts, MountOptions, Mounter, StagingDir, PASSWORD},
    utils::{is_mount, rooted},
};

#[derive(Clone, Debug)]
pub(crate) struct ImageOptions {
    pub(crate) root: PathBuf,
    pub(crate) filename: String,
    pub(crate) share: Option<String>,
    pub(crate) user: String,
    pub(crate) compression: Compression,
    pub(crate) level: u8,
    pub(crate) verbose: bool,
}

/// Expands `{date}` and `{suffix}` in an archive name template
pub(crate) fn filename(template: &str, date: Date, compression: Compression) -> String {
    template
        .replace("{date}", &date.to_string())
        .replace("{suffix}", compression.suffix())
}

/// Reads a password from the terminal without echoing it
pub(crate) fn prompt_password(prompt: &str) -> Result<String, HidslError> {
    Ok(rpassword::prompt_password(prompt)?)
}

/// Archives the reference system mounted at the root
///
/// With a share, the archive is written onto it, mounted on a private
/// staging directory for as long as it takes. `password` is only asked for
/// in that case, and nothing gets mounted if Ctrl-C was hit meanwhile.
pub(crate) fn make_image<P>(
    runner: &dyn Runner,
    mounter: &dyn Mounter,
    options: &ImageOptions,
    date: Date,
    password: P,
) -> Result<PathBuf, HidslError>
where
    P: FnOnce() -> Result<String, HidslError>,
{
    let root = options.root.as_path();

    if !matches!(is_mount(root), Ok(true)) {
        return Err(HidslError::NotMountPointOrBlockDevice(root.to_path_buf()));
    }

    let file = PathBuf::from(filename(&options.filename, date, options.compression));

    let create = |tarball: &Path| {
        info!("Creating image {}", tarball.display());

        archive::create(
            runner,
            tarball,
            root,
            options.compression,
            options.level,
            options.verbose,
        )
    };

    let Some(share) = &options.share else {
        create(&file)?;
        return Ok(file);
    };

    let password = password()?;
    runner.check_interrupt()?;

    let mount_options = MountOptions::new()
        .with("user", &options.user)
        .with(PASSWORD, &password);
    let partition = Partition::new(share, "/", Filesystem::Cifs, None);
    let staging = StagingDir::new()?;

    with_mounts(mounter, staging.path(), &[partition], mount_options, |mnt| {
        create(&rooted(mnt, &file)?)
    })?;

    Ok(Path::new(share).join(file))
}
