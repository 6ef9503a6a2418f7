use std::{
    fs, io,
    path::{Path, PathBuf},
};

use log::debug;
use serde::Deserialize;
use types::{Compression, HidslError};

use crate::{archive::DEFAULT_COMPRESSION_LEVEL, partitioner::DEFAULT_EFI_SIZE};

pub(crate) const DEFAULT_CONFIG_PATH: &str = "/etc/hidsl.toml";

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct RestoreConfig {
    pub(crate) device: PathBuf,
    pub(crate) image: PathBuf,
    pub(crate) authorized_keys: Option<PathBuf>,
    pub(crate) efi_size: String,
    pub(crate) dsa_host_key: bool,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/sda"),
            image: PathBuf::from("/opt/hidsl/ddb.bsdtar.lzop"),
            authorized_keys: None,
            efi_size: DEFAULT_EFI_SIZE.to_owned(),
            dsa_host_key: false,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ResetConfig {
    /// Units disabled on the reset system
    pub(crate) disable: Vec<String>,

    /// Unit telling the user the system still needs to be set up
    pub(crate) enable: String,

    /// Users whose home directories are emptied
    pub(crate) users: Vec<String>,
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            disable: vec![String::from("application.service")],
            enable: String::from("unconfigured-warning.service"),
            users: ["digsig", "homeinfo", "root"].map(String::from).to_vec(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ImageConfig {
    /// Archive name, `{date}` and `{suffix}` are substituted
    pub(crate) filename: String,
    pub(crate) cifs_user: String,
    pub(crate) compression: Compression,
    pub(crate) level: u8,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            filename: String::from("hidsl-{date}.bsdtar.{suffix}"),
            cifs_user: String::from("images"),
            compression: Compression::default(),
            level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct Config {
    pub(crate) restore: RestoreConfig,
    pub(crate) reset: ResetConfig,
    pub(crate) image: ImageConfig,
}

impl Config {
    pub(crate) fn from_toml(content: &str) -> Result<Self, HidslError> {
        Ok(toml::from_str(content)?)
    }

    /// Loads the configuration
    ///
    /// An explicitly given file must exist, the default one may be missing,
    /// in which case the built-in defaults apply.
    pub(crate) fn load(path: Option<&Path>) -> Result<Self, HidslError> {
        let (path, explicit) = match path {
            Some(p) => (p, true),
            None => (Path::new(DEFAULT_CONFIG_PATH), false),
        };

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound && !explicit => {
                debug!("No configuration at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        debug!("Loading configuration from {}", path.display());
        Self::from_toml(&content)
    }
}
