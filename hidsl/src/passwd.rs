use core::str::FromStr;
use std::{
    fs,
    path::{Path, PathBuf},
};

use types::HidslError;

use crate::utils::rooted;

const ETC_PASSWD: &str = "/etc/passwd";

/// An entry of a password database
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct PasswdEntry {
    pub(crate) name: String,
    pub(crate) uid: u32,
    pub(crate) gid: u32,
    pub(crate) home: PathBuf,
}

impl FromStr for PasswdEntry {
    type Err = HidslError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields = s.split(':').collect::<Vec<_>>();

        let [name, _password, uid, gid, _gecos, home, _shell] = fields[..] else {
            return Err(HidslError::Custom(format!("Malformed passwd entry: {s}")));
        };

        let id = |field: &str| {
            field
                .parse::<u32>()
                .map_err(|e| HidslError::Custom(format!("Invalid id {field} for {name}: {e}")))
        };

        Ok(Self {
            name: name.to_owned(),
            uid: id(uid)?,
            gid: id(gid)?,
            home: PathBuf::from(home),
        })
    }
}

/// Reads the password database of the system below `root`
pub(crate) fn passwd(root: &Path) -> Result<Vec<PasswdEntry>, HidslError> {
    fs::read_to_string(rooted(root, Path::new(ETC_PASSWD))?)?
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::parse)
        .collect()
}

/// Looks up a user by name in the password database below `root`
pub(crate) fn get_user(root: &Path, name: &str) -> Result<PasswdEntry, HidslError> {
    passwd(root)?
        .into_iter()
        .find(|e| e.name == name)
        .ok_or_else(|| HidslError::Custom(format!("No passwd entry for user {name}")))
}
