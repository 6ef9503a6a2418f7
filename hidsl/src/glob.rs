use std::{
    fs, iter,
    path::{Path, PathBuf},
};

use log::trace;
use regex::Regex;
use types::HidslError;

fn translate(segment: &str) -> String {
    let mut regex = String::from("^");
    let mut chars = segment.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' => regex.push_str("[^/]*"),
            '?' => regex.push_str("[^/]"),
            '[' => {
                regex.push('[');
                if chars.peek() == Some(&'!') {
                    chars.next();
                    regex.push('^');
                }

                for c in chars.by_ref() {
                    if c == ']' {
                        break;
                    }

                    if c == '\\' || c == '[' {
                        regex.push('\\');
                    }

                    regex.push(c);
                }

                regex.push(']');
            }
            c => regex.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }

    regex.push('$');
    regex
}

/// A re-iterable path glob
///
/// The pattern is matched below a base directory, one `/`-separated segment
/// per directory level. Nothing is cached: every call to [`Glob::iter`]
/// reads the file system again.
#[derive(Clone, Debug)]
pub(crate) struct Glob {
    base: PathBuf,
    segments: Vec<Regex>,
}

impl Glob {
    pub(crate) fn new(base: impl Into<PathBuf>, pattern: &str) -> Result<Self, HidslError> {
        let segments = pattern
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                Regex::new(&translate(s))
                    .map_err(|e| HidslError::Custom(format!("Invalid glob {pattern}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            base: base.into(),
            segments,
        })
    }

    pub(crate) fn base(&self) -> &Path {
        &self.base
    }

    /// Lazily yields the matching paths, sorted within each directory
    ///
    /// A missing or unreadable directory has no matches.
    pub(crate) fn iter(&self) -> impl Iterator<Item = PathBuf> + '_ {
        walk(self.base.clone(), &self.segments)
    }
}

fn walk<'a>(dir: PathBuf, segments: &'a [Regex]) -> Box<dyn Iterator<Item = PathBuf> + 'a> {
    let Some((segment, rest)) = segments.split_first() else {
        return Box::new(iter::once(dir));
    };

    let mut entries = match fs::read_dir(&dir) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .filter(|e| {
                e.file_name()
                    .to_str()
                    .is_some_and(|name| segment.is_match(name))
            })
            .collect::<Vec<_>>(),
        Err(e) => {
            trace!("Can't read {}: {e}", dir.display());
            return Box::new(iter::empty());
        }
    };
    entries.sort_by_key(fs::DirEntry::file_name);

    Box::new(
        entries
            .into_iter()
            .flat_map(move |entry| -> Box<dyn Iterator<Item = PathBuf> + 'a> {
                let path = entry.path();

                if rest.is_empty() {
                    return Box::new(iter::once(path));
                }

                // Never descend through symlinks
                if entry.file_type().is_ok_and(|t| t.is_dir()) {
                    walk(path, rest)
                } else {
                    Box::new(iter::empty())
                }
            }),
    )
}
