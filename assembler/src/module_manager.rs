//! Resolution of `.include "path"` targets.
//!
//! Source files in this compiler are read once and then own their text as
//! plain `String`/`Rc<str>` values (the origin chain keeps provenance), so
//! there is no need for a process-lifetime unit cache keyed by leaked
//! `&'static str` paths. What is kept is the resolution order itself: an
//! absolute path is used as-is; otherwise canonicalization is tried
//! relative to the including file's directory, then against each
//! directory in the configured include search path.

use std::io;
use std::path::{Path, PathBuf};

use crate::config;

/// Include recursion deeper than this is rejected.
pub const MAX_INCLUDE_DEPTH: usize = 16;

pub struct ModuleManager {
    include_paths: Vec<PathBuf>,
}

impl ModuleManager {
    pub fn new(mut include_paths: Vec<PathBuf>) -> Self {
        include_paths.extend(config::INCLUDE_SEARCH_PATH.iter().cloned());
        Self { include_paths }
    }

    /// Resolves `included_path` to a canonical, readable file path.
    pub fn resolve_include_path(&self, caller_directory: Option<&Path>, included_path: &Path) -> Result<PathBuf, io::Error> {
        if included_path.is_absolute() {
            if included_path.exists() {
                return included_path.canonicalize();
            }
            return Err(io::Error::new(io::ErrorKind::NotFound, format!("No such file: {}", included_path.display())));
        }

        if let Some(caller_directory) = caller_directory {
            if let Ok(resolved) = caller_directory.join(included_path).canonicalize() {
                return Ok(resolved);
            }
        }

        if let Ok(resolved) = included_path.canonicalize() {
            return Ok(resolved);
        }

        for search_dir in &self.include_paths {
            if let Ok(resolved) = search_dir.join(included_path).canonicalize() {
                return Ok(resolved);
            }
        }

        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!(
                "Could not resolve the path \"{}\" from directory \"{}\".",
                included_path.display(),
                caller_directory.unwrap_or(Path::new("")).display(),
            ),
        ))
    }
}
