//! Search-path handling: turning `PATH` into an ordered table of directory
//! prefixes and finding the executable a command name refers to.

use crate::error::{Result, ShellError};
use nix::unistd::{AccessFlags, access};
use std::fs;
use std::path::{Path, PathBuf};

/// Upper bound on the number of prefixes a search path may contribute.
pub const MAX_PATHS: usize = 512;

const PATH_KEY: &str = "PATH";

/// Ordered directory prefixes derived from a search-path variable.
///
/// Built once at startup and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTable {
    prefixes: Vec<PathBuf>,
}

impl PathTable {
    /// Split `path_var` on `:` into prefixes.
    ///
    /// Trailing `/` characters are stripped from every segment and an empty
    /// segment stands for the current directory. An absent variable or one
    /// with more than [`MAX_PATHS`] segments is a configuration error.
    pub fn init(path_var: Option<&str>) -> Result<Self> {
        let path_var = path_var
            .ok_or_else(|| ShellError::Configuration(format!("{PATH_KEY} is not set")))?;

        let mut prefixes = Vec::new();
        for segment in path_var.split(':') {
            if prefixes.len() == MAX_PATHS {
                return Err(ShellError::Configuration(format!(
                    "{PATH_KEY} has more than {MAX_PATHS} entries"
                )));
            }
            prefixes.push(Self::prefix_from(segment));
        }
        Ok(Self { prefixes })
    }

    /// Build the table from the process `PATH`.
    pub fn from_env() -> Result<Self> {
        let path_var = std::env::var(PATH_KEY).ok();
        Self::init(path_var.as_deref())
    }

    fn prefix_from(segment: &str) -> PathBuf {
        if segment.is_empty() {
            return PathBuf::from(".");
        }
        let trimmed = segment.trim_end_matches('/');
        if trimmed.is_empty() {
            PathBuf::from("/")
        } else {
            PathBuf::from(trimmed)
        }
    }

    pub fn prefixes(&self) -> &[PathBuf] {
        &self.prefixes
    }

    /// Resolve a command name the way the interpreter launches it.
    ///
    /// Names starting with `.` or `/` are taken as-is without checking that
    /// they exist. Anything else is looked up under each prefix in table order
    /// and the first candidate the current user may execute wins.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        if name.starts_with('.') || name.starts_with('/') {
            return Ok(PathBuf::from(name));
        }
        if name.is_empty() {
            return Err(ShellError::NotFound(name.to_string()));
        }

        self.prefixes
            .iter()
            .map(|prefix| prefix.join(name))
            .find(|candidate| is_executable(candidate))
            .ok_or_else(|| ShellError::NotFound(name.to_string()))
    }

    /// Names of every executable found under the table's prefixes, in table
    /// order. Unreadable directories are skipped.
    pub fn executables(&self) -> Vec<String> {
        let mut names = Vec::new();
        for prefix in &self.prefixes {
            let Ok(entries) = fs::read_dir(prefix) else {
                continue;
            };
            for entry in entries.flatten() {
                if is_executable(&entry.path()) {
                    names.push(entry.file_name().to_string_lossy().into_owned());
                }
            }
        }
        names
    }
}

fn is_executable(path: &Path) -> bool {
    access(path, AccessFlags::X_OK).is_ok()
}
