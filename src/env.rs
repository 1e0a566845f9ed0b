use std::collections::HashMap;
use std::env as stdenv;
use std::path::PathBuf;

const HISTORY_FILE_NAME: &str = ".thsh_history";
const HISTORY_FALLBACK_DIR: &str = "/tmp";

/// Mutable, user-level view of the process environment used by the interpreter.
///
/// The environment contains:
/// - `vars`: a map of environment variables that will be visible to executed commands.
/// - `current_dir`: the working directory for command execution.
/// - `previous_dir`: the directory `cd -` returns to.
/// - `should_exit`: a flag that the driver loop checks to know when to terminate.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Key-value store of environment variables (e.g., PATH, HOME).
    pub vars: HashMap<String, String>,
    /// The current working directory for command execution.
    pub current_dir: PathBuf,
    /// Working directory before the last successful `cd`.
    pub previous_dir: PathBuf,
    /// When set to true, the driver loop stops reading lines and no further
    /// pipeline stages are started.
    pub should_exit: bool,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    pub fn new() -> Self {
        let vars = stdenv::vars().collect();
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            vars,
            previous_dir: current_dir.clone(),
            current_dir,
            should_exit: false,
        }
    }

    /// Get the value of an environment variable.
    ///
    /// Looks up the key in `self.vars` first, falling back to `std::env::var`.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .cloned()
            .or_else(|| stdenv::var(key).ok())
    }

    /// Set or override an environment variable in `self.vars`.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// Location of the persisted history file: `$HOME/.thsh_history`, or the
    /// same name under `/tmp` when `HOME` is not set.
    pub fn history_path(&self) -> PathBuf {
        let dir = self
            .get_var("HOME")
            .filter(|home| !home.is_empty())
            .unwrap_or_else(|| HISTORY_FALLBACK_DIR.to_string());
        PathBuf::from(dir).join(HISTORY_FILE_NAME)
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use crate::env::Environment;
    use std::collections::HashMap;
    use std::env as stdenv;
    use std::path::PathBuf;

    fn bare_env() -> Environment {
        let cwd = stdenv::current_dir().unwrap();
        Environment {
            vars: HashMap::new(),
            previous_dir: cwd.clone(),
            current_dir: cwd,
            should_exit: false,
        }
    }

    #[test]
    fn test_env_set_and_get_var() {
        let mut env = bare_env();

        assert_eq!(env.get_var("SOME_RANDOM_ENV_VAR_12345"), None);

        env.set_var("KEY", "VALUE");

        assert_eq!(env.get_var("KEY"), Some("VALUE".to_string()));
    }

    #[test]
    fn test_env_reads_from_process_env() {
        let env = Environment::new();
        assert!(env.get_var("PATH").is_some());
        assert!(!env.should_exit);
        assert_eq!(env.previous_dir, env.current_dir);
    }

    #[test]
    fn test_history_path_under_home() {
        let mut env = bare_env();
        env.set_var("HOME", "/home/someone");
        assert_eq!(
            env.history_path(),
            PathBuf::from("/home/someone/.thsh_history")
        );
    }

    #[test]
    fn test_history_path_falls_back_when_home_is_empty() {
        let mut env = bare_env();
        env.set_var("HOME", "");
        assert_eq!(env.history_path(), PathBuf::from("/tmp/.thsh_history"));
    }
}
