use crate::error::EnvFileError;
use std::collections::HashMap;
use std::env as stdenv;
use std::fs;
use std::path::{Path, PathBuf};

/// Process environment as seen by actions and by the commands they launch.
///
/// The environment contains:
/// - `vars`: variables passed to every launched command.
/// - `current_dir`: the working directory for launched commands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    pub vars: HashMap<String, String>,
    pub current_dir: PathBuf,
}

impl Environment {
    /// Capture the current process state.
    pub fn capture() -> Self {
        let vars = stdenv::vars().collect();
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self { vars, current_dir }
    }

    /// An environment with no variables, rooted at `current_dir`.
    pub fn empty(current_dir: impl Into<PathBuf>) -> Self {
        Self {
            vars: HashMap::new(),
            current_dir: current_dir.into(),
        }
    }

    pub fn get_var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// Overlay variables, replacing existing keys.
    pub fn merge(&mut self, vars: HashMap<String, String>) {
        self.vars.extend(vars);
    }

    /// Read an env file and overlay its variables.
    pub fn merge_file(&mut self, path: impl AsRef<Path>) -> Result<(), EnvFileError> {
        let vars = load_env_file(path)?;
        self.merge(vars);
        Ok(())
    }
}

/// Read a `KEY=VALUE` file.
///
/// Lines starting with `#` and blank lines are skipped. Every other line must
/// contain exactly one `=`; the key is trimmed, the value is kept as written.
pub fn load_env_file(path: impl AsRef<Path>) -> Result<HashMap<String, String>, EnvFileError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| EnvFileError::Io {
        path: path.to_owned(),
        source,
    })?;
    parse_env(path, &content)
}

fn parse_env(path: &Path, content: &str) -> Result<HashMap<String, String>, EnvFileError> {
    let mut vars = HashMap::new();
    for (number, line) in content.lines().enumerate() {
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        let mut parts = line.split('=');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(key), Some(value), None) if !key.trim().is_empty() => {
                vars.insert(key.trim().to_owned(), value.to_owned());
            }
            _ => {
                return Err(EnvFileError::Malformed {
                    path: path.to_owned(),
                    line: number + 1,
                    content: line.to_owned(),
                });
            }
        }
    }
    Ok(vars)
}
