//! Launching external programs.
//!
//! Actions never spawn processes directly; they describe an [`Invocation`] and
//! hand it to whatever [`CommandRunner`] the context currently holds. The real
//! [`ProcessRunner`] and the printing [`DryRunRunner`] are interchangeable at
//! any point of a dispatch.

use crate::env::Environment;
use anyhow::{Context, Result, anyhow};
use std::borrow::Cow;
use std::ffi::OsStr;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

/// Conventional process exit code: 0 for success, anything else for failure.
pub type ExitCode = i32;

/// A program to launch, with its arguments and extra environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Added on top of the context's environment.
    pub envs: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.envs {
            write!(f, "{key}={value} ")?;
        }
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " {arg:?}")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Something that can carry out an [`Invocation`].
pub trait CommandRunner {
    /// Run to completion. `out` is the dispatcher's output stream, for runners
    /// that report instead of executing.
    fn run(&self, invocation: &Invocation, env: &Environment, out: &mut dyn Write)
    -> Result<ExitCode>;
}

/// Spawns real processes, inheriting stdio.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(
        &self,
        invocation: &Invocation,
        env: &Environment,
        _out: &mut dyn Write,
    ) -> Result<ExitCode> {
        let search_paths = env.get_var("PATH").unwrap_or_default();
        let program = find_command_path(OsStr::new(search_paths), Path::new(&invocation.program))
            .ok_or_else(|| anyhow!("command not found: {}", invocation.program))?;

        tracing::debug!(command = %invocation, "spawning");
        let exit_status = std::process::Command::new(program.as_os_str())
            .args(&invocation.args)
            .env_clear()
            .envs(env.vars.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .envs(invocation.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&env.current_dir)
            .status()
            .with_context(|| format!("failed to spawn {}", invocation.program))?;
        match exit_status.code() {
            Some(code) => Ok(code),
            None => Ok(terminated_by_signal(exit_status)),
        }
    }
}

/// Prints each invocation instead of running it, always reporting success.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunRunner;

impl CommandRunner for DryRunRunner {
    fn run(
        &self,
        invocation: &Invocation,
        _env: &Environment,
        out: &mut dyn Write,
    ) -> Result<ExitCode> {
        tracing::info!(command = %invocation, "dry run, not spawning");
        writeln!(out, "would run: {invocation}")?;
        Ok(0)
    }
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> i32 {
    -1
}

/// Resolve a program path the way a typical shell would.
///
/// - Absolute path: returned if it exists.
/// - `./foo` (or any relative path off unix): returned if it exists.
/// - Single component: looked up in each directory of `search_paths`.
/// - Several components (`bin/tool`): returned if it exists relative to the cwd.
/// - Empty path: `None`.
pub fn find_command_path<'a>(search_paths: &OsStr, path: &'a Path) -> Option<Cow<'a, Path>> {
    if path.is_absolute() {
        return find_by_path(path).map(Cow::Borrowed);
    }

    let search_in_current_dir = cfg!(not(unix)) || path.starts_with("./");
    if search_in_current_dir && path.exists() {
        return Some(Cow::Borrowed(path));
    }

    let mut components = path.components();
    match (components.next(), components.next()) {
        (None, None) => None,
        (Some(single), None) => find_in_path(search_paths, single.as_os_str()).map(Cow::Owned),
        _ => find_by_path(path).map(Cow::Borrowed),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths)
        .map(|dir| dir.join(cmd))
        .find(|candidate| candidate.exists())
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if path.exists() { Some(path) } else { None }
}
