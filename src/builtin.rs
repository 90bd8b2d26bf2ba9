use crate::action::ActionDescriptor;
use crate::context::ExecutionContext;
use crate::registry::Registry;
use crate::runner::DryRunRunner;
use anyhow::Result;
use argh::{EarlyExit, FromArgs};
use std::io::Write;
use std::rc::Rc;

/// An action whose arguments are declared as an [`argh`] struct.
///
/// The struct is parsed from the unparsed tail when the action owns the
/// remaining args, and from an empty argument list otherwise.
pub trait BuiltinAction: Sized + FromArgs {
    /// Canonical name of the action, e.g. "_help".
    fn name() -> &'static str;

    fn aliases() -> &'static [&'static str] {
        &[]
    }

    fn about() -> &'static str {
        ""
    }

    fn owns_remaining_args() -> bool {
        false
    }

    fn continue_after() -> bool {
        true
    }

    fn silent() -> bool {
        false
    }

    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<()>;
}

/// Descriptor for a typed action. Argument errors are printed to the
/// context's output and fail the action; `--help` prints and succeeds.
pub fn descriptor<T: BuiltinAction + 'static>() -> ActionDescriptor {
    let mut descriptor = ActionDescriptor::new(T::name())
        .aliases(T::aliases().iter().copied())
        .executor(|ctx| {
            let args = if T::owns_remaining_args() {
                ctx.read_unparsed()
            } else {
                Vec::new()
            };
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            match T::from_args(&[T::name()], &args) {
                Ok(action) => action.execute(ctx),
                Err(EarlyExit { output, status }) => {
                    ctx.out().write_all(output.as_bytes())?;
                    match status {
                        Ok(()) => Ok(()),
                        Err(()) => anyhow::bail!("invalid arguments for '{}'", T::name()),
                    }
                }
            }
        });
    if !T::about().is_empty() {
        descriptor = descriptor.about(T::about());
    }
    if T::owns_remaining_args() {
        descriptor = descriptor.owns_remaining_args();
    }
    if !T::continue_after() {
        descriptor = descriptor.terminal();
    }
    if T::silent() {
        descriptor = descriptor.silent();
    }
    descriptor
}

impl Registry {
    /// Register a typed action under [`BuiltinAction::name`].
    pub fn register_builtin<T: BuiltinAction + 'static>(&mut self) -> &mut Self {
        self.register(descriptor::<T>())
    }
}

pub(crate) fn register_builtins(registry: &mut Registry) {
    registry.register_builtin::<Help>().register_builtin::<DryRun>();
}

#[derive(FromArgs)]
/// Print the shared usage and every registered action.
pub struct Help {}

impl BuiltinAction for Help {
    fn name() -> &'static str {
        "_help"
    }

    fn aliases() -> &'static [&'static str] {
        &["?"]
    }

    fn about() -> &'static str {
        "print the shared usage and every registered action"
    }

    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<()> {
        let usage = ctx.help().to_owned();
        let actions = ctx.registry().describe();
        let out = ctx.out();
        writeln!(out, "{}", usage.trim_end())?;
        for action in actions {
            writeln!(out)?;
            if action.aliases.is_empty() {
                writeln!(out, "action '{}'", action.name)?;
            } else {
                writeln!(
                    out,
                    "action '{}' (aliases: {})",
                    action.name,
                    action.aliases.join(", ")
                )?;
            }
            match &action.about {
                Some(about) => writeln!(out, "\t{about}")?,
                None => writeln!(out, "\tno info available")?,
            }
            if action.owns_remaining_args {
                writeln!(out, "\ttakes every argument after it")?;
            }
            if !action.continue_after {
                writeln!(out, "\tstops the action sequence")?;
            }
            if let Some(flags) = &action.flags_help {
                for line in flags.lines().filter(|l| !l.trim().is_empty()) {
                    writeln!(out, "\t{line}")?;
                }
            }
        }
        Ok(())
    }
}

#[derive(FromArgs)]
/// Print external commands instead of running them.
pub struct DryRun {}

impl BuiltinAction for DryRun {
    fn name() -> &'static str {
        "_dry_run"
    }

    fn aliases() -> &'static [&'static str] {
        &["_null_subprocess"]
    }

    fn about() -> &'static str {
        "print external commands of the following actions instead of running them"
    }

    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<()> {
        tracing::debug!("switching to the dry-run command runner");
        ctx.set_runner(Rc::new(DryRunRunner));
        Ok(())
    }
}
