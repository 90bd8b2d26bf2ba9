//! The dispatch engine.
//!
//! A run goes through the same phases every time, never looping back:
//!
//! 1. discovery: a loose scan of argv for action tokens, tolerant of flags
//!    the shared grammar doesn't know;
//! 2. ownership: the first discovered action that owns the remaining args
//!    becomes the tail owner;
//! 3. split: argv is cut right after the owner's token (by position, not by
//!    searching for its text), the head is parsed strictly and the rest is
//!    kept verbatim as the unparsed tail;
//! 4. execution: actions run one after another until the sequence ends or a
//!    terminal action stops it;
//! 5. reporting: tail tokens nobody consumed are reported, not rejected.
//!
//! Resolution errors surface before any executor is called.

use crate::action::ActionDescriptor;
use crate::context::ExecutionContext;
use crate::env::Environment;
use crate::error::{DispatchError, Result};
use crate::flags::OptionValues;
use crate::parser::{Discovered, ParserFactory, SharedParser};
use crate::registry::Registry;
use crate::runner::{CommandRunner, DryRunRunner, ProcessRunner};
use std::io::Write;
use std::rc::Rc;

/// A fully resolved command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub actions: Vec<String>,
    pub globals: OptionValues,
    pub tail: Vec<String>,
    /// The action token that claimed the tail, with its argv position.
    pub tail_owner: Option<Discovered>,
}

/// What happened during [`Dispatcher::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Canonical names of the actions that ran, in order.
    pub executed: Vec<String>,
    /// The terminal action that ended the sequence early, if any.
    pub stopped_by: Option<String>,
    /// Tail tokens left unconsumed.
    pub unhandled: Vec<String>,
    /// Whether any executed action asked for a quiet finish.
    pub silent: bool,
}

pub struct Dispatcher<'r> {
    registry: &'r Registry,
    parser: SharedParser,
    env: Environment,
    runner: Rc<dyn CommandRunner>,
}

impl<'r> Dispatcher<'r> {
    /// Build the shared parser for `registry` and a dispatcher that launches
    /// real processes in the captured process environment.
    pub fn new(registry: &'r Registry, factory: &ParserFactory) -> Self {
        Self {
            registry,
            parser: factory.build(registry),
            env: Environment::capture(),
            runner: Rc::new(ProcessRunner),
        }
    }

    pub fn with_env(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }

    pub fn with_runner(mut self, runner: Rc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Print commands instead of running them.
    pub fn dry_run(self, enabled: bool) -> Self {
        if enabled {
            self.with_runner(Rc::new(DryRunRunner))
        } else {
            self
        }
    }

    pub fn parser(&self) -> &SharedParser {
        &self.parser
    }

    /// Work out which actions were requested and which tokens form the tail.
    pub fn resolve(&self, argv: &[String]) -> Result<Resolution> {
        let discovered = self.parser.discover(argv);
        tracing::debug!(?discovered, "discovered action tokens");

        let mut tail_owner = None;
        for candidate in discovered {
            // Tokens outside the grammar are left for the strict parse to report.
            if !self.parser.accepts(&candidate.identifier) {
                continue;
            }
            if self.registry.find(&candidate.identifier)?.is_tail_owner() {
                tail_owner = Some(candidate);
                break;
            }
        }

        let Some(owner) = tail_owner else {
            let parsed = self.parser.parse_strict(argv, self.registry)?;
            return Ok(Resolution {
                actions: parsed.actions,
                globals: parsed.globals,
                tail: Vec::new(),
                tail_owner: None,
            });
        };

        let (head, tail) = argv.split_at(owner.index + 1);
        tracing::debug!(
            owner = %owner.identifier,
            index = owner.index,
            ?head,
            ?tail,
            "splitting argv"
        );
        let parsed = self.parser.parse_strict(head, self.registry)?;
        Ok(Resolution {
            actions: parsed.actions,
            globals: parsed.globals,
            tail: tail.to_vec(),
            tail_owner: Some(owner),
        })
    }

    /// Resolve `argv` (without the program name) and run the requested
    /// actions, writing action output and the final report to `out`.
    pub fn run<S: AsRef<str>>(&self, argv: &[S], out: &mut dyn Write) -> Result<Outcome> {
        let argv: Vec<String> = argv.iter().map(|a| a.as_ref().to_owned()).collect();
        let resolution = self.resolve(&argv)?;
        self.run_resolved(resolution, out)
    }

    /// Run the actions of a command line already resolved with
    /// [`Dispatcher::resolve`].
    pub fn run_resolved(&self, resolution: Resolution, out: &mut dyn Write) -> Result<Outcome> {
        tracing::debug!(?resolution, "running resolved command line");
        let plan = self.plan(&resolution.actions)?;

        let help = self.parser.render_help();
        let mut outcome = Outcome::default();
        let mut ctx = ExecutionContext::new(
            self.registry,
            &help,
            &mut *out,
            Rc::clone(&self.runner),
            self.env.clone(),
        );
        ctx.resolve(resolution.actions, resolution.globals, resolution.tail);

        for action in plan {
            self.execute(action, &mut ctx)?;
            outcome.executed.push(action.name.clone());
            outcome.silent |= action.silent;
            if !action.continue_after {
                tracing::info!(action = %action.name, "final action, stopping");
                writeln!(ctx.out(), "ran into final action '{}'", action.name)?;
                outcome.stopped_by = Some(action.name.clone());
                break;
            }
        }

        outcome.unhandled = ctx.into_unhandled();
        if !outcome.unhandled.is_empty() {
            tracing::warn!(unhandled = ?outcome.unhandled, "unhandled extra arguments");
            writeln!(
                out,
                "there were unhandled extra args: {}",
                outcome.unhandled.join(" ")
            )?;
        }
        Ok(outcome)
    }

    /// Descriptors to run, up to and including the first terminal action.
    /// Fails if any of them has no executor.
    fn plan(&self, actions: &[String]) -> Result<Vec<&'r ActionDescriptor>> {
        let mut plan = Vec::with_capacity(actions.len());
        for identifier in actions {
            let action = self.registry.find(identifier)?;
            if !action.has_executor() {
                return Err(DispatchError::MissingExecutor {
                    action: action.name.clone(),
                });
            }
            plan.push(action);
            if !action.continue_after {
                break;
            }
        }
        Ok(plan)
    }

    fn execute(&self, action: &ActionDescriptor, ctx: &mut ExecutionContext<'_>) -> Result<()> {
        ctx.begin(&action.name);
        if action.owns_remaining_args {
            if let Some(parser) = &action.private_parser {
                let parsed = parser.parse(ctx.unparsed())?;
                tracing::debug!(
                    action = %action.name,
                    leftover = ?parsed.leftover,
                    "parsed private args"
                );
                ctx.apply_private(parsed.options, parsed.leftover);
            }
        }

        let executor = action
            .executor
            .as_ref()
            .ok_or_else(|| DispatchError::MissingExecutor {
                action: action.name.clone(),
            })?;
        tracing::debug!(action = %action.name, "executing");
        executor(ctx).map_err(|source| DispatchError::Action {
            action: action.name.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::{FlagSet, FlagSpec};
    use std::cell::RefCell;

    type Log = Rc<RefCell<Vec<String>>>;

    fn args(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    /// An action that records its name and the tail it saw.
    fn recorded(log: &Log, name: &str) -> ActionDescriptor {
        let log = Rc::clone(log);
        let tag = name.to_owned();
        ActionDescriptor::new(name).executor(move |ctx| {
            log.borrow_mut()
                .push(format!("{}[{}]", tag, ctx.unparsed().join(" ")));
            Ok(())
        })
    }

    /// An owner that takes its whole tail.
    fn draining(log: &Log, name: &str) -> ActionDescriptor {
        let log = Rc::clone(log);
        let tag = name.to_owned();
        ActionDescriptor::new(name)
            .owns_remaining_args()
            .executor(move |ctx| {
                let tail = ctx.read_unparsed();
                log.borrow_mut().push(format!("{}[{}]", tag, tail.join(" ")));
                Ok(())
            })
    }

    fn factory() -> ParserFactory {
        ParserFactory::new("act")
            .global(FlagSpec::switch("verbose").short('v'))
            .global(FlagSpec::value("env").short('e'))
    }

    fn dispatch(registry: &Registry, argv: &[&str]) -> (Result<Outcome>, String) {
        let dispatcher = Dispatcher::new(registry, &factory())
            .with_env(Environment::empty("/"))
            .dry_run(true);
        let mut out = Vec::new();
        let result = dispatcher.run(argv, &mut out);
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_tail_owner_gets_raw_tail() {
        let log = Log::default();
        let mut registry = Registry::new();
        registry
            .register(recorded(&log, "help"))
            .register(draining(&log, "run"));

        let dispatcher = Dispatcher::new(&registry, &factory());
        let resolution = dispatcher
            .resolve(&args(&["-v", "run", "--flag", "x"]))
            .unwrap();

        assert!(resolution.globals.flag("verbose"));
        assert_eq!(resolution.actions, vec!["run"]);
        assert_eq!(resolution.tail, vec!["--flag", "x"]);
        assert_eq!(resolution.tail_owner.map(|o| o.index), Some(1));

        let (outcome, out) = dispatch(&registry, &["-v", "run", "--flag", "x"]);
        let outcome = outcome.unwrap();
        assert_eq!(outcome.executed, vec!["run"]);
        assert!(outcome.unhandled.is_empty());
        assert_eq!(out, "");
        assert_eq!(*log.borrow(), vec!["run[--flag x]"]);
    }

    #[test]
    fn test_head_actions_run_before_owner() {
        let log = Log::default();
        let mut registry = Registry::new();
        registry
            .register(recorded(&log, "a"))
            .register(draining(&log, "b"));

        let (outcome, _) = dispatch(&registry, &["-v", "a", "b", "x", "y"]);
        assert_eq!(outcome.unwrap().executed, vec!["a", "b"]);
        // `a` runs first and sees the tail meant for `b`.
        assert_eq!(*log.borrow(), vec!["a[x y]", "b[x y]"]);
    }

    #[test]
    fn test_without_owner_tail_is_empty_and_parse_is_strict() {
        let log = Log::default();
        let mut registry = Registry::new();
        registry.register(recorded(&log, "a"));

        let dispatcher = Dispatcher::new(&registry, &factory());
        let resolution = dispatcher.resolve(&args(&["a", "-v"])).unwrap();
        assert!(resolution.tail.is_empty());
        assert_eq!(resolution.tail_owner, None);

        let (result, _) = dispatch(&registry, &["a", "--flag"]);
        assert!(matches!(result, Err(DispatchError::Usage { .. })));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_first_owner_in_command_line_order_wins() {
        let log = Log::default();
        let mut registry = Registry::new();
        registry
            .register(draining(&log, "first"))
            .register(draining(&log, "second"))
            .register(recorded(&log, "plain"));

        let (outcome, _) = dispatch(&registry, &["plain", "second", "first", "z"]);
        assert_eq!(outcome.unwrap().executed, vec!["plain", "second"]);
        assert_eq!(
            *log.borrow(),
            vec!["plain[first z]", "second[first z]"]
        );
    }

    #[test]
    fn test_split_uses_discovered_position() {
        let log = Log::default();
        let mut registry = Registry::new();
        registry
            .register(recorded(&log, "help"))
            .register(draining(&log, "run"));

        // The first `run` is the value of `-e`, not an action.
        let dispatcher = Dispatcher::new(&registry, &factory());
        let resolution = dispatcher
            .resolve(&args(&["-e", "run", "help", "run", "x"]))
            .unwrap();

        assert_eq!(resolution.globals.value("env"), Some("run"));
        assert_eq!(resolution.actions, vec!["help", "run"]);
        assert_eq!(resolution.tail, vec!["x"]);
    }

    #[test]
    fn test_terminal_action_stops_sequence() {
        let log = Log::default();
        let mut registry = Registry::new();
        registry
            .register(recorded(&log, "a"))
            .register(recorded(&log, "stop").terminal())
            .register(recorded(&log, "b"));

        let (outcome, out) = dispatch(&registry, &["a", "stop", "b", "b", "a"]);
        let outcome = outcome.unwrap();

        assert_eq!(outcome.executed, vec!["a", "stop"]);
        assert_eq!(outcome.stopped_by.as_deref(), Some("stop"));
        assert_eq!(*log.borrow(), vec!["a[]", "stop[]"]);
        assert_eq!(out, "ran into final action 'stop'\n");
    }

    #[test]
    fn test_repeated_action_runs_twice() {
        let log = Log::default();
        let mut registry = Registry::new();
        registry.register(recorded(&log, "a"));

        let dispatcher = Dispatcher::new(&registry, &factory());
        assert_eq!(
            dispatcher.resolve(&args(&["a", "a"])).unwrap().actions,
            vec!["a", "a"]
        );

        let (outcome, _) = dispatch(&registry, &["a", "a"]);
        assert_eq!(outcome.unwrap().executed, vec!["a", "a"]);
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn test_unconsumed_tail_is_reported_not_rejected() {
        let mut registry = Registry::new();
        registry.register(
            ActionDescriptor::new("run")
                .owns_remaining_args()
                .executor(|ctx| {
                    ctx.consume("--force");
                    Ok(())
                }),
        );

        let (outcome, out) = dispatch(&registry, &["run", "--force", "extra"]);
        let outcome = outcome.unwrap();

        assert_eq!(outcome.unhandled, vec!["extra"]);
        assert_eq!(out, "there were unhandled extra args: extra\n");
    }

    #[test]
    fn test_unknown_identifier_aborts_before_execution() {
        let log = Log::default();
        let mut registry = Registry::new();
        registry
            .register(recorded(&log, "a"))
            .register(draining(&log, "run"));

        let (result, _) = dispatch(&registry, &["a", "bogus"]);
        assert!(matches!(
            result,
            Err(DispatchError::Lookup { ref identifier }) if identifier == "bogus"
        ));

        let (result, _) = dispatch(&registry, &["a", "bogus", "run", "x"]);
        assert!(matches!(result, Err(DispatchError::Lookup { .. })));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_head_reparse_failure_is_usage_error() {
        let log = Log::default();
        let mut registry = Registry::new();
        registry
            .register(recorded(&log, "a"))
            .register(draining(&log, "run"));

        let (result, _) = dispatch(&registry, &["--nope", "run", "x"]);
        assert!(matches!(result, Err(DispatchError::Usage { .. })));

        // `val` belongs to the unknown flag, it is not reported as an action.
        let (result, _) = dispatch(&registry, &["--nope", "val", "a", "run", "x"]);
        assert!(matches!(result, Err(DispatchError::Usage { .. })));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_clustered_globals_before_owner() {
        let log = Log::default();
        let mut registry = Registry::new();
        registry
            .register(recorded(&log, "help"))
            .register(draining(&log, "run"));
        let dispatcher = Dispatcher::new(&registry, &factory());

        let resolution = dispatcher
            .resolve(&args(&["-ve", "staging", "run", "get"]))
            .unwrap();
        assert!(resolution.globals.flag("verbose"));
        assert_eq!(resolution.globals.value("env"), Some("staging"));
        assert_eq!(resolution.actions, vec!["run"]);
        assert_eq!(resolution.tail, vec!["get"]);

        let resolution = dispatcher
            .resolve(&args(&["-ve", "staging", "help"]))
            .unwrap();
        assert_eq!(resolution.actions, vec!["help"]);
        assert_eq!(resolution.globals.value("env"), Some("staging"));
        assert_eq!(resolution.tail_owner, None);
    }

    #[test]
    fn test_private_parser_needs_tail_ownership() {
        let seen = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&seen);
        let mut registry = Registry::new();
        registry.register(
            ActionDescriptor::new("show")
                .private_parser(FlagSet::new().flag(FlagSpec::value("key").default_value("HOME")))
                .executor(move |ctx| {
                    *sink.borrow_mut() = Some(ctx.private_options().is_empty());
                    Ok(())
                }),
        );

        let (outcome, _) = dispatch(&registry, &["show"]);
        outcome.unwrap();
        assert_eq!(*seen.borrow(), Some(true));
    }

    #[test]
    fn test_missing_executor_aborts_before_execution() {
        let log = Log::default();
        let mut registry = Registry::new();
        registry
            .register(recorded(&log, "a"))
            .register(ActionDescriptor::new("hollow"));

        let (result, _) = dispatch(&registry, &["a", "hollow"]);
        assert!(matches!(
            result,
            Err(DispatchError::MissingExecutor { ref action }) if action == "hollow"
        ));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_actions_after_terminal_need_no_executor() {
        let log = Log::default();
        let mut registry = Registry::new();
        registry
            .register(recorded(&log, "stop").terminal())
            .register(ActionDescriptor::new("hollow"));

        let (outcome, _) = dispatch(&registry, &["stop", "hollow"]);
        assert_eq!(outcome.unwrap().executed, vec!["stop"]);
    }

    #[test]
    fn test_private_parser_fills_private_options() {
        let seen = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&seen);
        let mut registry = Registry::new();
        registry.register(
            ActionDescriptor::new("show")
                .owns_remaining_args()
                .private_parser(FlagSet::new().flag(FlagSpec::value("key").short('k')))
                .executor(move |ctx| {
                    *sink.borrow_mut() = ctx.private_options().value("key").map(str::to_owned);
                    Ok(())
                }),
        );

        let (outcome, _) = dispatch(&registry, &["show", "-k", "HOME", "stray"]);

        assert_eq!(seen.borrow().as_deref(), Some("HOME"));
        assert_eq!(outcome.unwrap().unhandled, vec!["stray"]);
    }

    #[test]
    fn test_executor_failure_stops_sequence() {
        let log = Log::default();
        let mut registry = Registry::new();
        registry
            .register(ActionDescriptor::new("boom").executor(|_| anyhow::bail!("no credentials")))
            .register(recorded(&log, "a"));

        let (result, _) = dispatch(&registry, &["boom", "a"]);
        let err = result.unwrap_err();

        assert!(matches!(err, DispatchError::Action { ref action, .. } if action == "boom"));
        assert!(err.to_string().contains("no credentials"));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_silent_flag_is_reported() {
        let mut registry = Registry::new();
        registry
            .register(ActionDescriptor::new("quiet").silent().executor(|_| Ok(())))
            .register(ActionDescriptor::new("loud").executor(|_| Ok(())));

        let (outcome, _) = dispatch(&registry, &["loud"]);
        assert!(!outcome.unwrap().silent);
        let (outcome, _) = dispatch(&registry, &["loud", "quiet"]);
        assert!(outcome.unwrap().silent);
    }
}
