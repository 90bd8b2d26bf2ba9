use crate::env::Environment;
use crate::flags::OptionValues;
use crate::registry::Registry;
use crate::runner::{CommandRunner, ExitCode, Invocation};
use std::io::Write;
use std::rc::Rc;

/// Per-invocation state handed to every executor.
///
/// Created by the dispatcher once the command line is resolved and dropped
/// when the action sequence ends. Tokens left in the unparsed tail at that
/// point are reported as unhandled, so actions that read flags straight out
/// of the tail should [`consume`](Self::consume) them.
pub struct ExecutionContext<'a> {
    registry: &'a Registry,
    help: &'a str,
    out: &'a mut dyn Write,
    runner: Rc<dyn CommandRunner>,
    pub env: Environment,
    resolved_actions: Vec<String>,
    global_options: OptionValues,
    unparsed_tail: Vec<String>,
    private_options: OptionValues,
    current: Option<String>,
}

impl<'a> ExecutionContext<'a> {
    pub(crate) fn new(
        registry: &'a Registry,
        help: &'a str,
        out: &'a mut dyn Write,
        runner: Rc<dyn CommandRunner>,
        env: Environment,
    ) -> Self {
        Self {
            registry,
            help,
            out,
            runner,
            env,
            resolved_actions: Vec::new(),
            global_options: OptionValues::default(),
            unparsed_tail: Vec::new(),
            private_options: OptionValues::default(),
            current: None,
        }
    }

    /// The requested actions in command-line order, duplicates included.
    pub fn resolved_actions(&self) -> &[String] {
        &self.resolved_actions
    }

    pub fn global_options(&self) -> &OptionValues {
        &self.global_options
    }

    /// Values produced by the running action's private parser.
    pub fn private_options(&self) -> &OptionValues {
        &self.private_options
    }

    pub fn unparsed(&self) -> &[String] {
        &self.unparsed_tail
    }

    /// Name of the action being executed.
    pub fn current_action(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Take the whole tail, leaving nothing to report as unhandled.
    pub fn read_unparsed(&mut self) -> Vec<String> {
        std::mem::take(&mut self.unparsed_tail)
    }

    /// Mark every tail token equal to `token` as handled. Returns how many were removed.
    pub fn consume(&mut self, token: &str) -> usize {
        let before = self.unparsed_tail.len();
        self.unparsed_tail.retain(|t| t != token);
        before - self.unparsed_tail.len()
    }

    pub fn consume_all<I, S>(&mut self, tokens: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        tokens
            .into_iter()
            .map(|token| self.consume(token.as_ref()))
            .sum()
    }

    /// Remove `--name` from the tail, returning whether it was there.
    pub fn take_switch(&mut self, name: &str) -> bool {
        self.consume(&format!("--{name}")) > 0
    }

    /// Remove the first `--name VALUE` or `--name=VALUE` from the tail and
    /// return the value. A trailing `--name` without a value is left in place.
    pub fn take_option(&mut self, name: &str) -> Option<String> {
        let flag = format!("--{name}");
        let prefix = format!("--{name}=");
        let position = self
            .unparsed_tail
            .iter()
            .position(|t| *t == flag || t.starts_with(&prefix))?;

        if let Some(value) = self.unparsed_tail[position].strip_prefix(&prefix) {
            let value = value.to_owned();
            self.unparsed_tail.remove(position);
            return Some(value);
        }
        if position + 1 >= self.unparsed_tail.len() {
            return None;
        }
        let mut taken = self.unparsed_tail.drain(position..position + 2);
        taken.next();
        taken.next()
    }

    pub fn registry(&self) -> &Registry {
        self.registry
    }

    /// Rendered help of the shared parser.
    pub fn help(&self) -> &str {
        self.help
    }

    pub fn out(&mut self) -> &mut dyn Write {
        &mut *self.out
    }

    /// Launch `invocation` through the current runner, with this context's environment.
    pub fn run(&mut self, invocation: &Invocation) -> anyhow::Result<ExitCode> {
        let runner = Rc::clone(&self.runner);
        runner.run(invocation, &self.env, &mut *self.out)
    }

    /// Swap the runner for the rest of the dispatch.
    pub fn set_runner(&mut self, runner: Rc<dyn CommandRunner>) {
        self.runner = runner;
    }

    pub(crate) fn resolve(
        &mut self,
        actions: Vec<String>,
        globals: OptionValues,
        tail: Vec<String>,
    ) {
        self.resolved_actions = actions;
        self.global_options = globals;
        self.unparsed_tail = tail;
    }

    pub(crate) fn begin(&mut self, action: &str) {
        self.current = Some(action.to_owned());
        self.private_options = OptionValues::default();
    }

    pub(crate) fn apply_private(&mut self, options: OptionValues, leftover: Vec<String>) {
        self.private_options = options;
        self.unparsed_tail = leftover;
    }

    pub(crate) fn into_unhandled(self) -> Vec<String> {
        self.unparsed_tail
    }
}
