use crate::context::ExecutionContext;
use crate::error::Result;
use crate::flags::OptionValues;

/// The body of an action. Receives the context for the whole invocation.
pub type Executor = Box<dyn Fn(&mut ExecutionContext<'_>) -> anyhow::Result<()>>;

/// What a private parser makes of the unparsed tail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedTail {
    /// Structured values, exposed as the context's private options.
    pub options: OptionValues,
    /// Tokens the parser didn't recognize; they become the new unparsed tail.
    pub leftover: Vec<String>,
}

/// Parser an action can attach to get structured access to its tail.
///
/// Implementations must tolerate tokens they don't know and return them
/// in [`ParsedTail::leftover`].
pub trait PrivateParser {
    fn parse(&self, tail: &[String]) -> Result<ParsedTail>;

    /// Help text for the action's flags, if there is anything to show.
    fn help(&self, _action: &str) -> Option<String> {
        None
    }
}

/// One registered action.
///
/// Built with a small fluent API:
///
/// ```
/// use cli_actions::ActionDescriptor;
/// let kubectl = ActionDescriptor::new("kubectl")
///     .alias("k8")
///     .about("kubectl with the project's config")
///     .owns_remaining_args()
///     .executor(|ctx| {
///         let _args = ctx.read_unparsed();
///         Ok(())
///     });
/// assert!(kubectl.matches("k8"));
/// ```
pub struct ActionDescriptor {
    pub(crate) name: String,
    pub(crate) aliases: Vec<String>,
    pub(crate) about: Option<String>,
    pub(crate) executor: Option<Executor>,
    pub(crate) continue_after: bool,
    pub(crate) silent: bool,
    pub(crate) owns_remaining_args: bool,
    pub(crate) private_parser: Option<Box<dyn PrivateParser>>,
}

impl ActionDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            about: None,
            executor: None,
            continue_after: true,
            silent: false,
            owns_remaining_args: false,
            private_parser: None,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases.extend(aliases.into_iter().map(Into::into));
        self
    }

    /// One-line description shown by the help action.
    pub fn about(mut self, about: impl Into<String>) -> Self {
        self.about = Some(about.into());
        self
    }

    pub fn executor<F>(mut self, executor: F) -> Self
    where
        F: Fn(&mut ExecutionContext<'_>) -> anyhow::Result<()> + 'static,
    {
        self.executor = Some(Box::new(executor));
        self
    }

    /// Stop the action sequence after this action has run.
    pub fn terminal(mut self) -> Self {
        self.continue_after = false;
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Claim the raw remainder of the command line.
    pub fn owns_remaining_args(mut self) -> Self {
        self.owns_remaining_args = true;
        self
    }

    /// Parse the tail with `parser` before the executor runs. Only applied to
    /// actions that [own the remaining args](Self::owns_remaining_args); the
    /// registry warns about any other action carrying one.
    pub fn private_parser(mut self, parser: impl PrivateParser + 'static) -> Self {
        self.private_parser = Some(Box::new(parser));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn alias_list(&self) -> &[String] {
        &self.aliases
    }

    pub fn continue_after(&self) -> bool {
        self.continue_after
    }

    pub fn is_silent(&self) -> bool {
        self.silent
    }

    pub fn is_tail_owner(&self) -> bool {
        self.owns_remaining_args
    }

    pub fn has_executor(&self) -> bool {
        self.executor.is_some()
    }

    /// Whether `identifier` is this action's name or one of its aliases.
    pub fn matches(&self, identifier: &str) -> bool {
        self.name == identifier || self.aliases.iter().any(|a| a == identifier)
    }

    pub(crate) fn identifiers(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    pub fn info(&self) -> ActionInfo {
        ActionInfo {
            name: self.name.clone(),
            aliases: self.aliases.clone(),
            about: self.about.clone(),
            owns_remaining_args: self.owns_remaining_args,
            continue_after: self.continue_after,
            flags_help: self
                .private_parser
                .as_ref()
                .and_then(|parser| parser.help(&self.name)),
        }
    }
}

impl std::fmt::Debug for ActionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionDescriptor")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("has_executor", &self.executor.is_some())
            .field("continue_after", &self.continue_after)
            .field("silent", &self.silent)
            .field("owns_remaining_args", &self.owns_remaining_args)
            .field("has_private_parser", &self.private_parser.is_some())
            .finish()
    }
}

/// Read-only description of a registered action, for rendering usage text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionInfo {
    pub name: String,
    pub aliases: Vec<String>,
    pub about: Option<String>,
    pub owns_remaining_args: bool,
    pub continue_after: bool,
    pub flags_help: Option<String>,
}
