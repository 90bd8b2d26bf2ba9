//! The shared top-level parser.
//!
//! Its grammar is the embedding program's global flags plus one variadic
//! positional, the requested actions. [`SharedParser::discover`] is the loose
//! first pass that finds action tokens without failing on flags it doesn't
//! know; [`SharedParser::parse_strict`] is the authoritative pass built on clap.

use crate::error::{DispatchError, Result};
use crate::flags::{FlagSet, FlagSpec, OptionValues, ScanMode, looks_like_flag};
use crate::registry::Registry;
use clap::{Arg, ArgAction, Command};

const ACTIONS_ID: &str = "actions";

/// Builds a [`SharedParser`] from a [`Registry`].
#[derive(Debug, Clone)]
pub struct ParserFactory {
    program: String,
    about: Option<String>,
    globals: FlagSet,
    strict: bool,
    default_actions: Vec<String>,
}

impl ParserFactory {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            about: None,
            globals: FlagSet::new(),
            strict: false,
            default_actions: Vec::new(),
        }
    }

    pub fn about(mut self, about: impl Into<String>) -> Self {
        self.about = Some(about.into());
        self
    }

    /// Add a program-wide flag.
    pub fn global(mut self, spec: FlagSpec) -> Self {
        self.globals.push(spec);
        self
    }

    /// With `strict` set only canonical names are accepted as action
    /// identifiers; otherwise aliases are accepted too.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Actions to run when the command line names none.
    pub fn default_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_actions = actions.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(&self, registry: &Registry) -> SharedParser {
        let choices = if self.strict {
            registry.names()
        } else {
            registry.names_and_aliases()
        };

        let mut command = Command::new(self.program.clone())
            .no_binary_name(true)
            .disable_help_flag(true)
            .disable_version_flag(true)
            .arg(
                Arg::new(ACTIONS_ID)
                    .value_name("ACTION")
                    .num_args(1..)
                    .action(ArgAction::Append)
                    .help(format!("actions to run, in order: {}", choices.join(", "))),
            )
            .args(self.globals.iter().map(FlagSpec::to_arg));
        if let Some(about) = &self.about {
            command = command.about(about.clone());
        }

        SharedParser {
            command,
            globals: self.globals.clone(),
            choices,
            default_actions: self.default_actions.clone(),
        }
    }
}

/// An action token found by [`SharedParser::discover`], with its index in argv.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovered {
    pub index: usize,
    pub identifier: String,
}

/// Outcome of the strict parse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedArgs {
    pub actions: Vec<String>,
    pub globals: OptionValues,
}

#[derive(Debug, Clone)]
pub struct SharedParser {
    command: Command,
    globals: FlagSet,
    choices: Vec<String>,
    default_actions: Vec<String>,
}

impl SharedParser {
    /// Every positional token of `argv` that isn't the value of a known global
    /// flag, in command-line order. Unknown flags are skipped, never rejected.
    pub fn discover(&self, argv: &[String]) -> Vec<Discovered> {
        // Lenient scans can't fail.
        let scan = match self.globals.scan(argv, ScanMode::Lenient) {
            Ok(scan) => scan,
            Err(_) => return Vec::new(),
        };
        scan.rest
            .into_iter()
            .filter(|(_, token)| !looks_like_flag(token))
            .map(|(index, identifier)| Discovered { index, identifier })
            .collect()
    }

    /// Parse `argv` against the full grammar. Unknown flags, stray tokens and
    /// identifiers outside the grammar are usage errors; identifiers unknown
    /// to the registry are lookup errors.
    pub fn parse_strict(&self, argv: &[String], registry: &Registry) -> Result<ParsedArgs> {
        let matches = self
            .command
            .clone()
            .try_get_matches_from(argv)
            .map_err(|err| DispatchError::usage(err.render().to_string()))?;

        let mut actions: Vec<String> = matches
            .get_many::<String>(ACTIONS_ID)
            .map(|values| values.cloned().collect())
            .unwrap_or_default();
        for identifier in &actions {
            registry.find(identifier)?;
            if !self.accepts(identifier) {
                return Err(DispatchError::usage(format!(
                    "'{}' is not a canonical action name (expected one of: {})",
                    identifier,
                    self.choices.join(", ")
                )));
            }
        }
        if actions.is_empty() {
            if self.default_actions.is_empty() {
                return Err(DispatchError::NoActions);
            }
            actions = self.default_actions.clone();
        }

        let mut globals = OptionValues::default();
        for spec in self.globals.iter() {
            if spec.takes_value() {
                if let Some(value) = matches.get_one::<String>(spec.name()) {
                    globals.set_value(spec.name(), value.clone());
                }
            } else if matches.get_flag(spec.name()) {
                globals.set_switch(spec.name());
            }
        }

        Ok(ParsedArgs { actions, globals })
    }

    /// Whether `identifier` belongs to this parser's positional grammar.
    pub fn accepts(&self, identifier: &str) -> bool {
        self.choices.iter().any(|c| c == identifier)
    }

    pub fn render_help(&self) -> String {
        self.command.clone().render_help().to_string()
    }

    pub fn render_usage(&self) -> String {
        self.command.clone().render_usage().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionDescriptor;

    fn args(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .register(ActionDescriptor::new("help").alias("?"))
            .register(ActionDescriptor::new("run").alias("r").owns_remaining_args());
        registry
    }

    fn factory() -> ParserFactory {
        ParserFactory::new("act")
            .global(FlagSpec::switch("verbose").short('v'))
            .global(FlagSpec::value("env").short('e'))
    }

    #[test]
    fn test_discover_skips_flags_and_flag_values() {
        let registry = registry();
        let parser = factory().build(&registry);

        let found = parser.discover(&args(&["-e", "run", "help", "--unknown", "run", "x"]));
        let found: Vec<_> = found.iter().map(|d| (d.index, d.identifier.as_str())).collect();

        assert_eq!(found, vec![(2, "help"), (4, "run"), (5, "x")]);
    }

    #[test]
    fn test_strict_parse_collects_actions_and_globals() {
        let registry = registry();
        let parser = factory().build(&registry);

        let parsed = parser
            .parse_strict(&args(&["help", "-v", "--env=prod", "run"]), &registry)
            .unwrap();

        assert_eq!(parsed.actions, vec!["help", "run"]);
        assert!(parsed.globals.flag("verbose"));
        assert_eq!(parsed.globals.value("env"), Some("prod"));
    }

    #[test]
    fn test_strict_parse_rejects_unknown_flag() {
        let registry = registry();
        let parser = factory().build(&registry);

        let err = parser
            .parse_strict(&args(&["help", "--flag"]), &registry)
            .unwrap_err();
        assert!(matches!(err, DispatchError::Usage { .. }));
    }

    #[test]
    fn test_strict_parse_unknown_action_is_lookup_error() {
        let registry = registry();
        let parser = factory().build(&registry);

        let err = parser
            .parse_strict(&args(&["bogus"]), &registry)
            .unwrap_err();
        assert!(matches!(err, DispatchError::Lookup { .. }));
    }

    #[test]
    fn test_strict_grammar_refuses_aliases() {
        let registry = registry();
        let loose = factory().build(&registry);
        let strict = factory().strict(true).build(&registry);

        assert!(loose.parse_strict(&args(&["?"]), &registry).is_ok());
        let err = strict.parse_strict(&args(&["?"]), &registry).unwrap_err();
        assert!(matches!(err, DispatchError::Usage { .. }));
    }

    #[test]
    fn test_default_actions_when_none_given() {
        let registry = registry();
        let parser = factory().default_actions(["help"]).build(&registry);
        let parsed = parser.parse_strict(&args(&["-v"]), &registry).unwrap();
        assert_eq!(parsed.actions, vec!["help"]);

        let bare = factory().build(&registry);
        let err = bare.parse_strict(&args(&["-v"]), &registry).unwrap_err();
        assert!(matches!(err, DispatchError::NoActions));
    }

    #[test]
    fn test_help_mentions_globals_and_actions() {
        let registry = registry();
        let help = factory().build(&registry).render_help();
        assert!(help.contains("--verbose"));
        assert!(help.contains("run"));
    }
}
