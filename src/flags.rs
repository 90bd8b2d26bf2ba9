//! Declarative flag lists.
//!
//! A [`FlagSet`] is the small, unknown-tolerant parser an action can attach
//! instead of writing a full grammar. The same [`FlagSpec`] type describes the
//! embedding program's global flags on the shared parser.

use crate::action::{ParsedTail, PrivateParser};
use crate::error::{DispatchError, Result};
use clap::builder::PossibleValuesParser;
use clap::{Arg, ArgAction, Command};
use std::collections::{BTreeMap, BTreeSet};

/// One flag: a long name, an optional short form and, for value flags, an
/// optional fixed set of accepted values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagSpec {
    name: String,
    short: Option<char>,
    takes_value: bool,
    choices: Vec<String>,
    default: Option<String>,
    help: Option<String>,
}

impl FlagSpec {
    /// A boolean switch, `--name` / `-s`.
    pub fn switch(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            short: None,
            takes_value: false,
            choices: Vec::new(),
            default: None,
            help: None,
        }
    }

    /// A flag taking one value, `--name VALUE`, `--name=VALUE`, `-s VALUE` or `-sVALUE`.
    pub fn value(name: impl Into<String>) -> Self {
        Self {
            takes_value: true,
            ..Self::switch(name)
        }
    }

    pub fn short(mut self, short: char) -> Self {
        self.short = Some(short);
        self
    }

    /// Restrict the accepted values. Turns a switch into a value flag.
    pub fn choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.takes_value = true;
        self.choices = choices.into_iter().map(Into::into).collect();
        self
    }

    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.takes_value = true;
        self.default = Some(value.into());
        self
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn takes_value(&self) -> bool {
        self.takes_value
    }

    pub(crate) fn to_arg(&self) -> Arg {
        let mut arg = Arg::new(self.name.clone()).long(self.name.clone());
        if let Some(short) = self.short {
            arg = arg.short(short);
        }
        if let Some(help) = &self.help {
            arg = arg.help(help.clone());
        }
        if !self.takes_value {
            return arg.action(ArgAction::SetTrue);
        }
        arg = arg
            .action(ArgAction::Set)
            .value_name(self.name.to_uppercase());
        if !self.choices.is_empty() {
            arg = arg.value_parser(PossibleValuesParser::new(self.choices.clone()));
        }
        if let Some(default) = &self.default {
            arg = arg.default_value(default.clone());
        }
        arg
    }

    fn check_choice(&self, value: &str) -> Result<()> {
        if self.choices.is_empty() || self.choices.iter().any(|c| c == value) {
            return Ok(());
        }
        Err(DispatchError::usage(format!(
            "invalid value '{}' for '--{}' (possible values: {})",
            value,
            self.name,
            self.choices.join(", ")
        )))
    }
}

/// Parsed flag values, keyed by the flag's long name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionValues {
    switches: BTreeSet<String>,
    values: BTreeMap<String, String>,
}

impl OptionValues {
    /// Whether the switch `name` was given.
    pub fn flag(&self, name: &str) -> bool {
        self.switches.contains(name)
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.switches.is_empty() && self.values.is_empty()
    }

    pub(crate) fn set_switch(&mut self, name: &str) {
        self.switches.insert(name.to_owned());
    }

    pub(crate) fn set_value(&mut self, name: &str, value: impl Into<String>) {
        self.values.insert(name.to_owned(), value.into());
    }
}

/// How [`FlagSet::scan`] treats malformed known flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScanMode {
    /// Never fails; a malformed known flag is left alone.
    Lenient,
    /// Malformed known flags are usage errors. Unknown tokens still pass through.
    Checked,
}

/// Result of a scan: the recognized flags and every other token with its
/// position in the scanned slice.
#[derive(Debug, Default)]
pub(crate) struct Scan {
    pub values: OptionValues,
    pub rest: Vec<(usize, String)>,
}

/// An ordered list of [`FlagSpec`]s, usable as an action's private parser.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagSet {
    flags: Vec<FlagSpec>,
}

impl FlagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flag(mut self, spec: FlagSpec) -> Self {
        self.flags.push(spec);
        self
    }

    pub fn push(&mut self, spec: FlagSpec) {
        self.flags.push(spec);
    }

    pub fn iter(&self) -> impl Iterator<Item = &FlagSpec> {
        self.flags.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Parse the flags this set knows about and hand back everything else untouched.
    pub fn parse_known(&self, tokens: &[String]) -> Result<(OptionValues, Vec<String>)> {
        let scan = self.scan(tokens, ScanMode::Checked)?;
        Ok((
            scan.values,
            scan.rest.into_iter().map(|(_, token)| token).collect(),
        ))
    }

    /// Render the flag list the way clap renders a command's options.
    pub fn render_help(&self, name: &str) -> String {
        self.to_command(name).render_help().to_string()
    }

    pub(crate) fn to_command(&self, name: &str) -> Command {
        Command::new(name.to_owned())
            .no_binary_name(true)
            .disable_help_flag(true)
            .disable_version_flag(true)
            .args(self.flags.iter().map(FlagSpec::to_arg))
    }

    pub(crate) fn scan(&self, tokens: &[String], mode: ScanMode) -> Result<Scan> {
        let mut scan = Scan::default();
        let mut i = 0;
        while i < tokens.len() {
            let token = &tokens[i];
            if token == "--" {
                scan.rest
                    .extend(tokens.iter().cloned().enumerate().skip(i));
                break;
            }
            let Some((clustered, spec, inline)) = self.lookup(token) else {
                scan.rest.push((i, token.clone()));
                i += 1;
                continue;
            };
            for switch in clustered {
                scan.values.set_switch(&switch.name);
            }

            if !spec.takes_value {
                match inline {
                    None => scan.values.set_switch(&spec.name),
                    Some(_) if mode == ScanMode::Checked => {
                        return Err(DispatchError::usage(format!(
                            "'--{}' doesn't take a value",
                            spec.name
                        )));
                    }
                    Some(_) => scan.rest.push((i, token.clone())),
                }
                i += 1;
                continue;
            }

            let value = match inline {
                Some(value) => Some(value),
                None => match tokens.get(i + 1) {
                    Some(next) if !looks_like_flag(next) => {
                        i += 1;
                        Some(next.clone())
                    }
                    _ => None,
                },
            };
            match value {
                Some(value) => match spec.check_choice(&value) {
                    Ok(()) => scan.values.set_value(&spec.name, value),
                    Err(err) if mode == ScanMode::Checked => return Err(err),
                    Err(_) => {}
                },
                None if mode == ScanMode::Checked => {
                    return Err(DispatchError::usage(format!(
                        "'--{}' expects a value",
                        spec.name
                    )));
                }
                None => {}
            }
            i += 1;
        }

        for spec in &self.flags {
            if let Some(default) = spec.default.as_deref() {
                if scan.values.value(&spec.name).is_none() {
                    scan.values.set_value(&spec.name, default);
                }
            }
        }
        Ok(scan)
    }

    /// Match a token against the known flags. Returns the switches set by a
    /// short cluster (`-vq`), the flag the token ends on and its inline value,
    /// if any (`--name=value`, `-sVALUE`, `-vsVALUE`).
    ///
    /// A cluster is walked like clap walks it: switches until the first flag
    /// that takes a value, which gets the rest of the cluster.
    fn lookup(&self, token: &str) -> Option<(Vec<&FlagSpec>, &FlagSpec, Option<String>)> {
        if let Some(long) = token.strip_prefix("--") {
            let (name, inline) = match long.split_once('=') {
                Some((name, value)) => (name, Some(value.to_owned())),
                None => (long, None),
            };
            return self
                .flags
                .iter()
                .find(|spec| spec.name == name)
                .map(|spec| (Vec::new(), spec, inline));
        }

        let cluster = token.strip_prefix('-')?;
        let mut switches = Vec::new();
        for (at, short) in cluster.char_indices() {
            // An unknown short anywhere leaves the whole token to its owner.
            let spec = self.flags.iter().find(|spec| spec.short == Some(short))?;
            let rest = &cluster[at + short.len_utf8()..];
            if spec.takes_value {
                let inline = (!rest.is_empty()).then(|| rest.trim_start_matches('=').to_owned());
                return Some((switches, spec, inline));
            }
            if rest.is_empty() {
                return Some((switches, spec, None));
            }
            switches.push(spec);
        }
        None
    }
}

impl FromIterator<FlagSpec> for FlagSet {
    fn from_iter<T: IntoIterator<Item = FlagSpec>>(iter: T) -> Self {
        Self {
            flags: iter.into_iter().collect(),
        }
    }
}

impl PrivateParser for FlagSet {
    fn parse(&self, tail: &[String]) -> Result<ParsedTail> {
        let (options, leftover) = self.parse_known(tail)?;
        Ok(ParsedTail { options, leftover })
    }

    fn help(&self, action: &str) -> Option<String> {
        (!self.is_empty()).then(|| self.render_help(action))
    }
}

pub(crate) fn looks_like_flag(token: &str) -> bool {
    token.len() > 1 && token.starts_with('-')
}
