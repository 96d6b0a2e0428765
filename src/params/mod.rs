//! Ordered CLI parameter sets that providers patch into their own commands.
//!
//! A [`ParameterSet`] is the single source of truth for a deployment
//! command's options. Providers start from the shared base set and apply a
//! list of [`Patch`]es; the result is rendered into a `clap` subcommand and,
//! after parsing, resolved into [`Values`] in declaration order so that a
//! parameter's validator can read everything declared before it.

use crate::error::{Error, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::collections::BTreeMap;

pub mod prompt;
pub mod validate;

pub use prompt::{Prompter, TerminalPrompter};
pub use validate::{LiveDomain, Validator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Text,
    /// Never echoed when prompted and never shown as a literal default.
    Secret,
    /// Rendered as a `--name` / `--no-name` pair.
    Flag,
    Integer,
    Path,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultValue {
    None,
    Literal(String),
    Env(&'static str),
    EnvOr(&'static str, String),
}

#[derive(Debug, Clone)]
pub struct ParameterDefinition {
    pub name: &'static str,
    pub help: &'static str,
    pub kind: ValueKind,
    pub default: DefaultValue,
    /// Asked interactively when no value resolves. Prompted parameters are required.
    pub prompt: Option<String>,
    /// Limits the requirement to values resolved before this parameter.
    pub required_when: Option<fn(&Values) -> bool>,
    pub show_default: bool,
    pub validator: Option<Validator>,
}

impl ParameterDefinition {
    pub fn new(name: &'static str, kind: ValueKind, help: &'static str) -> Self {
        Self {
            name,
            help,
            kind,
            default: DefaultValue::None,
            prompt: None,
            required_when: None,
            show_default: true,
            validator: None,
        }
    }

    pub fn text(name: &'static str, help: &'static str) -> Self {
        Self::new(name, ValueKind::Text, help)
    }

    pub fn secret(name: &'static str, help: &'static str) -> Self {
        Self::new(name, ValueKind::Secret, help)
    }

    pub fn flag(name: &'static str, help: &'static str) -> Self {
        Self::new(name, ValueKind::Flag, help)
    }

    pub fn integer(name: &'static str, help: &'static str) -> Self {
        Self::new(name, ValueKind::Integer, help)
    }

    pub fn path(name: &'static str, help: &'static str) -> Self {
        Self::new(name, ValueKind::Path, help)
    }

    pub fn default_value(mut self, value: &str) -> Self {
        self.default = DefaultValue::Literal(value.to_string());
        self
    }

    pub fn default_env(mut self, var: &'static str) -> Self {
        self.default = DefaultValue::Env(var);
        self
    }

    pub fn default_env_or(mut self, var: &'static str, value: &str) -> Self {
        self.default = DefaultValue::EnvOr(var, value.to_string());
        self
    }

    pub fn prompt(mut self, text: &str) -> Self {
        self.prompt = Some(text.to_string());
        self
    }

    pub fn required_when(mut self, condition: fn(&Values) -> bool) -> Self {
        self.required_when = Some(condition);
        self
    }

    pub fn hide_default(mut self) -> Self {
        self.show_default = false;
        self
    }

    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    fn is_required(&self, context: &Values) -> bool {
        self.prompt.is_some() && self.required_when.is_none_or(|condition| condition(context))
    }

    fn negated_name(&self) -> String {
        format!("no-{}", self.name)
    }

    /// Default as displayed in help output.
    pub fn default_hint(&self) -> Option<String> {
        if !self.show_default {
            return None;
        }
        let secret = self.kind == ValueKind::Secret;
        match &self.default {
            DefaultValue::None => None,
            DefaultValue::Literal(_) if secret => None,
            DefaultValue::Literal(value) => Some(value.clone()),
            DefaultValue::Env(var) => Some(format!("${var}")),
            DefaultValue::EnvOr(var, _) if secret => Some(format!("${var}")),
            DefaultValue::EnvOr(var, value) => Some(format!("${var}, else {value}")),
        }
    }

    fn resolve_default(&self, env: &dyn Fn(&str) -> Option<String>) -> Option<String> {
        match &self.default {
            DefaultValue::None => None,
            DefaultValue::Literal(value) => Some(value.clone()),
            DefaultValue::Env(var) => env(var).filter(|v| !v.is_empty()),
            DefaultValue::EnvOr(var, value) => {
                env(var).filter(|v| !v.is_empty()).or_else(|| Some(value.clone()))
            }
        }
    }

    /// Checks `raw` against the value kind and the validator.
    pub fn check(&self, context: &Values, raw: &str) -> Result<String> {
        let value = match self.kind {
            ValueKind::Flag => match raw.trim().to_lowercase().as_str() {
                "true" | "yes" | "1" | "on" => "true".to_string(),
                "false" | "no" | "0" | "off" => "false".to_string(),
                _ => {
                    return Err(Error::Validation {
                        parameter: self.name.to_string(),
                        message: format!("'{raw}' is not a boolean"),
                    });
                }
            },
            ValueKind::Integer => raw
                .trim()
                .parse::<i64>()
                .map(|n| n.to_string())
                .map_err(|_| Error::Validation {
                    parameter: self.name.to_string(),
                    message: format!("'{raw}' is not an integer"),
                })?,
            _ => raw.to_string(),
        };

        match &self.validator {
            Some(validator) => validator.validate(self.name, context, &value),
            None => Ok(value),
        }
    }

    fn args(&self) -> Vec<Arg> {
        let mut help = self.help.to_string();
        if let Some(choices) = self.validator.as_ref().and_then(|v| v.choices()) {
            help.push_str(&format!(" [possible values: {}]", choices.join(", ")));
        }

        match self.kind {
            ValueKind::Flag => {
                let enabled = matches!(&self.default, DefaultValue::Literal(v) if v == "true");
                if enabled && self.show_default {
                    help.push_str(" [default: enabled]");
                }
                vec![
                    Arg::new(self.name)
                        .long(self.name)
                        .action(ArgAction::SetTrue)
                        .help(help)
                        .overrides_with(self.negated_name()),
                    Arg::new(self.negated_name())
                        .long(self.negated_name())
                        .action(ArgAction::SetTrue)
                        .help(format!("Disable --{}", self.name))
                        .overrides_with(self.name),
                ]
            }
            _ => {
                if let Some(hint) = self.default_hint() {
                    help.push_str(&format!(" [default: {hint}]"));
                }
                vec![
                    Arg::new(self.name)
                        .long(self.name)
                        .value_name(self.name.to_uppercase().replace('-', "_"))
                        .action(ArgAction::Set)
                        .help(help),
                ]
            }
        }
    }
}

/// A single mutation of a [`ParameterSet`].
#[derive(Debug, Clone)]
pub enum Patch {
    InsertBefore(&'static str, ParameterDefinition),
    InsertAfter(&'static str, ParameterDefinition),
    Append(ParameterDefinition),
    Remove(&'static str),
}

#[derive(Debug, Clone, Default)]
pub struct ParameterSet {
    parameters: Vec<ParameterDefinition>,
}

impl ParameterSet {
    pub fn new(definitions: Vec<ParameterDefinition>) -> Result<Self> {
        let mut set = Self::default();
        for definition in definitions {
            set.append(definition)?;
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParameterDefinition> {
        self.parameters.iter()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.parameters.iter().map(|p| p.name).collect()
    }

    pub fn get(&self, name: &str) -> Option<&ParameterDefinition> {
        self.parameters.iter().find(|p| p.name == name)
    }

    fn position(&self, name: &str) -> Result<usize> {
        self.parameters
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| Error::UnknownAnchor {
                anchor: name.to_string(),
            })
    }

    fn ensure_unique(&self, name: &str) -> Result<()> {
        if self.get(name).is_some() {
            return Err(Error::DuplicateName {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    pub fn append(&mut self, definition: ParameterDefinition) -> Result<()> {
        self.ensure_unique(definition.name)?;
        self.parameters.push(definition);
        Ok(())
    }

    pub fn insert_before(&mut self, anchor: &str, definition: ParameterDefinition) -> Result<()> {
        let index = self.position(anchor)?;
        self.ensure_unique(definition.name)?;
        self.parameters.insert(index, definition);
        Ok(())
    }

    pub fn insert_after(&mut self, anchor: &str, definition: ParameterDefinition) -> Result<()> {
        let index = self.position(anchor)?;
        self.ensure_unique(definition.name)?;
        self.parameters.insert(index + 1, definition);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<ParameterDefinition> {
        let index = self.position(name)?;
        Ok(self.parameters.remove(index))
    }

    pub fn apply(&mut self, patch: Patch) -> Result<()> {
        match patch {
            Patch::InsertBefore(anchor, definition) => self.insert_before(anchor, definition),
            Patch::InsertAfter(anchor, definition) => self.insert_after(anchor, definition),
            Patch::Append(definition) => self.append(definition),
            Patch::Remove(name) => self.remove(name).map(|_| ()),
        }
    }

    /// Applies `patches` in order to a copy of `base`. Each patch sees the
    /// result of the ones before it, so an inserted parameter can anchor a
    /// later patch.
    pub fn build(base: &ParameterSet, patches: impl IntoIterator<Item = Patch>) -> Result<Self> {
        let mut set = base.clone();
        for patch in patches {
            set.apply(patch)?;
        }
        Ok(set)
    }

    pub fn command(&self, name: &'static str, about: &'static str) -> Command {
        self.parameters
            .iter()
            .flat_map(ParameterDefinition::args)
            .fold(
                Command::new(name).about(about).args_override_self(true),
                |command, arg| command.arg(arg),
            )
    }

    /// Values given explicitly on the command line.
    pub fn cli_values(&self, matches: &ArgMatches) -> BTreeMap<String, String> {
        let mut values = BTreeMap::new();
        for parameter in &self.parameters {
            let value = match parameter.kind {
                ValueKind::Flag => {
                    if matches.get_flag(parameter.name) {
                        Some("true".to_string())
                    } else if matches.get_flag(&parameter.negated_name()) {
                        Some("false".to_string())
                    } else {
                        None
                    }
                }
                _ => matches.get_one::<String>(parameter.name).cloned(),
            };
            if let Some(value) = value {
                values.insert(parameter.name.to_string(), value);
            }
        }
        values
    }

    /// Resolves every parameter in declaration order: command line value,
    /// else default (environment first for env-backed defaults), else an
    /// interactive prompt. Without a prompter, missing prompted parameters
    /// and invalid values are errors; with one, invalid values are asked again.
    pub fn resolve(
        &self,
        cli: &BTreeMap<String, String>,
        env: &dyn Fn(&str) -> Option<String>,
        mut prompter: Option<&mut dyn Prompter>,
    ) -> Result<Values> {
        let mut values = Values::default();

        for parameter in &self.parameters {
            let mut raw = cli
                .get(parameter.name)
                .cloned()
                .or_else(|| parameter.resolve_default(env));
            let mut problem: Option<String> = None;

            loop {
                let candidate = match raw.take() {
                    Some(candidate) => candidate,
                    None if parameter.is_required(&values) || problem.is_some() => {
                        match prompter.as_mut() {
                            Some(prompter) => prompter.ask(parameter, problem.as_deref())?,
                            None => {
                                return Err(Error::Configuration(format!(
                                    "Missing required parameter '--{}'.",
                                    parameter.name
                                )));
                            }
                        }
                    }
                    None => break,
                };

                match parameter.check(&values, &candidate) {
                    Ok(value) => {
                        values.insert(parameter.name, &value);
                        break;
                    }
                    Err(e) if e.is_validation() && prompter.is_some() => {
                        problem = Some(e.to_string());
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(values)
    }
}

/// Resolved parameter values, in the order they were resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Values {
    entries: Vec<(String, String)>,
}

impl Values {
    pub fn insert(&mut self, name: &str, value: &str) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.entries.push((name.to_string(), value.to_string())),
        }
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn require(&self, name: &str) -> Result<&str> {
        self.text(name)
            .ok_or_else(|| Error::Configuration(format!("Missing required parameter '--{name}'.")))
    }

    /// Missing flags read as disabled.
    pub fn flag(&self, name: &str) -> bool {
        self.text(name) == Some("true")
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        self.text(name).and_then(|v| v.parse().ok())
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }
}
