//! Validation callbacks run on resolved parameter values.

use super::Values;
use crate::error::{Error, Result};
use std::fmt;
use std::rc::Rc;

/// A domain of valid values that can only be known by asking the provider,
/// e.g. the regions an account can currently deploy into.
pub trait LiveDomain {
    /// Parameters that must already be resolved before a lookup can run.
    fn prerequisites(&self) -> &[&'static str];

    /// Fetches the valid values using the prerequisite parameters in `context`.
    fn fetch(&self, context: &Values) -> std::result::Result<Vec<String>, String>;

    fn normalize(&self, raw: &str) -> String {
        normalize_identifier(raw)
    }
}

#[derive(Clone)]
pub enum Validator {
    /// Raw value must be a member of a fixed set and is accepted unchanged.
    OneOf(Vec<String>),
    /// Raw value is normalized and checked against a provider lookup.
    Live(Rc<dyn LiveDomain>),
    /// Pure check that may also rewrite the value.
    Check(fn(&str) -> std::result::Result<String, String>),
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validator::OneOf(choices) => f.debug_tuple("OneOf").field(choices).finish(),
            Validator::Live(domain) => f
                .debug_tuple("Live")
                .field(&domain.prerequisites())
                .finish(),
            Validator::Check(_) => f.write_str("Check"),
        }
    }
}

impl Validator {
    pub fn one_of(choices: &[&str]) -> Self {
        Validator::OneOf(choices.iter().map(|c| c.to_string()).collect())
    }

    pub fn live(domain: impl LiveDomain + 'static) -> Self {
        Validator::Live(Rc::new(domain))
    }

    pub fn choices(&self) -> Option<&[String]> {
        match self {
            Validator::OneOf(choices) => Some(choices),
            _ => None,
        }
    }

    pub fn validate(&self, parameter: &str, context: &Values, raw: &str) -> Result<String> {
        match self {
            Validator::OneOf(choices) => {
                if choices.iter().any(|choice| choice == raw) {
                    Ok(raw.to_string())
                } else {
                    Err(Error::InvalidChoice {
                        parameter: parameter.to_string(),
                        value: raw.to_string(),
                        choices: choices.clone(),
                    })
                }
            }
            Validator::Live(domain) => {
                let ready = domain
                    .prerequisites()
                    .iter()
                    .all(|name| context.text(name).is_some_and(|v| !v.is_empty()));
                if !ready {
                    // Credentials may still reach the provider another way.
                    return Ok(raw.to_string());
                }

                let value = domain.normalize(raw);
                let valid = domain.fetch(context).map_err(|message| Error::Validation {
                    parameter: parameter.to_string(),
                    message: format!("could not fetch valid values: {message}"),
                })?;
                if valid.iter().any(|candidate| *candidate == value) {
                    Ok(value)
                } else {
                    Err(Error::InvalidChoice {
                        parameter: parameter.to_string(),
                        value,
                        choices: valid,
                    })
                }
            }
            Validator::Check(check) => check(raw).map_err(|message| Error::Validation {
                parameter: parameter.to_string(),
                message,
            }),
        }
    }
}

/// Lowercases and replaces runs of whitespace with a single '-'.
pub fn normalize_identifier(raw: &str) -> String {
    raw.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

pub fn check_deployment_name(raw: &str) -> std::result::Result<String, String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err("deployment name cannot be empty".to_string());
    }
    if name.len() > 40 {
        return Err("deployment name must be at most 40 characters".to_string());
    }
    let mut chars = name.chars();
    let first_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if !first_ok || !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return Err(format!(
            "'{name}' must use lowercase letters, digits and '-', starting with a letter or digit"
        ));
    }
    Ok(name.to_string())
}

pub fn check_port(raw: &str) -> std::result::Result<String, String> {
    match raw.trim().parse::<u16>() {
        Ok(0) | Err(_) => Err(format!("'{raw}' is not a valid port number")),
        Ok(port) => Ok(port.to_string()),
    }
}
