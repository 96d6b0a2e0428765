use super::{ParameterDefinition, ValueKind};
use crate::error::{Error, Result};
use crate::log::*;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, Password, Select};

/// Asks the operator for values that were not supplied on the command line.
pub trait Prompter {
    /// Asks for a value of `definition`. `problem` describes why a previous
    /// answer was rejected.
    fn ask(&mut self, definition: &ParameterDefinition, problem: Option<&str>) -> Result<String>;

    /// Returns the index of the chosen item.
    fn select(&mut self, prompt: &str, items: &[&str]) -> Result<usize>;
}

#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn ask(&mut self, definition: &ParameterDefinition, problem: Option<&str>) -> Result<String> {
        if let Some(problem) = problem {
            log_warning(problem);
        }
        let theme = ColorfulTheme::default();
        let text = definition.prompt.as_deref().unwrap_or(definition.name);

        if let Some(choices) = definition.validator.as_ref().and_then(|v| v.choices()) {
            let index = Select::with_theme(&theme)
                .with_prompt(text)
                .items(choices)
                .default(0)
                .interact()
                .map_err(prompt_error)?;
            return Ok(choices[index].clone());
        }

        match definition.kind {
            ValueKind::Secret => Password::with_theme(&theme)
                .with_prompt(text)
                .interact()
                .map_err(prompt_error),
            _ => Input::<String>::with_theme(&theme)
                .with_prompt(text)
                .interact_text()
                .map_err(prompt_error),
        }
    }

    fn select(&mut self, prompt: &str, items: &[&str]) -> Result<usize> {
        Select::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .items(items)
            .default(0)
            .interact()
            .map_err(prompt_error)
    }
}

fn prompt_error(e: dialoguer::Error) -> Error {
    Error::Configuration(format!("Failed to read input: {e}"))
}
