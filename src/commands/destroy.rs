use super::GlobalOptions;
use crate::error::{Error, Result};
use crate::log::*;
use crate::pipeline::Orchestrator;
use crate::runner::ProcessRunner;
use clap::Args;
use dialoguer::Confirm;
use dialoguer::theme::ColorfulTheme;

#[derive(Args, Debug)]
pub struct DestroyArgs {
    /// Name of the deployment
    #[arg(value_name = "DEPLOYMENT")]
    pub name: String,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long = "yes")]
    pub yes: bool,
}

impl DestroyArgs {
    pub fn execute(&self, global: &GlobalOptions) -> Result<()> {
        let store = global.store()?;
        let state = store.load(&self.name)?.ok_or_else(|| {
            Error::Configuration(format!("Deployment '{}' not found.", self.name))
        })?;

        if !self.yes {
            if !global.interactive() {
                return Err(Error::Configuration(format!(
                    "Refusing to destroy '{}' without confirmation. Pass '--yes' to proceed.",
                    self.name
                )));
            }
            let confirmed = Confirm::with_theme(&ColorfulTheme::default())
                .with_prompt(format!(
                    "Destroy deployment '{}' ({}, {})?",
                    state.name, state.provider, state.lifecycle
                ))
                .default(false)
                .interact()
                .map_err(|e| Error::Configuration(format!("Failed to read input: {e}")))?;
            if !confirmed {
                log_warning("Destroy cancelled.");
                return Ok(());
            }
        }

        let data_dir = global.data_dir()?;
        let mut runner = ProcessRunner;
        Orchestrator::new(&mut runner, &store, &data_dir).destroy(&state)
    }
}
