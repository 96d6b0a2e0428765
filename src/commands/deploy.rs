use super::GlobalOptions;
use crate::error::Result;
use crate::log::*;
use crate::params::prompt::{Prompter, TerminalPrompter};
use crate::pipeline::{DeploymentRequest, Orchestrator};
use crate::providers::ProviderCommandSpec;
use crate::runner::ProcessRunner;
use clap::ArgMatches;

/// Resolves the provider command's options and runs the deployment pipeline.
pub fn deploy_command(
    spec: &ProviderCommandSpec,
    matches: &ArgMatches,
    global: &GlobalOptions,
) -> Result<()> {
    let interactive = global.interactive();
    let env = |var: &str| std::env::var(var).ok();
    let mut prompter = TerminalPrompter;

    let values = spec.resolve(
        matches,
        &env,
        interactive.then_some(&mut prompter as &mut dyn Prompter),
    )?;
    let request = DeploymentRequest::from_values(spec.provider(), &values)?;

    log_debug(&format!(
        "Deploying '{}' on {} with {} ({}).",
        request.name, request.provider, request.application, request.image
    ));

    let store = global.store()?;
    let data_dir = global.data_dir()?;
    let mut runner = ProcessRunner;
    let mut orchestrator = Orchestrator::new(&mut runner, &store, &data_dir);
    if interactive {
        orchestrator = orchestrator.with_prompter(&mut prompter);
    }
    orchestrator.run(&request)?;
    Ok(())
}
