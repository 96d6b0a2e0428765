use super::GlobalOptions;
use crate::error::{Error, Result};
use crate::log::*;
use crate::providers::Application;
use crate::runner::{Invocation, ProcessRunner, ToolRunner};
use crate::state::DeploymentState;
use clap::Args;

#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Name of the deployment
    #[arg(value_name = "DEPLOYMENT")]
    pub name: String,

    /// Attach to the application's container instead of a host shell
    #[arg(
        long = "app",
        value_name = "APPLICATION",
        num_args = 0..=1,
        default_missing_value = "deployed",
        value_parser = ["deployed", "isaac-sim", "isaac-lab", "kit"]
    )]
    pub app: Option<String>,
}

impl ConnectArgs {
    pub fn execute(&self, global: &GlobalOptions) -> Result<()> {
        let store = global.store()?;
        let names = store.list()?;
        if !names.contains(&self.name) {
            return Err(Error::Configuration(if names.is_empty() {
                format!("Deployment '{}' not found. No deployments exist yet.", self.name)
            } else {
                format!(
                    "Deployment '{}' not found. Known deployments: {}",
                    self.name,
                    names.join(", ")
                )
            }));
        }
        let state = store
            .load(&self.name)?
            .ok_or_else(|| Error::State(format!("State of '{}' disappeared.", self.name)))?;

        let application = match self.app.as_deref() {
            None => None,
            Some("deployed") => Some(state.application),
            Some(name) => Some(Application::from_name(name).ok_or_else(|| {
                Error::Configuration(format!("Unknown application '{name}'."))
            })?),
        };

        let invocation = ssh_invocation(&state, application)?;
        log_info(&format!("Connecting to '{}'...", state.name));
        let output = ProcessRunner.run(&invocation)?;
        // ssh passes through the remote shell's exit status.
        if !output.success() {
            return Err(Error::Tool(format!("ssh session ended with {}", output.describe_exit())));
        }
        Ok(())
    }
}

pub fn ssh_invocation(state: &DeploymentState, application: Option<Application>) -> Result<Invocation> {
    let ip = state.public_ip().ok_or_else(|| {
        Error::Configuration(format!(
            "Deployment '{}' has no address yet ({}).",
            state.name, state.lifecycle
        ))
    })?;
    let key = state.key_file.as_ref().ok_or_else(|| {
        Error::Configuration(format!("Deployment '{}' has no exported SSH key.", state.name))
    })?;

    let mut invocation = Invocation::new("ssh").args([
        "-i".to_string(),
        key.display().to_string(),
        "-p".to_string(),
        state.ssh_port.to_string(),
        "-o".to_string(),
        "StrictHostKeyChecking=no".to_string(),
        "-o".to_string(),
        "UserKnownHostsFile=/dev/null".to_string(),
    ]);
    let destination = format!("{}@{ip}", state.ssh_user);
    invocation = match application {
        Some(application) => invocation.arg("-t").arg(destination).arg(format!(
            "docker exec -it {} bash",
            application.container()
        )),
        None => invocation.arg(destination),
    };
    Ok(invocation)
}
