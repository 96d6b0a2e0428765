use super::GlobalOptions;
use crate::error::Result;
use crate::log::*;
use crate::state::DeploymentState;

pub fn list_command(global: &GlobalOptions) -> Result<()> {
    let store = global.store()?;
    let names = store.list()?;
    if names.is_empty() {
        log_info(&format!(
            "No deployments found in '{}'.",
            store.root().display()
        ));
        return Ok(());
    }

    let mut states = Vec::new();
    for name in &names {
        if let Some(state) = store.load(name)? {
            states.push(state);
        }
    }
    print!("{}", describe_deployments(&states));
    Ok(())
}

fn describe_deployments(states: &[DeploymentState]) -> String {
    let mut output = String::new();
    output.push_str("  Name                  Provider  Application  Lifecycle              Address\n");
    output.push_str("  ────────────────────  ────────  ───────────  ─────────────────────  ───────────────\n");
    for state in states {
        output.push_str(&format!(
            "  {:<20}  {:<8}  {:<11}  {:<21}  {}\n",
            state.name,
            state.provider.as_str(),
            state.application.as_str(),
            state.lifecycle.to_string(),
            state.public_ip().unwrap_or("-")
        ));
    }
    output
}
