//! Files the pipeline hands to terraform and ansible, and the connection
//! notes it leaves for the operator.

use crate::error::{Error, Result};
use crate::state::DeploymentState;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::path::Path;

pub const TFVARS_FILE: &str = "terraform.tfvars.json";
pub const TFSTATE_FILE: &str = "terraform.tfstate";
pub const ANSIBLE_VARS_FILE: &str = "ansible-vars.json";
pub const CONNECTION_FILE: &str = "connection.txt";

/// One entry of `terraform output -json`.
#[derive(Debug, Deserialize)]
struct TerraformOutput {
    value: Value,
    #[serde(default)]
    sensitive: bool,
}

/// Outputs read back from the infrastructure after apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfraOutputs {
    pub ssh_key: String,
    /// Everything except the key, stringified.
    pub values: BTreeMap<String, String>,
}

pub fn parse_outputs(stdout: &str) -> Result<InfraOutputs> {
    let outputs: BTreeMap<String, TerraformOutput> = serde_json::from_str(stdout)
        .map_err(|e| Error::KeyExport(format!("Failed to parse terraform outputs: {e}")))?;

    let mut ssh_key = None;
    let mut values = BTreeMap::new();
    for (name, output) in outputs {
        if name == "ssh_key" {
            ssh_key = output.value.as_str().map(str::to_string);
            continue;
        }
        if output.sensitive {
            continue;
        }
        let value = match output.value {
            Value::String(s) => s,
            other => other.to_string(),
        };
        values.insert(name, value);
    }

    let ssh_key = ssh_key
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| Error::KeyExport("infra outputs contain no 'ssh_key'".to_string()))?;

    Ok(InfraOutputs { ssh_key, values })
}

/// Ansible inventory with the deployment as its single host.
pub fn inventory(state: &DeploymentState) -> Result<Value> {
    let host = state.public_ip().ok_or_else(|| {
        Error::InventoryBuild("infra outputs contain no 'public_ip'".to_string())
    })?;
    let key = state
        .key_file
        .as_ref()
        .ok_or_else(|| Error::InventoryBuild("no SSH key has been exported".to_string()))?;

    let mut hosts = Map::new();
    hosts.insert(
        state.name.clone(),
        json!({
            "ansible_host": host,
            "ansible_port": state.ssh_port,
            "ansible_user": state.ssh_user,
            "ansible_ssh_private_key_file": key.display().to_string(),
            "ansible_ssh_common_args": "-o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null",
        }),
    );
    Ok(json!({ "all": { "hosts": hosts } }))
}

/// Extra variables for the playbook run. Contains secrets.
pub fn playbook_variables(
    state: &DeploymentState,
    image: &str,
    ngc_api_key: Option<&str>,
    vnc_password: &str,
) -> Value {
    json!({
        "deployment_name": state.name,
        "application": state.application.as_str(),
        "container_name": state.application.container(),
        "image": image,
        "ngc_api_key": ngc_api_key.unwrap_or_default(),
        "vnc_password": vnc_password,
        "uploads_dir": "~/uploads",
    })
}

pub fn connection_summary(state: &DeploymentState, key_file: &Path, ip: &str) -> String {
    let ssh = format!(
        "ssh -i {} -p {} {}@{}",
        key_file.display(),
        state.ssh_port,
        state.ssh_user,
        ip
    );
    format!(
        "Deployment '{name}' ({provider}, {application})\n\
        ───────────────────────────────────────────────────────────────────────────────\n\
        Host           : {ip}\n\
        SSH            : {ssh}\n\
        VNC            : vnc://{ip}:5900\n\
        noVNC          : http://{ip}:6080/vnc.html\n\
        NoMachine      : nx://{ip}:4000\n\
        Application    : ssh -t -i {key} -p {port} {user}@{ip} docker exec -it {container} bash\n\
        \n\
        Reconnect with 'simdeploy connect {name}'.\n",
        name = state.name,
        provider = state.provider,
        application = state.application,
        key = key_file.display(),
        port = state.ssh_port,
        user = state.ssh_user,
        container = state.application.container(),
    )
}
