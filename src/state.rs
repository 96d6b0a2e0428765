//! Persisted per-deployment state.
//!
//! Each deployment owns one directory under the state root, named after the
//! deployment. It holds `state.json`, the exported SSH key, the terraform
//! variables and state files, the ansible inventory and the connection notes.
//! State is saved after every completed checkpoint, so an interrupted run
//! leaves behind exactly what the next run's existing-deployment check needs.

use crate::error::{Error, Result};
use crate::providers::{Application, Provider};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Lifecycle {
    Absent,
    PartiallyProvisioned,
    Provisioned,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Lifecycle::Absent => "absent",
            Lifecycle::PartiallyProvisioned => "partially-provisioned",
            Lifecycle::Provisioned => "provisioned",
        })
    }
}

/// What to do when the deployment name already has state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExistingPolicy {
    Fail,
    DestroyAndRecreate,
    ReuseInfraOnly,
    RunConfigManagementOnly,
}

impl ExistingPolicy {
    pub const ALL: [ExistingPolicy; 4] = [
        ExistingPolicy::Fail,
        ExistingPolicy::DestroyAndRecreate,
        ExistingPolicy::ReuseInfraOnly,
        ExistingPolicy::RunConfigManagementOnly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExistingPolicy::Fail => "fail",
            ExistingPolicy::DestroyAndRecreate => "destroy-and-recreate",
            ExistingPolicy::ReuseInfraOnly => "reuse-infra-only",
            ExistingPolicy::RunConfigManagementOnly => "run-config-management-only",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|policy| policy.as_str() == name)
    }

    pub fn names() -> Vec<String> {
        Self::ALL.iter().map(|p| p.as_str().to_string()).collect()
    }
}

impl fmt::Display for ExistingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    ExistingCheck,
    CredentialCheck,
    InfraTeardown,
    InfraProvision,
    KeyExport,
    InventoryBuild,
    ConfigManagementRun,
    UserDataUpload,
    AutorunConfigManagement,
    Summary,
}

impl Step {
    pub fn description(&self) -> &'static str {
        match self {
            Step::ExistingCheck => "Checking for an existing deployment",
            Step::CredentialCheck => "Checking registry credentials",
            Step::InfraTeardown => "Destroying existing infrastructure",
            Step::InfraProvision => "Provisioning infrastructure",
            Step::KeyExport => "Exporting SSH key",
            Step::InventoryBuild => "Building inventory",
            Step::ConfigManagementRun => "Configuring host",
            Step::UserDataUpload => "Uploading user data",
            Step::AutorunConfigManagement => "Triggering autorun",
            Step::Summary => "Writing connection summary",
        }
    }

    /// Steps whose completion is recorded in state. Checks and locally
    /// recomputable steps are not.
    pub fn is_checkpoint(&self) -> bool {
        !matches!(
            self,
            Step::ExistingCheck | Step::CredentialCheck | Step::InventoryBuild
        )
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentState {
    pub name: String,
    pub provider: Provider,
    pub application: Application,
    pub lifecycle: Lifecycle,
    /// Policy used by the most recent run against an existing deployment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<ExistingPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_completed: Option<Step>,
    pub ssh_user: String,
    pub ssh_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,
    /// Infra outputs other than secrets, e.g. `public_ip`.
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
}

impl DeploymentState {
    pub fn new(name: &str, provider: Provider, application: Application) -> Self {
        Self {
            name: name.to_string(),
            provider,
            application,
            lifecycle: Lifecycle::Absent,
            policy: None,
            last_completed: None,
            ssh_user: "ubuntu".to_string(),
            ssh_port: 22,
            key_file: None,
            outputs: BTreeMap::new(),
        }
    }

    pub fn public_ip(&self) -> Option<&str> {
        self.outputs
            .get("public_ip")
            .map(String::as_str)
            .filter(|ip| !ip.is_empty())
    }

    /// Forgets everything the infrastructure produced.
    pub fn reset_infra(&mut self) {
        self.lifecycle = Lifecycle::Absent;
        self.key_file = None;
        self.outputs.clear();
    }
}

/// Directory-per-deployment store under a state root.
#[derive(Debug, Clone)]
pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn state_file(&self, name: &str) -> PathBuf {
        self.dir(name).join("state.json")
    }

    pub fn key_file(&self, name: &str) -> PathBuf {
        self.dir(name).join("key.pem")
    }

    pub fn inventory_file(&self, name: &str) -> PathBuf {
        self.dir(name).join("inventory.json")
    }

    pub fn load(&self, name: &str) -> Result<Option<DeploymentState>> {
        let path = self.state_file(name);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path).map_err(|e| {
            Error::State(format!(
                "Failed to read state file '{}': {e}",
                path.display()
            ))
        })?;
        let state = serde_json::from_str(&content).map_err(|e| {
            Error::State(format!(
                "Failed to parse state file '{}': {e}",
                path.display()
            ))
        })?;
        Ok(Some(state))
    }

    pub fn save(&self, state: &DeploymentState) -> Result<()> {
        let dir = self.dir(&state.name);
        fs::create_dir_all(&dir).map_err(|e| {
            Error::State(format!(
                "Failed to create state directory '{}': {e}",
                dir.display()
            ))
        })?;

        let content = serde_json::to_string_pretty(state)
            .map_err(|e| Error::State(format!("Failed to serialize state: {e}")))?;

        // Write then rename so an interrupt never leaves a truncated file.
        let path = self.state_file(&state.name);
        let staging = dir.join("state.json.tmp");
        fs::write(&staging, content)
            .and_then(|_| fs::rename(&staging, &path))
            .map_err(|e| {
                Error::State(format!(
                    "Failed to write state file '{}': {e}",
                    path.display()
                ))
            })
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        let dir = self.dir(name);
        if !dir.exists() {
            return Ok(());
        }
        fs::remove_dir_all(&dir).map_err(|e| {
            Error::State(format!(
                "Failed to remove state directory '{}': {e}",
                dir.display()
            ))
        })
    }

    /// Names of all deployments with persisted state, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.root).map_err(|e| {
            Error::State(format!(
                "Failed to read state directory '{}': {e}",
                self.root.display()
            ))
        })?;

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().join("state.json").exists())
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }
}

/// Writes `content` to `path` readable and writable by the owner only.
pub fn write_private(path: &Path, content: &str) -> std::io::Result<()> {
    use std::io::Write;

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    // The mode above only applies to newly created files.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(content.as_bytes())
}
