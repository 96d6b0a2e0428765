//! The provisioning pipeline.
//!
//! [`Orchestrator::run`] drives one deployment through its steps: the
//! existing-deployment check, an optional registry credential check,
//! terraform, key export, inventory, the two ansible passes, the user data
//! upload and the connection summary. Which steps run is decided up front by
//! [`plan`] from the stored lifecycle and the chosen [`ExistingPolicy`].
//! Progress is saved to the [`StateStore`] after every checkpoint step.

pub mod artifacts;

use crate::error::{Error, Result};
use crate::log::*;
use crate::params::Values;
use crate::params::prompt::Prompter;
use crate::providers::{Application, Provider, common_variables};
use crate::runner::{Exit, Invocation, ToolOutput, ToolRunner};
use crate::state::{
    DeploymentState, ExistingPolicy, Lifecycle, StateStore, Step, write_private,
};
use artifacts::{ANSIBLE_VARS_FILE, CONNECTION_FILE, TFSTATE_FILE, TFVARS_FILE};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const REGISTRY: &str = "nvcr.io";

const LOGIN_TIMEOUT: Duration = Duration::from_secs(30);

/// The `--existing` option: a policy, or ask when a deployment is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyChoice {
    Ask,
    Use(ExistingPolicy),
}

impl PolicyChoice {
    pub fn from_name(name: &str) -> Option<Self> {
        if name == "ask" {
            return Some(PolicyChoice::Ask);
        }
        ExistingPolicy::from_name(name).map(PolicyChoice::Use)
    }
}

/// Everything one deploy run needs, taken from resolved parameter values.
#[derive(Debug, Clone)]
pub struct DeploymentRequest {
    pub name: String,
    pub provider: Provider,
    pub application: Application,
    pub image: String,
    pub existing: PolicyChoice,
    pub ngc_api_key: Option<String>,
    pub check_registry_login: bool,
    pub vnc_password: String,
    pub ssh_port: u16,
    pub upload: bool,
    pub upload_dir: PathBuf,
    /// Terraform input variables.
    pub variables: Map<String, Value>,
}

impl DeploymentRequest {
    pub fn from_values(provider: Provider, values: &Values) -> Result<Self> {
        let application_name = values.require("application")?;
        let application = Application::from_name(application_name).ok_or_else(|| {
            Error::Configuration(format!("Unknown application '{application_name}'."))
        })?;
        let existing_name = values.require("existing")?;
        let existing = PolicyChoice::from_name(existing_name).ok_or_else(|| {
            Error::Configuration(format!("Unknown existing policy '{existing_name}'."))
        })?;
        let image = values
            .text("image")
            .filter(|image| !image.is_empty())
            .unwrap_or(application.default_image())
            .to_string();

        let mut variables = common_variables(values)?;
        variables.extend(provider.variables(values)?);
        variables.insert("image".to_string(), Value::from(image.as_str()));

        Ok(Self {
            name: values.require("deployment-name")?.to_string(),
            provider,
            application,
            image,
            existing,
            ngc_api_key: values
                .text("ngc-api-key")
                .filter(|key| !key.is_empty())
                .map(str::to_string),
            check_registry_login: values.flag("ngc-api-key-check"),
            vnc_password: values.require("vnc-password")?.to_string(),
            ssh_port: values
                .integer("ssh-port")
                .and_then(|port| u16::try_from(port).ok())
                .unwrap_or(22),
            upload: values.flag("upload"),
            upload_dir: PathBuf::from(values.text("upload-dir").unwrap_or("uploads")),
            variables,
        })
    }
}

/// How often a transient failure is retried and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub const fn new(retries: u32, backoff: Duration) -> Self {
        Self { retries, backoff }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(10))
    }
}

/// Steps following the existing-deployment check. `existing` is `None` for
/// a deployment without live infrastructure.
pub fn plan(existing: Option<ExistingPolicy>, credential_check: bool, upload: bool) -> Vec<Step> {
    let mut steps = Vec::new();
    if credential_check {
        steps.push(Step::CredentialCheck);
    }
    match existing {
        Some(ExistingPolicy::Fail) => return Vec::new(),
        None => steps.extend([Step::InfraProvision, Step::KeyExport, Step::InventoryBuild]),
        Some(ExistingPolicy::DestroyAndRecreate) => steps.extend([
            Step::InfraTeardown,
            Step::InfraProvision,
            Step::KeyExport,
            Step::InventoryBuild,
        ]),
        Some(ExistingPolicy::ReuseInfraOnly) => {
            steps.extend([Step::KeyExport, Step::InventoryBuild])
        }
        Some(ExistingPolicy::RunConfigManagementOnly) => {}
    }
    steps.push(Step::ConfigManagementRun);
    if upload {
        steps.push(Step::UserDataUpload);
    }
    steps.extend([Step::AutorunConfigManagement, Step::Summary]);
    steps
}

pub struct Orchestrator<'a> {
    runner: &'a mut dyn ToolRunner,
    store: &'a StateStore,
    data_dir: PathBuf,
    prompter: Option<&'a mut dyn Prompter>,
    retry: RetryPolicy,
    login_retry: RetryPolicy,
}

impl<'a> Orchestrator<'a> {
    /// `data_dir` holds `terraform/<provider>/` and `ansible/`.
    pub fn new(runner: &'a mut dyn ToolRunner, store: &'a StateStore, data_dir: &Path) -> Self {
        Self {
            runner,
            store,
            data_dir: data_dir.to_path_buf(),
            prompter: None,
            retry: RetryPolicy::default(),
            login_retry: RetryPolicy::new(2, Duration::from_secs(5)),
        }
    }

    /// Enables the interactive choice for `--existing ask`.
    pub fn with_prompter(mut self, prompter: &'a mut dyn Prompter) -> Self {
        self.prompter = Some(prompter);
        self
    }

    /// Retry behavior of the ansible passes.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_login_retry(mut self, retry: RetryPolicy) -> Self {
        self.login_retry = retry;
        self
    }

    pub fn run(&mut self, request: &DeploymentRequest) -> Result<DeploymentState> {
        log_info(&format!("{}...", Step::ExistingCheck));
        let (mut state, existing) = self.existing_check(request)?;

        let credential_check =
            request.check_registry_login && request.application.requires_registry_login();
        let steps = plan(existing, credential_check, upload_requested(request));

        state.application = request.application;
        state.policy = existing;
        // The stored inventory pins the port unless it is rebuilt.
        if steps.contains(&Step::InventoryBuild) {
            state.ssh_port = request.ssh_port;
        } else if state.ssh_port != request.ssh_port {
            log_warning(&format!(
                "Keeping SSH port {} from the existing inventory of '{}'.",
                state.ssh_port, state.name
            ));
        }

        for (index, step) in steps.iter().enumerate() {
            log_info(&format!("[{}/{}] {}...", index + 1, steps.len(), step));
            if let Err(e) = self.execute(*step, request, &mut state) {
                log_error(&format!("{step} failed."));
                if self.store.state_file(&state.name).exists() {
                    let last = state
                        .last_completed
                        .map_or("none", |completed| completed.description());
                    log_info(&format!(
                        "State of '{}' was kept at its last completed step: {last}.",
                        state.name
                    ));
                }
                return Err(e);
            }
            if step.is_checkpoint() {
                state.last_completed = Some(*step);
                self.store.save(&state)?;
            }
        }

        Ok(state)
    }

    /// Tears down a deployment's infrastructure and removes its state.
    pub fn destroy(&mut self, state: &DeploymentState) -> Result<()> {
        if state.lifecycle != Lifecycle::Absent {
            self.destroy_infra(state)?;
        }
        self.store.delete(&state.name)?;
        log_success(&format!("Destroyed deployment '{}'.", state.name));
        Ok(())
    }

    fn existing_check(
        &mut self,
        request: &DeploymentRequest,
    ) -> Result<(DeploymentState, Option<ExistingPolicy>)> {
        let Some(state) = self.store.load(&request.name)? else {
            let state = DeploymentState::new(&request.name, request.provider, request.application);
            return Ok((state, None));
        };

        if state.provider != request.provider {
            return Err(Error::Configuration(format!(
                "Deployment '{}' belongs to provider '{}'. Use '{}' or choose another deployment name.",
                state.name,
                state.provider,
                state.provider.command_name()
            )));
        }
        if state.lifecycle == Lifecycle::Absent {
            return Ok((state, None));
        }

        let policy = match request.existing {
            PolicyChoice::Use(policy) => policy,
            PolicyChoice::Ask => self.ask_policy(&state)?,
        };
        if policy == ExistingPolicy::Fail {
            return Err(Error::AlreadyExists {
                name: state.name,
                policies: ExistingPolicy::ALL
                    .iter()
                    .filter(|p| **p != ExistingPolicy::Fail)
                    .map(|p| p.as_str().to_string())
                    .collect(),
            });
        }

        log_info(&format!(
            "Deployment '{}' is {}, continuing with '{policy}'.",
            state.name, state.lifecycle
        ));
        Ok((state, Some(policy)))
    }

    // Without a prompter, asking behaves like `fail`.
    fn ask_policy(&mut self, state: &DeploymentState) -> Result<ExistingPolicy> {
        let Some(prompter) = self.prompter.as_mut() else {
            return Ok(ExistingPolicy::Fail);
        };
        log_warning(&format!(
            "Deployment '{}' already exists ({}).",
            state.name, state.lifecycle
        ));
        let items: Vec<&str> = ExistingPolicy::ALL.iter().map(ExistingPolicy::as_str).collect();
        let index = prompter.select("What should happen to the existing deployment?", &items)?;
        ExistingPolicy::ALL
            .get(index)
            .copied()
            .ok_or_else(|| Error::Configuration(format!("Invalid selection {index}.")))
    }

    fn execute(
        &mut self,
        step: Step,
        request: &DeploymentRequest,
        state: &mut DeploymentState,
    ) -> Result<()> {
        match step {
            Step::ExistingCheck => Ok(()),
            Step::CredentialCheck => self.credential_check(request),
            Step::InfraTeardown => self.teardown(request, state),
            Step::InfraProvision => self.provision(request, state),
            Step::KeyExport => self.export_key(state),
            Step::InventoryBuild => self.build_inventory(state),
            Step::ConfigManagementRun => self.run_playbook(request, state, "initial"),
            Step::UserDataUpload => self.upload(request, state),
            Step::AutorunConfigManagement => self.run_playbook(request, state, "autorun"),
            Step::Summary => self.summary(state),
        }
    }

    fn credential_check(&mut self, request: &DeploymentRequest) -> Result<()> {
        let key = request.ngc_api_key.as_deref().ok_or_else(|| {
            Error::CredentialInvalid("no NGC API key was provided".to_string())
        })?;
        let invocation = Invocation::new("docker")
            .args([
                "login",
                REGISTRY,
                "--username",
                "$oauthtoken",
                "--password-stdin",
            ])
            .stdin(key)
            .capture()
            .timeout(LOGIN_TIMEOUT);

        let retry = self.login_retry;
        let output = self.run_with_retry(&invocation, retry, |output| {
            output.exit == Exit::TimedOut
        })?;
        if !output.success() {
            return Err(Error::CredentialInvalid(format!(
                "docker login {REGISTRY} failed with {}",
                output.describe_exit()
            )));
        }
        log_info(&format!("NGC API key accepted by {REGISTRY}."));
        Ok(())
    }

    fn teardown(&mut self, request: &DeploymentRequest, state: &mut DeploymentState) -> Result<()> {
        self.write_variables(request)?;
        self.destroy_infra(state)?;
        state.reset_infra();

        for path in [
            self.store.key_file(&state.name),
            self.store.inventory_file(&state.name),
        ] {
            if path.exists() {
                fs::remove_file(&path).map_err(|e| {
                    Error::State(format!("Failed to remove '{}': {e}", path.display()))
                })?;
            }
        }
        Ok(())
    }

    fn destroy_infra(&mut self, state: &DeploymentState) -> Result<()> {
        let dir = self.store.dir(&state.name);
        if !dir.join(TFSTATE_FILE).exists() {
            log_warning(&format!(
                "No infrastructure state found for '{}', nothing to destroy.",
                state.name
            ));
            return Ok(());
        }

        let init = self.terraform(state, "init")?.arg("-input=false");
        self.run_checked(&init, "terraform init", Error::InfraProvision)?;
        let destroy = self.terraform(state, "destroy")?.args(apply_args(&dir));
        self.run_checked(&destroy, "terraform destroy", Error::InfraProvision)?;
        Ok(())
    }

    fn provision(&mut self, request: &DeploymentRequest, state: &mut DeploymentState) -> Result<()> {
        self.write_variables(request)?;
        let init = self.terraform(state, "init")?.arg("-input=false");
        self.run_checked(&init, "terraform init", Error::InfraProvision)?;

        // From here on, cloud resources may exist.
        state.lifecycle = Lifecycle::PartiallyProvisioned;
        self.store.save(state)?;

        let dir = self.store.dir(&state.name);
        let apply = self.terraform(state, "apply")?.args(apply_args(&dir));
        self.run_checked(&apply, "terraform apply", Error::InfraProvision)?;
        state.lifecycle = Lifecycle::Provisioned;
        Ok(())
    }

    fn export_key(&mut self, state: &mut DeploymentState) -> Result<()> {
        let dir = self.store.dir(&state.name);
        let invocation = self
            .terraform(state, "output")?
            .arg("-json")
            .arg(format!("-state={}", dir.join(TFSTATE_FILE).display()))
            .capture();
        let output = self.run_checked(&invocation, "terraform output", Error::KeyExport)?;
        let outputs = artifacts::parse_outputs(&output.stdout)?;

        let key_file = self.store.key_file(&state.name);
        let mut key = outputs.ssh_key;
        if !key.ends_with('\n') {
            key.push('\n');
        }
        write_private(&key_file, &key).map_err(|e| {
            Error::KeyExport(format!("Failed to write '{}': {e}", key_file.display()))
        })?;

        state.key_file = Some(key_file);
        state.outputs = outputs.values;
        Ok(())
    }

    fn build_inventory(&mut self, state: &DeploymentState) -> Result<()> {
        let inventory = artifacts::inventory(state)?;
        let content = serde_json::to_string_pretty(&inventory)
            .map_err(|e| Error::InventoryBuild(format!("Failed to serialize inventory: {e}")))?;
        let path = self.store.inventory_file(&state.name);
        fs::write(&path, content).map_err(|e| {
            Error::InventoryBuild(format!("Failed to write '{}': {e}", path.display()))
        })
    }

    fn run_playbook(
        &mut self,
        request: &DeploymentRequest,
        state: &DeploymentState,
        tag: &str,
    ) -> Result<()> {
        let inventory = self.store.inventory_file(&state.name);
        if !inventory.exists() {
            return Err(Error::InventoryBuild(format!(
                "inventory '{}' not found. Re-run with '--existing reuse-infra-only' to rebuild it",
                inventory.display()
            )));
        }
        let ansible_dir = self.data_dir.join("ansible");
        let playbook = ansible_dir.join(state.application.playbook());
        if !playbook.exists() {
            return Err(Error::Configuration(format!(
                "Playbook '{}' not found.",
                playbook.display()
            )));
        }

        let vars_file = self.store.dir(&state.name).join(ANSIBLE_VARS_FILE);
        let vars = artifacts::playbook_variables(
            state,
            &request.image,
            request.ngc_api_key.as_deref(),
            &request.vnc_password,
        );
        write_private(&vars_file, &vars.to_string()).map_err(|e| {
            Error::ConfigManagement(format!("Failed to write '{}': {e}", vars_file.display()))
        })?;

        let invocation = Invocation::new("ansible-playbook")
            .args([
                "-i".to_string(),
                inventory.display().to_string(),
                "--extra-vars".to_string(),
                format!("@{}", vars_file.display()),
                "--tags".to_string(),
                tag.to_string(),
                playbook.display().to_string(),
            ])
            .current_dir(&ansible_dir)
            .env("ANSIBLE_HOST_KEY_CHECKING", "False");

        let retry = self.retry;
        let output = self.run_with_retry(&invocation, retry, host_unreachable)?;
        if output.success() {
            return Ok(());
        }
        Err(Error::ConfigManagement(if host_unreachable(&output) {
            format!(
                "host still unreachable after {} retries ({})",
                retry.retries,
                output.describe_exit()
            )
        } else {
            format!(
                "ansible-playbook --tags {tag} failed with {}",
                output.describe_exit()
            )
        }))
    }

    fn upload(&mut self, request: &DeploymentRequest, state: &DeploymentState) -> Result<()> {
        let ip = state
            .public_ip()
            .ok_or_else(|| Error::Upload("deployment has no public address".to_string()))?;
        let key = state
            .key_file
            .as_ref()
            .ok_or_else(|| Error::Upload("no SSH key has been exported".to_string()))?;

        let invocation = Invocation::new("scp").args([
            "-r".to_string(),
            "-i".to_string(),
            key.display().to_string(),
            "-P".to_string(),
            state.ssh_port.to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            format!("{}/.", request.upload_dir.display()),
            format!("{}@{ip}:~/uploads", state.ssh_user),
        ]);
        self.run_checked(&invocation, "scp", Error::Upload)?;
        Ok(())
    }

    fn summary(&mut self, state: &DeploymentState) -> Result<()> {
        let ip = state
            .public_ip()
            .ok_or_else(|| Error::State("deployment has no public address".to_string()))?
            .to_string();
        let key_file = state
            .key_file
            .clone()
            .ok_or_else(|| Error::State("no SSH key has been exported".to_string()))?;

        let summary = artifacts::connection_summary(state, &key_file, &ip);
        let path = self.store.dir(&state.name).join(CONNECTION_FILE);
        fs::write(&path, &summary)
            .map_err(|e| Error::State(format!("Failed to write '{}': {e}", path.display())))?;

        println!("\n{summary}");
        log_success(&format!(
            "Deployed '{}'. Connection details saved to '{}'.",
            state.name,
            path.display()
        ));
        Ok(())
    }

    fn terraform(&self, state: &DeploymentState, subcommand: &str) -> Result<Invocation> {
        let workdir = self.data_dir.join("terraform").join(state.provider.as_str());
        if !workdir.is_dir() {
            return Err(Error::Configuration(format!(
                "Terraform configuration for '{}' not found at '{}'.",
                state.provider,
                workdir.display()
            )));
        }
        // Plugins and modules are kept per deployment so runs never share them.
        let data_dir = self.store.dir(&state.name).join(".terraform");
        Ok(Invocation::new("terraform")
            .arg(subcommand)
            .current_dir(workdir)
            .env("TF_DATA_DIR", data_dir.display().to_string())
            .env("TF_IN_AUTOMATION", "1"))
    }

    fn write_variables(&self, request: &DeploymentRequest) -> Result<()> {
        let dir = self.store.dir(&request.name);
        fs::create_dir_all(&dir).map_err(|e| {
            Error::State(format!("Failed to create '{}': {e}", dir.display()))
        })?;
        let content = serde_json::to_string_pretty(&request.variables)
            .map_err(|e| Error::State(format!("Failed to serialize variables: {e}")))?;
        let path = dir.join(TFVARS_FILE);
        write_private(&path, &content)
            .map_err(|e| Error::State(format!("Failed to write '{}': {e}", path.display())))
    }

    fn run_checked(
        &mut self,
        invocation: &Invocation,
        label: &str,
        error: fn(String) -> Error,
    ) -> Result<ToolOutput> {
        let output = self.runner.run(invocation)?;
        if !output.success() {
            return Err(error(format!("{label} failed with {}", output.describe_exit())));
        }
        Ok(output)
    }

    fn run_with_retry(
        &mut self,
        invocation: &Invocation,
        retry: RetryPolicy,
        transient: fn(&ToolOutput) -> bool,
    ) -> Result<ToolOutput> {
        let mut attempt = 0;
        loop {
            let output = self.runner.run(invocation)?;
            if output.success() || !transient(&output) || attempt >= retry.retries {
                return Ok(output);
            }
            attempt += 1;
            log_warning(&format!(
                "{} {}, retrying in {}s ({attempt}/{}).",
                invocation.program,
                output.describe_exit(),
                retry.backoff.as_secs(),
                retry.retries
            ));
            std::thread::sleep(retry.backoff);
        }
    }
}

// ansible-playbook exits with 4 when hosts are unreachable.
fn host_unreachable(output: &ToolOutput) -> bool {
    matches!(output.exit, Exit::Code(4) | Exit::TimedOut)
}

fn apply_args(dir: &Path) -> [String; 4] {
    [
        "-auto-approve".to_string(),
        "-input=false".to_string(),
        format!("-var-file={}", dir.join(TFVARS_FILE).display()),
        format!("-state={}", dir.join(TFSTATE_FILE).display()),
    ]
}

fn upload_requested(request: &DeploymentRequest) -> bool {
    if !request.upload {
        return false;
    }
    if request.upload_dir.is_dir() {
        return true;
    }
    log_warning(&format!(
        "Upload directory '{}' not found, skipping upload.",
        request.upload_dir.display()
    ));
    false
}
