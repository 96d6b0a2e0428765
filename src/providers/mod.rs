//! Cloud providers and the deployment commands built for them.
//!
//! Every provider shares one base parameter set and layers its own
//! credentials, region handling and machine catalog on top through patches.

use crate::error::{Error, Result};
use crate::params::validate::{check_deployment_name, check_port};
use crate::params::{
    LiveDomain, ParameterDefinition, ParameterSet, Patch, Prompter, Validator, Values,
};
use crate::runner::{Invocation, ProcessRunner, ToolRunner};
use clap::{ArgMatches, Command};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

pub mod alicloud;
pub mod aws;
pub mod azure;
pub mod gcp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    Aws,
    Gcp,
    Azure,
    Alicloud,
}

impl Provider {
    pub const ALL: [Provider; 4] = [
        Provider::Aws,
        Provider::Gcp,
        Provider::Azure,
        Provider::Alicloud,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Aws => "aws",
            Provider::Gcp => "gcp",
            Provider::Azure => "azure",
            Provider::Alicloud => "alicloud",
        }
    }

    pub fn command_name(&self) -> &'static str {
        match self {
            Provider::Aws => "deploy-aws",
            Provider::Gcp => "deploy-gcp",
            Provider::Azure => "deploy-azure",
            Provider::Alicloud => "deploy-alicloud",
        }
    }

    fn about(&self) -> &'static str {
        match self {
            Provider::Aws => "Deploy to Amazon Web Services.",
            Provider::Gcp => "Deploy to Google Cloud.",
            Provider::Azure => "Deploy to Microsoft Azure.",
            Provider::Alicloud => "Deploy to Alibaba Cloud.",
        }
    }

    pub fn from_command_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.command_name() == name)
    }

    fn patches(&self) -> Vec<Patch> {
        match self {
            Provider::Aws => aws::patches(),
            Provider::Gcp => gcp::patches(),
            Provider::Azure => azure::patches(),
            Provider::Alicloud => alicloud::patches(),
        }
    }

    /// Provider-specific terraform variables: credentials and location.
    pub fn variables(&self, values: &Values) -> Result<Map<String, Value>> {
        match self {
            Provider::Aws => aws::variables(values),
            Provider::Gcp => gcp::variables(values),
            Provider::Azure => azure::variables(values),
            Provider::Alicloud => alicloud::variables(values),
        }
    }

    /// Environment variables forwarded into the sandbox container.
    pub fn credential_env(&self) -> &'static [&'static str] {
        match self {
            Provider::Aws => aws::CREDENTIAL_ENV,
            Provider::Gcp => gcp::CREDENTIAL_ENV,
            Provider::Azure => azure::CREDENTIAL_ENV,
            Provider::Alicloud => alicloud::CREDENTIAL_ENV,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The simulation application installed on the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Application {
    IsaacSim,
    IsaacLab,
    Kit,
}

impl Application {
    pub const ALL: [Application; 3] = [
        Application::IsaacSim,
        Application::IsaacLab,
        Application::Kit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Application::IsaacSim => "isaac-sim",
            Application::IsaacLab => "isaac-lab",
            Application::Kit => "kit",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == name)
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(Application::as_str).collect()
    }

    /// Whether the image is pulled from a registry that needs a login.
    pub fn requires_registry_login(&self) -> bool {
        matches!(self, Application::IsaacSim | Application::IsaacLab)
    }

    pub fn default_image(&self) -> &'static str {
        match self {
            Application::IsaacSim => "nvcr.io/nvidia/isaac-sim:4.5.0",
            Application::IsaacLab => "nvcr.io/nvidia/isaac-lab:2.0.2",
            Application::Kit => "ghcr.io/simdeploy/kit-app:latest",
        }
    }

    /// Name of the container the application runs in on the host.
    pub fn container(&self) -> &'static str {
        match self {
            Application::IsaacSim => "isaac-sim",
            Application::IsaacLab => "isaac-lab",
            Application::Kit => "kit",
        }
    }

    pub fn playbook(&self) -> String {
        format!("{}.yml", self.as_str())
    }
}

impl fmt::Display for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn pulls_gated_image(values: &Values) -> bool {
    values
        .text("application")
        .and_then(Application::from_name)
        .is_none_or(|application| application.requires_registry_login())
}

/// Options shared by every provider command.
pub fn base_parameters() -> Result<ParameterSet> {
    let mut policies = vec!["ask".to_string()];
    policies.extend(crate::state::ExistingPolicy::names());

    ParameterSet::new(vec![
        ParameterDefinition::text("deployment-name", "Name of the deployment")
            .prompt("Deployment name")
            .validator(Validator::Check(check_deployment_name)),
        ParameterDefinition::text(
            "existing",
            "What to do if the deployment already exists",
        )
        .default_value("ask")
        .validator(Validator::OneOf(policies)),
        ParameterDefinition::text("region", "Region to deploy into").prompt("Region"),
        ParameterDefinition::text("application", "Application to deploy")
            .default_value("isaac-sim")
            .validator(Validator::one_of(&Application::names())),
        ParameterDefinition::text(
            "image",
            "Container image of the application, defaults to the application's release image",
        ),
        ParameterDefinition::secret("ngc-api-key", "NGC API key for pulling gated images")
            .default_env("NGC_API_KEY")
            .prompt("NGC API key")
            .required_when(pulls_gated_image),
        ParameterDefinition::flag(
            "ngc-api-key-check",
            "Check the NGC API key against the registry before provisioning",
        )
        .default_value("true"),
        ParameterDefinition::secret("vnc-password", "Password for VNC and NoMachine sessions")
            .default_env("VNC_PASSWORD")
            .prompt("VNC password"),
        ParameterDefinition::integer("ssh-port", "SSH port on the deployed host")
            .default_value("22")
            .validator(Validator::Check(check_port)),
        ParameterDefinition::flag("upload", "Upload the user data directory to the host")
            .default_value("true"),
        ParameterDefinition::path("upload-dir", "Local directory uploaded to ~/uploads")
            .default_value("uploads"),
    ])
}

/// The effective parameter set of one provider's deploy command.
#[derive(Debug, Clone)]
pub struct ProviderCommandSpec {
    provider: Provider,
    parameters: ParameterSet,
}

impl ProviderCommandSpec {
    pub fn build(provider: Provider) -> Result<Self> {
        let base = base_parameters()?;
        let parameters = ParameterSet::build(&base, provider.patches())?;
        Ok(Self {
            provider,
            parameters,
        })
    }

    pub fn all() -> Result<Vec<Self>> {
        Provider::ALL.into_iter().map(Self::build).collect()
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    pub fn command(&self) -> Command {
        self.parameters
            .command(self.provider.command_name(), self.provider.about())
    }

    pub fn resolve(
        &self,
        matches: &ArgMatches,
        env: &dyn Fn(&str) -> Option<String>,
        prompter: Option<&mut dyn Prompter>,
    ) -> Result<Values> {
        let cli = self.parameters.cli_values(matches);
        self.parameters.resolve(&cli, env, prompter)
    }
}

/// A live domain fetched by running a provider CLI.
pub struct CliLookup {
    pub prerequisites: &'static [&'static str],
    pub invocation: fn(&Values) -> Invocation,
    pub parse: fn(&str) -> std::result::Result<Vec<String>, String>,
}

impl LiveDomain for CliLookup {
    fn prerequisites(&self) -> &[&'static str] {
        self.prerequisites
    }

    fn fetch(&self, context: &Values) -> std::result::Result<Vec<String>, String> {
        let invocation = (self.invocation)(context)
            .capture()
            .timeout(Duration::from_secs(60));
        let output = ProcessRunner
            .run(&invocation)
            .map_err(|e| e.to_string())?;
        if !output.success() {
            return Err(format!(
                "{} failed with {}",
                invocation.program,
                output.describe_exit()
            ));
        }
        (self.parse)(&output.stdout)
    }
}

/// Splits whitespace separated CLI output into values.
pub fn parse_words(stdout: &str) -> std::result::Result<Vec<String>, String> {
    let values: Vec<String> = stdout.split_whitespace().map(str::to_string).collect();
    if values.is_empty() {
        return Err("lookup returned no values".to_string());
    }
    Ok(values)
}

/// Terraform variables shared by every provider.
pub fn common_variables(values: &Values) -> Result<Map<String, Value>> {
    let mut vars = Map::new();
    vars.insert(
        "deployment_name".to_string(),
        Value::from(values.require("deployment-name")?),
    );
    vars.insert(
        "instance_type".to_string(),
        Value::from(values.require("instance-type")?),
    );
    vars.insert(
        "ssh_port".to_string(),
        Value::from(values.integer("ssh-port").unwrap_or(22)),
    );
    vars.insert(
        "application".to_string(),
        Value::from(values.require("application")?),
    );
    Ok(vars)
}

pub(crate) fn insert_required(
    vars: &mut Map<String, Value>,
    values: &Values,
    key: &str,
    parameter: &str,
) -> Result<()> {
    let value = values.text(parameter).filter(|v| !v.is_empty()).ok_or_else(|| {
        Error::Configuration(format!("Missing required parameter '--{parameter}'."))
    })?;
    vars.insert(key.to_string(), Value::from(value));
    Ok(())
}
