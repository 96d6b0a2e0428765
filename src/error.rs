//! Error taxonomy shared by parameter parsing, state persistence and the
//! provisioning pipeline.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad or missing CLI input.
    #[error("{0}")]
    Configuration(String),

    /// A patch referenced a parameter that is not in the set.
    #[error("Parameter '{anchor}' does not exist in the parameter set.")]
    UnknownAnchor { anchor: String },

    /// A patch inserted a parameter whose name is already taken.
    #[error("Parameter '{name}' is already defined.")]
    DuplicateName { name: String },

    #[error("Invalid value for '--{parameter}': {message}")]
    Validation { parameter: String, message: String },

    #[error("Invalid value '{value}' for '--{parameter}'. Valid values: {}", .choices.join(", "))]
    InvalidChoice {
        parameter: String,
        value: String,
        choices: Vec<String>,
    },

    #[error(
        "Deployment '{name}' already exists. Re-run with '--existing' set to one of: {}",
        .policies.join(", ")
    )]
    AlreadyExists { name: String, policies: Vec<String> },

    #[error("Registry credential rejected: {0}")]
    CredentialInvalid(String),

    #[error("Infrastructure provisioning failed: {0}")]
    InfraProvision(String),

    #[error("SSH key export failed: {0}")]
    KeyExport(String),

    #[error("Inventory build failed: {0}")]
    InventoryBuild(String),

    #[error("Configuration management failed: {0}")]
    ConfigManagement(String),

    #[error("User data upload failed: {0}")]
    Upload(String),

    /// Reading or writing persisted deployment state failed.
    #[error("{0}")]
    State(String),

    /// An external program could not be launched.
    #[error("{0}")]
    Tool(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether a re-prompt can fix this error during interactive parsing.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation { .. } | Error::InvalidChoice { .. })
    }
}
