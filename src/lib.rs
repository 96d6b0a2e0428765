//! simdeploy - A library and CLI for provisioning cloud GPU machines that run
//! simulation workloads.
//!
//! Provider commands are generated from a shared base [`params::ParameterSet`]
//! plus per-provider patches. A deployment run resolves those parameters and
//! hands them to the [`pipeline::Orchestrator`], which drives terraform,
//! ansible and scp while persisting progress through [`state::StateStore`].

pub mod commands;
pub mod error;
pub mod log;
pub mod params;
pub mod pipeline;
pub mod providers;
pub mod runner;
pub mod sandbox;
pub mod state;

// Re-export commonly used items
pub use error::{Error, Result};
pub use pipeline::{DeploymentRequest, Orchestrator};
pub use providers::{Provider, ProviderCommandSpec};
