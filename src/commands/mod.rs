use crate::error::{Error, Result};
use crate::state::StateStore;
use clap::builder::FalseyValueParser;
use clap::{Args, Subcommand};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

pub mod connect;
pub mod deploy;
pub mod destroy;
pub mod list;

/// Options accepted by every command.
#[derive(Args, Debug, Clone)]
pub struct GlobalOptions {
    /// Directory holding one state directory per deployment
    #[arg(
        long = "state-dir",
        value_name = "DIR",
        env = "SIMDEPLOY_STATE_DIR",
        default_value = "state",
        global = true
    )]
    pub state_dir: PathBuf,

    /// Directory holding the terraform/<provider> and ansible/ trees
    #[arg(
        long = "data-dir",
        value_name = "DIR",
        env = "SIMDEPLOY_DATA_DIR",
        default_value = ".",
        global = true
    )]
    pub data_dir: PathBuf,

    /// Never prompt; missing values are errors
    #[arg(
        long = "non-interactive",
        env = "SIMDEPLOY_NON_INTERACTIVE",
        value_parser = FalseyValueParser::new(),
        global = true
    )]
    pub non_interactive: bool,

    /// Print every external command before running it
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,
}

impl GlobalOptions {
    /// Prompts are only shown on a terminal.
    pub fn interactive(&self) -> bool {
        !self.non_interactive && std::io::stdin().is_terminal()
    }

    /// The state store, rooted at an absolute path so recorded key paths
    /// stay valid from any working directory.
    pub fn store(&self) -> Result<StateStore> {
        Ok(StateStore::new(absolute(&self.state_dir)?))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        absolute(&self.data_dir)
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|e| {
        Error::Configuration(format!("Failed to resolve '{}': {e}", path.display()))
    })
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open an SSH session on a deployment.
    Connect(connect::ConnectArgs),
    /// Destroy a deployment's infrastructure and forget its state.
    Destroy(destroy::DestroyArgs),
    /// List deployments with persisted state.
    List,
}

impl Commands {
    pub fn execute(&self, global: &GlobalOptions) -> Result<()> {
        match self {
            Commands::Connect(args) => args.execute(global),
            Commands::Destroy(args) => args.execute(global),
            Commands::List => list::list_command(global),
        }
    }
}
