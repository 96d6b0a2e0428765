use clap::{CommandFactory, FromArgMatches, Parser};
use simdeploy::commands::{Commands, GlobalOptions, deploy};
use simdeploy::log::*;
use simdeploy::{Error, ProviderCommandSpec, Result, sandbox};

#[derive(Parser, Debug)]
#[command(name = "simdeploy")]
#[command(about = "A CLI for provisioning cloud GPU machines running simulation workloads.")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

fn main() {
    if let Err(e) = run() {
        log_error(&e.to_string());
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    // Provider commands are built from parameter sets rather than derived.
    let specs = ProviderCommandSpec::all()?;
    let command = specs
        .iter()
        .fold(Cli::command(), |command, spec| command.subcommand(spec.command()));
    let matches = command.get_matches();

    let global = GlobalOptions::from_arg_matches(&matches).map_err(cli_error)?;
    set_verbose(global.verbose);
    let mounts = [global.state_dir.clone(), global.data_dir.clone()];
    if let Some(code) = sandbox::enter(&mounts)? {
        std::process::exit(code);
    }

    if let Some((name, sub_matches)) = matches.subcommand() {
        if let Some(spec) = specs.iter().find(|s| s.provider().command_name() == name) {
            return deploy::deploy_command(spec, sub_matches, &global);
        }
    }

    let cli = Cli::from_arg_matches(&matches).map_err(cli_error)?;
    cli.command.execute(&cli.global)
}

fn cli_error(e: clap::Error) -> Error {
    Error::Configuration(e.to_string())
}
