// OpenVPN gateway provisioning CLI

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use ovpn_gateway::{
    config,
    executor::{CommandExecutor, ProcessExecutor},
    profile,
    provision::Provisioner,
    runtime::DockerRuntime,
    teardown::Teardown,
    types::Config,
};
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;

#[derive(Parser)]
#[command(name = "ovpn-gateway")]
#[command(about = "Provision a single OpenVPN gateway container on a Docker network", long_about = None)]
#[command(disable_help_subcommand = true)]
struct Args {
    /// Path to configuration file (built-in defaults when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Create the gateway and export a client profile
    Create {
        /// Replace an existing gateway container
        #[arg(short, long)]
        force: bool,
    },
    /// Remove the gateway container and its volume
    Destroy,
    /// Show valid arguments
    Help,
}

fn print_usage() -> Result<()> {
    Args::command()
        .print_help()
        .context("Failed to print usage")?;
    Ok(())
}

/// What the command line resolved to
enum Invocation {
    /// Print usage and exit 0 (no command, `help`, unknown command)
    Usage,
    /// clap-rendered `--help`/`--version` output, exit 0
    Info(clap::Error),
    /// Malformed arguments, exit 1
    Invalid(clap::Error),
    Run {
        config: Option<PathBuf>,
        command: Command,
    },
}

fn classify<I, T>(argv: I) -> Invocation
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args = match Args::try_parse_from(argv) {
        Ok(args) => args,
        Err(e) => {
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => Invocation::Info(e),
                // Unknown command falls back to usage, like no command at all
                ErrorKind::InvalidSubcommand => Invocation::Usage,
                _ => Invocation::Invalid(e),
            }
        }
    };

    match args.command {
        None | Some(Command::Help) => Invocation::Usage,
        Some(command) => Invocation::Run {
            config: args.config,
            command,
        },
    }
}

fn main() -> Result<()> {
    let (config_path, command) = match classify(std::env::args_os()) {
        Invocation::Usage => return print_usage(),
        Invocation::Info(e) => {
            e.print()?;
            return Ok(());
        }
        Invocation::Invalid(e) => {
            e.print()?;
            std::process::exit(1);
        }
        Invocation::Run { config, command } => (config, command),
    };

    // Load configuration
    let config =
        config::load_or_default(config_path.as_deref()).context("Failed to load configuration")?;

    // Initialize logging
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(&config.general.log_level),
    )
    .init();

    // Orchestration is strictly sequential, one thread is enough
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .enable_io()
        .build()?;

    runtime.block_on(async_main(config, command))
}

async fn async_main(config: Config, command: Command) -> Result<()> {
    let executor = ProcessExecutor::new(Duration::from_secs(config.general.command_timeout));
    let docker = DockerRuntime::new(executor, config.general.runtime_binary.clone());

    docker.ensure_available().await?;

    tokio::select! {
        result = dispatch(&docker, &config, command) => result,
        interrupted = signal::ctrl_c() => {
            interrupted.context("Failed to set up Ctrl-C handler")?;
            log::warn!("Interrupted, resources created so far are left in place");
            anyhow::bail!("Interrupted by operator");
        }
    }
}

async fn dispatch<E: CommandExecutor>(
    docker: &DockerRuntime<E>,
    config: &Config,
    command: Command,
) -> Result<()> {
    match command {
        Command::Create { force } => {
            let report = Provisioner::new(docker, config).create(force).await?;
            println!();
            println!("Done!");
            println!("Client profile: {}", report.profile_path.display());
            println!("Routes {} through the gateway", report.subnet);
            for line in profile::import_instructions(&report.profile_path) {
                println!("{}", line);
            }
        }
        Command::Destroy => {
            Teardown::new(docker, config).destroy().await?;
            println!("Done!");
        }
        Command::Help => print_usage()?,
    }
    Ok(())
}
