mod cli;
mod core;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cli::output::OutputOptions;
use crate::cli::setup_cmd::SetupArgs;
use crate::core::config::AppConfig;

#[derive(Parser)]
#[command(name = "srp-energy", about = "SRP Energy daily usage sensor", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Output format
    #[arg(short, long, global = true)]
    format: Option<String>,

    /// Shorthand for --format json
    #[arg(short = 'j', long = "json", global = true)]
    json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    /// Verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the SRP account (interactive unless credentials are passed)
    Setup(SetupArgs),
    /// Fetch and display the previous day's usage
    Usage,
    /// Keep polling and print every update until Ctrl-C
    Watch,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate config file
    Check,
    /// Remove the stored account
    Remove,
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // A broken config must not stop `config check` from reporting it.
    let settings = AppConfig::load().map(|c| c.settings).unwrap_or_default();
    let output_opts = OutputOptions::resolve(
        cli.format.as_deref(),
        cli.json,
        cli.pretty,
        cli.no_color,
        cli.verbose,
        &settings,
    );

    match cli.command {
        Some(Commands::Setup(args)) => cli::setup_cmd::run(args, &output_opts).await?,
        None | Some(Commands::Usage) => cli::usage_cmd::run(&output_opts).await?,
        Some(Commands::Watch) => cli::watch_cmd::run(&output_opts).await?,
        Some(Commands::Config { action }) => match action {
            ConfigAction::Check => cli::config_cmd::check(&output_opts)?,
            ConfigAction::Remove => cli::config_cmd::remove(&output_opts)?,
        },
    }

    Ok(())
}
