use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::Path;

use crate::cli::Output;
use crate::config::ParForConfig;

pub mod config;
pub mod info;
pub mod run;

#[derive(Parser)]
#[command(
    name = "parfor",
    version = env!("CARGO_PKG_VERSION"),
    about = "Parallel-for engine over a shared thread pool",
    long_about = "parfor fans an integer index range out across a shared, fixed-size thread pool \
                  with progress reporting, cooperative cancellation and first-failure abort."
)]
pub struct Cli {
    /// Increase verbosity (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Use custom configuration file
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a synthetic parallel loop
    Run(run::RunArgs),
    /// Display the merged configuration
    Config(config::ConfigArgs),
    /// Show the system profile and pool sizing
    Info(info::InfoArgs),
}

impl Cli {
    pub fn run(self) -> Result<()> {
        // Set up logging based on verbosity
        setup_logging(self.verbose, self.quiet);

        let settings = ParForConfig::load_with_custom_config(self.config.as_deref().map(Path::new))?;
        // The shared pool reads the global configuration on first use
        ParForConfig::install_global(settings.clone())?;

        let output = Output::new(self.verbose > 0, self.quiet);
        match self.command {
            Some(Commands::Run(args)) => run::execute(args, &settings, &output),
            Some(Commands::Config(args)) => config::execute(args, &settings),
            Some(Commands::Info(args)) => info::execute(args, &settings, &output),
            None => {
                Cli::command().print_help()?;
                Ok(())
            }
        }
    }
}

fn setup_logging(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => tracing_subscriber::EnvFilter::new("warn"),
        1 => tracing_subscriber::EnvFilter::new("info"),
        2 => tracing_subscriber::EnvFilter::new("debug"),
        _ => tracing_subscriber::EnvFilter::new("trace"),
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
