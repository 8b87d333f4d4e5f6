//! The command line interface for the scheduler.
use crate::input::load_system;
use crate::log;
use crate::output::{get_output_dir, write_csv};
use crate::schedule::{self, RunConfiguration};
use crate::solver::{ExecutionMode, SolverBackend, SolverOptions};
use ::log::info;
use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The command line interface for the scheduler.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// The available commands.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Options for the run command
#[derive(Args)]
pub struct RunOpts {
    /// The solver backend to use
    #[arg(long, value_enum, default_value_t = SolverBackend::Highs)]
    pub solver: SolverBackend,
    /// Delegate solving to a remote service at this base URL
    #[arg(long, value_name = "URL")]
    pub remote: Option<String>,
    /// Ignore line capacities (copper-plate network)
    #[arg(long)]
    pub no_network: bool,
    /// Relax commitment decisions from binary to the interval [0, 1]
    #[arg(long)]
    pub relaxed: bool,
    /// Penalty cost per unit of shed demand
    #[arg(long, default_value_t = 1000.0)]
    pub shed_cost: f64,
    /// Number of solver threads
    #[arg(long, default_value_t = 1)]
    pub threads: u32,
    /// Relative optimality gap at which the solve may stop
    #[arg(long, default_value_t = 1e-9)]
    pub mip_gap: f64,
    /// Wall-clock limit for the solve, in seconds
    #[arg(long, value_name = "SECONDS")]
    pub time_limit: Option<f64>,
    /// Directory for output files
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
}

impl RunOpts {
    /// Turn the command-line options into a run configuration.
    fn to_configuration(&self) -> RunConfiguration {
        RunConfiguration {
            backend: self.solver,
            mode: match &self.remote {
                Some(endpoint) => ExecutionMode::Remote {
                    endpoint: endpoint.clone(),
                },
                None => ExecutionMode::Local,
            },
            network_enabled: !self.no_network,
            commit_binary: !self.relaxed,
            options: SolverOptions {
                threads: self.threads,
                mip_gap: self.mip_gap,
                time_limit: self.time_limit.map(Duration::from_secs_f64),
            },
        }
    }
}

/// The available commands.
#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler on a model.
    Run {
        /// Path to the model directory.
        model_dir: PathBuf,
        /// Other run options
        #[command(flatten)]
        opts: RunOpts,
    },
    /// Validate a model without solving it.
    Validate {
        /// The path to the model directory.
        model_dir: PathBuf,
        /// Penalty cost per unit of shed demand
        #[arg(long, default_value_t = 1000.0)]
        shed_cost: f64,
    },
}

impl Commands {
    /// Execute the supplied CLI command
    fn execute(self) -> Result<()> {
        match self {
            Self::Run { model_dir, opts } => handle_run_command(&model_dir, &opts),
            Self::Validate {
                model_dir,
                shed_cost,
            } => handle_validate_command(&model_dir, shed_cost),
        }
    }
}

/// Parse CLI arguments and start the scheduler
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        let help_str = Cli::command().render_long_help().to_string();
        println!("{help_str}");
        return Ok(());
    };

    log::init().context("Failed to initialise logging.")?;
    command.execute()
}

/// Handle the `run` command.
pub fn handle_run_command(model_path: &Path, opts: &RunOpts) -> Result<()> {
    let system = load_system(model_path, opts.shed_cost).context("Failed to load model.")?;

    let pathbuf: PathBuf;
    let output_path = if let Some(p) = opts.output_dir.as_deref() {
        p
    } else {
        pathbuf = get_output_dir(model_path)?;
        &pathbuf
    };

    let output = schedule::run(&system, &opts.to_configuration())?;
    write_csv(&output, output_path).context("Failed to write results.")?;
    info!("Scheduling complete!");

    Ok(())
}

/// Handle the `validate` command.
pub fn handle_validate_command(model_path: &Path, shed_cost: f64) -> Result<()> {
    let system = load_system(model_path, shed_cost).context("Failed to validate model.")?;
    system.validate()?;
    info!("Model validation successful!");

    Ok(())
}
