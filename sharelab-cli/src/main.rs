//! Sharelab CLI: run and validate simulation configs.
//!
//! Commands:
//! - `run`: execute a simulation from a TOML config and export artifacts
//! - `validate`: parse and check a config and its input files without simulating

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use sharelab_runner::{build_strategy, load_inputs, run_simulation, ArtifactManager, RunConfig, SimulationResult};

#[derive(Parser)]
#[command(
    name = "sharelab",
    about = "Sharelab CLI: share-based portfolio simulation"
)]
struct Cli {
    /// Log filter (e.g. info, debug, sharelab_core=trace). `RUST_LOG` wins when set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a simulation from a TOML config file.
    Run {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Output directory for artifacts. Overrides `[output] directory`.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Check a config and its inputs without simulating.
    Validate {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,
    },
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Commands::Run { config, output_dir } => run_cmd(config, output_dir),
        Commands::Validate { config } => validate_cmd(config),
    }
}

fn run_cmd(config_path: PathBuf, output_dir: Option<PathBuf>) -> Result<()> {
    let config = RunConfig::from_file(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;

    tracing::info!(config = %config_path.display(), policy = %config.policy.name, "run started");
    let result = run_simulation(&config)?;
    print_summary(&result);

    let output_dir = output_dir.unwrap_or_else(|| config.resolve(&config.output.directory));
    let paths = ArtifactManager::new(&output_dir)?
        .with_parquet(config.output.parquet)
        .save_run(&result)?;
    println!("Artifacts saved to: {}", paths.run_dir.display());

    Ok(())
}

fn validate_cmd(config_path: PathBuf) -> Result<()> {
    let config = RunConfig::from_file(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;
    let inputs = load_inputs(&config)?;
    let strategy = build_strategy(&config, &inputs)?;

    println!("Config OK: {}", config_path.display());
    println!("Policy:         {}", strategy.policy_name());
    println!("Price rows:     {}", inputs.prices.len());
    println!("Signal tables:  {}", inputs.signals.len());
    println!("Dataset hash:   {}", inputs.dataset_hash);
    Ok(())
}

fn print_summary(result: &SimulationResult) {
    println!();
    println!("=== Simulation Result ===");
    println!("Policy:         {}", result.policy);
    println!(
        "Period:         {} to {}",
        result.start_date, result.end_date
    );
    println!("Dates:          {}", result.date_count());
    println!("Trades:         {}", result.trades.len());
    if let Some(init) = &result.init_asset {
        println!("Initial asset:  {init}");
    }
    println!();
    println!("--- Valuation ---");
    match (result.valuation.first(), result.final_value()) {
        (Some(first), Some(last)) => {
            println!("Start value:    {:.2}", first.value);
            println!("Final value:    {:.2}", last);
            if first.value != 0.0 {
                println!("Total Return:   {:.2}%", (last / first.value - 1.0) * 100.0);
            }
        }
        _ => println!("No valuation (empty portfolio)"),
    }
    println!();
    println!("Fingerprint:    {}", result.fingerprint);
    println!("Run ID:         {}", result.run_id);
}
