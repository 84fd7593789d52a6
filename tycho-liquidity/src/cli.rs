use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::info;

use crate::scenario::{Scenario, StepOutcome};

/// Tycho Liquidity - opens and grows Uniswap V3 positions on a sandbox chain
///
/// Loads a scenario describing the chain's tokens, pools and balances, deploys a position
/// orchestrator on it and optionally runs the scenario's steps against it.
#[derive(Parser, PartialEq, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    global_args: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Clone, PartialEq, Debug)]
pub struct GlobalArgs {
    /// Enable verbose logging.
    #[clap(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Clone, PartialEq, Debug)]
pub enum Command {
    /// Deploys the orchestrator on the scenario's genesis and prints its configuration.
    Deploy(ScenarioArgs),
    /// Deploys the orchestrator and runs every step of the scenario.
    Run(ScenarioArgs),
}

#[derive(Args, Clone, PartialEq, Debug)]
pub struct ScenarioArgs {
    /// Path to the scenario file.
    #[clap(
        long,
        short,
        env = "TYCHO_LIQUIDITY_SCENARIO",
        default_value = "./scenarios/mainnet_fork.yaml"
    )]
    scenario: PathBuf,
}

fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let log_level = if verbose { "debug" } else { "info" };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set up logging subscriber")
}

pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.global_args.verbose)?;
    info!("Running with version: {}", option_env!("CARGO_PKG_VERSION").unwrap_or("unknown"));

    match cli.command {
        Command::Deploy(args) => deploy(&args.scenario),
        Command::Run(args) => run(&args.scenario).await,
    }
}

fn deploy(path: &Path) -> anyhow::Result<()> {
    let scenario = Scenario::from_yaml(path)?;
    let deployment = scenario.deploy()?;
    let config = deployment.orchestrator.config();

    info!(
        chain = %scenario.chain,
        chain_id = scenario.chain.id(),
        native = scenario.chain.native_symbol(),
        deployer = %deployment.deployer,
        native_balance = %scenario.native_balance,
        "Deployer funded"
    );
    info!(
        orchestrator = %deployment.orchestrator.address(),
        factory = %config.factory,
        position_manager = %config.position_manager,
        swap_router = %config.swap_router,
        wrapped_native = %config.wrapped_native,
        slippage_model = ?config.slippage_model,
        deadline_buffer_secs = config.deadline_buffer_secs,
        "Orchestrator deployed"
    );
    Ok(())
}

async fn run(path: &Path) -> anyhow::Result<()> {
    let scenario = Scenario::from_yaml(path)?;
    let mut deployment = scenario.deploy()?;
    info!(
        orchestrator = %deployment.orchestrator.address(),
        steps = scenario.steps.len(),
        "Running scenario"
    );

    let reports = deployment.run(&scenario.steps).await?;
    let failed = reports
        .iter()
        .filter(|report| matches!(report.outcome, StepOutcome::Failed(_)))
        .count();
    for report in &reports {
        println!("[{}] {}: {}", report.index, report.action, report.summary);
    }
    info!(steps = reports.len(), expected_failures = failed, "Scenario finished");
    Ok(())
}
