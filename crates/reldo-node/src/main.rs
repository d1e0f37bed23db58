use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reldo_node::config::{NodeConfig, DEFAULT_CONFIG_FILE};
use reldo_node::scenario::{Scenario, ScenarioRunner};
use reldo_node::{logging, replay};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "reldo")]
#[command(about = "Reldo job escrow engine", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbosity level (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Output path for the configuration
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Execute a scenario script against an in-memory ledger
    Run {
        /// Scenario JSON file
        scenario: PathBuf,

        /// Write the resulting event log to this file
        #[arg(long, value_name = "FILE")]
        events_out: Option<PathBuf>,

        /// Print the full report as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Rebuild job state from an exported event log
    Replay {
        /// Event log JSON file
        events: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (ignore if it doesn't)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Priority order: ENV vars > config file > defaults
    let mut config = NodeConfig::load(cli.config.as_deref())?;
    config.apply_env_overrides();

    logging::init_logging(&config.logging, cli.verbose)
        .context("Failed to initialize logging")?;

    match cli.command {
        Commands::Init { output, force } => {
            if output.exists() && !force {
                anyhow::bail!(
                    "{} already exists (use --force to overwrite)",
                    output.display()
                );
            }
            config.validate()?;
            config.save_to_file(&output)?;
            info!(path = %output.display(), "⚙️ Configuration written");
        }
        Commands::Run {
            scenario,
            events_out,
            json,
        } => {
            config.validate()?;
            let script = Scenario::from_file(&scenario)?;
            let runner = ScenarioRunner::new(&script, &config.engine, &config.accounts).await?;
            let report = runner.run(&script).await?;

            if let Some(path) = events_out {
                let exported = runner.engine().events().export_json().await?;
                std::fs::write(&path, exported)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!(path = %path.display(), events = report.events.len(), "📝 Event log exported");
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for step in &report.steps {
                    let mark = step.error.as_deref().unwrap_or("ok");
                    println!("[{:<14}] #{:<3} {:<20} {}", mark, step.index, step.op, step.detail);
                }
                println!();
                for job in &report.jobs {
                    println!(
                        "job {}: {} bounty={} approve={} reject={}",
                        job.id, job.status, job.bounty, job.approve_weight, job.reject_weight
                    );
                }
                for (name, balance) in &report.balances {
                    println!("{}: {}", name, balance);
                }
            }
        }
        Commands::Replay { events } => {
            let projection = replay::replay_file(&events)?;
            if projection.jobs.is_empty() {
                warn!(path = %events.display(), "Event log holds no jobs");
            }
            println!("{}", replay::render_table(&projection));
        }
    }

    Ok(())
}
