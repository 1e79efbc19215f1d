//! Deskpilot CLI - run and replay desktop automation tasks
//!
//! Drives the deskpilot-core agent against the simulated desktop, so plans and
//! recordings can be exercised without touching the real pointer or keyboard.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use console::style;
use tracing::info;

use deskpilot_core::automation::{ActionRecorder, Automation, load_recording, save_recording};
use deskpilot_core::config::{Config, ConfigManager, GeneralConfig};
use deskpilot_core::desktop::{Desktop, MockDesktop};
use deskpilot_core::event::TracingSink;
use deskpilot_core::task::{FixedPlanner, Plan, Planner, SurveyPlanner, TaskStatus};
use deskpilot_core::Agent;

#[derive(Parser)]
#[command(name = "deskpilot")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Desktop automation agent: plan, run and replay input tasks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a task on the simulated desktop
    Run {
        /// What the task should accomplish
        description: String,

        /// JSON plan to execute instead of the default survey plan
        #[arg(long)]
        plan: Option<PathBuf>,

        /// Task priority (advisory)
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        priority: i32,

        /// Save the actions performed by the task to this file
        #[arg(long)]
        record: Option<PathBuf>,

        /// Seconds to wait for the task to finish
        #[arg(long, default_value_t = 120)]
        timeout: u64,
    },

    /// Replay a saved recording on the simulated desktop
    Replay {
        /// Recording file written by `run --record`
        file: PathBuf,

        /// Speed multiplier (defaults to the configured playback speed)
        #[arg(long)]
        speed: Option<f64>,
    },

    /// Show configuration
    Config {
        /// Write the default configuration file
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    }
    .context("Failed to load configuration")?;

    // Logs go to stderr so task JSON on stdout stays clean
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.verbose, &manager.config().general))
        .with_writer(std::io::stderr)
        .init();
    info!("Using configuration at {}", manager.config_path().display());

    match cli.command {
        Commands::Run {
            description,
            plan,
            priority,
            record,
            timeout,
        } => {
            run_task(
                manager.config().clone(),
                &description,
                plan.as_deref(),
                priority,
                record.as_deref(),
                Duration::from_secs(timeout),
            )
            .await
        }
        Commands::Replay { file, speed } => replay(manager.config(), &file, speed).await,
        Commands::Config { init } => show_config(&manager, init),
    }
}

/// Tracing filter: `--verbose` wins, otherwise the configured level
fn log_filter(verbose: bool, general: &GeneralConfig) -> String {
    if verbose {
        return "info,deskpilot_core=debug".to_string();
    }
    match general.log_level.trim() {
        "" => "warn".to_string(),
        level => level.to_string(),
    }
}

fn load_planner(plan: Option<&Path>) -> anyhow::Result<Arc<dyn Planner>> {
    let Some(path) = plan else {
        return Ok(Arc::new(SurveyPlanner));
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read plan {}", path.display()))?;
    let plan = Plan::from_json(&text).with_context(|| format!("Invalid plan {}", path.display()))?;
    Ok(Arc::new(FixedPlanner::new(plan)))
}

async fn run_task(
    config: Config,
    description: &str,
    plan: Option<&Path>,
    priority: i32,
    record: Option<&Path>,
    timeout: Duration,
) -> anyhow::Result<()> {
    let planner = load_planner(plan)?;
    let desktop = Arc::new(MockDesktop::with_sample_screen());
    let agent = Agent::builder(Desktop::uniform(desktop))
        .planner(planner)
        .config(config)
        .events(Arc::new(TracingSink))
        .build();

    agent.start()?;
    if record.is_some() {
        agent.start_recording()?;
    }

    let task = agent.submit_task(description, priority)?;
    eprintln!("{} {}", style("Submitted").bold(), style(&task.id).cyan());

    let task = agent.wait_for_task(&task.id, timeout).await;
    let recorded = agent.stop_recording();
    agent.shutdown().await;
    let task = task?;

    if let Some(path) = record {
        save_recording(&recorded, path)
            .with_context(|| format!("Failed to save recording {}", path.display()))?;
        eprintln!(
            "{} {} actions to {}",
            style("Recorded").bold(),
            recorded.len(),
            style(path.display()).green()
        );
    }

    println!("{}", serde_json::to_string_pretty(&task)?);

    match task.status {
        TaskStatus::Completed => {
            eprintln!("{}", style("Task completed").green());
            Ok(())
        }
        status => bail!("Task finished as {}", status),
    }
}

async fn replay(config: &Config, file: &Path, speed: Option<f64>) -> anyhow::Result<()> {
    let actions = load_recording(file)
        .with_context(|| format!("Failed to load recording {}", file.display()))?;
    let speed = speed.unwrap_or(config.recorder.default_speed);

    let desktop = Arc::new(MockDesktop::new());
    let automation = Automation::new(
        desktop,
        Arc::new(ActionRecorder::new(config.recorder.max_actions)),
    );

    eprintln!(
        "{} {} actions at {}x",
        style("Replaying").bold(),
        actions.len(),
        speed
    );
    automation
        .playback(&actions, speed, |progress| {
            println!(
                "  [{}/{}] {}",
                progress.current,
                progress.total,
                progress.action.description
            );
        })
        .await?;
    eprintln!("{}", style("Playback completed").green());
    Ok(())
}

fn show_config(manager: &ConfigManager, init: bool) -> anyhow::Result<()> {
    if init {
        if manager.config_path().exists() {
            bail!(
                "Configuration already exists at {}",
                manager.config_path().display()
            );
        }
        manager.save()?;
        eprintln!(
            "{} {}",
            style("Wrote default configuration to").bold(),
            style(manager.config_path().display()).green()
        );
    }

    println!("{}", style("Configuration:").bold());
    println!(
        "  Config file: {}",
        style(manager.config_path().display()).dim()
    );
    println!();
    print!("{}", toml::to_string_pretty(manager.config())?);
    Ok(())
}
