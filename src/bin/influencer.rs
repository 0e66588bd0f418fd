use anyhow::{Context, Result};
use clap::Parser;
use influencer_agent::cli::{parse_params, Cli, Commands, CredentialAction};
use influencer_agent::{runtime, ActivityResult, Config, Controller, ControllerEvent};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("influencer_agent=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { path } => init_command(&path.unwrap_or_else(|| PathBuf::from(".")))?,
        command => {
            let config = load_config(cli.config.as_deref())?;
            dispatch(&config, command).await?;
        }
    }

    Ok(())
}

async fn dispatch(config: &Config, command: Commands) -> Result<()> {
    match command {
        Commands::Init { .. } => {}
        Commands::Run { interval, cycles } => run_command(config, interval, cycles).await?,
        Commands::Exec { activity, params } => exec_command(config, &activity, &params).await?,
        Commands::Status => status_command(config)?,
        Commands::Activities => activities_command(config)?,
        Commands::Memory { limit, offset, activity_type } => {
            memory_command(config, limit, offset, activity_type.as_deref())?
        }
        Commands::ClearMemory => clear_memory_command(config)?,
        Commands::Credentials { action } => credentials_command(config, action)?,
        Commands::LoadProfile { file } => {
            let controller = runtime::build(config)?;
            runtime::load_profile_file(controller.brain(), &file)?;
            println!("Applied profile from {:?}", file);
        }
        Commands::LoadSkills { file } => {
            let controller = runtime::build(config)?;
            runtime::load_skills_file(controller.brain(), &file)?;
            println!("Applied skills from {:?}", file);
        }
        Commands::LoadConstraints { file } => {
            let controller = runtime::build(config)?;
            runtime::load_constraints_file(controller.brain(), &file)?;
            println!("Applied constraints from {:?}", file);
        }
        Commands::SetTrait { name, value } => {
            let controller = runtime::build(config)?;
            let stored = controller.brain().set_trait(&name, value)?;
            println!("{} = {:.2}", name, stored);
        }
    }
    Ok(())
}

fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let (config, source) = Config::discover(explicit, &cwd)?;
    match source {
        Some(path) => tracing::debug!("Using config {}", path.display()),
        None => tracing::debug!("No config file found, using defaults"),
    }
    Ok(config)
}

fn init_command(path: &Path) -> Result<()> {
    println!("Initializing influencer agent in {:?}", path);

    std::fs::create_dir_all(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    let mut config = Config::default_config();
    config.expand_paths();

    let config_path = path.join("influencer.toml");
    config.to_file(&config_path)?;
    println!("Created configuration: {:?}", config_path);

    runtime::open_store(&config)?;
    println!("Initialized database: {:?}", config.agent.state_db);

    println!("\nInitialization complete!");
    println!("\nNext steps:");
    println!("1. Edit influencer.toml to customize settings");
    println!("2. Add API keys with 'influencer credentials set <activity> <KEY> <value>'");
    println!("3. Run 'influencer run' to start the activity loop");

    Ok(())
}

async fn run_command(config: &Config, interval: Option<u64>, cycles: Option<usize>) -> Result<()> {
    let controller = runtime::build(config)?;
    let period = interval
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.cycle_interval());
    if period.is_zero() {
        anyhow::bail!("--interval must be greater than zero");
    }

    if let Some(cycles) = cycles {
        for cycle in 0..cycles {
            if cycle > 0 {
                tokio::time::sleep(period).await;
            }
            match controller.run_cycle().await {
                Some(result) => print_result(&result),
                None => println!("No runnable activity this cycle"),
            }
        }
        return Ok(());
    }

    let reporter = tokio::spawn(report_events(Arc::clone(&controller)));
    controller.start(period);
    println!("Running every {:?}. Press Ctrl-C to stop.", period);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    println!("Stopping, waiting for running activities to finish...");
    controller.shutdown().await;
    reporter.abort();
    println!("Stopped.");
    Ok(())
}

async fn report_events(controller: Arc<Controller>) {
    let mut events = controller.subscribe();
    loop {
        match events.recv().await {
            Ok(ControllerEvent::ActivityCompleted { result, .. }) => print_result(&result),
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("Event reporter skipped {} events", skipped)
            }
            Err(RecvError::Closed) => break,
        }
    }
}

async fn exec_command(config: &Config, activity: &str, params: &[String]) -> Result<()> {
    let params = parse_params(params)?;
    let controller = runtime::build(config)?;

    let Some(result) = controller.execute_on_demand(activity, &params).await else {
        anyhow::bail!("Unknown activity `{}`. Run 'influencer activities' to list them.", activity);
    };
    print_result(&result);
    if !result.success {
        anyhow::bail!("Activity `{}` failed", activity);
    }
    Ok(())
}

fn status_command(config: &Config) -> Result<()> {
    let controller = runtime::build(config)?;
    let brain = controller.brain();
    let state = brain.state();

    println!("Agent Status\n");
    println!("Mood:   {}", state.mood);
    println!("Energy: {:.2}", state.energy);
    if let (Some(last), Some(at)) = (&state.last_activity, state.last_activity_timestamp) {
        println!("Last:   {} at {}", last, at.to_rfc3339());
    }

    if !state.personality.is_empty() {
        println!("\nPersonality:");
        for (name, value) in &state.personality {
            println!("  {:<20} {:.2}", name, value);
        }
    }

    let eligible = brain.eligible_activities();
    println!("\nEligible activities: {}", eligible.len());
    for activity in &eligible {
        match brain.cooldown_remaining(activity.name()) {
            Some(remaining) => println!(
                "  {:<32} cooling down ({}s left)",
                activity.name(),
                remaining.as_secs()
            ),
            None => println!("  {}", activity.name()),
        }
    }

    println!("\nMemory entries: {}", controller.memory().len());
    Ok(())
}

fn activities_command(config: &Config) -> Result<()> {
    let controller = runtime::build(config)?;
    let brain = controller.brain();

    println!("Activities\n");
    for activity in brain.activities() {
        let readiness = match brain.readiness(activity.name()) {
            Some(Ok(())) => "ready".to_string(),
            Some(Err(reason)) => reason.to_string(),
            None => "unknown".to_string(),
        };
        println!(
            "  {:<32} cost {:.2}  cooldown {:>6}s  {}",
            activity.name(),
            activity.energy_cost(),
            activity.cooldown().as_secs(),
            readiness
        );
        println!("      {}", activity.description());
    }
    Ok(())
}

fn memory_command(
    config: &Config,
    limit: usize,
    offset: usize,
    activity_type: Option<&str>,
) -> Result<()> {
    let controller = runtime::build(config)?;
    let memory = controller.memory();

    let entries = match activity_type {
        Some(kind) => memory.by_type(kind).into_iter().skip(offset).take(limit).collect(),
        None => memory.recent(limit, offset),
    };

    if entries.is_empty() {
        println!("No memories recorded");
        return Ok(());
    }

    for entry in entries {
        let when = entry
            .timestamp
            .map(|ts| ts.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        let outcome = if entry.success { "ok" } else { "failed" };
        println!("[{}] {} {}", when, entry.activity_type, outcome);
        if let Some(error) = &entry.error {
            println!("    error: {}", error);
        }
    }
    Ok(())
}

fn clear_memory_command(config: &Config) -> Result<()> {
    let controller = runtime::build(config)?;
    let count = controller.memory().len();
    controller.memory().clear()?;
    println!("Cleared {} memory entries", count);
    Ok(())
}

fn credentials_command(config: &Config, action: CredentialAction) -> Result<()> {
    let controller = runtime::build(config)?;
    let brain = controller.brain();

    match action {
        CredentialAction::Set { activity, key, value } => {
            brain.set_credential(&activity, &key, &value);
            brain.refresh_eligibility();
            println!("Stored {} for {}", key, activity);
        }
        CredentialAction::Status => {
            for (activity, keys) in brain.credential_statuses() {
                println!("{}", activity);
                for (key, present) in keys {
                    println!("  {:<24} {}", key, if present { "configured" } else { "missing" });
                }
            }
        }
    }
    Ok(())
}

fn print_result(result: &ActivityResult) {
    let name = result.activity_type.as_deref().unwrap_or("?");
    if result.success {
        println!("✓ {}", name);
        if let Some(data) = &result.data {
            match serde_json::to_string_pretty(data) {
                Ok(text) => println!("{}", text),
                Err(e) => tracing::warn!("Could not render result data: {}", e),
            }
        }
    } else {
        println!("✗ {}: {}", name, result.error.as_deref().unwrap_or("unknown error"));
    }
}
