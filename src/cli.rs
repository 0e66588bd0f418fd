use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "influencer")]
#[command(version, about = "Autonomous influencer agent - picks and runs activities on a timer", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize configuration and database
    Init {
        /// Directory to initialize (defaults to current directory)
        path: Option<PathBuf>,
    },

    /// Run the activity loop until Ctrl-C
    Run {
        /// Seconds between cycles (overrides the config)
        #[arg(short, long)]
        interval: Option<u64>,

        /// Stop after this many cycles
        #[arg(long)]
        cycles: Option<usize>,
    },

    /// Run one activity now, bypassing selection
    Exec {
        /// Activity name, e.g. `nap` or `post-tweet`
        activity: String,

        /// Parameter as key=value, repeatable
        #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
    },

    /// Show mood, energy, traits and eligibility
    Status,

    /// List the activity catalogue
    Activities,

    /// Show recorded activity outcomes, newest first
    Memory {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        #[arg(short, long, default_value_t = 0)]
        offset: usize,

        /// Only entries of this activity
        #[arg(short = 't', long)]
        activity_type: Option<String>,
    },

    /// Delete every memory entry
    ClearMemory,

    /// Manage API keys per activity
    Credentials {
        #[command(subcommand)]
        action: CredentialAction,
    },

    /// Apply a persona document (JSON)
    LoadProfile { file: PathBuf },

    /// Apply a skills document (JSON)
    LoadSkills { file: PathBuf },

    /// Apply an activity constraints document (JSON)
    LoadConstraints { file: PathBuf },

    /// Set a personality trait, clamped to 0.0-1.0
    SetTrait { name: String, value: f64 },
}

#[derive(Subcommand, Debug)]
pub enum CredentialAction {
    /// Store a key for an activity
    Set {
        activity: String,
        key: String,
        value: String,
    },

    /// Show which keys are configured (values are never printed)
    Status,
}

/// Turn repeated `key=value` arguments into a JSON object.
///
/// Values that parse as JSON (numbers, booleans, arrays) keep their type,
/// anything else is a string.
pub fn parse_params(pairs: &[String]) -> Result<Value> {
    let mut params = Map::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .with_context(|| format!("Parameter `{}` is not in key=value form", pair))?;
        let key = key.trim();
        if key.is_empty() {
            anyhow::bail!("Parameter `{}` has an empty key", pair);
        }
        let value = match serde_json::from_str::<Value>(raw) {
            Ok(value) if !value.is_string() => value,
            _ => Value::String(raw.to_string()),
        };
        params.insert(key.to_string(), value);
    }
    Ok(Value::Object(params))
}
