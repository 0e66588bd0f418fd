use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::activities::ActivitySettings;
use crate::memory::MEMORY_CAPACITY;
use crate::persistence::PersistPolicy;

/// Files looked up in the working directory when no `--config` is given
pub const CONFIG_FILE_NAMES: [&str; 2] = ["influencer.toml", ".influencer.toml"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub agent: AgentConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    pub cycle_interval_secs: u64,
    pub state_db: PathBuf,
    #[serde(default)]
    pub persist_policy: PersistPolicy,
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: usize,
    /// Persona document (JSON) applied at startup
    #[serde(default)]
    pub profile: Option<PathBuf>,
    /// Skills document (JSON) applied at startup
    #[serde(default)]
    pub skills: Option<PathBuf>,
    /// Activity constraints document (JSON) applied at startup
    #[serde(default)]
    pub constraints: Option<PathBuf>,
}

fn default_memory_capacity() -> usize {
    MEMORY_CAPACITY
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub chat_model: String,
    pub image_model: String,
    pub image_size: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            image_model: "dall-e-3".to_string(),
            image_size: "1024x1024".to_string(),
            temperature: 0.8,
            max_tokens: 500,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LimitsConfig {
    pub daily_images: u32,
    pub daily_tweets: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        let defaults = ActivitySettings::default();
        Self {
            daily_images: defaults.daily_images,
            daily_tweets: defaults.daily_tweets,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourcesConfig {
    pub scrape_urls: Vec<String>,
    pub news_base_url: String,
    pub github_base_url: String,
    pub github_repo: Option<String>,
    pub twitter_base_url: String,
    /// Log posts instead of sending them
    pub dry_run_posts: bool,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            scrape_urls: vec![
                "https://news.ycombinator.com".to_string(),
                "https://www.technologyreview.com".to_string(),
            ],
            news_base_url: "https://newsapi.org/v2".to_string(),
            github_base_url: "https://api.github.com".to_string(),
            github_repo: None,
            twitter_base_url: "https://api.twitter.com".to_string(),
            dry_run_posts: true,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;
        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string
    pub fn from_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse config TOML")
    }

    /// Load `explicit` if given, else the first of [`CONFIG_FILE_NAMES`] in
    /// `dir`, else defaults. Returns the file used, if any.
    pub fn discover(explicit: Option<&Path>, dir: &Path) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            let mut config = Self::from_file(path)?;
            config.expand_paths();
            return Ok((config, Some(path.to_path_buf())));
        }

        for name in CONFIG_FILE_NAMES {
            let candidate = dir.join(name);
            if candidate.is_file() {
                let mut config = Self::from_file(&candidate)?;
                config.expand_paths();
                return Ok((config, Some(candidate)));
            }
        }

        let mut config = Self::default_config();
        config.expand_paths();
        Ok((config, None))
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let agent_dir = home.join(".influencer-agent");

        Config {
            agent: AgentConfig {
                cycle_interval_secs: 300,
                state_db: agent_dir.join("state.db"),
                persist_policy: PersistPolicy::default(),
                memory_capacity: MEMORY_CAPACITY,
                profile: None,
                skills: None,
                constraints: None,
            },
            llm: LlmConfig::default(),
            limits: LimitsConfig::default(),
            sources: SourcesConfig::default(),
        }
    }

    /// Write configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config to TOML")?;
        std::fs::write(path.as_ref(), contents)
            .context("Failed to write config file")?;
        Ok(())
    }

    /// Check values the runtime cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.agent.cycle_interval_secs == 0 {
            anyhow::bail!("agent.cycle_interval_secs must be greater than zero");
        }
        if self.agent.memory_capacity == 0 {
            anyhow::bail!("agent.memory_capacity must be greater than zero");
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            anyhow::bail!("llm.temperature must be between 0.0 and 2.0");
        }
        Ok(())
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.agent.cycle_interval_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_secs)
    }

    pub fn activity_settings(&self) -> ActivitySettings {
        ActivitySettings {
            temperature: self.llm.temperature,
            max_tokens: self.llm.max_tokens,
            daily_images: self.limits.daily_images,
            daily_tweets: self.limits.daily_tweets,
            scrape_urls: self.sources.scrape_urls.clone(),
            github_repo: self.sources.github_repo.clone(),
        }
    }
}

impl Config {
    /// Expand tilde in paths to home directory
    pub fn expand_paths(&mut self) {
        if let Some(home) = std::env::var_os("HOME") {
            let home = PathBuf::from(home);
            self.agent.state_db = expand_tilde(&self.agent.state_db, &home);
            for path in [&mut self.agent.profile, &mut self.agent.skills, &mut self.agent.constraints]
                .into_iter()
                .flatten()
            {
                *path = expand_tilde(path, &home);
            }
        }
    }
}

fn expand_tilde(path: &Path, home: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        home.join(stripped)
    } else {
        path.to_path_buf()
    }
}
