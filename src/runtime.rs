//! Wiring from [`Config`] to a ready [`Controller`].

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::activities::{default_activities, Services};
use crate::brain::Brain;
use crate::config::{AgentConfig, Config};
use crate::controller::Controller;
use crate::credentials::CredentialStore;
use crate::db::{Database, KeyValueStore};
use crate::github::GitHubClient;
use crate::llm::OpenAiClient;
use crate::memory::MemoryStore;
use crate::news::NewsApiClient;
use crate::persistence::Persister;
use crate::skills::SkillsDocument;
use crate::social::{DryRunPoster, SocialPoster, TwitterClient};
use crate::state::{Constraints, Profile};
use crate::web::HttpFetcher;

/// Open the state database, creating its directory if needed
pub fn open_store(config: &Config) -> Result<Arc<dyn KeyValueStore>> {
    let path = &config.agent.state_db;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let db = Database::new(path)
        .with_context(|| format!("Failed to open state database {}", path.display()))?;
    Ok(Arc::new(db))
}

/// HTTP-backed services for the built-in activities
pub fn build_services(config: &Config) -> Result<Services> {
    let timeout = config.http_timeout();
    let openai = Arc::new(OpenAiClient::new(
        &config.llm.base_url,
        &config.llm.chat_model,
        &config.llm.image_model,
        &config.llm.image_size,
        timeout,
    )?);

    let poster: Arc<dyn SocialPoster> = if config.sources.dry_run_posts {
        Arc::new(DryRunPoster)
    } else {
        Arc::new(TwitterClient::new(&config.sources.twitter_base_url, timeout)?)
    };

    Ok(Services {
        chat_model: openai.clone(),
        image_model: openai,
        poster,
        fetcher: Arc::new(HttpFetcher::new(timeout)?),
        news: Arc::new(NewsApiClient::new(&config.sources.news_base_url, timeout)?),
        commits: Arc::new(GitHubClient::new(&config.sources.github_base_url, timeout)?),
    })
}

/// Build the brain, memory and controller over `store` with every built-in
/// activity registered and the configured documents applied
pub fn build_controller(
    config: &Config,
    store: Arc<dyn KeyValueStore>,
    services: &Services,
) -> Result<Arc<Controller>> {
    config.validate()?;

    let persister = Arc::new(Persister::new(store, config.agent.persist_policy));
    let credentials = CredentialStore::persistent(persister.clone());
    let memory = Arc::new(MemoryStore::new(persister.clone(), config.agent.memory_capacity));
    let brain = Arc::new(Brain::new(persister.clone(), credentials));

    brain.register_all(default_activities(
        services,
        &config.activity_settings(),
        memory.clone(),
        persister,
    ));
    load_documents(&brain, &config.agent)?;

    info!(
        "Agent ready: {} activities, {} eligible, {} memories",
        brain.activities().len(),
        brain.eligible_activities().len(),
        memory.len()
    );
    Ok(Arc::new(Controller::new(brain, memory)))
}

/// Open the configured database and build everything on top of it
pub fn build(config: &Config) -> Result<Arc<Controller>> {
    let store = open_store(config)?;
    let services = build_services(config)?;
    build_controller(config, store, &services)
}

fn read_document(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

pub fn load_profile_file(brain: &Brain, path: &Path) -> Result<()> {
    let profile = Profile::from_json(&read_document(path)?)?;
    brain.load_profile(profile)?;
    Ok(())
}

pub fn load_skills_file(brain: &Brain, path: &Path) -> Result<()> {
    let skills = SkillsDocument::from_json(&read_document(path)?)?;
    brain.load_skills_config(skills)?;
    Ok(())
}

pub fn load_constraints_file(brain: &Brain, path: &Path) -> Result<()> {
    let constraints = Constraints::from_json(&read_document(path)?)?;
    brain.load_activity_constraints(constraints)?;
    Ok(())
}

fn load_documents(brain: &Brain, agent: &AgentConfig) -> Result<()> {
    if let Some(path) = &agent.profile {
        info!("Applying profile from {}", path.display());
        load_profile_file(brain, path)?;
    }
    if let Some(path) = &agent.skills {
        info!("Applying skills from {}", path.display());
        load_skills_file(brain, path)?;
    }
    if let Some(path) = &agent.constraints {
        info!("Applying constraints from {}", path.display());
        load_constraints_file(brain, path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activities::names;
    use crate::db::InMemoryStore;
    use crate::test_support::fixture_services;
    use std::io::Write;

    #[test]
    fn test_build_controller_registers_catalogue() {
        let config = Config::default_config();
        let controller =
            build_controller(&config, Arc::new(InMemoryStore::new()), &fixture_services()).unwrap();
        assert_eq!(controller.brain().activities().len(), names::ALL.len());
        assert!(!controller.is_running());
    }

    #[test]
    fn test_configured_documents_are_applied() {
        let mut profile = tempfile::NamedTempFile::new().unwrap();
        write!(profile, r#"{{"mood": "curious", "backstory": "Born in a test"}}"#).unwrap();
        let mut constraints = tempfile::NamedTempFile::new().unwrap();
        write!(constraints, r#"{{"activities_enabled": {{"nap": false}}}}"#).unwrap();

        let mut config = Config::default_config();
        config.agent.profile = Some(profile.path().to_path_buf());
        config.agent.constraints = Some(constraints.path().to_path_buf());

        let controller =
            build_controller(&config, Arc::new(InMemoryStore::new()), &fixture_services()).unwrap();
        let brain = controller.brain();
        assert_eq!(brain.state().mood, "curious");
        assert!(brain.eligible_activities().iter().all(|a| a.name() != names::NAP));
    }

    #[test]
    fn test_missing_document_is_an_error() {
        let mut config = Config::default_config();
        config.agent.skills = Some("/definitely/not/here.json".into());
        let err = build_controller(&config, Arc::new(InMemoryStore::new()), &fixture_services()).unwrap_err();
        assert!(format!("{:#}", err).contains("not/here.json"));
    }
}
