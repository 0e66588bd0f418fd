pub mod activities;
pub mod activity;
pub mod brain;
pub mod cli;
pub mod config;
pub mod controller;
pub mod credentials;
pub mod db;
pub mod github;
pub mod llm;
pub mod memory;
pub mod news;
pub mod persistence;
pub mod runtime;
pub mod skills;
pub mod social;
pub mod state;
pub mod web;

#[cfg(test)]
mod test_support;

pub use activities::{default_activities, names, ActivitySettings, Services};
pub use activity::{Activity, ActivityContext, ActivityResult, DailyLimiter, Ineligible};
pub use brain::Brain;
pub use config::Config;
pub use controller::{Controller, ControllerEvent};
pub use credentials::{CredentialStore, ResolvedCredentials};
pub use db::{Database, InMemoryStore, KeyValueStore};
pub use llm::{ChatModel, ChatRequest, GeneratedImage, ImageModel, OpenAiClient};
pub use memory::{MemoryEntry, MemoryStore, MEMORY_CAPACITY};
pub use persistence::{PersistPolicy, PersistenceError, Persister};
pub use skills::{Skill, SkillConfig, SkillsDocument};
pub use state::{AgentState, Constraints, Profile};
