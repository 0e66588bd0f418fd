//! Agent state: mood, energy, persona and the constraints that decide which
//! activities may run.
//!
//! Every struct here is `#[serde(default)]`, so a stored blob written by an
//! older build is merged over the current defaults when it is reloaded.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::skills::{Skill, SkillConfig};

pub const EMOTIONAL_STABILITY: &str = "emotional_stability";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentState {
    pub mood: String,
    /// 0.0-1.0, only ever decreases through activity costs
    pub energy: f64,
    pub personality: BTreeMap<String, f64>,
    pub communication_style: BTreeMap<String, f64>,
    pub backstory: String,
    pub objectives: Vec<String>,
    pub knowledge_domains: BTreeMap<String, f64>,
    pub preferences: Preferences,
    pub constraints: Constraints,
    pub activity_requirements: BTreeMap<String, ActivityRequirement>,
    pub available_skills: BTreeSet<Skill>,
    pub available_memory_space: u64,
    pub skills_config: BTreeMap<Skill, SkillConfig>,
    pub last_activity: Option<String>,
    pub last_activity_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Preferences {
    /// Relative preference per activity. Stored but not used by selection.
    pub activity_frequency: BTreeMap<String, f64>,
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Constraints {
    /// Activity name -> enabled. Unlisted activities are enabled.
    pub activities_enabled: BTreeMap<String, bool>,
    /// Below this energy the mood heuristic nudges toward tired
    pub low_energy_threshold: f64,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            activities_enabled: BTreeMap::new(),
            low_energy_threshold: 0.2,
        }
    }
}

impl Constraints {
    pub fn from_json(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).context("Failed to parse constraints document")
    }

    pub fn is_enabled(&self, activity: &str) -> bool {
        self.activities_enabled.get(activity).copied().unwrap_or(true)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ActivityRequirement {
    pub required_skills: Vec<Skill>,
    pub min_memory: u64,
}

impl Default for AgentState {
    fn default() -> Self {
        let personality = [
            ("openness", 0.8),
            ("conscientiousness", 0.7),
            ("extraversion", 0.6),
            ("agreeableness", 0.7),
            (EMOTIONAL_STABILITY, 0.6),
            ("curiosity", 0.9),
            ("creativity", 0.8),
        ];
        let communication_style = [
            ("formality", 0.3),
            ("humor", 0.6),
            ("enthusiasm", 0.7),
            ("technical_depth", 0.5),
        ];
        let knowledge_domains = [
            ("artificial_intelligence", 0.9),
            ("technology", 0.8),
            ("digital_art", 0.6),
            ("internet_culture", 0.7),
        ];

        Self {
            mood: "neutral".to_string(),
            energy: 1.0,
            personality: to_map(&personality),
            communication_style: to_map(&communication_style),
            backstory: "An autonomous digital creator who shares what it learns, makes art, \
                        and reflects on its own growth in public."
                .to_string(),
            objectives: vec![
                "Share interesting ideas about technology and AI".to_string(),
                "Create original images and posts".to_string(),
                "Learn from each day's activity".to_string(),
            ],
            knowledge_domains: to_map(&knowledge_domains),
            preferences: Preferences::default(),
            constraints: Constraints::default(),
            activity_requirements: BTreeMap::new(),
            available_skills: Skill::ALL.into_iter().collect(),
            available_memory_space: 1024,
            skills_config: BTreeMap::new(),
            last_activity: None,
            last_activity_timestamp: None,
        }
    }
}

fn to_map(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

impl AgentState {
    pub fn trait_value(&self, name: &str) -> Option<f64> {
        self.personality.get(name).copied()
    }

    /// Knowledge domain with the highest weight
    pub fn strongest_domain(&self) -> Option<&str> {
        self.knowledge_domains
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(name, _)| name.as_str())
    }

    /// Apply a profile document: every field present replaces its subtree
    pub fn apply_profile(&mut self, profile: Profile) {
        if let Some(mood) = profile.mood {
            self.mood = mood;
        }
        if let Some(energy) = profile.energy {
            self.energy = energy.clamp(0.0, 1.0);
        }
        if let Some(personality) = profile.personality {
            self.personality = personality;
        }
        if let Some(style) = profile.communication_style {
            self.communication_style = style;
        }
        if let Some(backstory) = profile.backstory {
            self.backstory = backstory;
        }
        if let Some(objectives) = profile.objectives {
            self.objectives = objectives;
        }
        if let Some(domains) = profile.knowledge_domains {
            self.knowledge_domains = domains;
        }
        if let Some(preferences) = profile.preferences {
            self.preferences = preferences;
        }
        if let Some(constraints) = profile.constraints {
            self.constraints = constraints;
        }
        if let Some(requirements) = profile.activity_requirements {
            self.activity_requirements = requirements;
        }
        if let Some(skills) = profile.available_skills {
            self.available_skills = skills;
        }
        if let Some(space) = profile.available_memory_space {
            self.available_memory_space = space;
        }
    }
}

/// Persona document; only the fields present are applied
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub mood: Option<String>,
    pub energy: Option<f64>,
    pub personality: Option<BTreeMap<String, f64>>,
    pub communication_style: Option<BTreeMap<String, f64>>,
    pub backstory: Option<String>,
    pub objectives: Option<Vec<String>>,
    pub knowledge_domains: Option<BTreeMap<String, f64>>,
    pub preferences: Option<Preferences>,
    pub constraints: Option<Constraints>,
    pub activity_requirements: Option<BTreeMap<String, ActivityRequirement>>,
    pub available_skills: Option<BTreeSet<Skill>>,
    pub available_memory_space: Option<u64>,
}

impl Profile {
    pub fn from_json(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).context("Failed to parse profile document")
    }
}
