use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::activities::names;

/// Capability flags that gate activities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Skill {
    TextGeneration,
    ImageGeneration,
    WebScraping,
    SocialPosting,
    NewsFeed,
    CodeAnalysis,
    SelfImprovement,
}

impl Skill {
    pub const ALL: [Skill; 7] = [
        Skill::TextGeneration,
        Skill::ImageGeneration,
        Skill::WebScraping,
        Skill::SocialPosting,
        Skill::NewsFeed,
        Skill::CodeAnalysis,
        Skill::SelfImprovement,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Skill::TextGeneration => "text_generation",
            Skill::ImageGeneration => "image_generation",
            Skill::WebScraping => "web_scraping",
            Skill::SocialPosting => "social_posting",
            Skill::NewsFeed => "news_feed",
            Skill::CodeAnalysis => "code_analysis",
            Skill::SelfImprovement => "self_improvement",
        }
    }

    /// Activities this skill gates
    pub fn activities(self) -> &'static [&'static str] {
        match self {
            Skill::TextGeneration => &[names::CHAT, names::DAILY_THOUGHT, names::ANALYZE_DAILY],
            Skill::ImageGeneration => &[names::DRAW, names::POST_TWEET_WITH_IMAGE],
            Skill::WebScraping => &[names::WEB_SCRAPE],
            Skill::SocialPosting => &[
                names::POST_TWEET,
                names::POST_RECENT_MEMORIES_TWEET,
                names::POST_TWEET_WITH_IMAGE,
            ],
            Skill::NewsFeed => &[names::FETCH_NEWS],
            Skill::CodeAnalysis => &[names::ANALYZE_COMMITS],
            Skill::SelfImprovement => &[
                names::ANALYZE_DAILY,
                names::EVALUATE,
                names::SUGGEST_NEW_ACTIVITIES,
                names::BUILD_OR_UPDATE,
            ],
        }
    }

    pub fn gates(self, activity: &str) -> bool {
        self.activities().contains(&activity)
    }

    /// Every skill an activity depends on according to the static table
    pub fn required_for(activity: &str) -> Vec<Skill> {
        Skill::ALL.into_iter().filter(|s| s.gates(activity)).collect()
    }
}

impl fmt::Display for Skill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Skill {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Skill::ALL
            .into_iter()
            .find(|skill| skill.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown skill: {}", s))
    }
}

/// Per-skill configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkillConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Credential aliases: credential name -> activity whose stored value is borrowed
    #[serde(default)]
    pub credentials: BTreeMap<String, String>,
}

fn default_enabled() -> bool {
    true
}

impl Default for SkillConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            credentials: BTreeMap::new(),
        }
    }
}

/// Skills enablement document accepted by `Brain::load_skills_config`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SkillsDocument {
    #[serde(default)]
    pub skills: BTreeMap<Skill, SkillConfig>,
}

impl SkillsDocument {
    pub fn from_json(contents: &str) -> anyhow::Result<Self> {
        use anyhow::Context;
        serde_json::from_str(contents).context("Failed to parse skills document")
    }
}
