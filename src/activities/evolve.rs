//! Self-improvement: proposing new activities and drafting plans for them.
//!
//! Plans are returned as data only. Nothing here changes the registry.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use super::{keys, names, ChatActivity};
use crate::activity::{param_str, Activity, ActivityContext, ActivityResult};
use crate::memory::MemoryStore;

const MAX_SUGGESTIONS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub name: String,
    pub description: String,
}

fn slugify(name: &str) -> String {
    let mut slug = String::new();
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

/// Parse `name: description` lines from a model reply. Bullets, numbering
/// and emphasis are ignored; names already in `known` are skipped.
pub fn parse_suggestions(reply: &str, known: &[String]) -> Vec<Suggestion> {
    let mut suggestions: Vec<Suggestion> = Vec::new();

    for line in reply.lines() {
        let line = line
            .trim()
            .trim_start_matches(|c: char| c == '-' || c == '*' || c == '•' || c.is_ascii_digit() || c == '.' || c == ')')
            .trim();
        let Some((name, description)) = line.split_once(':') else {
            continue;
        };

        let name = slugify(&name.replace("**", ""));
        let description = description.trim().to_string();
        if name.is_empty() || description.is_empty() {
            continue;
        }
        if known.iter().any(|k| *k == name) || suggestions.iter().any(|s| s.name == name) {
            continue;
        }

        suggestions.push(Suggestion { name, description });
    }

    suggestions
}

pub struct SuggestNewActivitiesActivity {
    chat: Arc<ChatActivity>,
    known: Vec<String>,
}

impl SuggestNewActivitiesActivity {
    pub fn new(chat: Arc<ChatActivity>, known: Vec<String>) -> Self {
        Self { chat, known }
    }
}

#[async_trait]
impl Activity for SuggestNewActivitiesActivity {
    fn name(&self) -> &str {
        names::SUGGEST_NEW_ACTIVITIES
    }

    fn description(&self) -> &str {
        "Brainstorm activities the agent does not have yet"
    }

    fn energy_cost(&self) -> f64 {
        0.1
    }

    fn cooldown(&self) -> Duration {
        Duration::from_secs(24 * 60 * 60)
    }

    fn required_credentials(&self) -> &[&'static str] {
        &[keys::OPENAI]
    }

    fn success_mood(&self) -> &str {
        "inspired"
    }

    async fn execute(&self, ctx: &ActivityContext, _params: &Value) -> ActivityResult {
        let outcome = async {
            let prompt = format!(
                "You can currently do these activities: {}.\n\
                 Suggest up to {} new activities that fit your objectives. \
                 Answer with one per line as `name: description`.",
                self.known.join(", "),
                MAX_SUGGESTIONS
            );
            let reply = self.chat.generate(ctx, &prompt).await?;
            let mut suggestions = parse_suggestions(&reply, &self.known);
            suggestions.truncate(MAX_SUGGESTIONS);
            if suggestions.is_empty() {
                anyhow::bail!("model reply contained no usable suggestions");
            }
            anyhow::Ok(json!({ "suggestions": suggestions }))
        };
        ActivityResult::from_outcome(outcome.await)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum PlanMode {
    Build,
    Update,
}

/// Drafts an implementation plan for a new activity, or an improvement plan
/// for an existing one
pub struct BuildOrUpdateActivity {
    chat: Arc<ChatActivity>,
    memory: Arc<MemoryStore>,
    known: Vec<String>,
}

impl BuildOrUpdateActivity {
    pub fn new(chat: Arc<ChatActivity>, memory: Arc<MemoryStore>, known: Vec<String>) -> Self {
        Self { chat, memory, known }
    }

    /// Most recent suggestion recorded by a successful suggest run
    fn latest_suggestion(&self) -> Option<Suggestion> {
        self.memory
            .by_type(names::SUGGEST_NEW_ACTIVITIES)
            .into_iter()
            .filter(|entry| entry.success)
            .filter_map(|entry| entry.data)
            .filter_map(|data| {
                data.get("suggestions")
                    .cloned()
                    .and_then(|s| serde_json::from_value::<Vec<Suggestion>>(s).ok())
            })
            .find_map(|list| list.into_iter().next())
    }

    fn target(&self, params: &Value) -> Option<Suggestion> {
        match param_str(params, "activity") {
            Some(name) => Some(Suggestion {
                name: name.to_string(),
                description: param_str(params, "description").unwrap_or_default().to_string(),
            }),
            None => self.latest_suggestion(),
        }
    }
}

#[async_trait]
impl Activity for BuildOrUpdateActivity {
    fn name(&self) -> &str {
        names::BUILD_OR_UPDATE
    }

    fn description(&self) -> &str {
        "Draft a build plan for a suggested activity or an update plan for an existing one"
    }

    fn energy_cost(&self) -> f64 {
        0.2
    }

    fn cooldown(&self) -> Duration {
        Duration::from_secs(24 * 60 * 60)
    }

    fn required_credentials(&self) -> &[&'static str] {
        &[keys::OPENAI]
    }

    fn success_mood(&self) -> &str {
        "determined"
    }

    async fn execute(&self, ctx: &ActivityContext, params: &Value) -> ActivityResult {
        let Some(target) = self.target(params) else {
            return ActivityResult::failure("no `activity` given and no earlier suggestion to build");
        };
        let mode = if self.known.contains(&target.name) {
            PlanMode::Update
        } else {
            PlanMode::Build
        };

        let outcome = async {
            let ask = match mode {
                PlanMode::Build => format!(
                    "Plan how to build a new activity called `{}`: {}",
                    target.name, target.description
                ),
                PlanMode::Update => format!(
                    "Plan how to improve your existing `{}` activity. {}",
                    target.name, target.description
                ),
            };
            let prompt = format!(
                "{}\nList the steps, the external services it needs, and how to tell it worked.",
                ask
            );
            let plan = self.chat.generate(ctx, &prompt).await?;
            anyhow::Ok(json!({
                "mode": mode,
                "activity": target.name,
                "description": target.description,
                "plan": plan,
            }))
        };
        ActivityResult::from_outcome(outcome.await)
    }
}
