//! Daily introspection: a free-form thought and a review of the last 24 hours.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::{keys, names, ChatActivity};
use crate::activity::{param_str, Activity, ActivityContext, ActivityResult};
use crate::memory::{MemoryEntry, MemoryStore};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

pub struct DailyThoughtActivity {
    chat: Arc<ChatActivity>,
}

impl DailyThoughtActivity {
    pub fn new(chat: Arc<ChatActivity>) -> Self {
        Self { chat }
    }
}

#[async_trait]
impl Activity for DailyThoughtActivity {
    fn name(&self) -> &str {
        names::DAILY_THOUGHT
    }

    fn description(&self) -> &str {
        "Write down a short reflective thought for the day"
    }

    fn energy_cost(&self) -> f64 {
        0.1
    }

    fn cooldown(&self) -> Duration {
        DAY
    }

    fn required_credentials(&self) -> &[&'static str] {
        &[keys::OPENAI]
    }

    fn success_mood(&self) -> &str {
        "reflective"
    }

    async fn execute(&self, ctx: &ActivityContext, params: &Value) -> ActivityResult {
        let theme = param_str(params, "theme")
            .map(str::to_string)
            .or_else(|| ctx.objectives.first().cloned())
            .unwrap_or_else(|| "growing as a creator".to_string());

        let outcome = async {
            let prompt = format!(
                "Share one honest, reflective thought for today in two or three sentences. \
                 Theme: {}. You are feeling {}.",
                theme, ctx.mood
            );
            let thought = self.chat.generate(ctx, &prompt).await?;
            anyhow::Ok(json!({ "theme": theme, "thought": thought }))
        };
        ActivityResult::from_outcome(outcome.await)
    }
}

/// Counts and success rate per activity type
fn tally(entries: &[MemoryEntry]) -> BTreeMap<String, (usize, usize)> {
    let mut counts: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    for entry in entries {
        let slot = counts.entry(entry.activity_type.clone()).or_default();
        slot.0 += 1;
        if entry.success {
            slot.1 += 1;
        }
    }
    counts
}

pub struct AnalyzeDailyActivity {
    chat: Arc<ChatActivity>,
    memory: Arc<MemoryStore>,
}

impl AnalyzeDailyActivity {
    pub fn new(chat: Arc<ChatActivity>, memory: Arc<MemoryStore>) -> Self {
        Self { chat, memory }
    }
}

#[async_trait]
impl Activity for AnalyzeDailyActivity {
    fn name(&self) -> &str {
        names::ANALYZE_DAILY
    }

    fn description(&self) -> &str {
        "Review the last 24 hours of activity and draw lessons from it"
    }

    fn energy_cost(&self) -> f64 {
        0.1
    }

    fn cooldown(&self) -> Duration {
        DAY
    }

    fn required_credentials(&self) -> &[&'static str] {
        &[keys::OPENAI]
    }

    fn success_mood(&self) -> &str {
        "thoughtful"
    }

    async fn execute(&self, ctx: &ActivityContext, _params: &Value) -> ActivityResult {
        let cutoff = Utc::now() - chrono::Duration::hours(24);
        let entries = self.memory.since(cutoff);
        if entries.is_empty() {
            return ActivityResult::failure("no activity recorded in the last 24 hours");
        }

        let counts = tally(&entries);
        let succeeded = entries.iter().filter(|e| e.success).count();
        let breakdown = counts
            .iter()
            .map(|(activity, (total, ok))| format!("- {}: {} runs, {} succeeded", activity, total, ok))
            .collect::<Vec<_>>()
            .join("\n");

        let outcome = async {
            let prompt = format!(
                "Here is your activity over the last day ({} runs, {} succeeded):\n{}\n\n\
                 Summarize what went well, what did not, and one thing to do differently tomorrow.",
                entries.len(),
                succeeded,
                breakdown
            );
            let summary = self.chat.generate(ctx, &prompt).await?;
            let per_activity: BTreeMap<&String, Value> = counts
                .iter()
                .map(|(activity, (total, ok))| (activity, json!({ "total": total, "succeeded": ok })))
                .collect();
            anyhow::Ok(json!({
                "total": entries.len(),
                "succeeded": succeeded,
                "activities": per_activity,
                "summary": summary,
            }))
        };
        ActivityResult::from_outcome(outcome.await)
    }
}
