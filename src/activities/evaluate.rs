use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::names;
use crate::activity::{Activity, ActivityContext, ActivityResult};
use crate::memory::{MemoryEntry, MemoryStore};

const WINDOW: usize = 100;

#[derive(Debug, Default, Serialize, PartialEq)]
struct ActivityStats {
    runs: usize,
    succeeded: usize,
    success_rate: f64,
    last_error: Option<String>,
}

fn evaluate(entries: &[MemoryEntry]) -> BTreeMap<String, ActivityStats> {
    let mut stats: BTreeMap<String, ActivityStats> = BTreeMap::new();
    // Newest first, so the first error seen is the latest.
    for entry in entries {
        let slot = stats.entry(entry.activity_type.clone()).or_default();
        slot.runs += 1;
        if entry.success {
            slot.succeeded += 1;
        } else if slot.last_error.is_none() {
            slot.last_error = entry.error.clone();
        }
    }
    for slot in stats.values_mut() {
        slot.success_rate = slot.succeeded as f64 / slot.runs as f64;
    }
    stats
}

/// Local self-assessment over recent memory. No external calls.
pub struct EvaluateActivity {
    memory: Arc<MemoryStore>,
}

impl EvaluateActivity {
    pub fn new(memory: Arc<MemoryStore>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Activity for EvaluateActivity {
    fn name(&self) -> &str {
        names::EVALUATE
    }

    fn description(&self) -> &str {
        "Score recent activities by success rate"
    }

    fn energy_cost(&self) -> f64 {
        0.05
    }

    fn cooldown(&self) -> Duration {
        Duration::from_secs(6 * 60 * 60)
    }

    fn success_mood(&self) -> &str {
        "analytical"
    }

    async fn execute(&self, _ctx: &ActivityContext, _params: &Value) -> ActivityResult {
        let entries = self.memory.recent(WINDOW, 0);
        let stats = evaluate(&entries);
        let succeeded = entries.iter().filter(|e| e.success).count();
        let overall = if entries.is_empty() {
            0.0
        } else {
            succeeded as f64 / entries.len() as f64
        };
        let weakest = stats
            .iter()
            .filter(|(_, s)| s.succeeded < s.runs)
            .min_by(|a, b| a.1.success_rate.total_cmp(&b.1.success_rate))
            .map(|(name, _)| name.clone());

        ActivityResult::success(json!({
            "total": entries.len(),
            "success_rate": overall,
            "activities": stats,
            "needs_attention": weakest,
        }))
    }
}
