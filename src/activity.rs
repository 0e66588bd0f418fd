//! The activity contract: what every pluggable unit of work declares and
//! how its outcome is reported.

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::warn;

use crate::credentials::ResolvedCredentials;
use crate::persistence::{Persister, DAILY_COUNTER_PREFIX};
use crate::state::AgentState;

/// Uniform outcome of an activity.
///
/// Either `success` with optional `data`, or failure with `error` set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityResult {
    pub success: bool,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_type: Option<String>,
}

impl ActivityResult {
    pub fn success(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            metadata: None,
            timestamp: None,
            activity_type: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            metadata: None,
            timestamp: None,
            activity_type: None,
        }
    }

    /// Collapse a fallible body into a result, keeping the full error chain
    pub fn from_outcome(outcome: anyhow::Result<Value>) -> Self {
        match outcome {
            Ok(data) => Self::success(data),
            Err(e) => Self::failure(format!("{:#}", e)),
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Stamp activity type and timestamp, keeping any existing timestamp
    pub fn for_activity(mut self, name: &str) -> Self {
        self.activity_type = Some(name.to_string());
        if self.timestamp.is_none() {
            self.timestamp = Some(Utc::now());
        }
        self
    }
}

/// Why an activity cannot run right now
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Ineligible {
    #[error("insufficient energy: `{activity}` needs {required:.2}, agent has {available:.2}")]
    InsufficientEnergy {
        activity: String,
        required: f64,
        available: f64,
    },
    #[error("missing API key `{credential}` for `{activity}`")]
    MissingCredential { activity: String, credential: String },
    #[error("`{0}` is disabled by constraints")]
    Disabled(String),
    #[error("`{activity}` requires skill `{skill}`")]
    MissingSkill { activity: String, skill: String },
    #[error("`{activity}` needs {required} units of memory space, {available} available")]
    InsufficientMemory {
        activity: String,
        required: u64,
        available: u64,
    },
    #[error("`{activity}` is cooling down for another {remaining_ms} ms")]
    CoolingDown { activity: String, remaining_ms: i64 },
    #[error("daily limit of {limit} reached for `{counter}`")]
    DailyLimitReached { counter: String, limit: u32 },
}

/// The slice of agent state an activity may read, plus its resolved secrets
#[derive(Debug, Clone)]
pub struct ActivityContext {
    pub energy: f64,
    pub mood: String,
    pub personality: BTreeMap<String, f64>,
    pub communication_style: BTreeMap<String, f64>,
    pub backstory: String,
    pub objectives: Vec<String>,
    pub knowledge_domains: BTreeMap<String, f64>,
    pub credentials: ResolvedCredentials,
}

impl ActivityContext {
    pub fn from_state(state: &AgentState, credentials: ResolvedCredentials) -> Self {
        Self {
            energy: state.energy,
            mood: state.mood.clone(),
            personality: state.personality.clone(),
            communication_style: state.communication_style.clone(),
            backstory: state.backstory.clone(),
            objectives: state.objectives.clone(),
            knowledge_domains: state.knowledge_domains.clone(),
            credentials,
        }
    }

    pub fn strongest_domain(&self) -> Option<&str> {
        self.knowledge_domains
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(name, _)| name.as_str())
    }

    /// Short persona description for prompts
    pub fn persona(&self) -> String {
        let traits = describe_weights(&self.personality);
        let style = describe_weights(&self.communication_style);
        format!(
            "Backstory: {}\nPersonality: {}\nCommunication style: {}\nCurrent mood: {}\nObjectives: {}",
            self.backstory,
            traits,
            style,
            self.mood,
            self.objectives.join("; "),
        )
    }
}

fn describe_weights(weights: &BTreeMap<String, f64>) -> String {
    weights
        .iter()
        .map(|(name, value)| format!("{} {:.1}", name, value))
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
pub trait Activity: Send + Sync {
    /// Unique key: cooldown map key and memory `activity_type`
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Energy deducted per execution, 0.0-1.0
    fn energy_cost(&self) -> f64;

    fn cooldown(&self) -> Duration {
        Duration::ZERO
    }

    fn required_credentials(&self) -> &[&'static str] {
        &[]
    }

    /// Minimum memory space the activity declares
    fn min_memory(&self) -> u64 {
        0
    }

    /// Mood adopted after a successful run
    fn success_mood(&self) -> &str {
        "content"
    }

    /// Energy and credential gate. Must not mutate anything.
    fn check(&self, ctx: &ActivityContext) -> Result<(), Ineligible> {
        if ctx.energy < self.energy_cost() {
            return Err(Ineligible::InsufficientEnergy {
                activity: self.name().to_string(),
                required: self.energy_cost(),
                available: ctx.energy,
            });
        }

        if let Some(missing) = self
            .required_credentials()
            .iter()
            .find(|key| !ctx.credentials.has(key))
        {
            return Err(Ineligible::MissingCredential {
                activity: self.name().to_string(),
                credential: missing.to_string(),
            });
        }

        Ok(())
    }

    fn can_run(&self, ctx: &ActivityContext) -> bool {
        self.check(ctx).is_ok()
    }

    /// Run the activity. Failures are reported in the result, never raised.
    async fn execute(&self, ctx: &ActivityContext, params: &Value) -> ActivityResult;
}

/// Non-empty string parameter
pub fn param_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub fn require_param<'a>(params: &'a Value, key: &str) -> anyhow::Result<&'a str> {
    param_str(params, key).ok_or_else(|| anyhow::anyhow!("missing required parameter `{}`", key))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct DailyCount {
    last_reset: String,
    count: u32,
}

/// Persisted per-day counter for rate-limited activities.
///
/// The count resets whenever the stored day differs from today, so the limit
/// holds across restarts. The in-memory count is authoritative; writes are
/// best-effort. Limits are advisory: two overlapping executions can both pass
/// `check` before either calls `record`.
#[derive(Debug)]
pub struct DailyLimiter {
    counter: String,
    limit: u32,
    count: Mutex<Option<DailyCount>>,
    persister: Arc<Persister>,
}

impl DailyLimiter {
    pub fn new(counter: &str, limit: u32, persister: Arc<Persister>) -> Self {
        let key = format!("{}{}", DAILY_COUNTER_PREFIX, counter);
        let stored = persister.load::<DailyCount>(&key);
        Self {
            counter: counter.to_string(),
            limit,
            count: Mutex::new(stored),
            persister,
        }
    }

    fn key(&self) -> String {
        format!("{}{}", DAILY_COUNTER_PREFIX, self.counter)
    }

    fn count_guard(&self) -> MutexGuard<'_, Option<DailyCount>> {
        self.count.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn used_on(&self, today: NaiveDate) -> u32 {
        let today = day_key(today);
        match &*self.count_guard() {
            Some(current) if current.last_reset == today => current.count,
            _ => 0,
        }
    }

    pub fn check_on(&self, today: NaiveDate) -> Result<(), Ineligible> {
        if self.used_on(today) >= self.limit {
            Err(Ineligible::DailyLimitReached {
                counter: self.counter.clone(),
                limit: self.limit,
            })
        } else {
            Ok(())
        }
    }

    pub fn record_on(&self, today: NaiveDate) -> u32 {
        let today = day_key(today);
        let updated = {
            let mut current = self.count_guard();
            let count = match &*current {
                Some(stored) if stored.last_reset == today => stored.count + 1,
                _ => 1,
            };
            let updated = DailyCount {
                last_reset: today,
                count,
            };
            *current = Some(updated.clone());
            updated
        };
        if let Err(e) = self.persister.save(&self.key(), &updated) {
            warn!("Daily counter `{}` kept in memory only: {}", self.counter, e);
        }
        updated.count
    }

    pub fn check(&self) -> Result<(), Ineligible> {
        self.check_on(today())
    }

    pub fn record(&self) -> u32 {
        self.record_on(today())
    }

    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used_on(today()))
    }
}

fn day_key(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}
