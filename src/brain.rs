//! The brain owns agent state, the activity registry and the credential store.
//! It decides what may run, picks the next activity and runs it.
//!
//! Locks are never held across an `.await`. When both are needed the
//! cooldown map is locked before the state.

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::activity::{Activity, ActivityContext, ActivityResult, Ineligible};
use crate::credentials::CredentialStore;
use crate::persistence::{PersistenceError, Persister, AGENT_STATE_KEY, COOLDOWNS_KEY};
use crate::skills::{Skill, SkillsDocument};
use crate::state::{AgentState, Constraints, Profile, EMOTIONAL_STABILITY};

pub struct Brain {
    state: Mutex<AgentState>,
    registry: RwLock<BTreeMap<String, Arc<dyn Activity>>>,
    /// Names passing enablement, skill and memory checks. Rebuilt on every
    /// configuration or registry change.
    eligible: RwLock<Vec<String>>,
    /// Activity name -> start of its last run, persisted so a restart does
    /// not reset them
    cooldowns: Mutex<HashMap<String, DateTime<Utc>>>,
    credentials: CredentialStore,
    persister: Arc<Persister>,
}

impl std::fmt::Debug for Brain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Brain")
            .field("activities", &self.activity_names())
            .field("eligible", &self.eligible_names())
            .finish()
    }
}

impl Brain {
    /// Create a brain over `persister`, restoring any saved agent state
    pub fn new(persister: Arc<Persister>, credentials: CredentialStore) -> Self {
        let state = match persister.try_load::<AgentState>(AGENT_STATE_KEY) {
            Ok(Some(state)) => {
                info!("Restored agent state (mood: {}, energy: {:.2})", state.mood, state.energy);
                state
            }
            Ok(None) => AgentState::default(),
            Err(e) => {
                warn!("Ignoring stored agent state: {}", e);
                AgentState::default()
            }
        };

        let cooldowns = match persister.try_load::<HashMap<String, DateTime<Utc>>>(COOLDOWNS_KEY) {
            Ok(stamps) => stamps.unwrap_or_default(),
            Err(e) => {
                warn!("Ignoring stored cooldowns: {}", e);
                HashMap::new()
            }
        };

        Self {
            state: Mutex::new(state),
            registry: RwLock::new(BTreeMap::new()),
            eligible: RwLock::new(Vec::new()),
            cooldowns: Mutex::new(cooldowns),
            credentials,
            persister,
        }
    }

    fn state_guard(&self) -> MutexGuard<'_, AgentState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn cooldown_guard(&self) -> MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        self.cooldowns.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add or replace an activity by name
    pub fn register(&self, activity: Arc<dyn Activity>) {
        let name = activity.name().to_string();
        {
            let mut registry = self.registry.write().unwrap_or_else(|p| p.into_inner());
            if registry.insert(name.clone(), activity).is_some() {
                debug!("Replaced activity: {}", name);
            }
        }
        self.refresh_eligibility();
    }

    pub fn register_all(&self, activities: impl IntoIterator<Item = Arc<dyn Activity>>) {
        {
            let mut registry = self.registry.write().unwrap_or_else(|p| p.into_inner());
            for activity in activities {
                registry.insert(activity.name().to_string(), activity);
            }
        }
        self.refresh_eligibility();
    }

    pub fn activity(&self, name: &str) -> Option<Arc<dyn Activity>> {
        self.registry
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(name)
            .cloned()
    }

    /// Every registered activity, by name
    pub fn activities(&self) -> Vec<Arc<dyn Activity>> {
        self.registry
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .values()
            .cloned()
            .collect()
    }

    fn activity_names(&self) -> Vec<String> {
        self.registry
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    /// Snapshot of the current state
    pub fn state(&self) -> AgentState {
        self.state_guard().clone()
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    fn eligible_names(&self) -> Vec<String> {
        self.eligible.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Activities allowed by the current constraints, skills and memory budget.
    /// Energy, credentials and cooldowns are checked at selection time.
    pub fn eligible_activities(&self) -> Vec<Arc<dyn Activity>> {
        let registry = self.registry.read().unwrap_or_else(|p| p.into_inner());
        self.eligible_names()
            .iter()
            .filter_map(|name| registry.get(name).cloned())
            .collect()
    }

    /// Rebuild the eligibility cache from the registry and current state
    pub fn refresh_eligibility(&self) {
        let activities = self.activities();
        let names: Vec<String> = {
            let state = self.state_guard();
            activities
                .iter()
                .filter(|activity| configured_eligibility(&state, activity.as_ref()).is_ok())
                .map(|activity| activity.name().to_string())
                .collect()
        };

        debug!("{} of {} activities eligible", names.len(), activities.len());
        *self.eligible.write().unwrap_or_else(|p| p.into_inner()) = names;
    }

    /// How long until `name` may run again, if it is cooling down
    pub fn cooldown_remaining(&self, name: &str) -> Option<Duration> {
        let activity = self.activity(name)?;
        let cooldowns = self.cooldown_guard();
        remaining_cooldown(&cooldowns, activity.as_ref(), Utc::now())
    }

    fn context_for(&self, state: &AgentState, activity: &dyn Activity) -> ActivityContext {
        let credentials =
            self.credentials
                .resolve(activity.name(), activity.required_credentials(), &state.skills_config);
        ActivityContext::from_state(state, credentials)
    }

    /// Full readiness of one activity right now, or `None` if unknown
    pub fn readiness(&self, name: &str) -> Option<Result<(), Ineligible>> {
        let activity = self.activity(name)?;
        let cooldowns = self.cooldown_guard();
        let state = self.state_guard();
        Some(self.ready(&cooldowns, &state, activity.as_ref(), Utc::now()))
    }

    fn ready(
        &self,
        cooldowns: &HashMap<String, DateTime<Utc>>,
        state: &AgentState,
        activity: &dyn Activity,
        now: DateTime<Utc>,
    ) -> Result<(), Ineligible> {
        if let Some(remaining) = remaining_cooldown(cooldowns, activity, now) {
            return Err(Ineligible::CoolingDown {
                activity: activity.name().to_string(),
                remaining_ms: remaining.as_millis() as i64,
            });
        }
        configured_eligibility(state, activity)?;
        activity.check(&self.context_for(state, activity))
    }

    /// Pick a runnable activity uniformly at random. `None` means nothing can
    /// run right now.
    pub fn select_next(&self) -> Option<Arc<dyn Activity>> {
        let eligible = self.eligible_activities();
        let now = Utc::now();

        let runnable: Vec<Arc<dyn Activity>> = {
            let cooldowns = self.cooldown_guard();
            let state = self.state_guard();
            eligible
                .into_iter()
                .filter(|activity| self.ready(&cooldowns, &state, activity.as_ref(), now).is_ok())
                .collect()
        };

        let chosen = runnable.choose(&mut rand::thread_rng()).cloned();
        match &chosen {
            Some(activity) => debug!("Selected {} from {} runnable", activity.name(), runnable.len()),
            None => debug!("No runnable activities"),
        }
        chosen
    }

    /// Run `name` now. Never fails: every problem comes back as a failed
    /// result.
    pub async fn execute(&self, name: &str, params: &Value) -> ActivityResult {
        let Some(activity) = self.activity(name) else {
            warn!("Activity not found: {}", name);
            return ActivityResult::failure(format!("Activity `{}` not found", name)).for_activity(name);
        };

        let ctx = match self.begin(activity.as_ref()) {
            Ok(ctx) => ctx,
            Err(result) => return result.for_activity(name),
        };

        info!("Executing activity: {}", name);
        let result = activity.execute(&ctx, params).await.for_activity(name);

        if result.success {
            info!("Activity {} succeeded", name);
        } else {
            warn!(
                "Activity {} failed: {}",
                name,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }

        self.finish(activity.as_ref(), result)
    }

    /// Check, stamp the cooldown, deduct energy and persist, all under the
    /// cooldown and state locks
    fn begin(&self, activity: &dyn Activity) -> Result<ActivityContext, ActivityResult> {
        let name = activity.name();
        let now = Utc::now();
        let mut cooldowns = self.cooldown_guard();
        let mut state = self.state_guard();

        if let Err(reason) = self.ready(&cooldowns, &state, activity, now) {
            info!("Not running {}: {}", name, reason);
            return Err(ActivityResult::failure(reason.to_string()));
        }

        let previous_state = state.clone();
        let previous_stamp = cooldowns.insert(name.to_string(), now);
        state.energy = (state.energy - activity.energy_cost()).max(0.0);
        state.last_activity = Some(name.to_string());
        state.last_activity_timestamp = Some(now);

        if let Err(e) = self.persister.save(AGENT_STATE_KEY, &*state) {
            error!("Not running {}: {}", name, e);
            *state = previous_state;
            match previous_stamp {
                Some(stamp) => cooldowns.insert(name.to_string(), stamp),
                None => cooldowns.remove(name),
            };
            return Err(ActivityResult::failure(e.to_string()));
        }

        // The stamp in memory already guards this process.
        if let Err(e) = self.persister.save(COOLDOWNS_KEY, &*cooldowns) {
            warn!("Cooldown for {} kept in memory only: {}", name, e);
        }

        Ok(self.context_for(&state, activity))
    }

    fn finish(&self, activity: &dyn Activity, result: ActivityResult) -> ActivityResult {
        let saved = {
            let mut state = self.state_guard();
            state.mood = updated_mood(&state, activity.success_mood(), result.success);
            debug!("Mood is now {} (energy {:.2})", state.mood, state.energy);
            self.persister.save(AGENT_STATE_KEY, &*state)
        };

        match saved {
            Ok(()) => result,
            Err(e) => {
                error!("Failed to save state after {}: {}", activity.name(), e);
                with_metadata_field(result, "persistence_error", json!(e.to_string()))
            }
        }
    }

    fn update_state(&self, apply: impl FnOnce(&mut AgentState)) -> Result<(), PersistenceError> {
        let saved = {
            let mut state = self.state_guard();
            apply(&mut state);
            self.persister.save(AGENT_STATE_KEY, &*state)
        };
        self.refresh_eligibility();
        saved
    }

    /// Apply a persona document. Present fields replace their subtrees.
    pub fn load_profile(&self, profile: Profile) -> Result<(), PersistenceError> {
        info!("Loading profile");
        self.update_state(|state| state.apply_profile(profile))
    }

    /// Replace the skill configuration. Each listed skill is added to or
    /// removed from the available set according to its `enabled` flag.
    pub fn load_skills_config(&self, document: SkillsDocument) -> Result<(), PersistenceError> {
        info!("Loading configuration for {} skills", document.skills.len());
        self.update_state(|state| {
            for (skill, config) in &document.skills {
                if config.enabled {
                    state.available_skills.insert(*skill);
                } else {
                    state.available_skills.remove(skill);
                }
            }
            state.skills_config = document.skills;
        })
    }

    pub fn load_activity_constraints(&self, constraints: Constraints) -> Result<(), PersistenceError> {
        info!("Loading activity constraints");
        self.update_state(|state| state.constraints = constraints)
    }

    /// Set a personality trait, clamped to 0.0-1.0. Returns the stored value.
    pub fn set_trait(&self, name: &str, value: f64) -> Result<f64, PersistenceError> {
        let value = value.clamp(0.0, 1.0);
        let saved = {
            let mut state = self.state_guard();
            state.personality.insert(name.to_string(), value);
            self.persister.save(AGENT_STATE_KEY, &*state)
        };
        saved.map(|()| value)
    }

    pub fn set_credential(&self, activity: &str, key: &str, value: &str) -> bool {
        self.credentials.set(activity, key, value)
    }

    /// activity -> required credential -> resolvable, for registered activities
    pub fn credential_statuses(&self) -> BTreeMap<String, BTreeMap<String, bool>> {
        let state = self.state();
        self.activities()
            .iter()
            .filter(|activity| !activity.required_credentials().is_empty())
            .map(|activity| {
                let required = activity.required_credentials();
                let resolved = self
                    .credentials
                    .resolve(activity.name(), required, &state.skills_config);
                let flags = required
                    .iter()
                    .map(|key| (key.to_string(), resolved.has(key)))
                    .collect();
                (activity.name().to_string(), flags)
            })
            .collect()
    }

    pub fn save_state(&self) -> Result<(), PersistenceError> {
        let state = self.state_guard();
        self.persister.save(AGENT_STATE_KEY, &*state)
    }
}

/// Enablement, skills and memory budget. These only change with configuration.
fn configured_eligibility(state: &AgentState, activity: &dyn Activity) -> Result<(), Ineligible> {
    let name = activity.name();
    if !state.constraints.is_enabled(name) {
        return Err(Ineligible::Disabled(name.to_string()));
    }

    let requirement = state.activity_requirements.get(name);
    let mut skills = Skill::required_for(name);
    if let Some(requirement) = requirement {
        skills.extend(requirement.required_skills.iter().copied());
    }
    if let Some(missing) = skills.iter().find(|skill| !state.available_skills.contains(skill)) {
        return Err(Ineligible::MissingSkill {
            activity: name.to_string(),
            skill: missing.to_string(),
        });
    }

    let min_memory = requirement
        .map_or(0, |r| r.min_memory)
        .max(activity.min_memory());
    if min_memory > state.available_memory_space {
        return Err(Ineligible::InsufficientMemory {
            activity: name.to_string(),
            required: min_memory,
            available: state.available_memory_space,
        });
    }

    Ok(())
}

fn remaining_cooldown(
    cooldowns: &HashMap<String, DateTime<Utc>>,
    activity: &dyn Activity,
    now: DateTime<Utc>,
) -> Option<Duration> {
    let last_run = cooldowns.get(activity.name())?;
    let elapsed = (now - *last_run).to_std().unwrap_or(Duration::ZERO);
    activity.cooldown().checked_sub(elapsed).filter(|d| !d.is_zero())
}

/// Success adopts the activity's mood. Failure picks a tag by how unstable
/// the agent is. Low energy overrides both.
fn updated_mood(state: &AgentState, success_mood: &str, success: bool) -> String {
    let mood = if success {
        success_mood
    } else {
        let stability = state.trait_value(EMOTIONAL_STABILITY).unwrap_or(0.5).clamp(0.0, 1.0);
        let severity = 1.0 - stability;
        if severity >= 0.6 {
            "frustrated"
        } else if severity >= 0.3 {
            "disappointed"
        } else {
            "unfazed"
        }
    };

    if state.energy < state.constraints.low_energy_threshold {
        if state.energy <= 0.05 {
            return "exhausted".to_string();
        }
        return "tired".to_string();
    }
    mood.to_string()
}

fn with_metadata_field(mut result: ActivityResult, key: &str, value: Value) -> ActivityResult {
    match result.metadata.as_mut().and_then(Value::as_object_mut) {
        Some(object) => {
            object.insert(key.to_string(), value);
        }
        None => {
            let mut object = serde_json::Map::new();
            if let Some(previous) = result.metadata.take() {
                object.insert("previous".to_string(), previous);
            }
            object.insert(key.to_string(), value);
            result.metadata = Some(Value::Object(object));
        }
    }
    result
}
