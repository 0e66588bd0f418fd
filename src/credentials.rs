//! Per-activity API keys with skill aliases and a shared scope.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

use crate::persistence::{Persister, CREDENTIALS_KEY, CREDENTIAL_STATUS_KEY};
use crate::skills::{Skill, SkillConfig};

/// Scope consulted after an activity's own entries and skill aliases
pub const SHARED_SCOPE: &str = "shared";

type Secrets = BTreeMap<String, BTreeMap<String, String>>;

/// Secrets keyed by (activity, credential name). Values are never exposed by
/// [`CredentialStore::statuses`].
pub struct CredentialStore {
    secrets: RwLock<Secrets>,
    persister: Option<Arc<Persister>>,
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("statuses", &self.statuses())
            .finish()
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore {
    /// Store that lives only for this process
    pub fn new() -> Self {
        Self {
            secrets: RwLock::new(BTreeMap::new()),
            persister: None,
        }
    }

    /// Store backed by `persister`, seeded from whatever was saved before
    pub fn persistent(persister: Arc<Persister>) -> Self {
        let secrets: Secrets = persister.load(CREDENTIALS_KEY).unwrap_or_default();
        Self {
            secrets: RwLock::new(secrets),
            persister: Some(persister),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Secrets> {
        self.secrets.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Secrets> {
        self.secrets.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, activity: &str, key: &str) -> Option<String> {
        self.read()
            .get(activity)
            .and_then(|entries| entries.get(key))
            .filter(|value| !value.is_empty())
            .cloned()
    }

    /// Always succeeds; the value's shape is not validated
    pub fn set(&self, activity: &str, key: &str, value: &str) -> bool {
        let mut secrets = self.write();
        secrets
            .entry(activity.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        self.persist(&secrets);
        true
    }

    pub fn remove(&self, activity: &str, key: &str) -> bool {
        let mut secrets = self.write();
        let removed = secrets
            .get_mut(activity)
            .map(|entries| entries.remove(key).is_some())
            .unwrap_or(false);
        secrets.retain(|_, entries| !entries.is_empty());
        if removed {
            self.persist(&secrets);
        }
        removed
    }

    /// activity -> credential -> present
    pub fn statuses(&self) -> BTreeMap<String, BTreeMap<String, bool>> {
        presence(&self.read())
    }

    /// Resolve `required` for `activity`: own entry, then a skill alias, then
    /// the shared scope. Unresolved names are simply absent.
    pub fn resolve(
        &self,
        activity: &str,
        required: &[&str],
        skills_config: &BTreeMap<Skill, SkillConfig>,
    ) -> ResolvedCredentials {
        let mut values = HashMap::new();

        for &key in required {
            let aliased = || {
                Skill::required_for(activity)
                    .into_iter()
                    .filter_map(|skill| skills_config.get(&skill))
                    .filter_map(|config| config.credentials.get(key))
                    .find_map(|source| self.get(source, key))
            };

            let value = self
                .get(activity, key)
                .or_else(aliased)
                .or_else(|| self.get(SHARED_SCOPE, key));

            if let Some(value) = value {
                values.insert(key.to_string(), value);
            }
        }

        ResolvedCredentials { values }
    }

    fn persist(&self, secrets: &Secrets) {
        let Some(persister) = &self.persister else {
            return;
        };
        // Setters return bool, so a propagated error can only be logged.
        if let Err(e) = persister.save(CREDENTIALS_KEY, secrets) {
            warn!("Credentials kept in memory only: {}", e);
        }
        if let Err(e) = persister.save(CREDENTIAL_STATUS_KEY, &presence(secrets)) {
            warn!("Credential status kept in memory only: {}", e);
        }
    }
}

fn presence(secrets: &Secrets) -> BTreeMap<String, BTreeMap<String, bool>> {
    secrets
        .iter()
        .map(|(activity, entries)| {
            let flags = entries
                .iter()
                .map(|(key, value)| (key.clone(), !value.is_empty()))
                .collect();
            (activity.clone(), flags)
        })
        .collect()
}

/// Credentials resolved for one execution
#[derive(Clone, Default)]
pub struct ResolvedCredentials {
    values: HashMap<String, String>,
}

impl ResolvedCredentials {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }
}

impl fmt::Debug for ResolvedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("ResolvedCredentials").field("keys", &keys).finish()
    }
}
