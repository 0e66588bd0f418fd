//! JSON blob persistence on top of a [`KeyValueStore`], with an explicit
//! policy for what happens when a write fails.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::db::KeyValueStore;

pub const AGENT_STATE_KEY: &str = "agent_state";
pub const MEMORY_KEY: &str = "agent_memory";
pub const CREDENTIALS_KEY: &str = "credentials";
pub const CREDENTIAL_STATUS_KEY: &str = "credential_status";
pub const COOLDOWNS_KEY: &str = "cooldowns";
pub const DAILY_COUNTER_PREFIX: &str = "daily_counter:";

/// What to do when a write to the backing store fails
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PersistPolicy {
    /// Retry the write once, then log and continue
    RetryOnce,
    /// Log and continue; the in-memory copy stays authoritative
    #[default]
    Drop,
    /// Hand the error back to the caller
    Propagate,
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("failed to serialize `{key}`: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write `{key}`: {source:#}")]
    Write {
        key: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to read `{key}`: {source:#}")]
    Read {
        key: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("stored value for `{key}` is not valid JSON: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

pub struct Persister {
    store: Arc<dyn KeyValueStore>,
    policy: PersistPolicy,
}

impl std::fmt::Debug for Persister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persister")
            .field("policy", &self.policy)
            .finish()
    }
}

impl Persister {
    pub fn new(store: Arc<dyn KeyValueStore>, policy: PersistPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> PersistPolicy {
        self.policy
    }

    /// Serialize and store `value` under `key`.
    ///
    /// Returns `Err` only under [`PersistPolicy::Propagate`]; the other
    /// policies log the failure and report success.
    pub fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), PersistenceError> {
        let json = serde_json::to_string(value).map_err(|source| PersistenceError::Serialize {
            key: key.to_string(),
            source,
        })?;

        let mut outcome = self.store.set(key, &json);
        if outcome.is_err() && self.policy == PersistPolicy::RetryOnce {
            outcome = self.store.set(key, &json);
        }

        match outcome {
            Ok(()) => Ok(()),
            Err(source) => {
                let error = PersistenceError::Write {
                    key: key.to_string(),
                    source,
                };
                match self.policy {
                    PersistPolicy::Propagate => Err(error),
                    PersistPolicy::RetryOnce | PersistPolicy::Drop => {
                        warn!("{}", error);
                        Ok(())
                    }
                }
            }
        }
    }

    /// Load and deserialize `key`. Missing keys are `Ok(None)`.
    pub fn try_load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, PersistenceError> {
        let raw = self.store.get(key).map_err(|source| PersistenceError::Read {
            key: key.to_string(),
            source,
        })?;

        match raw {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| PersistenceError::Corrupt {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    /// Like [`Persister::try_load`] but read failures are logged and treated
    /// as absent, so startup always falls back to defaults.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.try_load(key) {
            Ok(value) => value,
            Err(e) => {
                warn!("{}; falling back to defaults", e);
                None
            }
        }
    }

    pub fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        match self.store.remove(key) {
            Ok(()) => Ok(()),
            Err(source) => {
                let error = PersistenceError::Write {
                    key: key.to_string(),
                    source,
                };
                if self.policy == PersistPolicy::Propagate {
                    Err(error)
                } else {
                    warn!("{}", error);
                    Ok(())
                }
            }
        }
    }
}
