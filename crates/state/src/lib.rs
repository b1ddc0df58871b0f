//! Shared runtime state
//!
//! A process-wide registry of named JSON fields plus the activity clock used
//! to decide whether the runtime has gone idle. One `SharedState` is built at
//! startup and handed to whoever needs it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum StateError {
    #[error("state field '{0}' not found")]
    NotFound(String),

    #[error("state field '{name}' is declared as {expected} but got {actual}")]
    TypeMismatch {
        name: String,
        expected: FieldType,
        actual: FieldType,
    },

    #[error("state field '{name}' could not be decoded: {source}")]
    Decode {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, StateError>;

/// JSON type a field is declared to hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl FieldType {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => FieldType::Null,
            Value::Bool(_) => FieldType::Bool,
            Value::Number(_) => FieldType::Number,
            Value::String(_) => FieldType::String,
            Value::Array(_) => FieldType::Array,
            Value::Object(_) => FieldType::Object,
        }
    }

    pub fn accepts(self, value: &Value) -> bool {
        Self::of(value) == self
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FieldType::Null => "null",
            FieldType::Bool => "bool",
            FieldType::Number => "number",
            FieldType::String => "string",
            FieldType::Array => "array",
            FieldType::Object => "object",
        };
        f.write_str(name)
    }
}

/// A named value with an optional declared type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedField {
    pub name: String,
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_type: Option<FieldType>,
}

/// Typed field registry and activity tracker
pub struct SharedState {
    fields: DashMap<String, SharedField>,
    origin: Instant,
    /// Milliseconds since `origin` at the last recorded activity
    last_activity_ms: AtomicU64,
    idle_timeout: Duration,
}

impl SharedState {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            fields: DashMap::new(),
            origin: Instant::now(),
            last_activity_ms: AtomicU64::new(0),
            idle_timeout,
        }
    }

    /// Register a field, overwriting any previous registration
    pub fn register(
        &self,
        name: impl Into<String>,
        value: Value,
        declared_type: Option<FieldType>,
    ) -> Result<()> {
        let name = name.into();
        if let Some(expected) = declared_type {
            if !expected.accepts(&value) {
                return Err(StateError::TypeMismatch {
                    name,
                    expected,
                    actual: FieldType::of(&value),
                });
            }
        }

        let field = SharedField {
            name: name.clone(),
            value,
            declared_type,
        };
        if self.fields.insert(name.clone(), field).is_some() {
            warn!("State field '{}' registered twice, overwriting", name);
        }
        Ok(())
    }

    /// Update a field, registering it untyped if absent
    pub fn update(&self, name: impl Into<String>, value: Value) -> Result<()> {
        let name = name.into();
        match self.fields.entry(name) {
            Entry::Occupied(mut entry) => {
                let field = entry.get_mut();
                if let Some(expected) = field.declared_type {
                    if !expected.accepts(&value) {
                        return Err(StateError::TypeMismatch {
                            name: field.name.clone(),
                            expected,
                            actual: FieldType::of(&value),
                        });
                    }
                }
                field.value = value;
            }
            Entry::Vacant(entry) => {
                debug!("Auto-registering state field '{}'", entry.key());
                let name = entry.key().clone();
                entry.insert(SharedField {
                    name,
                    value,
                    declared_type: None,
                });
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Value> {
        self.fields
            .get(name)
            .map(|field| field.value.clone())
            .ok_or_else(|| StateError::NotFound(name.to_string()))
    }

    /// Get a field decoded into `T`
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self.get(name)?;
        serde_json::from_value(value).map_err(|source| StateError::Decode {
            name: name.to_string(),
            source,
        })
    }

    pub fn field(&self, name: &str) -> Option<SharedField> {
        self.fields.get(name).map(|field| field.clone())
    }

    pub fn has(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.fields.remove(name).map(|(_, field)| field.value)
    }

    /// Field names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.fields.iter().map(|f| f.key().clone()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Record activity now
    pub fn touch(&self) {
        let elapsed = self.origin.elapsed().as_millis() as u64;
        self.last_activity_ms.fetch_max(elapsed, Ordering::SeqCst);
    }

    pub fn last_activity(&self) -> Instant {
        self.origin + Duration::from_millis(self.last_activity_ms.load(Ordering::SeqCst))
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Time since the last recorded activity
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity())
    }

    pub fn is_idle(&self, now: Instant) -> bool {
        self.idle_for(now) > self.idle_timeout
    }
}

impl std::fmt::Debug for SharedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedState")
            .field("fields", &self.fields.len())
            .field("idle_timeout", &self.idle_timeout)
            .finish()
    }
}
