//! Option storage for pipes and the pipeline.
//!
//! Each pipe owns a store of named options with metadata (description,
//! category) and an optional verifier consulted on every write. The engine
//! treats the store as opaque: it registers executor defaults at pipe
//! creation and passes the store through to executors; interpretation is
//! entirely up to user code and external tooling.

use crate::error::ProtocolError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// An option's value.
#[derive(Clone, Debug, PartialEq)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl OptionValue {
    /// Returns the boolean value, if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the integer value, if this is an `Int`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the float value, if this is a `Float`.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the text value, if this is a `Text`.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for OptionValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Write-time validation callback. Returning false rejects the write.
pub type OptionVerifier = Arc<dyn Fn(&OptionValue) -> bool + Send + Sync>;

struct OptionEntry {
    value: OptionValue,
    default: OptionValue,
    description: String,
    category: String,
    verifier: Option<OptionVerifier>,
}

/// Metadata snapshot of a registered option.
#[derive(Clone, Debug)]
pub struct OptionInfo {
    pub key: String,
    pub value: OptionValue,
    pub default: OptionValue,
    pub description: String,
    pub category: String,
}

/// Registry of named options with metadata and write verification.
///
/// Reads and writes go through an internal `RwLock`; no lock is exposed to
/// callers and none is held across user callbacks other than the verifier.
pub struct OptionStore {
    entries: RwLock<HashMap<String, OptionEntry>>,
}

impl OptionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Registers an option with its default value and metadata.
    ///
    /// Re-registering an existing key resets it to the new default.
    pub fn register(
        &self,
        key: impl Into<String>,
        default: impl Into<OptionValue>,
        description: impl Into<String>,
        category: impl Into<String>,
    ) {
        self.register_entry(key.into(), default.into(), description, category, None);
    }

    /// Registers an option with a verifier consulted on every write.
    pub fn register_verified(
        &self,
        key: impl Into<String>,
        default: impl Into<OptionValue>,
        description: impl Into<String>,
        category: impl Into<String>,
        verifier: OptionVerifier,
    ) {
        self.register_entry(
            key.into(),
            default.into(),
            description,
            category,
            Some(verifier),
        );
    }

    fn register_entry(
        &self,
        key: String,
        default: OptionValue,
        description: impl Into<String>,
        category: impl Into<String>,
        verifier: Option<OptionVerifier>,
    ) {
        let entry = OptionEntry {
            value: default.clone(),
            default,
            description: description.into(),
            category: category.into(),
            verifier,
        };
        self.entries.write().insert(key, entry);
    }

    /// Writes an option value.
    ///
    /// Fails for unknown keys and for values the option's verifier refuses.
    pub fn set(
        &self,
        key: &str,
        value: impl Into<OptionValue>,
    ) -> Result<(), ProtocolError> {
        let value = value.into();
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(key)
            .ok_or_else(|| ProtocolError::OptionRejected {
                key: key.to_string(),
                reason: "not registered".to_string(),
            })?;
        if let Some(verifier) = &entry.verifier {
            if !verifier(&value) {
                return Err(ProtocolError::OptionRejected {
                    key: key.to_string(),
                    reason: "verifier refused the value".to_string(),
                });
            }
        }
        entry.value = value;
        Ok(())
    }

    /// Reads an option value.
    pub fn get(&self, key: &str) -> Option<OptionValue> {
        self.entries.read().get(key).map(|e| e.value.clone())
    }

    /// Returns the metadata snapshot of one option.
    pub fn info(&self, key: &str) -> Option<OptionInfo> {
        self.entries.read().get(key).map(|e| OptionInfo {
            key: key.to_string(),
            value: e.value.clone(),
            default: e.default.clone(),
            description: e.description.clone(),
            category: e.category.clone(),
        })
    }

    /// Returns the keys of all options in `category`, sorted.
    pub fn keys_in_category(&self, category: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .iter()
            .filter(|(_, e)| e.category == category)
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Resets every option to its registered default.
    pub fn reset_to_defaults(&self) {
        let mut entries = self.entries.write();
        for entry in entries.values_mut() {
            entry.value = entry.default.clone();
        }
    }

    /// Number of registered options.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if no options are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for OptionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OptionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptionStore")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_get() {
        let store = OptionStore::new();
        store.register("threshold", 0.5f64, "Detection threshold", "detect");

        assert_eq!(store.get("threshold"), Some(OptionValue::Float(0.5)));
        assert!(store.get("missing").is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_set_known_key() {
        let store = OptionStore::new();
        store.register("enabled", true, "Enable stage", "general");

        store.set("enabled", false).unwrap();
        assert_eq!(store.get("enabled"), Some(OptionValue::Bool(false)));
    }

    #[test]
    fn test_set_unknown_key_rejected() {
        let store = OptionStore::new();
        let err = store.set("missing", 1i64).unwrap_err();
        assert!(matches!(err, ProtocolError::OptionRejected { .. }));
    }

    #[test]
    fn test_verifier_refusal() {
        let store = OptionStore::new();
        store.register_verified(
            "workers",
            4i64,
            "Worker count",
            "general",
            Arc::new(|v| v.as_int().is_some_and(|n| n > 0)),
        );

        assert!(store.set("workers", 8i64).is_ok());
        let err = store.set("workers", 0i64).unwrap_err();
        assert!(matches!(err, ProtocolError::OptionRejected { .. }));
        assert_eq!(store.get("workers"), Some(OptionValue::Int(8)));
    }

    #[test]
    fn test_reset_to_defaults() {
        let store = OptionStore::new();
        store.register("threshold", 0.5f64, "Detection threshold", "detect");
        store.set("threshold", 0.9f64).unwrap();

        store.reset_to_defaults();
        assert_eq!(store.get("threshold"), Some(OptionValue::Float(0.5)));
    }

    #[test]
    fn test_info_and_categories() {
        let store = OptionStore::new();
        store.register("threshold", 0.5f64, "Detection threshold", "detect");
        store.register("window", 16i64, "Window size", "detect");
        store.register("enabled", true, "Enable stage", "general");

        let info = store.info("threshold").unwrap();
        assert_eq!(info.description, "Detection threshold");
        assert_eq!(info.category, "detect");

        assert_eq!(store.keys_in_category("detect"), vec!["threshold", "window"]);
    }
}
