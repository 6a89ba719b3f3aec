//! Per-generation shared context objects.
//!
//! One [`FenceObject`] is created (or recycled) for every unit of work
//! admitted into the pipeline. Every pipe processing that generation holds
//! the same shared object; it carries a type-erased key/value payload for
//! per-generation metadata and a back-reference to the pipeline's global
//! option store.

use crate::options::OptionStore;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Shared per-generation context.
///
/// Payload entries are written by the supply-time fence mutator and read by
/// executors and link adapters. Values are stored type-erased; readers
/// retrieve owned clones by type and key.
pub struct FenceObject {
    payload: Mutex<HashMap<String, Box<dyn Any + Send + Sync>>>,
    options: Arc<OptionStore>,
}

impl FenceObject {
    pub(crate) fn new(options: Arc<OptionStore>) -> Self {
        Self {
            payload: Mutex::new(HashMap::new()),
            options,
        }
    }

    /// The pipeline's global option store.
    pub fn options(&self) -> &Arc<OptionStore> {
        &self.options
    }

    /// Stores a payload value under `key`, replacing any previous value.
    pub fn set<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.payload.lock().insert(key.into(), Box::new(value));
    }

    /// Returns an owned clone of the payload value under `key`.
    ///
    /// Returns `None` if the key is absent or holds a different type.
    pub fn get<T: Any + Send + Sync + Clone>(&self, key: &str) -> Option<T> {
        let payload = self.payload.lock();
        payload.get(key)?.downcast_ref::<T>().cloned()
    }

    /// Returns true if a payload value exists under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.payload.lock().contains_key(key)
    }

    /// Clears the payload. Called by the pool when the object is recycled.
    pub(crate) fn clear(&self) {
        self.payload.lock().clear();
    }
}

impl std::fmt::Debug for FenceObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<String> = self.payload.lock().keys().cloned().collect();
        f.debug_struct("FenceObject").field("payload", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object() -> FenceObject {
        FenceObject::new(Arc::new(OptionStore::new()))
    }

    #[test]
    fn test_payload_set_get() {
        let obj = object();
        obj.set("frame", 42u64);
        obj.set("label", "keyframe".to_string());

        assert_eq!(obj.get::<u64>("frame"), Some(42));
        assert_eq!(obj.get::<String>("label"), Some("keyframe".to_string()));
        assert!(obj.contains("frame"));
    }

    #[test]
    fn test_payload_wrong_type_or_key() {
        let obj = object();
        obj.set("frame", 42u64);

        assert!(obj.get::<String>("frame").is_none());
        assert!(obj.get::<u64>("missing").is_none());
        assert!(!obj.contains("missing"));
    }

    #[test]
    fn test_payload_clear() {
        let obj = object();
        obj.set("frame", 1u64);
        obj.clear();
        assert!(!obj.contains("frame"));
    }
}
