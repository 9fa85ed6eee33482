//! Shared Run Context
//!
//! Scratch space shared by every step of one run. Handlers in the same
//! round may touch it concurrently, so every access goes through a
//! mutex that is never held across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{Map, Value};

/// Shared, synchronized key/value context for one workflow run.
///
/// Cloning is cheap and yields a handle onto the same map.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    inner: Arc<Mutex<Map<String, Value>>>,
}

impl RunContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context owning a copy of `initial`.
    pub fn from_map(initial: Map<String, Value>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(initial)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Map<String, Value>> {
        // A handler that panicked mid-write leaves the map usable
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns a clone of the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    /// Stores `value` under `key`, returning the previous value.
    pub fn insert(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.lock().insert(key.into(), value)
    }

    /// Stores `value` under `"<step>.<key>"`.
    ///
    /// Steps that write only scoped keys never collide with each other.
    pub fn insert_scoped(&self, step: &str, key: &str, value: Value) -> Option<Value> {
        self.insert(scoped_key(step, key), value)
    }

    /// Reads a value written with [`insert_scoped`](Self::insert_scoped).
    pub fn get_scoped(&self, step: &str, key: &str) -> Option<Value> {
        self.get(&scoped_key(step, key))
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.lock().remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    /// Atomically reads and rewrites the value under `key`.
    ///
    /// The closure receives `Value::Null` when the key is absent.
    pub fn update<F>(&self, key: impl Into<String>, f: F) -> Value
    where
        F: FnOnce(&mut Value),
    {
        let mut map = self.lock();
        let slot = map.entry(key.into()).or_insert(Value::Null);
        f(slot);
        slot.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns a copy of the whole map.
    pub fn snapshot(&self) -> Map<String, Value> {
        self.lock().clone()
    }
}

impl From<Map<String, Value>> for RunContext {
    fn from(map: Map<String, Value>) -> Self {
        Self::from_map(map)
    }
}

impl From<HashMap<String, Value>> for RunContext {
    fn from(map: HashMap<String, Value>) -> Self {
        Self::from_map(map.into_iter().collect())
    }
}

fn scoped_key(step: &str, key: &str) -> String {
    format!("{}.{}", step, key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_and_get() {
        let ctx = RunContext::new();
        assert!(ctx.is_empty());

        assert!(ctx.insert("k", json!(1)).is_none());
        assert_eq!(ctx.insert("k", json!(2)), Some(json!(1)));
        assert_eq!(ctx.get("k"), Some(json!(2)));
        assert!(ctx.contains_key("k"));
        assert_eq!(ctx.len(), 1);

        assert_eq!(ctx.remove("k"), Some(json!(2)));
        assert!(ctx.get("k").is_none());
    }

    #[test]
    fn test_clones_share_state() {
        let ctx = RunContext::new();
        let other = ctx.clone();
        other.insert("shared", json!("yes"));
        assert_eq!(ctx.get("shared"), Some(json!("yes")));
    }

    #[test]
    fn test_from_map_copies_initial() {
        let mut initial = Map::new();
        initial.insert("seed".to_string(), json!(42));

        let ctx = RunContext::from_map(initial.clone());
        ctx.insert("seed", json!(0));

        assert_eq!(initial.get("seed"), Some(&json!(42)));
        assert_eq!(ctx.get("seed"), Some(json!(0)));
    }

    #[test]
    fn test_scoped_keys() {
        let ctx = RunContext::new();
        ctx.insert_scoped("fetch", "rows", json!(10));
        ctx.insert_scoped("build", "rows", json!(20));

        assert_eq!(ctx.get_scoped("fetch", "rows"), Some(json!(10)));
        assert_eq!(ctx.get("build.rows"), Some(json!(20)));
    }

    #[test]
    fn test_update_from_many_threads() {
        let ctx = RunContext::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ctx = ctx.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        ctx.update("counter", |v| {
                            *v = json!(v.as_i64().unwrap_or(0) + 1);
                        });
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(ctx.get("counter"), Some(json!(800)));
    }

    #[test]
    fn test_from_hashmap() {
        let mut map = HashMap::new();
        map.insert("a".to_string(), json!([1, 2]));
        let ctx: RunContext = map.into();
        assert_eq!(ctx.snapshot().get("a"), Some(&json!([1, 2])));
    }
}
