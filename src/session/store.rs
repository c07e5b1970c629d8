use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

/// Serialized session payload: a flat key-value map, same shape a backing
/// store would persist
#[derive(Debug, Clone, Default)]
pub struct SessionData {
    values: HashMap<String, Value>,
}

impl SessionData {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn put(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// Mint an unguessable session identifier
pub fn new_session_id() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

/// Key-value store scoped per session id. Implementations must treat
/// regenerate_id as an atomic move: the old id stops resolving the moment the
/// new one exists.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, id: &str) -> Option<SessionData>;
    async fn save(&self, id: &str, data: SessionData);
    /// Move the session under a fresh id (fixation defense), returning it
    async fn regenerate_id(&self, old_id: &str) -> String;
    async fn invalidate(&self, id: &str);
}

/// Process-local session store. Suits single-instance deployments and tests;
/// sessions do not survive a restart.
#[derive(Default)]
pub struct MemorySessionStore {
    inner: Mutex<HashMap<String, SessionData>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, id: &str) -> Option<SessionData> {
        self.inner.lock().unwrap().get(id).cloned()
    }

    async fn save(&self, id: &str, data: SessionData) {
        self.inner.lock().unwrap().insert(id.to_string(), data);
    }

    async fn regenerate_id(&self, old_id: &str) -> String {
        let new_id = new_session_id();
        let mut inner = self.inner.lock().unwrap();
        let data = inner.remove(old_id).unwrap_or_default();
        inner.insert(new_id.clone(), data);
        new_id
    }

    async fn invalidate(&self, id: &str) {
        self.inner.lock().unwrap().remove(id);
    }
}
