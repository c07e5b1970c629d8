pub mod security;
pub mod store;

pub use store::{new_session_id, MemorySessionStore, SessionData, SessionStore};

use std::sync::{Arc, Mutex};

use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::Response;
use serde_json::{json, Value};
use uuid::Uuid;

// Well-known session keys
pub const LAST_ACTIVITY: &str = "last_activity";
pub const LAST_REGENERATED: &str = "last_regenerated";
pub const FINGERPRINT: &str = "fingerprint";
pub const FLASH: &str = "flash";
pub const TWO_FACTOR_USER: &str = "2fa:user_id";
pub const TWO_FACTOR_GUARD: &str = "2fa:guard";
pub const TWO_FACTOR_REMEMBER: &str = "2fa:remember";

#[derive(Debug)]
struct SessionInner {
    id: String,
    data: SessionData,
    /// Newly minted this request, cookie must be set
    fresh: bool,
    /// Rotate the id at commit, keeping data (fixation defense)
    rotate: bool,
    /// Invalidate the old id at commit and mint a fresh empty session
    destroy: bool,
}

/// Request-scoped session handle. Cloned into request extensions so handlers
/// and the pipeline share one view; all changes are persisted in a single
/// commit after the handler runs.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<Mutex<SessionInner>>,
}

impl Session {
    pub fn fresh() -> Self {
        Self::build(new_session_id(), SessionData::default(), true)
    }

    pub fn loaded(id: String, data: SessionData) -> Self {
        Self::build(id, data, false)
    }

    fn build(id: String, data: SessionData, fresh: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionInner {
                id,
                data,
                fresh,
                rotate: false,
                destroy: false,
            })),
        }
    }

    pub fn id(&self) -> String {
        self.inner.lock().unwrap().id.clone()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.lock().unwrap().data.get(key).cloned()
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|v| v.as_str().map(str::to_string))
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_i64())
    }

    pub fn get_uuid(&self, key: &str) -> Option<Uuid> {
        self.get_str(key).and_then(|s| Uuid::parse_str(&s).ok())
    }

    pub fn put(&self, key: &str, value: Value) {
        self.inner.lock().unwrap().data.put(key, value);
    }

    pub fn put_uuid(&self, key: &str, value: Uuid) {
        self.put(key, json!(value.to_string()));
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner.lock().unwrap().data.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().unwrap().data.contains(key)
    }

    /// One-shot message shown after the next redirect
    pub fn set_flash(&self, message: &str) {
        self.put(FLASH, json!(message));
    }

    pub fn take_flash(&self) -> Option<String> {
        self.remove(FLASH).and_then(|v| v.as_str().map(str::to_string))
    }

    /// Rotate the session id at commit, keeping session data
    pub fn request_rotation(&self) {
        self.inner.lock().unwrap().rotate = true;
    }

    /// Force-invalidate: wipe all data, retire the current id, carry only the
    /// given flash message into a brand new session
    pub fn force_logout(&self, flash: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.data.clear();
        inner.data.put(FLASH, json!(flash));
        inner.destroy = true;
    }

    fn take_commit_state(&self) -> (String, SessionData, bool, bool, bool) {
        let inner = self.inner.lock().unwrap();
        (
            inner.id.clone(),
            inner.data.clone(),
            inner.fresh,
            inner.rotate,
            inner.destroy,
        )
    }
}

/// Read this session cookie's value from the request headers
pub fn session_id_from_headers(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    for pair in cookies.split(';') {
        let mut parts = pair.trim().splitn(2, '=');
        if parts.next() == Some(cookie_name) {
            return parts.next().map(str::to_string);
        }
    }
    None
}

/// Persist the session and attach the cookie when the id changed. Runs once
/// per request, after the pipeline and handler are done with the session.
pub async fn commit(
    store: &Arc<dyn SessionStore>,
    cookie_name: &str,
    session: &Session,
    mut response: Response,
) -> Response {
    let (id, data, fresh, rotate, destroy) = session.take_commit_state();

    let (final_id, set_cookie) = if destroy {
        store.invalidate(&id).await;
        let new_id = new_session_id();
        store.save(&new_id, data).await;
        (new_id, true)
    } else if rotate {
        let new_id = store.regenerate_id(&id).await;
        store.save(&new_id, data).await;
        (new_id, true)
    } else {
        store.save(&id, data).await;
        (id, fresh)
    };

    if set_cookie {
        let cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            cookie_name, final_id
        );
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }

    response
}
