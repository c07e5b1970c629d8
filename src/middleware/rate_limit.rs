// Fixed-window rate limiting. The window key is the authenticated principal
// when the cookie resolves to a stored session, then the session id for
// anonymous-but-real sessions, then the client IP. A cookie that does not
// load from the store never contributes a key, so invented cookie values
// cannot mint fresh windows. Runs outside the pipeline so over-limit
// requests never reach tenant resolution or the data store.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;
use crate::guards::GuardKind;
use crate::session::{session_id_from_headers, SessionStore};
use crate::state::AppState;

const GUARDS: [GuardKind; 3] = [GuardKind::Central, GuardKind::Staff, GuardKind::Customer];

pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let settings = &state.pipeline.rate_limit;
    if !settings.enabled {
        return next.run(request).await;
    }

    let key = client_key(
        &state.sessions,
        &state.pipeline.session.cookie_name,
        request.headers(),
    )
    .await;
    let (count, reset_secs) = state
        .cache
        .increment(&format!("ratelimit:{}", key), settings.window_secs)
        .await;

    if count > settings.max_requests as u64 {
        tracing::warn!("Rate limit exceeded for '{}' ({} requests)", key, count);
        return ApiError::too_many_requests(
            "Too many requests, slow down",
            settings.max_requests,
            reset_secs,
        )
        .into_response();
    }

    let remaining = settings.max_requests as u64 - count;
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&settings.max_requests.to_string()) {
        headers.insert("X-RateLimit-Limit", v);
    }
    if let Ok(v) = HeaderValue::from_str(&remaining.to_string()) {
        headers.insert("X-RateLimit-Remaining", v);
    }
    response
}

async fn client_key(
    sessions: &Arc<dyn SessionStore>,
    cookie_name: &str,
    headers: &HeaderMap,
) -> String {
    if let Some(id) = session_id_from_headers(headers, cookie_name) {
        if let Some(data) = sessions.load(&id).await {
            for guard in GUARDS {
                if let Some(principal) = data.get(guard.session_key()).and_then(|v| v.as_str()) {
                    return format!("principal:{}", principal);
                }
            }
            return format!("session:{}", id);
        }
    }
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("unknown");
    format!("ip:{}", ip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MemorySessionStore, SessionData};
    use axum::http::header;
    use serde_json::json;

    fn headers_with(cookie: Option<&str>, forwarded: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = cookie {
            headers.insert(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
        }
        if let Some(ip) = forwarded {
            headers.insert("x-forwarded-for", HeaderValue::from_str(ip).unwrap());
        }
        headers
    }

    #[tokio::test]
    async fn authenticated_session_keys_on_the_principal() {
        let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
        let mut data = SessionData::default();
        data.put("auth:staff", json!("7c9e6679-7425-40de-944b-e07fc1f90ae7"));
        sessions.save("abc", data).await;

        let headers = headers_with(Some("sid=abc"), Some("10.0.0.1"));
        assert_eq!(
            client_key(&sessions, "sid", &headers).await,
            "principal:7c9e6679-7425-40de-944b-e07fc1f90ae7"
        );
    }

    #[tokio::test]
    async fn anonymous_stored_session_keys_on_its_id() {
        let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
        sessions.save("abc", SessionData::default()).await;

        let headers = headers_with(Some("sid=abc"), Some("10.0.0.1"));
        assert_eq!(client_key(&sessions, "sid", &headers).await, "session:abc");
    }

    #[tokio::test]
    async fn unknown_cookie_falls_back_to_the_ip() {
        let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());

        let headers = headers_with(Some("sid=forged"), Some("10.0.0.1, 172.16.0.1"));
        assert_eq!(client_key(&sessions, "sid", &headers).await, "ip:10.0.0.1");

        let headers = headers_with(None, None);
        assert_eq!(client_key(&sessions, "sid", &headers).await, "ip:unknown");
    }
}
