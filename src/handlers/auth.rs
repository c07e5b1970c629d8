// Sign-in and sign-out for all three guards. The pipeline has already
// selected the guard and bound the tenant context, so one pair of handlers
// serves /login and /customer/login on every domain.

use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiError;
use crate::guards::GuardKind;
use crate::middleware::pipeline::wants_json;
use crate::middleware::{ApiResponse, CurrentPrincipal};
use crate::session::{security, Session, FINGERPRINT, LAST_ACTIVITY, LAST_REGENERATED};
use crate::state::AppState;
use crate::stores::AuditEntry;
use crate::tenancy::TenantContext;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// GET login route: page metadata plus any pending flash (e.g. a forced
/// logout reason)
pub async fn login_page(
    Extension(guard): Extension<GuardKind>,
    Extension(session): Extension<Session>,
) -> ApiResponse<serde_json::Value> {
    ApiResponse::success(json!({
        "page": "login",
        "guard": guard.as_str(),
        "flash": session.take_flash(),
    }))
}

pub async fn login(
    State(state): State<AppState>,
    Extension(guard): Extension<GuardKind>,
    Extension(session): Extension<Session>,
    tenant: Option<Extension<TenantContext>>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let tenant_scope = match (guard.is_tenant_scoped(), &tenant) {
        (true, Some(Extension(ctx))) => Some(ctx.tenant_id()),
        (true, None) => {
            return Err(ApiError::internal_server_error("Tenant context missing"))
        }
        (false, _) => None,
    };

    let found = state
        .principals
        .find_by_username(guard, tenant_scope, &body.username)
        .await?;

    let principal = match found.filter(|p| p.is_active && p.verify_password(&body.password)) {
        Some(p) => p,
        None => {
            tracing::warn!(
                "Failed {} login attempt for '{}'",
                guard.as_str(),
                body.username
            );
            state
                .audit
                .record(
                    AuditEntry::new("auth.login_failed", "Rejected sign-in attempt")
                        .metadata(json!({ "guard": guard.as_str(), "username": body.username })),
                )
                .await;
            return Err(ApiError::unauthorized("Invalid username or password"));
        }
    };

    // Privilege change, so the session id must not survive from the
    // anonymous session (fixation defense)
    session.request_rotation();

    let now = Utc::now().timestamp();
    session.put_uuid(guard.session_key(), principal.id);
    session.put(LAST_ACTIVITY, json!(now));
    session.put(LAST_REGENERATED, json!(now));
    if guard == GuardKind::Customer && state.pipeline.session.fingerprint_enabled {
        session.put(FINGERPRINT, json!(security::fingerprint(&headers)));
    }

    state
        .audit
        .record(
            AuditEntry::new("auth.login", format!("'{}' signed in", principal.username))
                .actor(principal.username.clone())
                .metadata(json!({ "guard": guard.as_str(), "principal_id": principal.id })),
        )
        .await;

    if wants_json(&headers) {
        Ok(ApiResponse::success(json!({
            "redirect": guard.home_route(),
            "user": {
                "id": principal.id,
                "username": principal.username,
                "display_name": principal.display_name,
            },
        }))
        .into_response())
    } else {
        Ok(Redirect::to(guard.home_route()).into_response())
    }
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(guard): Extension<GuardKind>,
    Extension(session): Extension<Session>,
    principal: Option<Extension<CurrentPrincipal>>,
    headers: HeaderMap,
) -> Response {
    if let Some(Extension(CurrentPrincipal(principal))) = &principal {
        state
            .audit
            .record(
                AuditEntry::new("auth.logout", format!("'{}' signed out", principal.username))
                    .actor(principal.username.clone())
                    .metadata(json!({ "guard": guard.as_str() })),
            )
            .await;
    }

    session.force_logout("You have been signed out");

    if wants_json(&headers) {
        ApiResponse::success(json!({ "redirect": guard.login_route() })).into_response()
    } else {
        Redirect::to(guard.login_route()).into_response()
    }
}
