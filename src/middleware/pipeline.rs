// The request pipeline. Stage order is a fixed invariant of the whole
// system, executed top to bottom in this one function:
//
//   1. Domain Classifier   - central host or tenant host
//   2. Tenant Resolver     - tenant hosts only; binds TenantContext before
//                            any session work, since principal lookup depends
//                            on which tenant's user store is active
//   3. Guard Selector      - central / staff / customer identity space
//   4. Authentication      - session-cookie principal under the guard's
//                            session namespace
//   5. Session Security    - idle timeout, fingerprint, integrity, rotation
//   6. Subscription Gate   - admit/deny over the tenant's subscription
//   7. Route handler       - runs only after every gate has admitted
//
// The usage gate is not a pipeline stage; creation handlers invoke it.
// Later stages assume earlier stages' extensions exist, so the order above
// must never be rearranged.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use serde_json::json;

use crate::error::ApiError;
use crate::guards::{select_guard, GuardKind};
use crate::session::{
    self, security, Session, FINGERPRINT, LAST_ACTIVITY, LAST_REGENERATED, TWO_FACTOR_USER,
};
use crate::state::AppState;
use crate::stores::{AuditEntry, Principal};
use crate::subscription::{Admission, SubscriptionGate};
use crate::tenancy::{classify, DomainClass, TenantResolver};

/// The authenticated principal for this request, injected for handlers
#[derive(Debug, Clone)]
pub struct CurrentPrincipal(pub Principal);

/// Single signal deciding redirect-vs-JSON for every deny path in the
/// pipeline: an explicit JSON accept or the AJAX marker
pub fn wants_json(headers: &HeaderMap) -> bool {
    let accepts_json = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("application/json"))
        .unwrap_or(false);
    let ajax = headers
        .get("x-requested-with")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == "XMLHttpRequest")
        .unwrap_or(false);
    accepts_json || ajax
}

pub async fn pipeline(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let cfg = state.pipeline.clone();

    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let path = request.uri().path().to_string();
    let json_client = wants_json(request.headers());
    let client_fingerprint = security::fingerprint(request.headers());

    // Stage 1: classify the host
    let class = classify(&host, &cfg.central_domains);

    // Stage 2: resolve tenant hosts; a miss ends the request here
    let tenant_ctx = match class {
        DomainClass::Central => None,
        DomainClass::Tenant => {
            let resolver = TenantResolver::new(state.directory.clone());
            match resolver.resolve(&host).await {
                Ok(ctx) => Some(ctx),
                Err(err) => return err.into_response(),
            }
        }
    };
    if let Some(ctx) = &tenant_ctx {
        request.extensions_mut().insert(ctx.clone());
    }

    // Stage 3: guard selection
    let guard = select_guard(class, &path);
    request.extensions_mut().insert(guard);

    // Session bootstrap (after tenant binding, before auth)
    let session = match session::session_id_from_headers(request.headers(), &cfg.session.cookie_name)
    {
        Some(id) => match state.sessions.load(&id).await {
            Some(data) => Session::loaded(id, data),
            None => Session::fresh(),
        },
        None => Session::fresh(),
    };

    // Stage 4: authentication under the selected guard's namespace
    let tenant_scope = tenant_ctx.as_ref().map(|c| c.tenant_id());
    let principal = match session.get_uuid(guard.session_key()) {
        Some(principal_id) => {
            match state.principals.find(guard, tenant_scope, principal_id).await {
                Ok(found) => found,
                Err(err) => {
                    let response = ApiError::from(err).into_response();
                    return finish(&state, &session, response).await;
                }
            }
        }
        None => None,
    };

    let is_public = cfg.public_paths.iter().any(|p| p == &path);
    if principal.is_none() && !is_public {
        tracing::debug!("Unauthenticated {} request for {}", guard.as_str(), path);
        let response = if json_client {
            ApiError::unauthorized("Authentication required").into_response()
        } else {
            session.set_flash("Please sign in to continue");
            Redirect::to(guard.login_route()).into_response()
        };
        return finish(&state, &session, response).await;
    }

    // Already signed in and visiting the login route: go home instead
    if principal.is_some() && path == guard.login_route() {
        let response = Redirect::to(guard.home_route()).into_response();
        return finish(&state, &session, response).await;
    }

    // Stage 5: session security for authenticated sessions
    if let Some(principal) = &principal {
        let now = Utc::now().timestamp();

        // Idle timeout, exempt paths still refresh the activity timestamp
        let idle_exempt = cfg.idle_exempt_paths.iter().any(|p| p == &path);
        let last_activity = session.get_i64(LAST_ACTIVITY);
        if !idle_exempt && security::idle_expired(last_activity, now, cfg.session.idle_timeout_mins)
        {
            return force_logout(
                &state,
                &session,
                guard,
                principal,
                json_client,
                "session.timeout",
                "Your session expired due to inactivity, please sign in again",
            )
            .await;
        }
        session.put(LAST_ACTIVITY, json!(now));

        // The customer guard carries the full security treatment
        if guard == GuardKind::Customer {
            if cfg.session.fingerprint_enabled {
                match session.get_str(FINGERPRINT) {
                    None => session.put(FINGERPRINT, json!(client_fingerprint)),
                    Some(stored) if stored != client_fingerprint => {
                        return force_logout(
                            &state,
                            &session,
                            guard,
                            principal,
                            json_client,
                            "session.fingerprint_mismatch",
                            "Your session was ended for security reasons, please sign in again",
                        )
                        .await;
                    }
                    Some(_) => {}
                }
            }

            // Integrity: the account and its parent group must still be active
            if !principal.is_active {
                return force_logout(
                    &state,
                    &session,
                    guard,
                    principal,
                    json_client,
                    "session.account_deactivated",
                    "This account has been deactivated",
                )
                .await;
            }
            if let (Some(tenant_id), Some(group_id)) = (tenant_scope, principal.group_id) {
                let group_ok = state
                    .principals
                    .group_active(tenant_id, group_id)
                    .await
                    .unwrap_or(false);
                if !group_ok {
                    return force_logout(
                        &state,
                        &session,
                        guard,
                        principal,
                        json_client,
                        "session.group_deactivated",
                        "Access for your group has been deactivated",
                    )
                    .await;
                }
            }

            // Periodic id rotation, suppressed mid-2FA
            let pending_2fa = session.contains(TWO_FACTOR_USER);
            if security::rotation_due(
                session.get_i64(LAST_REGENERATED),
                now,
                cfg.session.regenerate_interval_mins,
                pending_2fa,
            ) {
                session.put(LAST_REGENERATED, json!(now));
                session.request_rotation();
            }
        }
    }

    // Stage 6: subscription gate, tenant hosts only. Anonymous traffic was
    // already narrowed to the public routes above, and those must stay
    // reachable for sign-in, so the gate evaluates authenticated requests.
    if let (Some(ctx), true) = (&tenant_ctx, principal.is_some()) {
        let subscription = match state.directory.find_subscription(ctx.tenant_id()).await {
            Ok(sub) => sub,
            Err(err) => {
                let response = ApiError::from(err).into_response();
                return finish(&state, &session, response).await;
            }
        };

        let gate = SubscriptionGate::new(cfg.subscription_exempt_paths.clone());
        match gate.evaluate(&path, subscription.as_ref(), Utc::now()) {
            Admission::Admit => {}
            Admission::Deny(denial) => {
                tracing::warn!(
                    "Subscription gate denied {} for tenant '{}': {}",
                    path,
                    ctx.tenant().name,
                    denial.code
                );
                let response = if json_client {
                    ApiError::subscription_denied(denial.message, denial.code).into_response()
                } else {
                    session.set_flash(denial.message);
                    Redirect::to(denial.redirect_to).into_response()
                };
                return finish(&state, &session, response).await;
            }
        }
    }

    // Stage 7: every gate admitted, run the handler
    request.extensions_mut().insert(session.clone());
    if let Some(principal) = principal {
        request.extensions_mut().insert(CurrentPrincipal(principal));
    }

    let response = next.run(request).await;
    finish(&state, &session, response).await
}

/// Persist the session and attach cookie changes, on every exit path
async fn finish(state: &AppState, session: &Session, response: Response) -> Response {
    session::commit(
        &state.sessions,
        &state.pipeline.session.cookie_name,
        session,
        response,
    )
    .await
}

async fn force_logout(
    state: &AppState,
    session: &Session,
    guard: GuardKind,
    principal: &Principal,
    json_client: bool,
    action: &str,
    message: &'static str,
) -> Response {
    tracing::warn!(
        "Forced logout of {} '{}': {}",
        guard.as_str(),
        principal.username,
        action
    );
    state
        .audit
        .record(
            AuditEntry::new(action, format!("Forced logout of '{}'", principal.username))
                .actor(principal.username.clone())
                .metadata(json!({ "guard": guard.as_str(), "principal_id": principal.id })),
        )
        .await;

    session.force_logout(message);
    let response = if json_client {
        ApiError::session_expired(message).into_response()
    } else {
        Redirect::to(guard.login_route()).into_response()
    };
    finish(state, session, response).await
}
