// Session security layer: idle timeout, fingerprint pinning, integrity
// checks and periodic id rotation, driven through the router with a
// tampered-with session store standing in for the passage of time.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::Utc;
use common::*;
use coverdesk_api::guards::GuardKind;
use coverdesk_api::session::{LAST_ACTIVITY, LAST_REGENERATED, TWO_FACTOR_USER};
use coverdesk_api::stores::{digest_password, Principal};
use coverdesk_api::subscription::SubscriptionStatus;
use serde_json::json;
use uuid::Uuid;

async fn customer_app() -> (TestApp, String) {
    let app = spawn();
    let tenant = app.seed_tenant("acme", "acme.test");
    let plan = app.seed_plan(5, 100);
    app.seed_subscription(tenant.id, plan.id, SubscriptionStatus::Active);
    app.seed_principal(GuardKind::Customer, Some(tenant.id), "carol", "secret");
    let cookie = app.login("acme.test", "/customer/login", "carol", "secret").await;
    (app, cookie)
}

/// Rewrite one timestamp key in the stored session, simulating elapsed time
async fn backdate(app: &TestApp, cookie: &str, key: &str, secs_ago: i64) {
    let id = cookie_session_id(cookie);
    let mut data = app.state.sessions.load(id).await.expect("session missing");
    data.put(key, json!(Utc::now().timestamp() - secs_ago));
    app.state.sessions.save(id, data).await;
}

#[tokio::test]
async fn idle_session_is_forced_out_with_a_flash() {
    let app = spawn();
    let tenant = app.seed_tenant("acme", "acme.test");
    let plan = app.seed_plan(5, 100);
    app.seed_subscription(tenant.id, plan.id, SubscriptionStatus::Active);
    app.seed_principal(GuardKind::Staff, Some(tenant.id), "alice", "secret");
    let cookie = app.login("acme.test", "/login", "alice", "secret").await;

    // Under the 60 minute timeout: still in
    backdate(&app, &cookie, LAST_ACTIVITY, 30 * 60).await;
    let response = app.get("acme.test", "/dashboard", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);

    // Past it: forced logout, old session gone, flash carried into a new one
    backdate(&app, &cookie, LAST_ACTIVITY, 61 * 60).await;
    let response = app.get("acme.test", "/dashboard", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");

    let old_id = cookie_session_id(&cookie).to_string();
    assert!(app.state.sessions.load(&old_id).await.is_none());

    let new_cookie = session_cookie(&response).unwrap();
    let response = app.get("acme.test", "/login", Some(&new_cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["data"]["flash"]
        .as_str()
        .unwrap()
        .contains("inactivity"));
}

#[tokio::test]
async fn idle_session_is_401_for_json_clients() {
    let (app, cookie) = customer_app().await;
    backdate(&app, &cookie, LAST_ACTIVITY, 61 * 60).await;
    let response = app
        .get_json("acme.test", "/customer/dashboard", Some(&cookie))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["code"], "SESSION_EXPIRED");
}

#[tokio::test]
async fn idle_exempt_paths_skip_the_timeout_check() {
    let app = spawn();
    let tenant = app.seed_tenant("acme", "acme.test");
    let plan = app.seed_plan(5, 100);
    app.seed_subscription(tenant.id, plan.id, SubscriptionStatus::Active);
    app.seed_principal(GuardKind::Staff, Some(tenant.id), "alice", "secret");
    let cookie = app.login("acme.test", "/login", "alice", "secret").await;

    backdate(&app, &cookie, LAST_ACTIVITY, 61 * 60).await;

    // /password/change is idle-exempt; no route serves it, so reaching the
    // router's 404 proves the pipeline admitted the request
    let response = app.get("acme.test", "/password/change", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(app
        .state
        .sessions
        .load(cookie_session_id(&cookie))
        .await
        .is_some());
}

#[tokio::test]
async fn changed_fingerprint_forces_logout() {
    let (app, cookie) = customer_app().await;

    // Same headers as login: admitted
    let response = app.get("acme.test", "/customer/dashboard", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);

    // Different user agent: session ends
    let request = Request::builder()
        .method("GET")
        .uri("/customer/dashboard")
        .header(header::HOST, "acme.test")
        .header(header::USER_AGENT, "Mozilla/5.0 (different)")
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/customer/login");
    assert!(app
        .state
        .sessions
        .load(cookie_session_id(&cookie))
        .await
        .is_none());
}

#[tokio::test]
async fn fingerprint_is_not_checked_for_staff() {
    let app = spawn();
    let tenant = app.seed_tenant("acme", "acme.test");
    let plan = app.seed_plan(5, 100);
    app.seed_subscription(tenant.id, plan.id, SubscriptionStatus::Active);
    app.seed_principal(GuardKind::Staff, Some(tenant.id), "alice", "secret");
    let cookie = app.login("acme.test", "/login", "alice", "secret").await;

    let request = Request::builder()
        .method("GET")
        .uri("/dashboard")
        .header(header::HOST, "acme.test")
        .header(header::USER_AGENT, "Mozilla/5.0 (different)")
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn deactivated_account_is_forced_out() {
    let app = spawn();
    let tenant = app.seed_tenant("acme", "acme.test");
    let plan = app.seed_plan(5, 100);
    app.seed_subscription(tenant.id, plan.id, SubscriptionStatus::Active);
    let carol = app.seed_principal(GuardKind::Customer, Some(tenant.id), "carol", "secret");
    let cookie = app.login("acme.test", "/customer/login", "carol", "secret").await;

    app.store.set_principal_active(carol.id, false);

    let response = app
        .get_json("acme.test", "/customer/dashboard", Some(&cookie))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn deactivated_group_is_forced_out() {
    let app = spawn();
    let tenant = app.seed_tenant("acme", "acme.test");
    let plan = app.seed_plan(5, 100);
    app.seed_subscription(tenant.id, plan.id, SubscriptionStatus::Active);

    let group = Uuid::new_v4();
    app.store.seed_group(tenant.id, group, true);
    app.store.seed_principal(Principal {
        id: Uuid::new_v4(),
        tenant_id: Some(tenant.id),
        guard: GuardKind::Customer,
        username: "carol".to_string(),
        password_digest: digest_password("secret"),
        display_name: "Carol".to_string(),
        is_active: true,
        group_id: Some(group),
    });

    let cookie = app.login("acme.test", "/customer/login", "carol", "secret").await;
    let response = app.get("acme.test", "/customer/dashboard", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);

    app.store.seed_group(tenant.id, group, false);
    let response = app
        .get_json("acme.test", "/customer/dashboard", Some(&cookie))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn stale_customer_session_id_is_rotated() {
    let (app, cookie) = customer_app().await;
    backdate(&app, &cookie, LAST_REGENERATED, 31 * 60).await;

    let response = app.get("acme.test", "/customer/dashboard", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let rotated = session_cookie(&response).expect("rotation must reissue the cookie");
    assert_ne!(rotated, cookie);

    // The old id stopped resolving; the new one carries the authentication
    assert!(app
        .state
        .sessions
        .load(cookie_session_id(&cookie))
        .await
        .is_none());
    let response = app.get("acme.test", "/customer/dashboard", Some(&rotated)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn rotation_is_suppressed_during_pending_two_factor() {
    let (app, cookie) = customer_app().await;
    backdate(&app, &cookie, LAST_REGENERATED, 31 * 60).await;

    let id = cookie_session_id(&cookie);
    let mut data = app.state.sessions.load(id).await.unwrap();
    data.put(TWO_FACTOR_USER, json!(Uuid::new_v4().to_string()));
    app.state.sessions.save(id, data).await;

    let response = app.get("acme.test", "/customer/dashboard", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(session_cookie(&response).is_none(), "id must not change mid-2FA");
}

#[tokio::test]
async fn logout_destroys_the_session() {
    let (app, cookie) = customer_app().await;

    let response = app
        .post_json("acme.test", "/customer/logout", Some(&cookie), json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(app
        .state
        .sessions
        .load(cookie_session_id(&cookie))
        .await
        .is_none());

    // The retired cookie no longer authenticates
    let response = app
        .get_json("acme.test", "/customer/dashboard", Some(&cookie))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
