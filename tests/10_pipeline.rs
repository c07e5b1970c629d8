// Domain classification, tenant resolution, guard selection and the central
// admin surface, exercised through the full router.

mod common;

use axum::http::StatusCode;
use common::*;
use coverdesk_api::guards::GuardKind;
use coverdesk_api::middleware::RateLimitSettings;
use coverdesk_api::stores::PlatformAdmin;
use coverdesk_api::subscription::SubscriptionStatus;
use serde_json::json;

#[tokio::test]
async fn unknown_host_is_not_found() {
    let app = spawn();
    let response = app.get("nobody.example.com", "/", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn trashed_tenant_host_is_not_found() {
    let app = spawn();
    let tenant = app.seed_tenant("acme", "acme.test");

    let before = app.get("acme.test", "/login", None).await;
    assert_eq!(before.status(), StatusCode::OK);

    app.store
        .soft_delete_tenant(tenant.id, chrono::Utc::now())
        .await
        .unwrap();
    let after = app.get("acme.test", "/login", None).await;
    assert_eq!(after.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn central_host_serves_root_without_resolution() {
    let app = spawn();
    let response = app.get(CENTRAL_HOST, "/", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["name"], "coverdesk-api");
}

#[tokio::test]
async fn unauthenticated_staff_request_redirects_to_staff_login() {
    let app = spawn();
    let tenant = app.seed_tenant("acme", "acme.test");
    let plan = app.seed_plan(5, 100);
    app.seed_subscription(tenant.id, plan.id, SubscriptionStatus::Active);

    let response = app.get("acme.test", "/dashboard", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");

    // The same request from a JSON client is a plain 401
    let response = app.get_json("acme.test", "/dashboard", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn customer_paths_redirect_to_the_customer_login() {
    let app = spawn();
    let tenant = app.seed_tenant("acme", "acme.test");
    let plan = app.seed_plan(5, 100);
    app.seed_subscription(tenant.id, plan.id, SubscriptionStatus::Active);

    let response = app.get("acme.test", "/customer/dashboard", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/customer/login");

    // "/customers" is a staff resource route, not the customer portal
    let response = app.get("acme.test", "/customers", None).await;
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn staff_login_reaches_the_dashboard() {
    let app = spawn();
    let tenant = app.seed_tenant("acme", "acme.test");
    let plan = app.seed_plan(5, 100);
    app.seed_subscription(tenant.id, plan.id, SubscriptionStatus::Active);
    app.seed_principal(GuardKind::Staff, Some(tenant.id), "alice", "secret");

    let cookie = app.login("acme.test", "/login", "alice", "secret").await;
    let response = app.get("acme.test", "/dashboard", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["guard"], "staff");
    assert_eq!(body["data"]["tenant"]["name"], "acme");
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let app = spawn();
    let tenant = app.seed_tenant("acme", "acme.test");
    let plan = app.seed_plan(5, 100);
    app.seed_subscription(tenant.id, plan.id, SubscriptionStatus::Active);
    app.seed_principal(GuardKind::Staff, Some(tenant.id), "alice", "secret");

    let response = app
        .post_json(
            "acme.test",
            "/login",
            None,
            json!({ "username": "alice", "password": "wrong" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn authenticated_visit_to_login_goes_home() {
    let app = spawn();
    let tenant = app.seed_tenant("acme", "acme.test");
    let plan = app.seed_plan(5, 100);
    app.seed_subscription(tenant.id, plan.id, SubscriptionStatus::Active);
    app.seed_principal(GuardKind::Staff, Some(tenant.id), "alice", "secret");

    let cookie = app.login("acme.test", "/login", "alice", "secret").await;
    let response = app.get("acme.test", "/login", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/dashboard");
}

#[tokio::test]
async fn admin_routes_refuse_tenant_domains() {
    let app = spawn();
    let tenant = app.seed_tenant("acme", "acme.test");
    let plan = app.seed_plan(5, 100);
    app.seed_subscription(tenant.id, plan.id, SubscriptionStatus::Active);
    app.seed_principal(GuardKind::Staff, Some(tenant.id), "alice", "secret");

    let cookie = app.login("acme.test", "/login", "alice", "secret").await;
    let response = app.get_json("acme.test", "/admin/tenants", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn provisioning_flow_brings_a_tenant_online() {
    let app = spawn();
    app.seed_principal(GuardKind::Central, None, "ops", "central-secret");
    let plan = app.seed_plan(5, 100);

    let cookie = app.login(CENTRAL_HOST, "/login", "ops", "central-secret").await;
    let response = app
        .post_json(
            CENTRAL_HOST,
            "/admin/tenants",
            Some(&cookie),
            json!({
                "name": "fresh",
                "hostname": "fresh.test",
                "plan_id": plan.id,
                "staff_username": "admin",
                "staff_password": "bootstrap",
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    let tenant_id = body["data"]["id"].as_str().unwrap().to_string();

    // The new hostname now resolves and its seeded staff account signs in
    let staff_cookie = app.login("fresh.test", "/login", "admin", "bootstrap").await;
    let response = app.get("fresh.test", "/dashboard", Some(&staff_cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);

    // Hostnames are globally unique
    let response = app
        .post_json(
            CENTRAL_HOST,
            "/admin/tenants",
            Some(&cookie),
            json!({
                "name": "other",
                "hostname": "fresh.test",
                "plan_id": plan.id,
                "staff_username": "admin",
                "staff_password": "bootstrap",
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Deletion requires the exact confirmation phrase
    let path = format!("/admin/tenants/{}", tenant_id);
    let request = axum::http::Request::builder()
        .method("DELETE")
        .uri(&path)
        .header(axum::http::header::HOST, CENTRAL_HOST)
        .header(axum::http::header::ACCEPT, "application/json")
        .header(axum::http::header::CONTENT_TYPE, "application/json")
        .header(axum::http::header::COOKIE, &cookie)
        .body(axum::body::Body::from(
            json!({ "confirmation": "DELETE wrong" }).to_string(),
        ))
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let request = axum::http::Request::builder()
        .method("DELETE")
        .uri(&path)
        .header(axum::http::header::HOST, CENTRAL_HOST)
        .header(axum::http::header::ACCEPT, "application/json")
        .header(axum::http::header::CONTENT_TYPE, "application/json")
        .header(axum::http::header::COOKIE, &cookie)
        .body(axum::body::Body::from(
            json!({ "confirmation": "DELETE fresh" }).to_string(),
        ))
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);

    // Soft-deleted tenants stop resolving
    let response = app.get("fresh.test", "/login", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn plan_core_fields_lock_once_referenced() {
    let app = spawn();
    app.seed_principal(GuardKind::Central, None, "ops", "central-secret");
    let cookie = app.login(CENTRAL_HOST, "/login", "ops", "central-secret").await;

    let plan_input = |max_users: i64, name: &str| {
        json!({
            "name": name,
            "slug": "pro",
            "price": "99.00",
            "billing_interval": "monthly",
            "max_users": max_users,
            "max_customers": 500,
            "max_leads_per_month": 1000,
            "storage_limit_gb": 20,
        })
    };

    let response = app
        .post_json(CENTRAL_HOST, "/admin/plans", Some(&cookie), plan_input(10, "Pro"))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    let plan_id = body["data"]["id"].as_str().unwrap().to_string();

    // Unreferenced: limits are editable
    let path = format!("/admin/plans/{}", plan_id);
    let request = axum::http::Request::builder()
        .method("PUT")
        .uri(&path)
        .header(axum::http::header::HOST, CENTRAL_HOST)
        .header(axum::http::header::ACCEPT, "application/json")
        .header(axum::http::header::CONTENT_TYPE, "application/json")
        .header(axum::http::header::COOKIE, &cookie)
        .body(axum::body::Body::from(plan_input(20, "Pro").to_string()))
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);

    // Reference the plan, then a limit change must be refused
    let tenant = app.seed_tenant("acme", "acme.test");
    app.seed_subscription(
        tenant.id,
        plan_id.parse().unwrap(),
        SubscriptionStatus::Active,
    );
    let request = axum::http::Request::builder()
        .method("PUT")
        .uri(&path)
        .header(axum::http::header::HOST, CENTRAL_HOST)
        .header(axum::http::header::ACCEPT, "application/json")
        .header(axum::http::header::CONTENT_TYPE, "application/json")
        .header(axum::http::header::COOKIE, &cookie)
        .body(axum::body::Body::from(plan_input(50, "Pro").to_string()))
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Renaming stays allowed
    let request = axum::http::Request::builder()
        .method("PUT")
        .uri(&path)
        .header(axum::http::header::HOST, CENTRAL_HOST)
        .header(axum::http::header::ACCEPT, "application/json")
        .header(axum::http::header::CONTENT_TYPE, "application/json")
        .header(axum::http::header::COOKIE, &cookie)
        .body(axum::body::Body::from(
            plan_input(20, "Pro (legacy)").to_string(),
        ))
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn rate_limit_rejects_with_advisory_headers() {
    let mut config = base_config();
    config.rate_limit = RateLimitSettings {
        enabled: true,
        max_requests: 3,
        window_secs: 60,
    };
    let app = spawn_with(config);

    for _ in 0..3 {
        let response = app.get_json(CENTRAL_HOST, "/health", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("X-RateLimit-Limit").unwrap(),
            "3"
        );
        assert!(response.headers().contains_key("X-RateLimit-Remaining"));
    }

    let response = app.get_json(CENTRAL_HOST, "/health", None).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("Retry-After"));
    assert_eq!(response.headers().get("X-RateLimit-Remaining").unwrap(), "0");
    let body = body_json(response).await;
    assert_eq!(body["code"], "TOO_MANY_REQUESTS");
}

#[tokio::test]
async fn forged_cookies_cannot_reset_the_rate_window() {
    let mut config = base_config();
    config.rate_limit = RateLimitSettings {
        enabled: true,
        max_requests: 3,
        window_secs: 60,
    };
    let app = spawn_with(config);

    // A cookie the session store has never seen must not mint a fresh
    // window; all four requests land in the same IP bucket
    for i in 0..4 {
        let request = axum::http::Request::builder()
            .method("GET")
            .uri("/health")
            .header(axum::http::header::HOST, CENTRAL_HOST)
            .header(axum::http::header::ACCEPT, "application/json")
            .header(
                axum::http::header::COOKIE,
                format!("{}=forged{}", COOKIE_NAME, i),
            )
            .header("x-forwarded-for", "203.0.113.9")
            .body(axum::body::Body::empty())
            .unwrap();
        let response = app.send(request).await;
        if i < 3 {
            assert_eq!(response.status(), StatusCode::OK, "request {}", i);
        } else {
            assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        }
    }
}
