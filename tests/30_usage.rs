// Usage gate at its two call sites: staff user creation and customer
// creation. Denials are 422 with the upgrade call-to-action, distinct from
// validation failures.

mod common;

use axum::http::StatusCode;
use common::*;
use coverdesk_api::guards::GuardKind;
use coverdesk_api::subscription::{SubscriptionStatus, UNLIMITED};
use serde_json::json;

async fn staff_app(max_users: i64, max_customers: i64) -> (TestApp, String) {
    let app = spawn();
    let tenant = app.seed_tenant("acme", "acme.test");
    let plan = app.seed_plan(max_users, max_customers);
    app.seed_subscription(tenant.id, plan.id, SubscriptionStatus::Active);
    app.seed_principal(GuardKind::Staff, Some(tenant.id), "alice", "secret");
    let cookie = app.login("acme.test", "/login", "alice", "secret").await;
    (app, cookie)
}

#[tokio::test]
async fn user_creation_stops_at_the_plan_limit() {
    // One seeded staff account plus one created here reaches the limit of 2
    let (app, cookie) = staff_app(2, UNLIMITED).await;

    let response = app
        .post_json(
            "acme.test",
            "/users",
            Some(&cookie),
            json!({ "username": "bob", "password": "pw", "display_name": "Bob" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .post_json(
            "acme.test",
            "/users",
            Some(&cookie),
            json!({ "username": "carol", "password": "pw", "display_name": "Carol" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["code"], "USAGE_LIMIT_EXCEEDED");
    assert_eq!(body["plan"], "Starter");
    assert_eq!(body["limit"], 2);
    assert_eq!(body["upgrade_required"], true);
    assert!(body["message"].as_str().unwrap().contains("Starter"));
}

#[tokio::test]
async fn customer_creation_stops_at_the_plan_limit() {
    let (app, cookie) = staff_app(UNLIMITED, 1).await;

    let response = app
        .post_json(
            "acme.test",
            "/customers",
            Some(&cookie),
            json!({ "name": "Jane Doe", "email": "jane@example.com" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .post_json(
            "acme.test",
            "/customers",
            Some(&cookie),
            json!({ "name": "John Doe", "email": "john@example.com" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["limit"], 1);
}

#[tokio::test]
async fn unlimited_plans_never_deny() {
    let (app, cookie) = staff_app(UNLIMITED, UNLIMITED).await;

    for i in 0..10 {
        let response = app
            .post_json(
                "acme.test",
                "/users",
                Some(&cookie),
                json!({
                    "username": format!("user{}", i),
                    "password": "pw",
                    "display_name": format!("User {}", i),
                }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }
}

#[tokio::test]
async fn validation_failures_are_not_usage_denials() {
    let (app, cookie) = staff_app(2, 2).await;

    let response = app
        .post_json(
            "acme.test",
            "/users",
            Some(&cookie),
            json!({ "username": "", "password": "", "display_name": "Nobody" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let response = app
        .post_json(
            "acme.test",
            "/customers",
            Some(&cookie),
            json!({ "name": "Jane", "email": "not-an-email" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["field_errors"]["email"], "invalid");
}
