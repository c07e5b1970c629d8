// Shared harness for the integration tests: an in-memory AppState behind the
// real router, driven with tower::oneshot. No server process, no Postgres.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use coverdesk_api::config::SessionConfig;
use coverdesk_api::guards::GuardKind;
use coverdesk_api::middleware::{PipelineConfig, RateLimitSettings};
use coverdesk_api::stores::memory::MemoryStore;
use coverdesk_api::stores::{digest_password, Principal};
use coverdesk_api::subscription::{BillingInterval, Plan, Subscription, SubscriptionStatus};
use coverdesk_api::tenancy::Tenant;
use coverdesk_api::{app, AppState};

pub const CENTRAL_HOST: &str = "admin.coverdesk.test";
pub const COOKIE_NAME: &str = "coverdesk_session";

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub state: AppState,
}

pub fn base_config() -> PipelineConfig {
    PipelineConfig {
        central_domains: vec![CENTRAL_HOST.to_string()],
        session: SessionConfig {
            cookie_name: COOKIE_NAME.to_string(),
            idle_timeout_mins: 60,
            regenerate_interval_mins: 30,
            fingerprint_enabled: true,
        },
        public_paths: PipelineConfig::default_public_paths(),
        idle_exempt_paths: PipelineConfig::default_idle_exempt_paths(),
        subscription_exempt_paths: PipelineConfig::default_subscription_exempt_paths(),
        rate_limit: RateLimitSettings {
            enabled: false,
            max_requests: 60,
            window_secs: 60,
        },
    }
}

pub fn spawn() -> TestApp {
    spawn_with(base_config())
}

pub fn spawn_with(config: PipelineConfig) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::with_memory_store(store.clone(), config);
    TestApp {
        router: app(state.clone()),
        store,
        state,
    }
}

impl TestApp {
    pub fn seed_tenant(&self, name: &str, hostname: &str) -> Tenant {
        let now = Utc::now();
        let tenant = Tenant {
            id: Uuid::new_v4(),
            name: name.to_string(),
            database: format!("tenant_{}", &Uuid::new_v4().simple().to_string()[..16]),
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
            trashed_at: None,
        };
        self.store.seed_tenant(tenant.clone(), hostname);
        tenant
    }

    pub fn seed_plan(&self, max_users: i64, max_customers: i64) -> Plan {
        let plan = Plan {
            id: Uuid::new_v4(),
            name: "Starter".to_string(),
            slug: "starter".to_string(),
            price: Decimal::new(4900, 2),
            billing_interval: BillingInterval::Monthly,
            max_users,
            max_customers,
            max_leads_per_month: 500,
            storage_limit_gb: 5,
            features: vec!["policies".to_string()],
            is_active: true,
        };
        self.store.seed_plan(plan.clone());
        plan
    }

    pub fn seed_subscription(
        &self,
        tenant_id: Uuid,
        plan_id: Uuid,
        status: SubscriptionStatus,
    ) -> Subscription {
        let subscription = Subscription {
            id: Uuid::new_v4(),
            tenant_id,
            plan_id,
            status,
            trial_ends_at: None,
            starts_at: Utc::now() - Duration::days(30),
            ends_at: None,
            next_billing_date: None,
        };
        self.store.seed_subscription(subscription.clone());
        subscription
    }

    /// Trial subscription whose trial window ended in the past
    pub fn seed_expired_trial(&self, tenant_id: Uuid, plan_id: Uuid) -> Subscription {
        let subscription = Subscription {
            id: Uuid::new_v4(),
            tenant_id,
            plan_id,
            status: SubscriptionStatus::Trial,
            trial_ends_at: Some(Utc::now() - Duration::days(1)),
            starts_at: Utc::now() - Duration::days(15),
            ends_at: None,
            next_billing_date: None,
        };
        self.store.seed_subscription(subscription.clone());
        subscription
    }

    pub fn seed_principal(
        &self,
        guard: GuardKind,
        tenant_id: Option<Uuid>,
        username: &str,
        password: &str,
    ) -> Principal {
        let principal = Principal {
            id: Uuid::new_v4(),
            tenant_id,
            guard,
            username: username.to_string(),
            password_digest: digest_password(password),
            display_name: username.to_string(),
            is_active: true,
            group_id: None,
        };
        self.store.seed_principal(principal.clone());
        principal
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, host: &str, path: &str, cookie: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder()
            .method("GET")
            .uri(path)
            .header(header::HOST, host);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    /// GET with `Accept: application/json`, so denials come back as status
    /// codes instead of redirects
    pub async fn get_json(&self, host: &str, path: &str, cookie: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder()
            .method("GET")
            .uri(path)
            .header(header::HOST, host)
            .header(header::ACCEPT, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(
        &self,
        host: &str,
        path: &str,
        cookie: Option<&str>,
        body: Value,
    ) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header(header::HOST, host)
            .header(header::ACCEPT, "application/json")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    /// Sign in and return the session cookie pair for subsequent requests
    pub async fn login(&self, host: &str, login_path: &str, username: &str, password: &str) -> String {
        let response = self
            .post_json(
                host,
                login_path,
                None,
                serde_json::json!({ "username": username, "password": password }),
            )
            .await;
        assert_eq!(
            response.status(),
            StatusCode::OK,
            "login as '{}' on {} failed",
            username,
            host
        );
        session_cookie(&response).expect("login response missing session cookie")
    }
}

/// Extract the `name=id` session cookie pair from a Set-Cookie header
pub fn session_cookie<B>(response: &Response<B>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(COOKIE_NAME))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

/// The session id portion of a `name=id` cookie pair
pub fn cookie_session_id(cookie: &str) -> &str {
    cookie.splitn(2, '=').nth(1).unwrap_or("")
}

pub fn location<B>(response: &Response<B>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
