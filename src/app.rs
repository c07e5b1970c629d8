use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers::{auth, central, customer, portal, status};
use crate::middleware;
use crate::state::AppState;

/// Assemble the full router. Every route below runs behind the pipeline
/// layer; the rate limiter sits outside it so over-limit requests are
/// rejected before tenant resolution touches the store.
pub fn app(state: AppState) -> Router {
    Router::new()
        // Public
        .route("/", get(status::root))
        .route("/health", get(status::health))
        // Auth, shared across guards
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/customer/login", get(auth::login_page).post(auth::login))
        .route("/customer/logout", post(auth::logout))
        // Staff and central portal
        .route("/dashboard", get(portal::dashboard))
        .route("/users", post(portal::create_user))
        .route("/customers", post(portal::create_customer))
        .route("/alerts", get(portal::alerts))
        // Customer portal
        .route("/customer/dashboard", get(customer::dashboard))
        .route("/customer/profile", get(customer::profile))
        // Subscription status pages the gate redirects to
        .route("/subscription/required", get(status::subscription_status))
        .route("/subscription/suspended", get(status::subscription_status))
        .route("/subscription/cancelled", get(status::subscription_status))
        .route("/subscription/plans", get(status::subscription_status))
        // Central admin
        .merge(admin_routes())
        // Ordering matters: axum applies layers bottom-up, so requests pass
        // through the rate limiter first, then the pipeline, then the route
        .layer(from_fn_with_state(state.clone(), middleware::pipeline))
        .layer(from_fn_with_state(state.clone(), middleware::rate_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/admin/tenants",
            get(central::list_tenants).post(central::provision_tenant),
        )
        .route("/admin/tenants/:id", delete(central::delete_tenant))
        .route(
            "/admin/plans",
            get(central::list_plans).post(central::create_plan),
        )
        .route("/admin/plans/:id", put(central::update_plan))
        .route(
            "/admin/subscriptions/:tenant_id/suspend",
            post(central::suspend_subscription),
        )
        .route(
            "/admin/subscriptions/:tenant_id/resume",
            post(central::resume_subscription),
        )
        .route(
            "/admin/subscriptions/:tenant_id/cancel",
            post(central::cancel_subscription),
        )
}
