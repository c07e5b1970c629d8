// Service metadata, health and the subscription status pages the gate
// redirects browsers to.

use axum::{extract::State, http::Uri, Extension};
use chrono::Utc;
use serde_json::json;

use crate::config::config;
use crate::middleware::{ApiResponse, ApiResult};
use crate::session::Session;
use crate::state::AppState;

pub async fn root() -> ApiResponse<serde_json::Value> {
    ApiResponse::success(json!({
        "name": "coverdesk-api",
        "version": env!("CARGO_PKG_VERSION"),
        "environment": format!("{:?}", config().environment).to_lowercase(),
    }))
}

pub async fn health() -> ApiResponse<serde_json::Value> {
    ApiResponse::success(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// The four pages the subscription gate sends browsers to. One handler; the
/// last path segment names the page. The plans page additionally lists the
/// active plans so the tenant can pick an upgrade.
pub async fn subscription_status(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    uri: Uri,
) -> ApiResult<serde_json::Value> {
    let page = uri.path().rsplit('/').next().unwrap_or("");
    let message = match page {
        "required" => "An active subscription is required to use this application",
        "suspended" => "This account is suspended, contact support to restore access",
        "cancelled" => "This subscription has been cancelled",
        "plans" => "Choose a plan to continue",
        _ => "Subscription status",
    };

    let plans = if page == "plans" {
        let all = state.admin.list_plans().await?;
        Some(all.into_iter().filter(|p| p.is_active).collect::<Vec<_>>())
    } else {
        None
    };

    Ok(ApiResponse::success(json!({
        "page": format!("subscription/{}", page),
        "message": message,
        "flash": session.take_flash(),
        "plans": plans,
    })))
}
