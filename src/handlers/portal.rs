// Tenant staff portal. The creation routes here are the two call sites of
// the usage gate: limits are checked against the tenant's plan right before
// the insert, never as a pipeline stage.

use std::collections::HashMap;

use axum::{extract::State, Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::{require_guard, require_tenant};
use crate::error::ApiError;
use crate::guards::GuardKind;
use crate::middleware::{ApiResponse, ApiResult, CurrentPrincipal};
use crate::session::Session;
use crate::state::AppState;
use crate::stores::{digest_password, AuditEntry, Customer, Principal};
use crate::subscription::Plan;
use crate::usage::{self, ResourceType, UsageAlert};

/// Shared landing route for the central and staff guards
pub async fn dashboard(
    State(state): State<AppState>,
    Extension(guard): Extension<GuardKind>,
    Extension(session): Extension<Session>,
    Extension(CurrentPrincipal(principal)): Extension<CurrentPrincipal>,
    tenant: Option<Extension<crate::tenancy::TenantContext>>,
) -> ApiResult<serde_json::Value> {
    let tenant_block = match &tenant {
        Some(Extension(ctx)) => {
            let alerts = state.directory.open_alerts(ctx.tenant_id()).await?;
            json!({
                "id": ctx.tenant_id(),
                "name": ctx.tenant().name,
                "alerts": alerts,
            })
        }
        None => serde_json::Value::Null,
    };

    Ok(ApiResponse::success(json!({
        "guard": guard.as_str(),
        "user": {
            "id": principal.id,
            "username": principal.username,
            "display_name": principal.display_name,
        },
        "tenant": tenant_block,
        "flash": session.take_flash(),
    })))
}

/// Open usage alerts for the banner on every portal page
pub async fn alerts(
    State(state): State<AppState>,
    Extension(guard): Extension<GuardKind>,
    ctx: Option<Extension<crate::tenancy::TenantContext>>,
) -> ApiResult<Vec<UsageAlert>> {
    require_guard(guard, GuardKind::Staff)?;
    let ctx = require_tenant(ctx)?;
    let open = state.directory.open_alerts(ctx.tenant_id()).await?;
    Ok(ApiResponse::success(open))
}

/// Resolve the tenant's plan for a usage check. The subscription gate has
/// already admitted the request, so a missing subscription here is a data
/// inconsistency rather than a policy decision.
async fn current_plan(state: &AppState, tenant_id: Uuid) -> Result<Plan, ApiError> {
    let subscription = state
        .directory
        .find_subscription(tenant_id)
        .await?
        .ok_or_else(|| ApiError::internal_server_error("Tenant has no subscription"))?;
    state
        .directory
        .find_plan(subscription.plan_id)
        .await?
        .ok_or_else(|| ApiError::internal_server_error("Subscription references unknown plan"))
}

#[derive(Debug, Deserialize)]
pub struct NewUserRequest {
    pub username: String,
    pub password: String,
    pub display_name: String,
}

pub async fn create_user(
    State(state): State<AppState>,
    Extension(guard): Extension<GuardKind>,
    ctx: Option<Extension<crate::tenancy::TenantContext>>,
    Extension(CurrentPrincipal(actor)): Extension<CurrentPrincipal>,
    Json(body): Json<NewUserRequest>,
) -> ApiResult<Principal> {
    require_guard(guard, GuardKind::Staff)?;
    let ctx = require_tenant(ctx)?;
    if body.username.trim().is_empty() || body.password.is_empty() {
        let mut fields = HashMap::new();
        if body.username.trim().is_empty() {
            fields.insert("username".to_string(), "required".to_string());
        }
        if body.password.is_empty() {
            fields.insert("password".to_string(), "required".to_string());
        }
        return Err(ApiError::validation_error(
            "Username and password are required",
            Some(fields),
        ));
    }

    let plan = current_plan(&state, ctx.tenant_id()).await?;
    let current = state.usage.count(ctx.tenant_id(), ResourceType::Users).await?;
    usage::can_create(&plan, ResourceType::Users, current)?;

    let user = Principal {
        id: Uuid::new_v4(),
        tenant_id: Some(ctx.tenant_id()),
        guard: GuardKind::Staff,
        username: body.username,
        password_digest: digest_password(&body.password),
        display_name: body.display_name,
        is_active: true,
        group_id: None,
    };
    state.admin.insert_principal(&user).await?;

    state
        .audit
        .record(
            AuditEntry::new("user.created", format!("Created staff user '{}'", user.username))
                .actor(actor.username.clone())
                .metadata(json!({ "tenant_id": ctx.tenant_id(), "user_id": user.id })),
        )
        .await;

    Ok(ApiResponse::created(user))
}

#[derive(Debug, Deserialize)]
pub struct NewCustomerRequest {
    pub name: String,
    pub email: String,
}

pub async fn create_customer(
    State(state): State<AppState>,
    Extension(guard): Extension<GuardKind>,
    ctx: Option<Extension<crate::tenancy::TenantContext>>,
    Extension(CurrentPrincipal(actor)): Extension<CurrentPrincipal>,
    Json(body): Json<NewCustomerRequest>,
) -> ApiResult<Customer> {
    require_guard(guard, GuardKind::Staff)?;
    let ctx = require_tenant(ctx)?;
    if body.name.trim().is_empty() || !body.email.contains('@') {
        let mut fields = HashMap::new();
        if body.name.trim().is_empty() {
            fields.insert("name".to_string(), "required".to_string());
        }
        if !body.email.contains('@') {
            fields.insert("email".to_string(), "invalid".to_string());
        }
        return Err(ApiError::validation_error(
            "A name and a valid email are required",
            Some(fields),
        ));
    }

    let plan = current_plan(&state, ctx.tenant_id()).await?;
    let current = state
        .usage
        .count(ctx.tenant_id(), ResourceType::Customers)
        .await?;
    usage::can_create(&plan, ResourceType::Customers, current)?;

    let customer = Customer {
        id: Uuid::new_v4(),
        tenant_id: ctx.tenant_id(),
        name: body.name,
        email: body.email,
        created_at: Utc::now(),
    };
    state.admin.insert_customer(&customer).await?;

    state
        .audit
        .record(
            AuditEntry::new("customer.created", format!("Created customer '{}'", customer.name))
                .actor(actor.username.clone())
                .metadata(json!({ "tenant_id": ctx.tenant_id(), "customer_id": customer.id })),
        )
        .await;

    Ok(ApiResponse::created(customer))
}
