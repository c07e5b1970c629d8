// Central admin surface: tenant lifecycle, plan management and subscription
// transitions. These routes exist only under the central guard; on tenant
// domains they answer 403.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::require_guard;
use crate::guards::GuardKind;
use crate::middleware::{ApiResponse, ApiResult, CurrentPrincipal};
use crate::services::{PlanService, SubscriptionService, TenantService};
use crate::services::plan_service::PlanInput;
use crate::services::tenant_service::ProvisionRequest;
use crate::state::AppState;
use crate::subscription::{Plan, Subscription};
use crate::tenancy::Tenant;

fn tenants(state: &AppState) -> TenantService {
    TenantService::new(state.admin.clone(), state.audit.clone())
}

fn plans(state: &AppState) -> PlanService {
    PlanService::new(state.admin.clone(), state.audit.clone())
}

fn subscriptions(state: &AppState) -> SubscriptionService {
    SubscriptionService::new(state.directory.clone(), state.admin.clone(), state.audit.clone())
}

pub async fn list_tenants(
    State(state): State<AppState>,
    Extension(guard): Extension<GuardKind>,
) -> ApiResult<Vec<Tenant>> {
    require_guard(guard, GuardKind::Central)?;
    Ok(ApiResponse::success(state.admin.list_tenants().await?))
}

pub async fn provision_tenant(
    State(state): State<AppState>,
    Extension(guard): Extension<GuardKind>,
    Json(body): Json<ProvisionRequest>,
) -> ApiResult<Tenant> {
    require_guard(guard, GuardKind::Central)?;
    let tenant = tenants(&state).provision(body).await?;
    Ok(ApiResponse::created(tenant))
}

#[derive(Debug, Deserialize)]
pub struct DeleteTenantRequest {
    /// Must be exactly `DELETE <tenant name>`
    pub confirmation: String,
}

pub async fn delete_tenant(
    State(state): State<AppState>,
    Extension(guard): Extension<GuardKind>,
    Path(tenant_id): Path<Uuid>,
    Json(body): Json<DeleteTenantRequest>,
) -> ApiResult<serde_json::Value> {
    require_guard(guard, GuardKind::Central)?;
    tenants(&state).soft_delete(tenant_id, &body.confirmation).await?;
    Ok(ApiResponse::success(serde_json::json!({ "trashed": tenant_id })))
}

pub async fn list_plans(
    State(state): State<AppState>,
    Extension(guard): Extension<GuardKind>,
) -> ApiResult<Vec<Plan>> {
    require_guard(guard, GuardKind::Central)?;
    Ok(ApiResponse::success(plans(&state).list().await?))
}

pub async fn create_plan(
    State(state): State<AppState>,
    Extension(guard): Extension<GuardKind>,
    Json(body): Json<PlanInput>,
) -> ApiResult<Plan> {
    require_guard(guard, GuardKind::Central)?;
    Ok(ApiResponse::created(plans(&state).create(body).await?))
}

pub async fn update_plan(
    State(state): State<AppState>,
    Extension(guard): Extension<GuardKind>,
    Path(plan_id): Path<Uuid>,
    Json(body): Json<PlanInput>,
) -> ApiResult<Plan> {
    require_guard(guard, GuardKind::Central)?;
    Ok(ApiResponse::success(plans(&state).update(plan_id, body).await?))
}

pub async fn suspend_subscription(
    State(state): State<AppState>,
    Extension(guard): Extension<GuardKind>,
    Extension(CurrentPrincipal(actor)): Extension<CurrentPrincipal>,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<Subscription> {
    require_guard(guard, GuardKind::Central)?;
    let sub = subscriptions(&state).suspend(tenant_id, &actor.username).await?;
    Ok(ApiResponse::success(sub))
}

pub async fn resume_subscription(
    State(state): State<AppState>,
    Extension(guard): Extension<GuardKind>,
    Extension(CurrentPrincipal(actor)): Extension<CurrentPrincipal>,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<Subscription> {
    require_guard(guard, GuardKind::Central)?;
    let sub = subscriptions(&state).resume(tenant_id, &actor.username).await?;
    Ok(ApiResponse::success(sub))
}

pub async fn cancel_subscription(
    State(state): State<AppState>,
    Extension(guard): Extension<GuardKind>,
    Extension(CurrentPrincipal(actor)): Extension<CurrentPrincipal>,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<Subscription> {
    require_guard(guard, GuardKind::Central)?;
    let sub = subscriptions(&state).cancel(tenant_id, &actor.username).await?;
    Ok(ApiResponse::success(sub))
}
