// Customer portal. Thin for now; the heavy lifting for this guard lives in
// the pipeline's session security stage.

use axum::Extension;
use serde_json::json;

use super::require_tenant;
use crate::middleware::{ApiResponse, ApiResult, CurrentPrincipal};
use crate::session::Session;
use crate::tenancy::TenantContext;

pub async fn dashboard(
    ctx: Option<Extension<TenantContext>>,
    Extension(session): Extension<Session>,
    Extension(CurrentPrincipal(principal)): Extension<CurrentPrincipal>,
) -> ApiResult<serde_json::Value> {
    let ctx = require_tenant(ctx)?;
    Ok(ApiResponse::success(json!({
        "guard": "customer",
        "tenant": ctx.tenant().name,
        "user": {
            "id": principal.id,
            "username": principal.username,
            "display_name": principal.display_name,
        },
        "flash": session.take_flash(),
    })))
}

/// Customer profile, the minimal self-service view
pub async fn profile(
    Extension(CurrentPrincipal(principal)): Extension<CurrentPrincipal>,
) -> ApiResponse<serde_json::Value> {
    ApiResponse::success(json!({
        "id": principal.id,
        "username": principal.username,
        "display_name": principal.display_name,
        "active": principal.is_active,
    }))
}
