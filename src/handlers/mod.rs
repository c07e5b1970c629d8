// Handlers, organized by identity space: shared auth endpoints, the central
// admin surface, the tenant staff portal and the customer portal. Every
// handler here runs only after the pipeline has admitted the request.

pub mod auth;
pub mod central;
pub mod customer;
pub mod portal;
pub mod status;

use axum::Extension;

use crate::error::ApiError;
use crate::guards::GuardKind;
use crate::tenancy::TenantContext;

/// Guard assertion for handlers that exist under one identity space only.
/// The pipeline selects the guard from domain and path; this catches routes
/// reached under the wrong one (e.g. /admin/* on a tenant domain).
pub fn require_guard(actual: GuardKind, expected: GuardKind) -> Result<(), ApiError> {
    if actual == expected {
        Ok(())
    } else {
        Err(ApiError::forbidden("Not available in this context"))
    }
}

/// Tenant-only handlers take the context as an Option so a central-domain
/// request gets a clean 403 instead of a missing-extension 500
pub fn require_tenant(ctx: Option<Extension<TenantContext>>) -> Result<TenantContext, ApiError> {
    ctx.map(|Extension(ctx)| ctx)
        .ok_or_else(|| ApiError::forbidden("Not available in this context"))
}
