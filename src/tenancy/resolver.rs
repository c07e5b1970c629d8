use std::sync::Arc;

use crate::error::ApiError;
use crate::stores::TenantDirectory;

use super::TenantContext;

/// Maps a tenant-classified host to its tenant record and binds the tenant
/// context for the request. Runs before any session or auth stage, because
/// authenticated-principal lookup depends on which tenant's user store is
/// active.
pub struct TenantResolver {
    directory: Arc<dyn TenantDirectory>,
}

impl TenantResolver {
    pub fn new(directory: Arc<dyn TenantDirectory>) -> Self {
        Self { directory }
    }

    /// Exact-match domain lookup. A miss is a plain 404 with an opaque body;
    /// the response must not reveal whether the hostname is unallocated or
    /// belongs to a trashed tenant.
    pub async fn resolve(&self, host: &str) -> Result<TenantContext, ApiError> {
        let tenant = self.directory.find_domain(host).await?;

        match tenant {
            Some(tenant) if tenant.is_active() => {
                tracing::debug!("Resolved host '{}' to tenant '{}'", host, tenant.name);
                Ok(TenantContext::new(tenant))
            }
            Some(tenant) => {
                tracing::warn!(
                    "Host '{}' maps to trashed tenant '{}', returning not found",
                    host,
                    tenant.name
                );
                Err(ApiError::not_found("Not found"))
            }
            None => {
                tracing::warn!("No tenant domain registered for host '{}'", host);
                Err(ApiError::not_found("Not found"))
            }
        }
    }
}
