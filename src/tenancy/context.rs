use std::sync::Arc;

use super::Tenant;

/// Request-scoped tenant binding, injected into request extensions by the
/// pipeline once the host resolves. Every later stage and every handler reads
/// the tenant from here; there is deliberately no process-wide "current
/// tenant" singleton, so concurrent requests for different tenants can never
/// observe each other's binding.
#[derive(Debug, Clone)]
pub struct TenantContext {
    tenant: Arc<Tenant>,
}

impl TenantContext {
    pub fn new(tenant: Tenant) -> Self {
        Self {
            tenant: Arc::new(tenant),
        }
    }

    pub fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    pub fn tenant_id(&self) -> uuid::Uuid {
        self.tenant.id
    }

    /// Name of the tenant's isolated database, used to scope all persistence
    /// for the remainder of the request
    pub fn database(&self) -> &str {
        &self.tenant.database
    }
}
