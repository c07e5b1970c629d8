pub mod classifier;
pub mod context;
pub mod resolver;

pub use classifier::{classify, DomainClass};
pub use context::TenantContext;
pub use resolver::TenantResolver;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An isolated customer organization with its own data space, domain and subscription
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    /// Name of the tenant's isolated database
    pub database: String,
    /// Opaque key-value blob: company details, contact info, threshold overrides
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub trashed_at: Option<DateTime<Utc>>,
}

impl Tenant {
    /// Soft-deleted tenants are never resolvable
    pub fn is_active(&self) -> bool {
        self.trashed_at.is_none()
    }
}

/// A hostname owned by exactly one tenant. Hostnames are globally unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Domain {
    pub hostname: String,
    pub tenant_id: Uuid,
}
