// Boundary collaborators of the pipeline, specified as traits so the request
// path never depends on a concrete backend. `memory` backs tests and the
// STORAGE=memory dev mode; `postgres` is the production implementation.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::guards::GuardKind;
use crate::subscription::{Plan, Subscription, SubscriptionStatus};
use crate::tenancy::Tenant;
use crate::usage::{ResourceType, UsageAlert};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// An authenticatable identity within one guard's identity space. Central
/// principals are global; staff and customer principals belong to a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub guard: GuardKind,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_digest: String,
    pub display_name: String,
    pub is_active: bool,
    /// Parent grouping entity (family / organization); integrity checks
    /// require it to still be active
    pub group_id: Option<Uuid>,
}

pub fn digest_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl Principal {
    pub fn verify_password(&self, password: &str) -> bool {
        self.password_digest == digest_password(password)
    }
}

/// A tenant's end customer record, created via the usage-gated staff flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Read side used by the request pipeline
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Exact-match hostname lookup, following the domain to its owning tenant
    async fn find_domain(&self, host: &str) -> Result<Option<Tenant>, StoreError>;
    async fn find_tenant(&self, id: Uuid) -> Result<Option<Tenant>, StoreError>;
    async fn find_subscription(&self, tenant_id: Uuid) -> Result<Option<Subscription>, StoreError>;
    async fn find_plan(&self, plan_id: Uuid) -> Result<Option<Plan>, StoreError>;
    async fn open_alerts(&self, tenant_id: Uuid) -> Result<Vec<UsageAlert>, StoreError>;
}

/// Per-guard principal lookup. `tenant` must be Some for tenant-scoped guards
/// and None for the central guard.
#[async_trait]
pub trait PrincipalStore: Send + Sync {
    async fn find_by_username(
        &self,
        guard: GuardKind,
        tenant: Option<Uuid>,
        username: &str,
    ) -> Result<Option<Principal>, StoreError>;

    async fn find(
        &self,
        guard: GuardKind,
        tenant: Option<Uuid>,
        id: Uuid,
    ) -> Result<Option<Principal>, StoreError>;

    async fn group_active(&self, tenant: Uuid, group: Uuid) -> Result<bool, StoreError>;
}

/// Committed resource counts at time of check. Must reflect the caller's own
/// writes within a request; no stronger consistency is required.
#[async_trait]
pub trait UsageCounter: Send + Sync {
    async fn count(&self, tenant: Uuid, resource: ResourceType) -> Result<i64, StoreError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub action: String,
    pub description: String,
    pub actor: Option<String>,
    pub metadata: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(action: &str, description: impl Into<String>) -> Self {
        Self {
            action: action.to_string(),
            description: description.into(),
            actor: None,
            metadata: serde_json::json!({}),
            recorded_at: Utc::now(),
        }
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Fire-and-forget audit sink. Implementations swallow their own failures;
/// observability must never fail the guarded request.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry);
}

/// Key-value cache with TTL semantics for rate-limit counters and
/// suspicious-activity markers
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Atomically increment the counter for `key` within a fixed window of
    /// `window_secs`, returning the new count and the seconds until the
    /// window resets. Concurrent increments to one key must not race.
    async fn increment(&self, key: &str, window_secs: u64) -> (u64, u64);
}

/// Mutation surface used by the admin services, never by the pipeline
#[async_trait]
pub trait PlatformAdmin: Send + Sync {
    async fn insert_tenant(&self, tenant: &Tenant) -> Result<(), StoreError>;
    async fn find_tenant_by_name(&self, name: &str) -> Result<Option<Tenant>, StoreError>;
    async fn list_tenants(&self) -> Result<Vec<Tenant>, StoreError>;
    async fn soft_delete_tenant(&self, id: Uuid, when: DateTime<Utc>) -> Result<(), StoreError>;

    /// Fails with Conflict when the hostname is already allocated; hostnames
    /// are globally unique across tenants
    async fn insert_domain(&self, hostname: &str, tenant_id: Uuid) -> Result<(), StoreError>;

    async fn insert_plan(&self, plan: &Plan) -> Result<(), StoreError>;
    async fn update_plan(&self, plan: &Plan) -> Result<(), StoreError>;
    async fn list_plans(&self) -> Result<Vec<Plan>, StoreError>;
    /// Whether any subscription references the plan (locks its core fields)
    async fn plan_in_use(&self, plan_id: Uuid) -> Result<bool, StoreError>;

    async fn upsert_subscription(&self, subscription: &Subscription) -> Result<(), StoreError>;
    async fn set_subscription_status(
        &self,
        tenant_id: Uuid,
        status: SubscriptionStatus,
    ) -> Result<(), StoreError>;

    async fn insert_principal(&self, principal: &Principal) -> Result<(), StoreError>;
    async fn insert_customer(&self, customer: &Customer) -> Result<(), StoreError>;
}
