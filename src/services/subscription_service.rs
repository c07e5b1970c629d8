use std::sync::Arc;

use uuid::Uuid;

use crate::error::ApiError;
use crate::stores::{AuditEntry, AuditSink, PlatformAdmin, StoreError, TenantDirectory};
use crate::subscription::{Subscription, SubscriptionStatus};

#[derive(Debug, thiserror::Error)]
pub enum SubscriptionServiceError {
    #[error("Subscription not found")]
    NotFound,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<SubscriptionServiceError> for ApiError {
    fn from(err: SubscriptionServiceError) -> Self {
        match err {
            SubscriptionServiceError::NotFound => ApiError::not_found("Subscription not found"),
            SubscriptionServiceError::Store(e) => e.into(),
        }
    }
}

/// Explicit admin-driven subscription transitions. Time-based expiry is never
/// applied here; the gate evaluates it lazily on each request.
pub struct SubscriptionService {
    directory: Arc<dyn TenantDirectory>,
    admin: Arc<dyn PlatformAdmin>,
    audit: Arc<dyn AuditSink>,
}

impl SubscriptionService {
    pub fn new(
        directory: Arc<dyn TenantDirectory>,
        admin: Arc<dyn PlatformAdmin>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            directory,
            admin,
            audit,
        }
    }

    pub async fn suspend(&self, tenant_id: Uuid, actor: &str) -> Result<Subscription, SubscriptionServiceError> {
        self.transition(tenant_id, SubscriptionStatus::Suspended, "subscription.suspended", actor)
            .await
    }

    /// Resume returns the tenant to Active regardless of what it was
    /// suspended from; billing reconciliation is the billing collaborator's
    /// concern
    pub async fn resume(&self, tenant_id: Uuid, actor: &str) -> Result<Subscription, SubscriptionServiceError> {
        self.transition(tenant_id, SubscriptionStatus::Active, "subscription.resumed", actor)
            .await
    }

    pub async fn cancel(&self, tenant_id: Uuid, actor: &str) -> Result<Subscription, SubscriptionServiceError> {
        self.transition(tenant_id, SubscriptionStatus::Cancelled, "subscription.cancelled", actor)
            .await
    }

    async fn transition(
        &self,
        tenant_id: Uuid,
        status: SubscriptionStatus,
        action: &str,
        actor: &str,
    ) -> Result<Subscription, SubscriptionServiceError> {
        let existing = self
            .directory
            .find_subscription(tenant_id)
            .await?
            .ok_or(SubscriptionServiceError::NotFound)?;

        self.admin.set_subscription_status(tenant_id, status).await?;

        self.audit
            .record(
                AuditEntry::new(
                    action,
                    format!(
                        "Subscription for tenant {} moved from {} to {}",
                        tenant_id,
                        existing.status.as_str(),
                        status.as_str()
                    ),
                )
                .actor(actor)
                .metadata(serde_json::json!({ "tenant_id": tenant_id })),
            )
            .await;

        Ok(Subscription { status, ..existing })
    }
}
