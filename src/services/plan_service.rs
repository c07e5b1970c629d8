use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::stores::{AuditEntry, AuditSink, PlatformAdmin, StoreError};
use crate::subscription::{BillingInterval, Plan};

#[derive(Debug, thiserror::Error)]
pub enum PlanServiceError {
    #[error("Plan not found")]
    NotFound,

    #[error("Plan is referenced by subscriptions; {0} is read-only")]
    CoreFieldLocked(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<PlanServiceError> for ApiError {
    fn from(err: PlanServiceError) -> Self {
        match err {
            PlanServiceError::NotFound => ApiError::not_found("Plan not found"),
            PlanServiceError::CoreFieldLocked(field) => ApiError::conflict(format!(
                "Plan is referenced by subscriptions; '{}' can no longer be changed",
                field
            )),
            PlanServiceError::Store(e) => e.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PlanInput {
    pub name: String,
    pub slug: String,
    pub price: Decimal,
    pub billing_interval: BillingInterval,
    pub max_users: i64,
    pub max_customers: i64,
    pub max_leads_per_month: i64,
    pub storage_limit_gb: i64,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Plan management. Once any subscription references a plan its core fields
/// (limits, price, billing interval, slug) are frozen, so already-billed
/// tenants keep the terms they signed up under; name, feature list and the
/// active flag stay editable.
pub struct PlanService {
    admin: Arc<dyn PlatformAdmin>,
    audit: Arc<dyn AuditSink>,
}

impl PlanService {
    pub fn new(admin: Arc<dyn PlatformAdmin>, audit: Arc<dyn AuditSink>) -> Self {
        Self { admin, audit }
    }

    pub async fn create(&self, input: PlanInput) -> Result<Plan, PlanServiceError> {
        let plan = Plan {
            id: Uuid::new_v4(),
            name: input.name,
            slug: input.slug,
            price: input.price,
            billing_interval: input.billing_interval,
            max_users: input.max_users,
            max_customers: input.max_customers,
            max_leads_per_month: input.max_leads_per_month,
            storage_limit_gb: input.storage_limit_gb,
            features: input.features,
            is_active: input.is_active,
        };
        self.admin.insert_plan(&plan).await?;

        self.audit
            .record(
                AuditEntry::new("plan.created", format!("Created plan '{}'", plan.name))
                    .metadata(serde_json::json!({ "plan_id": plan.id, "slug": plan.slug })),
            )
            .await;
        Ok(plan)
    }

    pub async fn list(&self) -> Result<Vec<Plan>, PlanServiceError> {
        Ok(self.admin.list_plans().await?)
    }

    pub async fn update(&self, id: Uuid, input: PlanInput) -> Result<Plan, PlanServiceError> {
        let existing = self
            .admin
            .list_plans()
            .await?
            .into_iter()
            .find(|p| p.id == id)
            .ok_or(PlanServiceError::NotFound)?;

        if self.admin.plan_in_use(id).await? {
            if input.slug != existing.slug {
                return Err(PlanServiceError::CoreFieldLocked("slug"));
            }
            if input.price != existing.price {
                return Err(PlanServiceError::CoreFieldLocked("price"));
            }
            if input.billing_interval != existing.billing_interval {
                return Err(PlanServiceError::CoreFieldLocked("billing_interval"));
            }
            if input.max_users != existing.max_users
                || input.max_customers != existing.max_customers
                || input.max_leads_per_month != existing.max_leads_per_month
                || input.storage_limit_gb != existing.storage_limit_gb
            {
                return Err(PlanServiceError::CoreFieldLocked("limits"));
            }
        }

        let updated = Plan {
            id,
            name: input.name,
            slug: input.slug,
            price: input.price,
            billing_interval: input.billing_interval,
            max_users: input.max_users,
            max_customers: input.max_customers,
            max_leads_per_month: input.max_leads_per_month,
            storage_limit_gb: input.storage_limit_gb,
            features: input.features,
            is_active: input.is_active,
        };
        self.admin.update_plan(&updated).await?;

        self.audit
            .record(
                AuditEntry::new("plan.updated", format!("Updated plan '{}'", updated.name))
                    .metadata(serde_json::json!({ "plan_id": id })),
            )
            .await;
        Ok(updated)
    }
}
