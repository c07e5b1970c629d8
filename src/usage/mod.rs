// Usage gate: plan-limit enforcement for resource-creating operations.
// Runs only on create paths, never per-request, and is independent of the
// subscription gate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::subscription::{Plan, UNLIMITED};

/// Resource types whose creation is gated by plan limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Users,
    Customers,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Users => "users",
            ResourceType::Customers => "customers",
        }
    }

    /// Human-readable singular name used in limit messages
    pub fn singular(&self) -> &'static str {
        match self {
            ResourceType::Users => "user",
            ResourceType::Customers => "customer",
        }
    }
}

/// Denial carrying everything the caller needs to render an upgrade
/// call-to-action, distinct from a generic validation error
#[derive(Debug, Clone)]
pub struct UsageDenial {
    pub resource: ResourceType,
    pub plan: String,
    pub limit: i64,
}

impl UsageDenial {
    pub fn message(&self) -> String {
        format!(
            "The {} plan allows up to {} {}. Upgrade your plan to add more.",
            self.plan,
            self.limit,
            self.resource.as_str()
        )
    }
}

impl From<UsageDenial> for ApiError {
    fn from(denial: UsageDenial) -> Self {
        ApiError::usage_limit_exceeded(denial.message(), denial.plan.clone(), denial.limit)
    }
}

/// Permit creation iff the current committed count is strictly below the plan
/// limit. A limit of `-1` always permits.
pub fn can_create(plan: &Plan, resource: ResourceType, current: i64) -> Result<(), UsageDenial> {
    let limit = plan.limit_for(resource);
    if limit == UNLIMITED || current < limit {
        return Ok(());
    }
    Err(UsageDenial {
        resource,
        plan: plan.name.clone(),
        limit,
    })
}

/// Severity of a threshold crossing recorded by the usage-analytics collector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
    Exceeded,
}

/// Alert lifecycle: pending -> sent -> acknowledged -> resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    Pending,
    Sent,
    Acknowledged,
    Resolved,
}

/// Per-tenant, per-resource threshold crossing. Created by the usage
/// analytics collaborator; this crate only reads them for banner display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageAlert {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub resource: String,
    pub severity: AlertSeverity,
    pub state: AlertState,
    pub created_at: DateTime<Utc>,
}

impl UsageAlert {
    /// Resolved alerts drop out of the banner
    pub fn is_open(&self) -> bool {
        self.state != AlertState::Resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::BillingInterval;
    use rust_decimal::Decimal;

    fn plan(max_users: i64) -> Plan {
        Plan {
            id: Uuid::new_v4(),
            name: "Starter".to_string(),
            slug: "starter".to_string(),
            price: Decimal::new(4900, 2),
            billing_interval: BillingInterval::Monthly,
            max_users,
            max_customers: 100,
            max_leads_per_month: 500,
            storage_limit_gb: 5,
            features: vec![],
            is_active: true,
        }
    }

    #[test]
    fn boundary_at_limit_denies() {
        let p = plan(5);
        assert!(can_create(&p, ResourceType::Users, 4).is_ok());
        let denial = can_create(&p, ResourceType::Users, 5).unwrap_err();
        assert_eq!(denial.limit, 5);
        assert_eq!(denial.plan, "Starter");
    }

    #[test]
    fn unlimited_always_permits() {
        let p = plan(UNLIMITED);
        assert!(can_create(&p, ResourceType::Users, 0).is_ok());
        assert!(can_create(&p, ResourceType::Users, i64::MAX - 1).is_ok());
    }

    #[test]
    fn denial_message_names_plan_and_limit() {
        let p = plan(5);
        let denial = can_create(&p, ResourceType::Users, 9).unwrap_err();
        let msg = denial.message();
        assert!(msg.contains("Starter"));
        assert!(msg.contains('5'));
    }

    #[test]
    fn denial_converts_to_upgrade_flagged_error() {
        let p = plan(1);
        let err: ApiError = can_create(&p, ResourceType::Users, 1).unwrap_err().into();
        assert_eq!(err.status_code(), 422);
        assert_eq!(err.to_json()["upgrade_required"], serde_json::json!(true));
    }
}
