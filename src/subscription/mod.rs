pub mod gate;

pub use gate::{Admission, Denial, SubscriptionGate};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::usage::ResourceType;

/// Commercial state of a tenant. The pipeline only ever reads this; changes
/// come from admin actions or billing webhooks, and time-based expiry is
/// evaluated lazily at request time, never by a background clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trial,
    Active,
    Cancelled,
    Expired,
    PastDue,
    Suspended,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Suspended => "suspended",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "trial" => Some(SubscriptionStatus::Trial),
            "active" => Some(SubscriptionStatus::Active),
            "cancelled" => Some(SubscriptionStatus::Cancelled),
            "expired" => Some(SubscriptionStatus::Expired),
            "past_due" => Some(SubscriptionStatus::PastDue),
            "suspended" => Some(SubscriptionStatus::Suspended),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingInterval {
    Monthly,
    Yearly,
}

impl BillingInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingInterval::Monthly => "monthly",
            BillingInterval::Yearly => "yearly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "monthly" => Some(BillingInterval::Monthly),
            "yearly" => Some(BillingInterval::Yearly),
            _ => None,
        }
    }
}

/// Pricing tier with named numeric limits. `-1` on any limit means unlimited.
/// Core fields (limits, price, billing interval, slug) become read-only once
/// any subscription references the plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub price: Decimal,
    pub billing_interval: BillingInterval,
    pub max_users: i64,
    pub max_customers: i64,
    pub max_leads_per_month: i64,
    pub storage_limit_gb: i64,
    pub features: Vec<String>,
    pub is_active: bool,
}

pub const UNLIMITED: i64 = -1;

impl Plan {
    pub fn limit_for(&self, resource: ResourceType) -> i64 {
        match resource {
            ResourceType::Users => self.max_users,
            ResourceType::Customers => self.max_customers,
        }
    }
}

/// The one-to-one commercial relationship record for a tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub plan_id: Uuid,
    pub status: SubscriptionStatus,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub next_billing_date: Option<DateTime<Utc>>,
}

impl Subscription {
    /// Subscription end date strictly in the past
    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.ends_at, Some(end) if end < now)
    }

    /// Trial end date strictly in the past
    pub fn trial_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.trial_ends_at, Some(end) if end < now)
    }
}
