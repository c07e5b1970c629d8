// In-memory store implementations. Back the test suites and the
// STORAGE=memory development mode; all state lives behind one mutex per
// store, which also gives the atomic read-increment-write the cache contract
// requires.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::guards::GuardKind;
use crate::subscription::{Plan, Subscription, SubscriptionStatus};
use crate::tenancy::Tenant;
use crate::usage::{ResourceType, UsageAlert};

use super::{
    AuditEntry, AuditSink, CacheStore, Customer, PlatformAdmin, Principal, PrincipalStore,
    StoreError, TenantDirectory, UsageCounter,
};

#[derive(Default)]
struct MemoryState {
    tenants: HashMap<Uuid, Tenant>,
    domains: HashMap<String, Uuid>,
    plans: HashMap<Uuid, Plan>,
    subscriptions: HashMap<Uuid, Subscription>,
    principals: Vec<Principal>,
    customers: Vec<Customer>,
    groups: HashMap<(Uuid, Uuid), bool>,
    alerts: Vec<UsageAlert>,
}

/// One store object implements the whole read and admin surface; the state
/// lives behind a single lock so cross-collection invariants (domain
/// uniqueness, subscription-per-tenant) hold without coordination.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/dev seeding: register a tenant together with its domain
    pub fn seed_tenant(&self, tenant: Tenant, hostname: &str) {
        let mut state = self.state.lock().unwrap();
        state.domains.insert(hostname.to_string(), tenant.id);
        state.tenants.insert(tenant.id, tenant);
    }

    pub fn seed_plan(&self, plan: Plan) {
        self.state.lock().unwrap().plans.insert(plan.id, plan);
    }

    pub fn seed_subscription(&self, subscription: Subscription) {
        self.state
            .lock()
            .unwrap()
            .subscriptions
            .insert(subscription.tenant_id, subscription);
    }

    pub fn seed_principal(&self, principal: Principal) {
        self.state.lock().unwrap().principals.push(principal);
    }

    pub fn seed_group(&self, tenant: Uuid, group: Uuid, active: bool) {
        self.state.lock().unwrap().groups.insert((tenant, group), active);
    }

    pub fn seed_alert(&self, alert: UsageAlert) {
        self.state.lock().unwrap().alerts.push(alert);
    }

    pub fn set_principal_active(&self, id: Uuid, active: bool) {
        let mut state = self.state.lock().unwrap();
        if let Some(p) = state.principals.iter_mut().find(|p| p.id == id) {
            p.is_active = active;
        }
    }
}

#[async_trait]
impl TenantDirectory for MemoryStore {
    async fn find_domain(&self, host: &str) -> Result<Option<Tenant>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .domains
            .get(host)
            .and_then(|id| state.tenants.get(id))
            .cloned())
    }

    async fn find_tenant(&self, id: Uuid) -> Result<Option<Tenant>, StoreError> {
        Ok(self.state.lock().unwrap().tenants.get(&id).cloned())
    }

    async fn find_subscription(&self, tenant_id: Uuid) -> Result<Option<Subscription>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .subscriptions
            .get(&tenant_id)
            .cloned())
    }

    async fn find_plan(&self, plan_id: Uuid) -> Result<Option<Plan>, StoreError> {
        Ok(self.state.lock().unwrap().plans.get(&plan_id).cloned())
    }

    async fn open_alerts(&self, tenant_id: Uuid) -> Result<Vec<UsageAlert>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .alerts
            .iter()
            .filter(|a| a.tenant_id == tenant_id && a.is_open())
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PrincipalStore for MemoryStore {
    async fn find_by_username(
        &self,
        guard: GuardKind,
        tenant: Option<Uuid>,
        username: &str,
    ) -> Result<Option<Principal>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .principals
            .iter()
            .find(|p| p.guard == guard && p.tenant_id == tenant && p.username == username)
            .cloned())
    }

    async fn find(
        &self,
        guard: GuardKind,
        tenant: Option<Uuid>,
        id: Uuid,
    ) -> Result<Option<Principal>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .principals
            .iter()
            .find(|p| p.guard == guard && p.tenant_id == tenant && p.id == id)
            .cloned())
    }

    async fn group_active(&self, tenant: Uuid, group: Uuid) -> Result<bool, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .groups
            .get(&(tenant, group))
            .copied()
            .unwrap_or(false))
    }
}

#[async_trait]
impl UsageCounter for MemoryStore {
    async fn count(&self, tenant: Uuid, resource: ResourceType) -> Result<i64, StoreError> {
        let state = self.state.lock().unwrap();
        let count = match resource {
            ResourceType::Users => state
                .principals
                .iter()
                .filter(|p| p.guard == GuardKind::Staff && p.tenant_id == Some(tenant))
                .count(),
            ResourceType::Customers => state
                .customers
                .iter()
                .filter(|c| c.tenant_id == tenant)
                .count(),
        };
        Ok(count as i64)
    }
}

#[async_trait]
impl PlatformAdmin for MemoryStore {
    async fn insert_tenant(&self, tenant: &Tenant) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.tenants.values().any(|t| t.name == tenant.name) {
            return Err(StoreError::Conflict(format!(
                "Tenant '{}' already exists",
                tenant.name
            )));
        }
        state.tenants.insert(tenant.id, tenant.clone());
        Ok(())
    }

    async fn find_tenant_by_name(&self, name: &str) -> Result<Option<Tenant>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .tenants
            .values()
            .find(|t| t.name == name)
            .cloned())
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>, StoreError> {
        let mut tenants: Vec<Tenant> = self.state.lock().unwrap().tenants.values().cloned().collect();
        tenants.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tenants)
    }

    async fn soft_delete_tenant(&self, id: Uuid, when: DateTime<Utc>) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        match state.tenants.get_mut(&id) {
            Some(tenant) => {
                tenant.trashed_at = Some(when);
                tenant.updated_at = when;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("Tenant {}", id))),
        }
    }

    async fn insert_domain(&self, hostname: &str, tenant_id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.domains.contains_key(hostname) {
            return Err(StoreError::Conflict(format!(
                "Domain '{}' is already allocated",
                hostname
            )));
        }
        state.domains.insert(hostname.to_string(), tenant_id);
        Ok(())
    }

    async fn insert_plan(&self, plan: &Plan) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.plans.values().any(|p| p.slug == plan.slug) {
            return Err(StoreError::Conflict(format!(
                "Plan slug '{}' already exists",
                plan.slug
            )));
        }
        state.plans.insert(plan.id, plan.clone());
        Ok(())
    }

    async fn update_plan(&self, plan: &Plan) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        match state.plans.get_mut(&plan.id) {
            Some(existing) => {
                *existing = plan.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("Plan {}", plan.id))),
        }
    }

    async fn list_plans(&self) -> Result<Vec<Plan>, StoreError> {
        let mut plans: Vec<Plan> = self.state.lock().unwrap().plans.values().cloned().collect();
        plans.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(plans)
    }

    async fn plan_in_use(&self, plan_id: Uuid) -> Result<bool, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .subscriptions
            .values()
            .any(|s| s.plan_id == plan_id))
    }

    async fn upsert_subscription(&self, subscription: &Subscription) -> Result<(), StoreError> {
        // Exactly one subscription per tenant: keyed by tenant id
        self.state
            .lock()
            .unwrap()
            .subscriptions
            .insert(subscription.tenant_id, subscription.clone());
        Ok(())
    }

    async fn set_subscription_status(
        &self,
        tenant_id: Uuid,
        status: SubscriptionStatus,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        match state.subscriptions.get_mut(&tenant_id) {
            Some(sub) => {
                sub.status = status;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!(
                "Subscription for tenant {}",
                tenant_id
            ))),
        }
    }

    async fn insert_principal(&self, principal: &Principal) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let duplicate = state.principals.iter().any(|p| {
            p.guard == principal.guard
                && p.tenant_id == principal.tenant_id
                && p.username == principal.username
        });
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "Username '{}' is taken",
                principal.username
            )));
        }
        state.principals.push(principal.clone());
        Ok(())
    }

    async fn insert_customer(&self, customer: &Customer) -> Result<(), StoreError> {
        self.state.lock().unwrap().customers.push(customer.clone());
        Ok(())
    }
}

/// Collects audit entries in memory; tests inspect them, dev mode just logs
#[derive(Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, entry: AuditEntry) {
        tracing::debug!("audit: {} - {}", entry.action, entry.description);
        self.entries.lock().unwrap().push(entry);
    }
}

/// Fixed-window counters under a single lock; the lock makes each increment
/// a single atomic read-increment-write
#[derive(Default)]
pub struct MemoryCache {
    windows: Mutex<HashMap<String, (u64, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn increment(&self, key: &str, window_secs: u64) -> (u64, u64) {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap();
        let entry = windows
            .entry(key.to_string())
            .or_insert((0, now + Duration::from_secs(window_secs)));

        if now >= entry.1 {
            *entry = (0, now + Duration::from_secs(window_secs));
        }
        entry.0 += 1;

        let remaining = entry.1.saturating_duration_since(now).as_secs().max(1);
        (entry.0, remaining)
    }
}
