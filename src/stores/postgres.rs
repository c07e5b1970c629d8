// Postgres store implementations over the DatabaseManager pools. The system
// database holds tenants, domains, plans, subscriptions, central principals
// and the audit log; staff/customer principals, groups, customers and usage
// alerts live in each tenant's own database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::database::manager::DatabaseManager;
use crate::guards::GuardKind;
use crate::subscription::{BillingInterval, Plan, Subscription, SubscriptionStatus};
use crate::tenancy::Tenant;
use crate::usage::{AlertSeverity, AlertState, ResourceType, UsageAlert};

use super::{
    AuditEntry, AuditSink, Customer, PlatformAdmin, Principal, PrincipalStore, StoreError,
    TenantDirectory, UsageCounter,
};

pub struct PostgresStore;

impl PostgresStore {
    pub fn new() -> Self {
        Self
    }

    async fn main_pool(&self) -> Result<PgPool, StoreError> {
        DatabaseManager::main_pool()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    /// Pool for the tenant's isolated database, looked up by tenant id
    async fn tenant_pool(&self, tenant_id: Uuid) -> Result<PgPool, StoreError> {
        let pool = self.main_pool().await?;
        let row = sqlx::query("SELECT database FROM tenants WHERE id = $1")
            .bind(tenant_id)
            .fetch_optional(&pool)
            .await?;
        let database: String = row
            .ok_or_else(|| StoreError::NotFound(format!("Tenant {}", tenant_id)))?
            .get("database");
        DatabaseManager::tenant_pool(&database)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

impl Default for PostgresStore {
    fn default() -> Self {
        Self::new()
    }
}

fn tenant_from_row(row: &sqlx::postgres::PgRow) -> Tenant {
    Tenant {
        id: row.get("id"),
        name: row.get("name"),
        database: row.get("database"),
        metadata: row.get("metadata"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        trashed_at: row.get("trashed_at"),
    }
}

fn parse_status(s: &str) -> Result<SubscriptionStatus, StoreError> {
    SubscriptionStatus::parse(s)
        .ok_or_else(|| StoreError::Unavailable(format!("Unknown subscription status '{}'", s)))
}

fn parse_interval(s: &str) -> Result<BillingInterval, StoreError> {
    BillingInterval::parse(s)
        .ok_or_else(|| StoreError::Unavailable(format!("Unknown billing interval '{}'", s)))
}

fn plan_from_row(row: &sqlx::postgres::PgRow) -> Result<Plan, StoreError> {
    let interval: String = row.get("billing_interval");
    let features: serde_json::Value = row.get("features");
    Ok(Plan {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        price: row.get::<Decimal, _>("price"),
        billing_interval: parse_interval(&interval)?,
        max_users: row.get("max_users"),
        max_customers: row.get("max_customers"),
        max_leads_per_month: row.get("max_leads_per_month"),
        storage_limit_gb: row.get("storage_limit_gb"),
        features: features
            .as_array()
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default(),
        is_active: row.get("is_active"),
    })
}

fn subscription_from_row(row: &sqlx::postgres::PgRow) -> Result<Subscription, StoreError> {
    let status: String = row.get("status");
    Ok(Subscription {
        id: row.get("id"),
        tenant_id: row.get("tenant_id"),
        plan_id: row.get("plan_id"),
        status: parse_status(&status)?,
        trial_ends_at: row.get("trial_ends_at"),
        starts_at: row.get("starts_at"),
        ends_at: row.get("ends_at"),
        next_billing_date: row.get("next_billing_date"),
    })
}

fn principal_from_row(row: &sqlx::postgres::PgRow, guard: GuardKind) -> Principal {
    Principal {
        id: row.get("id"),
        tenant_id: row.get("tenant_id"),
        guard,
        username: row.get("username"),
        password_digest: row.get("password_digest"),
        display_name: row.get("display_name"),
        is_active: row.get("is_active"),
        group_id: row.get("group_id"),
    }
}

#[async_trait]
impl TenantDirectory for PostgresStore {
    async fn find_domain(&self, host: &str) -> Result<Option<Tenant>, StoreError> {
        let pool = self.main_pool().await?;
        let query = r#"
            SELECT t.id, t.name, t.database, t.metadata, t.created_at, t.updated_at, t.trashed_at
            FROM domains d
            JOIN tenants t ON t.id = d.tenant_id
            WHERE d.hostname = $1
        "#;
        let row = sqlx::query(query).bind(host).fetch_optional(&pool).await?;
        Ok(row.map(|r| tenant_from_row(&r)))
    }

    async fn find_tenant(&self, id: Uuid) -> Result<Option<Tenant>, StoreError> {
        let pool = self.main_pool().await?;
        let query = r#"
            SELECT id, name, database, metadata, created_at, updated_at, trashed_at
            FROM tenants WHERE id = $1
        "#;
        let row = sqlx::query(query).bind(id).fetch_optional(&pool).await?;
        Ok(row.map(|r| tenant_from_row(&r)))
    }

    async fn find_subscription(&self, tenant_id: Uuid) -> Result<Option<Subscription>, StoreError> {
        let pool = self.main_pool().await?;
        let query = r#"
            SELECT id, tenant_id, plan_id, status, trial_ends_at, starts_at, ends_at, next_billing_date
            FROM subscriptions WHERE tenant_id = $1
        "#;
        let row = sqlx::query(query)
            .bind(tenant_id)
            .fetch_optional(&pool)
            .await?;
        row.map(|r| subscription_from_row(&r)).transpose()
    }

    async fn find_plan(&self, plan_id: Uuid) -> Result<Option<Plan>, StoreError> {
        let pool = self.main_pool().await?;
        let query = r#"
            SELECT id, name, slug, price, billing_interval, max_users, max_customers,
                   max_leads_per_month, storage_limit_gb, features, is_active
            FROM plans WHERE id = $1
        "#;
        let row = sqlx::query(query).bind(plan_id).fetch_optional(&pool).await?;
        row.map(|r| plan_from_row(&r)).transpose()
    }

    async fn open_alerts(&self, tenant_id: Uuid) -> Result<Vec<UsageAlert>, StoreError> {
        let pool = self.tenant_pool(tenant_id).await?;
        let query = r#"
            SELECT id, resource, severity, state, created_at
            FROM usage_alerts
            WHERE state != 'resolved'
            ORDER BY created_at DESC
        "#;
        let rows = sqlx::query(query).fetch_all(&pool).await?;
        let mut alerts = Vec::with_capacity(rows.len());
        for row in rows {
            let severity: String = row.get("severity");
            let state: String = row.get("state");
            alerts.push(UsageAlert {
                id: row.get("id"),
                tenant_id,
                resource: row.get("resource"),
                severity: match severity.as_str() {
                    "critical" => AlertSeverity::Critical,
                    "exceeded" => AlertSeverity::Exceeded,
                    _ => AlertSeverity::Warning,
                },
                state: match state.as_str() {
                    "sent" => AlertState::Sent,
                    "acknowledged" => AlertState::Acknowledged,
                    _ => AlertState::Pending,
                },
                created_at: row.get("created_at"),
            });
        }
        Ok(alerts)
    }
}

#[async_trait]
impl PrincipalStore for PostgresStore {
    async fn find_by_username(
        &self,
        guard: GuardKind,
        tenant: Option<Uuid>,
        username: &str,
    ) -> Result<Option<Principal>, StoreError> {
        let pool = match tenant {
            Some(id) => self.tenant_pool(id).await?,
            None => self.main_pool().await?,
        };
        let query = r#"
            SELECT id, tenant_id, username, password_digest, display_name, is_active, group_id
            FROM principals
            WHERE guard = $1 AND username = $2
        "#;
        let row = sqlx::query(query)
            .bind(guard.as_str())
            .bind(username)
            .fetch_optional(&pool)
            .await?;
        Ok(row.map(|r| principal_from_row(&r, guard)))
    }

    async fn find(
        &self,
        guard: GuardKind,
        tenant: Option<Uuid>,
        id: Uuid,
    ) -> Result<Option<Principal>, StoreError> {
        let pool = match tenant {
            Some(tid) => self.tenant_pool(tid).await?,
            None => self.main_pool().await?,
        };
        let query = r#"
            SELECT id, tenant_id, username, password_digest, display_name, is_active, group_id
            FROM principals
            WHERE guard = $1 AND id = $2
        "#;
        let row = sqlx::query(query)
            .bind(guard.as_str())
            .bind(id)
            .fetch_optional(&pool)
            .await?;
        Ok(row.map(|r| principal_from_row(&r, guard)))
    }

    async fn group_active(&self, tenant: Uuid, group: Uuid) -> Result<bool, StoreError> {
        let pool = self.tenant_pool(tenant).await?;
        let row = sqlx::query("SELECT is_active FROM groups WHERE id = $1")
            .bind(group)
            .fetch_optional(&pool)
            .await?;
        Ok(row.map(|r| r.get("is_active")).unwrap_or(false))
    }
}

#[async_trait]
impl UsageCounter for PostgresStore {
    async fn count(&self, tenant: Uuid, resource: ResourceType) -> Result<i64, StoreError> {
        let pool = self.tenant_pool(tenant).await?;
        let query = match resource {
            ResourceType::Users => "SELECT COUNT(*) AS n FROM principals WHERE guard = 'staff'",
            ResourceType::Customers => "SELECT COUNT(*) AS n FROM customers",
        };
        let row = sqlx::query(query).fetch_one(&pool).await?;
        Ok(row.get("n"))
    }
}

/// Writes to the system audit_log table; failures are logged and swallowed so
/// observability never fails a guarded request
pub struct PostgresAuditSink;

#[async_trait]
impl AuditSink for PostgresAuditSink {
    async fn record(&self, entry: AuditEntry) {
        let pool = match DatabaseManager::main_pool().await {
            Ok(pool) => pool,
            Err(e) => {
                tracing::error!("Audit sink unavailable: {}", e);
                return;
            }
        };
        let query = r#"
            INSERT INTO audit_log (action, description, actor, metadata, recorded_at)
            VALUES ($1, $2, $3, $4, $5)
        "#;
        let result = sqlx::query(query)
            .bind(&entry.action)
            .bind(&entry.description)
            .bind(&entry.actor)
            .bind(&entry.metadata)
            .bind(entry.recorded_at)
            .execute(&pool)
            .await;
        if let Err(e) = result {
            tracing::error!("Failed to write audit entry '{}': {}", entry.action, e);
        }
    }
}

#[async_trait]
impl PlatformAdmin for PostgresStore {
    async fn insert_tenant(&self, tenant: &Tenant) -> Result<(), StoreError> {
        // Physical provisioning first: clone the tenant database template
        DatabaseManager::clone_database("tenant_template", &tenant.database)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let pool = self.main_pool().await?;
        let query = r#"
            INSERT INTO tenants (id, name, database, metadata, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
        "#;
        sqlx::query(query)
            .bind(tenant.id)
            .bind(&tenant.name)
            .bind(&tenant.database)
            .bind(&tenant.metadata)
            .bind(tenant.created_at)
            .bind(tenant.updated_at)
            .execute(&pool)
            .await?;
        Ok(())
    }

    async fn find_tenant_by_name(&self, name: &str) -> Result<Option<Tenant>, StoreError> {
        let pool = self.main_pool().await?;
        let query = r#"
            SELECT id, name, database, metadata, created_at, updated_at, trashed_at
            FROM tenants WHERE name = $1
        "#;
        let row = sqlx::query(query).bind(name).fetch_optional(&pool).await?;
        Ok(row.map(|r| tenant_from_row(&r)))
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>, StoreError> {
        let pool = self.main_pool().await?;
        let query = r#"
            SELECT id, name, database, metadata, created_at, updated_at, trashed_at
            FROM tenants ORDER BY name
        "#;
        let rows = sqlx::query(query).fetch_all(&pool).await?;
        Ok(rows.iter().map(tenant_from_row).collect())
    }

    async fn soft_delete_tenant(&self, id: Uuid, when: DateTime<Utc>) -> Result<(), StoreError> {
        let pool = self.main_pool().await?;
        let result = sqlx::query("UPDATE tenants SET trashed_at = $2, updated_at = $2 WHERE id = $1")
            .bind(id)
            .bind(when)
            .execute(&pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("Tenant {}", id)));
        }
        Ok(())
    }

    async fn insert_domain(&self, hostname: &str, tenant_id: Uuid) -> Result<(), StoreError> {
        let pool = self.main_pool().await?;
        let result = sqlx::query(
            "INSERT INTO domains (hostname, tenant_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(hostname)
        .bind(tenant_id)
        .execute(&pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "Domain '{}' is already allocated",
                hostname
            )));
        }
        Ok(())
    }

    async fn insert_plan(&self, plan: &Plan) -> Result<(), StoreError> {
        let pool = self.main_pool().await?;
        let query = r#"
            INSERT INTO plans (id, name, slug, price, billing_interval, max_users, max_customers,
                               max_leads_per_month, storage_limit_gb, features, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#;
        sqlx::query(query)
            .bind(plan.id)
            .bind(&plan.name)
            .bind(&plan.slug)
            .bind(plan.price)
            .bind(plan.billing_interval.as_str())
            .bind(plan.max_users)
            .bind(plan.max_customers)
            .bind(plan.max_leads_per_month)
            .bind(plan.storage_limit_gb)
            .bind(serde_json::json!(plan.features))
            .bind(plan.is_active)
            .execute(&pool)
            .await?;
        Ok(())
    }

    async fn update_plan(&self, plan: &Plan) -> Result<(), StoreError> {
        let pool = self.main_pool().await?;
        let query = r#"
            UPDATE plans
            SET name = $2, slug = $3, price = $4, billing_interval = $5, max_users = $6,
                max_customers = $7, max_leads_per_month = $8, storage_limit_gb = $9,
                features = $10, is_active = $11
            WHERE id = $1
        "#;
        let result = sqlx::query(query)
            .bind(plan.id)
            .bind(&plan.name)
            .bind(&plan.slug)
            .bind(plan.price)
            .bind(plan.billing_interval.as_str())
            .bind(plan.max_users)
            .bind(plan.max_customers)
            .bind(plan.max_leads_per_month)
            .bind(plan.storage_limit_gb)
            .bind(serde_json::json!(plan.features))
            .bind(plan.is_active)
            .execute(&pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("Plan {}", plan.id)));
        }
        Ok(())
    }

    async fn list_plans(&self) -> Result<Vec<Plan>, StoreError> {
        let pool = self.main_pool().await?;
        let query = r#"
            SELECT id, name, slug, price, billing_interval, max_users, max_customers,
                   max_leads_per_month, storage_limit_gb, features, is_active
            FROM plans ORDER BY name
        "#;
        let rows = sqlx::query(query).fetch_all(&pool).await?;
        rows.iter().map(plan_from_row).collect()
    }

    async fn plan_in_use(&self, plan_id: Uuid) -> Result<bool, StoreError> {
        let pool = self.main_pool().await?;
        let row = sqlx::query("SELECT COUNT(*) AS n FROM subscriptions WHERE plan_id = $1")
            .bind(plan_id)
            .fetch_one(&pool)
            .await?;
        let n: i64 = row.get("n");
        Ok(n > 0)
    }

    async fn upsert_subscription(&self, subscription: &Subscription) -> Result<(), StoreError> {
        let pool = self.main_pool().await?;
        // One subscription per tenant, keyed on tenant_id
        let query = r#"
            INSERT INTO subscriptions (id, tenant_id, plan_id, status, trial_ends_at, starts_at,
                                       ends_at, next_billing_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (tenant_id) DO UPDATE
            SET plan_id = EXCLUDED.plan_id, status = EXCLUDED.status,
                trial_ends_at = EXCLUDED.trial_ends_at, starts_at = EXCLUDED.starts_at,
                ends_at = EXCLUDED.ends_at, next_billing_date = EXCLUDED.next_billing_date
        "#;
        sqlx::query(query)
            .bind(subscription.id)
            .bind(subscription.tenant_id)
            .bind(subscription.plan_id)
            .bind(subscription.status.as_str())
            .bind(subscription.trial_ends_at)
            .bind(subscription.starts_at)
            .bind(subscription.ends_at)
            .bind(subscription.next_billing_date)
            .execute(&pool)
            .await?;
        Ok(())
    }

    async fn set_subscription_status(
        &self,
        tenant_id: Uuid,
        status: SubscriptionStatus,
    ) -> Result<(), StoreError> {
        let pool = self.main_pool().await?;
        let result = sqlx::query("UPDATE subscriptions SET status = $2 WHERE tenant_id = $1")
            .bind(tenant_id)
            .bind(status.as_str())
            .execute(&pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "Subscription for tenant {}",
                tenant_id
            )));
        }
        Ok(())
    }

    async fn insert_principal(&self, principal: &Principal) -> Result<(), StoreError> {
        let pool = match principal.tenant_id {
            Some(tid) => self.tenant_pool(tid).await?,
            None => self.main_pool().await?,
        };
        let query = r#"
            INSERT INTO principals (id, tenant_id, guard, username, password_digest,
                                    display_name, is_active, group_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#;
        sqlx::query(query)
            .bind(principal.id)
            .bind(principal.tenant_id)
            .bind(principal.guard.as_str())
            .bind(&principal.username)
            .bind(&principal.password_digest)
            .bind(&principal.display_name)
            .bind(principal.is_active)
            .bind(principal.group_id)
            .execute(&pool)
            .await?;
        Ok(())
    }

    async fn insert_customer(&self, customer: &Customer) -> Result<(), StoreError> {
        let pool = self.tenant_pool(customer.tenant_id).await?;
        let query = r#"
            INSERT INTO customers (id, tenant_id, name, email, created_at)
            VALUES ($1, $2, $3, $4, $5)
        "#;
        sqlx::query(query)
            .bind(customer.id)
            .bind(customer.tenant_id)
            .bind(&customer.name)
            .bind(&customer.email)
            .bind(customer.created_at)
            .execute(&pool)
            .await?;
        Ok(())
    }
}
