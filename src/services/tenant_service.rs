use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::ApiError;
use crate::guards::GuardKind;
use crate::stores::{
    digest_password, AuditEntry, AuditSink, PlatformAdmin, Principal, StoreError,
};
use crate::subscription::{Subscription, SubscriptionStatus};
use crate::tenancy::Tenant;

const TRIAL_DAYS: i64 = 14;

#[derive(Debug, thiserror::Error)]
pub enum TenantServiceError {
    #[error("Invalid tenant name: {0}")]
    InvalidName(String),

    #[error("Tenant already exists: {0}")]
    AlreadyExists(String),

    #[error("Domain '{0}' is already allocated")]
    DomainTaken(String),

    #[error("Tenant not found")]
    NotFound,

    #[error("Confirmation phrase does not match")]
    ConfirmationMismatch,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<TenantServiceError> for ApiError {
    fn from(err: TenantServiceError) -> Self {
        match err {
            TenantServiceError::InvalidName(msg) => ApiError::bad_request(msg),
            TenantServiceError::AlreadyExists(name) => {
                ApiError::conflict(format!("Tenant '{}' already exists", name))
            }
            TenantServiceError::DomainTaken(host) => {
                ApiError::conflict(format!("Domain '{}' is already allocated", host))
            }
            TenantServiceError::NotFound => ApiError::not_found("Tenant not found"),
            TenantServiceError::ConfirmationMismatch => {
                ApiError::bad_request("Confirmation phrase does not match")
            }
            TenantServiceError::Store(e) => e.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProvisionRequest {
    pub name: String,
    pub hostname: String,
    pub plan_id: Uuid,
    pub staff_username: String,
    pub staff_password: String,
}

/// Central-admin tenant lifecycle: provisioning allocates a domain, creates
/// the isolated data space, seeds the initial staff account and starts a
/// trial subscription. Deletion is soft and gated on an exact confirmation
/// phrase; this service never hard-deletes.
pub struct TenantService {
    admin: Arc<dyn PlatformAdmin>,
    audit: Arc<dyn AuditSink>,
}

impl TenantService {
    pub fn new(admin: Arc<dyn PlatformAdmin>, audit: Arc<dyn AuditSink>) -> Self {
        Self { admin, audit }
    }

    pub async fn provision(&self, req: ProvisionRequest) -> Result<Tenant, TenantServiceError> {
        Self::validate_tenant_name(&req.name)?;

        if self.admin.find_tenant_by_name(&req.name).await?.is_some() {
            return Err(TenantServiceError::AlreadyExists(req.name));
        }

        let now = Utc::now();
        let tenant = Tenant {
            id: Uuid::new_v4(),
            name: req.name.clone(),
            database: Self::tenant_db_name(&req.name),
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
            trashed_at: None,
        };

        self.admin.insert_tenant(&tenant).await?;

        match self.admin.insert_domain(&req.hostname, tenant.id).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => {
                return Err(TenantServiceError::DomainTaken(req.hostname))
            }
            Err(e) => return Err(e.into()),
        }

        // Seed the initial staff account
        let staff = Principal {
            id: Uuid::new_v4(),
            tenant_id: Some(tenant.id),
            guard: GuardKind::Staff,
            username: req.staff_username,
            password_digest: digest_password(&req.staff_password),
            display_name: "Administrator".to_string(),
            is_active: true,
            group_id: None,
        };
        self.admin.insert_principal(&staff).await?;

        // New tenants start on a trial of the chosen plan
        let subscription = Subscription {
            id: Uuid::new_v4(),
            tenant_id: tenant.id,
            plan_id: req.plan_id,
            status: SubscriptionStatus::Trial,
            trial_ends_at: Some(now + Duration::days(TRIAL_DAYS)),
            starts_at: now,
            ends_at: None,
            next_billing_date: None,
        };
        self.admin.upsert_subscription(&subscription).await?;

        self.audit
            .record(
                AuditEntry::new("tenant.provisioned", format!("Provisioned tenant '{}'", tenant.name))
                    .metadata(serde_json::json!({
                        "tenant_id": tenant.id,
                        "hostname": req.hostname,
                        "plan_id": req.plan_id,
                    })),
            )
            .await;

        tracing::info!("Provisioned tenant '{}' ({})", tenant.name, tenant.id);
        Ok(tenant)
    }

    /// Soft delete, admitted only when `confirmation` is exactly
    /// `DELETE <tenant name>`
    pub async fn soft_delete(
        &self,
        tenant_id: Uuid,
        confirmation: &str,
    ) -> Result<(), TenantServiceError> {
        let tenant = self
            .admin
            .list_tenants()
            .await?
            .into_iter()
            .find(|t| t.id == tenant_id)
            .ok_or(TenantServiceError::NotFound)?;

        let expected = format!("DELETE {}", tenant.name);
        if confirmation != expected {
            return Err(TenantServiceError::ConfirmationMismatch);
        }

        self.admin.soft_delete_tenant(tenant.id, Utc::now()).await?;

        self.audit
            .record(
                AuditEntry::new("tenant.trashed", format!("Soft-deleted tenant '{}'", tenant.name))
                    .metadata(serde_json::json!({ "tenant_id": tenant.id })),
            )
            .await;

        tracing::info!("Soft-deleted tenant '{}' ({})", tenant.name, tenant.id);
        Ok(())
    }

    fn validate_tenant_name(name: &str) -> Result<(), TenantServiceError> {
        if name.len() < 2 {
            return Err(TenantServiceError::InvalidName(
                "Tenant name must be at least 2 characters".to_string(),
            ));
        }
        let valid = name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == ' ');
        if !valid {
            return Err(TenantServiceError::InvalidName(
                "Tenant name may only contain letters, digits, spaces and dashes".to_string(),
            ));
        }
        Ok(())
    }

    /// Hash the tenant name to a stable, valid database name
    fn tenant_db_name(name: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(name.as_bytes());
        let hash = format!("{:x}", hasher.finalize());
        format!("tenant_{}", &hash[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::memory::{MemoryAuditSink, MemoryStore};

    fn service() -> (Arc<MemoryStore>, Arc<MemoryAuditSink>, TenantService) {
        let store = Arc::new(MemoryStore::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let service = TenantService::new(store.clone(), audit.clone());
        (store, audit, service)
    }

    fn request(name: &str, hostname: &str) -> ProvisionRequest {
        ProvisionRequest {
            name: name.to_string(),
            hostname: hostname.to_string(),
            plan_id: Uuid::new_v4(),
            staff_username: "admin".to_string(),
            staff_password: "secret".to_string(),
        }
    }

    #[tokio::test]
    async fn provision_creates_tenant_staff_and_trial() {
        use crate::stores::{PrincipalStore, TenantDirectory};

        let (store, audit, service) = service();
        let tenant = service.provision(request("acme", "acme.example.com")).await.unwrap();

        assert!(tenant.database.starts_with("tenant_"));
        let sub = store.find_subscription(tenant.id).await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Trial);
        assert!(sub.trial_ends_at.unwrap() > Utc::now());

        let staff = store
            .find_by_username(GuardKind::Staff, Some(tenant.id), "admin")
            .await
            .unwrap()
            .unwrap();
        assert!(staff.verify_password("secret"));

        assert!(audit.entries().iter().any(|e| e.action == "tenant.provisioned"));
    }

    #[tokio::test]
    async fn duplicate_domain_is_rejected() {
        let (_, _, service) = service();
        service.provision(request("first", "shared.example.com")).await.unwrap();
        let err = service
            .provision(request("second", "shared.example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, TenantServiceError::DomainTaken(_)));
    }

    #[tokio::test]
    async fn soft_delete_requires_exact_confirmation_phrase() {
        let (store, _, service) = service();
        let tenant = service.provision(request("acme", "acme.example.com")).await.unwrap();

        let err = service.soft_delete(tenant.id, "DELETE wrong").await.unwrap_err();
        assert!(matches!(err, TenantServiceError::ConfirmationMismatch));

        service.soft_delete(tenant.id, "DELETE acme").await.unwrap();
        let listed = store.list_tenants().await.unwrap();
        assert!(listed.iter().find(|t| t.id == tenant.id).unwrap().trashed_at.is_some());
    }

    #[test]
    fn tenant_name_validation() {
        assert!(TenantService::validate_tenant_name("Acme Insurance").is_ok());
        assert!(TenantService::validate_tenant_name("a").is_err());
        assert!(TenantService::validate_tenant_name("bad/name").is_err());
    }
}
