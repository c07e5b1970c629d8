pub mod plan_service;
pub mod subscription_service;
pub mod tenant_service;

pub use plan_service::{PlanService, PlanServiceError};
pub use subscription_service::{SubscriptionService, SubscriptionServiceError};
pub use tenant_service::{ProvisionRequest, TenantService, TenantServiceError};
