pub mod pipeline;
pub mod rate_limit;
pub mod response;

pub use pipeline::{pipeline, CurrentPrincipal};
pub use rate_limit::rate_limit;
pub use response::{ApiResponse, ApiResult};

use crate::config::{AppConfig, SessionConfig};

/// Construction-time configuration for the request pipeline. Route exemption
/// lists are plain data handed in here, so tests can inject minimal lists
/// instead of depending on global route names.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub central_domains: Vec<String>,
    pub session: SessionConfig,
    /// Paths reachable without authentication, exact match
    pub public_paths: Vec<String>,
    /// Paths exempt from the idle-timeout check (they still update the
    /// activity timestamp), exact match
    pub idle_exempt_paths: Vec<String>,
    /// Paths the subscription gate admits unconditionally, exact match
    pub subscription_exempt_paths: Vec<String>,
    pub rate_limit: RateLimitSettings,
}

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub max_requests: u32,
    pub window_secs: u64,
}

impl PipelineConfig {
    pub fn from_app_config(cfg: &AppConfig) -> Self {
        Self {
            central_domains: cfg.tenancy.central_domains.clone(),
            session: cfg.session.clone(),
            public_paths: Self::default_public_paths(),
            idle_exempt_paths: Self::default_idle_exempt_paths(),
            subscription_exempt_paths: Self::default_subscription_exempt_paths(),
            rate_limit: RateLimitSettings {
                enabled: cfg.api.enable_rate_limiting,
                max_requests: cfg.api.rate_limit_requests,
                window_secs: cfg.api.rate_limit_window_secs,
            },
        }
    }

    pub fn default_public_paths() -> Vec<String> {
        [
            "/",
            "/health",
            "/login",
            "/customer/login",
            "/password/forgot",
            "/password/reset",
            "/email/verify",
            // The gate's redirect targets must be readable under any guard,
            // otherwise a denied customer bounces into the staff login
            "/subscription/required",
            "/subscription/suspended",
            "/subscription/cancelled",
            "/subscription/plans",
        ]
        .map(String::from)
        .to_vec()
    }

    pub fn default_idle_exempt_paths() -> Vec<String> {
        [
            "/logout",
            "/customer/logout",
            "/password/change",
            "/customer/password/change",
        ]
        .map(String::from)
        .to_vec()
    }

    pub fn default_subscription_exempt_paths() -> Vec<String> {
        [
            "/subscription/required",
            "/subscription/suspended",
            "/subscription/cancelled",
            "/subscription/plans",
            "/logout",
            "/customer/logout",
            "/password/forgot",
            "/password/reset",
            "/password/change",
            "/customer/password/change",
            "/email/verify",
        ]
        .map(String::from)
        .to_vec()
    }
}
