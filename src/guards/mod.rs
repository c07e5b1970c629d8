// Guard selection - which authentication identity space a request belongs to.
//
// The three guards are independent identity spaces: each has its own
// credential store, its own session namespace and its own "currently
// authenticated principal". A principal signed in under one guard is
// invisible to the others, even inside the same browser session.

use serde::{Deserialize, Serialize};

use crate::tenancy::DomainClass;

/// Closed set of authentication identity spaces. Every decision point matches
/// exhaustively; there is no string-keyed guard registry to fall through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardKind {
    Central,
    Staff,
    Customer,
}

/// Route prefix that places a tenant-domain request under the customer guard
const CUSTOMER_PREFIX: &str = "/customer";

/// Select the guard for a request. This is the single decision function:
/// login and home redirect targets below derive from the same selection, so
/// the unauthenticated-redirect choice can never disagree with it.
pub fn select_guard(class: DomainClass, path: &str) -> GuardKind {
    match class {
        DomainClass::Central => GuardKind::Central,
        DomainClass::Tenant => {
            if path == CUSTOMER_PREFIX || path.starts_with("/customer/") {
                GuardKind::Customer
            } else {
                GuardKind::Staff
            }
        }
    }
}

impl GuardKind {
    /// Where unauthenticated requests under this guard are sent
    pub fn login_route(&self) -> &'static str {
        match self {
            GuardKind::Central => "/login",
            GuardKind::Staff => "/login",
            GuardKind::Customer => "/customer/login",
        }
    }

    /// Where already-authenticated principals land (e.g. when visiting the
    /// login route again)
    pub fn home_route(&self) -> &'static str {
        match self {
            GuardKind::Central => "/dashboard",
            GuardKind::Staff => "/dashboard",
            GuardKind::Customer => "/customer/dashboard",
        }
    }

    /// Session namespace key holding the authenticated principal id
    pub fn session_key(&self) -> &'static str {
        match self {
            GuardKind::Central => "auth:central",
            GuardKind::Staff => "auth:staff",
            GuardKind::Customer => "auth:customer",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GuardKind::Central => "central",
            GuardKind::Staff => "staff",
            GuardKind::Customer => "customer",
        }
    }

    /// Central principals are global; staff and customer principals live in
    /// their tenant's data space
    pub fn is_tenant_scoped(&self) -> bool {
        !matches!(self, GuardKind::Central)
    }
}
