// Subscription gate: per-request admit/deny decision over the tenant's
// subscription record. The gate never changes subscription state.

use chrono::{DateTime, Utc};

use super::{Subscription, SubscriptionStatus};

/// Outcome of gate evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Admit,
    Deny(Denial),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    /// Stable machine-readable code, also used as the JSON error code
    pub code: &'static str,
    /// Status page browser clients are redirected to
    pub redirect_to: &'static str,
    pub message: &'static str,
}

pub const DENY_NO_SUBSCRIPTION: Denial = Denial {
    code: "SUBSCRIPTION_REQUIRED",
    redirect_to: "/subscription/required",
    message: "An active subscription is required to access this area",
};

pub const DENY_SUSPENDED: Denial = Denial {
    code: "SUBSCRIPTION_SUSPENDED",
    redirect_to: "/subscription/suspended",
    message: "This account has been suspended",
};

pub const DENY_CANCELLED: Denial = Denial {
    code: "SUBSCRIPTION_CANCELLED",
    redirect_to: "/subscription/cancelled",
    message: "This subscription has been cancelled",
};

pub const DENY_EXPIRED: Denial = Denial {
    code: "SUBSCRIPTION_EXPIRED",
    redirect_to: "/subscription/plans",
    message: "This subscription has expired, please choose a plan",
};

pub const DENY_TRIAL_ENDED: Denial = Denial {
    code: "TRIAL_ENDED",
    redirect_to: "/subscription/plans",
    message: "The trial period has ended, please upgrade to continue",
};

/// Evaluates the fixed denial ladder for tenant-domain requests. The exempt
/// path list (status pages, logout, password reset, email verification) is
/// supplied at construction so the gate can never redirect into itself.
pub struct SubscriptionGate {
    exempt_paths: Vec<String>,
}

impl SubscriptionGate {
    pub fn new(exempt_paths: Vec<String>) -> Self {
        Self { exempt_paths }
    }

    /// Evaluation order is load-bearing and must not be re-ordered:
    ///
    ///   1. exempt path             -> admit (prevents redirect loops)
    ///   2. no subscription         -> deny, subscription-required page
    ///   3. suspended               -> deny, suspended page
    ///   4. cancelled               -> deny, cancelled page
    ///   5. ends_at in the past     -> deny, plan selection
    ///   6. trial past, not active  -> deny, plan selection (upgrade prompt)
    ///   7. trial past, active      -> admit (paid conversion overrides expiry)
    ///   8. otherwise               -> admit
    pub fn evaluate(
        &self,
        path: &str,
        subscription: Option<&Subscription>,
        now: DateTime<Utc>,
    ) -> Admission {
        if self.exempt_paths.iter().any(|p| p == path) {
            return Admission::Admit;
        }

        let sub = match subscription {
            Some(sub) => sub,
            None => return Admission::Deny(DENY_NO_SUBSCRIPTION),
        };

        match sub.status {
            SubscriptionStatus::Suspended => return Admission::Deny(DENY_SUSPENDED),
            SubscriptionStatus::Cancelled => return Admission::Deny(DENY_CANCELLED),
            _ => {}
        }

        if sub.has_expired(now) {
            return Admission::Deny(DENY_EXPIRED);
        }

        // Trial expiry is overridden by an explicit Active status: the one
        // place a time-based condition yields to a status flag. Checked in
        // this order, never reversed.
        if sub.trial_expired(now) && sub.status != SubscriptionStatus::Active {
            return Admission::Deny(DENY_TRIAL_ENDED);
        }

        Admission::Admit
    }
}
