// Session security policy: idle timeout, periodic id rotation and client
// fingerprinting. The customer guard gets the full treatment; staff and
// central sessions run the idle-timeout check only.

use axum::http::{header, HeaderMap};
use sha2::{Digest, Sha256};

/// Has the session been idle longer than the timeout window?
///
/// A request arriving at exactly the threshold is still valid; only strictly
/// more elapsed time forces the logout.
pub fn idle_expired(last_activity: Option<i64>, now: i64, timeout_mins: i64) -> bool {
    match last_activity {
        Some(last) => now - last > timeout_mins * 60,
        // No recorded activity yet: nothing to expire
        None => false,
    }
}

/// Is the session id due for its periodic rotation?
///
/// Rotation is suppressed while a two-factor challenge is pending, since the
/// challenge state is keyed to the current session id.
pub fn rotation_due(
    last_regenerated: Option<i64>,
    now: i64,
    interval_mins: i64,
    two_factor_pending: bool,
) -> bool {
    if two_factor_pending {
        return false;
    }
    match last_regenerated {
        Some(last) => now - last > interval_mins * 60,
        // Never rotated: stamp on first authenticated request
        None => true,
    }
}

/// Derive a stable client fingerprint from a fixed header set.
///
/// Deliberately coarse: user-agent, accept-language and accept-encoding only,
/// never the client IP, so mobile network churn does not log users out while
/// a stolen session token presented by a materially different client still
/// trips the check.
pub fn fingerprint(headers: &HeaderMap) -> String {
    let part = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string()
    };

    let mut hasher = Sha256::new();
    hasher.update(part(header::USER_AGENT));
    hasher.update("|");
    hasher.update(part(header::ACCEPT_LANGUAGE));
    hasher.update("|");
    hasher.update(part(header::ACCEPT_ENCODING));
    format!("{:x}", hasher.finalize())
}
