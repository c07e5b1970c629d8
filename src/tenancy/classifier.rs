/// Whether a request targets the central (admin/marketing) application or a
/// tenant subdomain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainClass {
    Central,
    Tenant,
}

/// Classify a raw Host header against the configured central domain list.
///
/// Comparison is exact and case-sensitive, with no normalization; operators
/// configure the literal values requests will carry. Both the raw header value
/// (which may include a port) and its port-stripped form are checked, so a
/// list entry of `admin.example.com` matches `admin.example.com:8080`.
///
/// Pure and total: every host maps to exactly one class.
pub fn classify(host: &str, central_domains: &[String]) -> DomainClass {
    if central_domains.iter().any(|d| d == host) {
        return DomainClass::Central;
    }

    if let Some((bare, _port)) = host.rsplit_once(':') {
        if central_domains.iter().any(|d| d == bare) {
            return DomainClass::Central;
        }
    }

    DomainClass::Tenant
}
