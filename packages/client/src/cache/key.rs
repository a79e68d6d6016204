//! Cache key layout: `{tenant}:{resource}:{discriminator}`.
//!
//! Invalidation works on the `{tenant}:{resource}:` prefix; the trailing
//! separator keeps `task` from matching `tasks`.

/// Key of one cached response
pub fn cache_key(tenant: &str, resource: &str, discriminator: &str) -> String {
    format!("{}{}", resource_prefix(tenant, resource), discriminator)
}

/// Prefix shared by every entry of `resource` for `tenant`
pub fn resource_prefix(tenant: &str, resource: &str) -> String {
    format!("{}:{}:", tenant, resource)
}
