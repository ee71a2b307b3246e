//! Cache key namespace.
//!
//! Every key lives under [`NAMESPACE`]; each entity also has a prefix
//! constant for bulk eviction with `remove_by_prefix`.

pub const NAMESPACE: &str = "idgw";

pub const ROLE_PREFIX: &str = "idgw:role:";
pub const PERMISSION_PREFIX: &str = "idgw:permission:";
pub const RATE_LIMIT_PREFIX: &str = "idgw:ratelimit:";
pub const IP_FILTER_PREFIX: &str = "idgw:ipfilter:";
pub const SYSTEM_CONFIG_PREFIX: &str = "idgw:sysconfig:";
pub const USER_PREFIX: &str = "idgw:user:";
pub const CLIENT_PREFIX: &str = "idgw:client:";

pub fn role_by_id(id: &str) -> String {
    format!("{ROLE_PREFIX}id:{id}")
}

/// Role names are case-insensitive.
pub fn role_by_name(name: &str) -> String {
    format!("{ROLE_PREFIX}name:{}", name.to_lowercase())
}

pub fn all_roles() -> String {
    format!("{ROLE_PREFIX}all")
}

pub fn all_permissions() -> String {
    format!("{PERMISSION_PREFIX}all")
}

pub fn user_permissions(user_id: &str) -> String {
    format!("{PERMISSION_PREFIX}user:{user_id}")
}

pub fn all_rate_limit_policies() -> String {
    format!("{RATE_LIMIT_PREFIX}policy:all")
}

pub fn rate_limit_policy(name: &str) -> String {
    format!("{RATE_LIMIT_PREFIX}policy:name:{name}")
}

pub fn active_ip_rules() -> String {
    format!("{IP_FILTER_PREFIX}rules:active")
}

pub fn system_config(group: &str, key: &str) -> String {
    format!("{SYSTEM_CONFIG_PREFIX}{group}:{key}")
}

pub fn all_system_configs() -> String {
    format!("{SYSTEM_CONFIG_PREFIX}all")
}

pub fn user_by_id(id: &str) -> String {
    format!("{USER_PREFIX}id:{id}")
}

pub fn client_by_id(client_id: &str) -> String {
    format!("{CLIENT_PREFIX}id:{client_id}")
}
