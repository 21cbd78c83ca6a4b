//! Process configuration, read from the environment once at start-up.

use std::net::SocketAddr;

use thiserror::Error;

use onboard_auth::{Role, RoleRegistry};
use onboard_auth::registry::DEFAULT_ADMIN_GROUP;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEV_TOKEN_SECRET: &str = "dev-secret";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name}: {reason}")]
    Invalid { name: String, reason: String },

    #[error("{0} must be set when USE_PERSISTENT_STORES=true")]
    Missing(&'static str),
}

impl ConfigError {
    fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub token_secret: String,
    /// `Some` only when persistent stores are enabled.
    pub database_url: Option<String>,
    pub admin_group: String,
    /// Per-role group overrides; roles absent here keep the built-in names.
    pub role_groups: Vec<(Role, Vec<String>)>,
    /// Report not-found exactly like access-denied.
    pub conceal_not_found: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            token_secret: DEV_TOKEN_SECRET.to_string(),
            database_url: None,
            admin_group: DEFAULT_ADMIN_GROUP.to_string(),
            role_groups: Vec::new(),
            conceal_not_found: true,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any key lookup (the environment in production, a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = get("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::invalid("BIND_ADDR", e.to_string()))?;

        let token_secret = get("TOKEN_SECRET").unwrap_or_else(|| {
            tracing::warn!("TOKEN_SECRET not set; using insecure dev default");
            DEV_TOKEN_SECRET.to_string()
        });

        let use_persistent = parse_bool("USE_PERSISTENT_STORES", get("USE_PERSISTENT_STORES"), false)?;
        let database_url = if use_persistent {
            Some(get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?)
        } else {
            None
        };

        let admin_group = get("ADMIN_GROUP").unwrap_or_else(|| DEFAULT_ADMIN_GROUP.to_string());

        let role_groups = Role::ALL
            .into_iter()
            .filter(|role| *role != Role::Admin)
            .filter_map(|role| {
                get(&format!("ROLE_GROUPS_{}", role.as_str())).map(|raw| {
                    let groups: Vec<String> = raw
                        .split(',')
                        .map(str::trim)
                        .filter(|g| !g.is_empty())
                        .map(str::to_string)
                        .collect();
                    (role, groups)
                })
            })
            .collect();

        let conceal_not_found = parse_bool("CONCEAL_NOT_FOUND", get("CONCEAL_NOT_FOUND"), true)?;

        Ok(Self {
            bind_addr,
            token_secret,
            database_url,
            admin_group,
            role_groups,
            conceal_not_found,
        })
    }

    /// Build the role registry; the admin group joins every role here.
    pub fn role_registry(&self) -> RoleRegistry {
        let defaults = RoleRegistry::with_defaults();
        let mut builder = RoleRegistry::builder(self.admin_group.clone());
        for role in Role::ALL.into_iter().filter(|r| *r != Role::Admin) {
            let groups = match self.role_groups.iter().find(|(r, _)| *r == role) {
                Some((_, groups)) => groups.clone(),
                None => defaults
                    .allowed_groups(role)
                    .into_iter()
                    .filter(|g| !g.eq_ignore_ascii_case(DEFAULT_ADMIN_GROUP))
                    .collect(),
            };
            builder = builder.allow(role, groups);
        }
        builder.build()
    }
}

fn parse_bool(name: &str, value: Option<String>, default: bool) -> Result<bool, ConfigError> {
    match value.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(default),
        Some("true" | "1" | "yes") => Ok(true),
        Some("false" | "0" | "no") => Ok(false),
        Some(other) => Err(ConfigError::invalid(name, format!("expected a boolean, got '{other}'"))),
    }
}
