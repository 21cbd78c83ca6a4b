//! Role registry: logical role -> identity-provider groups that satisfy it.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;

use crate::Role;

/// Group that satisfies every role unless configured otherwise.
pub const DEFAULT_ADMIN_GROUP: &str = "supplier-onboarding-admins";

/// Static mapping from [`Role`] to the set of identity groups granting it.
///
/// The admin group is folded into every role's allowed-group set when the
/// registry is built, so `has_role` is one set-intersection test for every
/// role, admin included. Group names compare case-insensitively.
#[derive(Debug, Clone)]
pub struct RoleRegistry {
    admin_group: String,
    allowed: HashMap<Role, HashSet<String>>,
}

/// Role definition with its allowed groups (for audit/display).
#[derive(Debug, Clone, Serialize)]
pub struct RoleDefinition {
    pub role: Role,
    pub description: &'static str,
    pub groups: Vec<String>,
}

impl RoleRegistry {
    pub fn builder(admin_group: impl Into<String>) -> RoleRegistryBuilder {
        RoleRegistryBuilder {
            admin_group: admin_group.into(),
            allowed: HashMap::new(),
        }
    }

    /// Built-in group names used when no configuration overrides them.
    pub fn with_defaults() -> Self {
        Self::builder(DEFAULT_ADMIN_GROUP)
            .allow(Role::Requester, ["supplier-onboarding-requesters"])
            .allow(Role::Pbp, ["supplier-onboarding-pbp"])
            .allow(Role::Procurement, ["supplier-onboarding-procurement"])
            .allow(Role::Opw, ["supplier-onboarding-opw-panel"])
            .allow(Role::Contract, ["supplier-onboarding-contract-drafters"])
            .allow(Role::ApControl, ["supplier-onboarding-ap-control"])
            .build()
    }

    pub fn admin_group(&self) -> &str {
        &self.admin_group
    }

    /// Groups granting `role`. Unconfigured roles yield an empty set.
    pub fn allowed_groups(&self, role: Role) -> Vec<String> {
        let mut groups: Vec<String> = self
            .allowed
            .get(&role)
            .map(|g| g.iter().cloned().collect())
            .unwrap_or_default();
        groups.sort();
        groups
    }

    pub fn has_role<S: AsRef<str>>(&self, groups: &[S], role: Role) -> bool {
        let Some(allowed) = self.allowed.get(&role) else {
            return false;
        };
        groups
            .iter()
            .any(|g| allowed.contains(&normalize(g.as_ref())))
    }

    /// Role lookup by configured name. Unknown names deny (fail-closed).
    pub fn has_role_named<S: AsRef<str>>(&self, groups: &[S], role_name: &str) -> bool {
        match role_name.parse::<Role>() {
            Ok(role) => self.has_role(groups, role),
            Err(_) => {
                tracing::debug!(role_name, "unknown role name; denying");
                false
            }
        }
    }

    pub fn is_admin<S: AsRef<str>>(&self, groups: &[S]) -> bool {
        self.has_role(groups, Role::Admin)
    }

    pub fn roles_of<S: AsRef<str>>(&self, groups: &[S]) -> BTreeSet<Role> {
        Role::ALL
            .into_iter()
            .filter(|role| self.has_role(groups, *role))
            .collect()
    }

    pub fn definitions(&self) -> Vec<RoleDefinition> {
        Role::ALL
            .into_iter()
            .map(|role| RoleDefinition {
                role,
                description: role.description(),
                groups: self.allowed_groups(role),
            })
            .collect()
    }
}

impl Default for RoleRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Incremental builder; `build()` adds the admin group to every role.
#[derive(Debug, Clone)]
pub struct RoleRegistryBuilder {
    admin_group: String,
    allowed: HashMap<Role, HashSet<String>>,
}

impl RoleRegistryBuilder {
    pub fn allow<I, S>(mut self, role: Role, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entry = self.allowed.entry(role).or_default();
        for group in groups {
            let group = normalize(group.as_ref());
            if !group.is_empty() {
                entry.insert(group);
            }
        }
        self
    }

    pub fn build(mut self) -> RoleRegistry {
        let admin = normalize(&self.admin_group);
        for role in Role::ALL {
            self.allowed.entry(role).or_default().insert(admin.clone());
        }
        RoleRegistry {
            admin_group: self.admin_group,
            allowed: self.allowed,
        }
    }
}

fn normalize(group: &str) -> String {
    group.trim().to_lowercase()
}
