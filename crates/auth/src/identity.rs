use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{Role, RoleRegistry};

/// Authenticated identity as supplied by the identity provider.
///
/// `groups` is the raw group membership. Roles are derived from it per
/// request and never stored here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub email: String,
    pub display_name: String,
    pub groups: Vec<String>,
}

impl Identity {
    pub fn new<I, S>(email: impl Into<String>, display_name: impl Into<String>, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            email: email.into(),
            display_name: display_name.into(),
            groups: groups.into_iter().map(Into::into).collect(),
        }
    }
}

/// A fully resolved principal for authorization decisions.
///
/// Built once per request from a verified [`Identity`]; the role set is the
/// server's own derivation and never a client-supplied claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    identity: Identity,
    roles: BTreeSet<Role>,
}

impl Principal {
    pub fn resolve(identity: Identity, registry: &RoleRegistry) -> Self {
        let roles = registry.roles_of(&identity.groups);
        Self { identity, roles }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn email(&self) -> &str {
        &self.identity.email
    }

    pub fn display_name(&self) -> &str {
        &self.identity.display_name
    }

    pub fn roles(&self) -> &BTreeSet<Role> {
        &self.roles
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    /// Case-insensitive e-mail comparison used for ownership checks.
    pub fn email_matches(&self, other: &str) -> bool {
        let mine = self.identity.email.trim();
        !mine.is_empty() && mine.eq_ignore_ascii_case(other.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_derives_roles_from_groups() {
        let registry = RoleRegistry::with_defaults();
        let p = Principal::resolve(
            Identity::new("pat@nhs.net", "Pat", ["supplier-onboarding-pbp"]),
            &registry,
        );
        assert!(p.has_role(Role::Pbp));
        assert!(!p.is_admin());
        assert_eq!(p.roles().len(), 1);
    }

    #[test]
    fn email_match_ignores_case_and_whitespace() {
        let registry = RoleRegistry::with_defaults();
        let p = Principal::resolve(Identity::new("Sarah.Johnson@NHS.net", "Sarah", Vec::<String>::new()), &registry);
        assert!(p.email_matches(" sarah.johnson@nhs.net "));
        assert!(!p.email_matches("sarah@nhs.net"));
    }

    #[test]
    fn empty_email_never_matches() {
        let registry = RoleRegistry::with_defaults();
        let p = Principal::resolve(Identity::new("", "Nobody", Vec::<String>::new()), &registry);
        assert!(!p.email_matches(""));
    }
}
