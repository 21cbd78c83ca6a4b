use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Logical permission category used for RBAC.
///
/// Roles are never stored on an identity; they are computed per request from
/// identity-provider groups by the [`crate::RoleRegistry`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Requester,
    Pbp,
    Procurement,
    Opw,
    Contract,
    ApControl,
    Admin,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl Role {
    pub const ALL: [Role; 7] = [
        Role::Requester,
        Role::Pbp,
        Role::Procurement,
        Role::Opw,
        Role::Contract,
        Role::ApControl,
        Role::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Requester => "REQUESTER",
            Role::Pbp => "PBP",
            Role::Procurement => "PROCUREMENT",
            Role::Opw => "OPW",
            Role::Contract => "CONTRACT",
            Role::ApControl => "AP_CONTROL",
            Role::Admin => "ADMIN",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Role::Requester => "Raises supplier onboarding requests",
            Role::Pbp => "Procurement business partner; first-line review",
            Role::Procurement => "Procurement team review and classification",
            Role::Opw => "Off-payroll working (IR35) determination panel",
            Role::Contract => "Contract drafting and supplier negotiation",
            Role::ApControl => "Accounts payable control; final vendor set-up",
            Role::Admin => "Administrator; satisfies every role",
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == normalized)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("ap_control".parse::<Role>().unwrap(), Role::ApControl);
        assert_eq!("Ap-Control".parse::<Role>().unwrap(), Role::ApControl);
        assert_eq!("PBP".parse::<Role>().unwrap(), Role::Pbp);
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn serializes_as_screaming_snake_case() {
        assert_eq!(serde_json::to_string(&Role::ApControl).unwrap(), "\"AP_CONTROL\"");
    }
}
