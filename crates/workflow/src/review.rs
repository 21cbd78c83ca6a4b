use chrono::{DateTime, Utc};
use onboard_auth::{Principal, Role};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::stage::{Decision, Stage};

/// Who acted, captured from the server-side principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reviewer {
    pub email: String,
    pub name: String,
    pub role: Role,
}

impl Reviewer {
    /// The role the principal acted under. Admins are always recorded as
    /// `ADMIN` since the admin group satisfies every stage role.
    pub fn acting_for(principal: &Principal, stage_role: Option<Role>) -> Self {
        let role = match stage_role {
            _ if principal.is_admin() => Role::Admin,
            Some(role) if principal.has_role(role) => role,
            _ => Role::Requester,
        };
        Self {
            email: principal.email().to_string(),
            name: principal.display_name().to_string(),
            role,
        }
    }
}

/// One stage's review record. Overwritten only by a later decision at the
/// same stage (e.g. after an info request).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageReview {
    pub decision: Decision,
    pub rationale: String,
    pub reviewer_email: String,
    pub reviewer_name: String,
    pub reviewer_role: Role,
    pub reviewed_at: DateTime<Utc>,
}

/// Terminal rejection marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rejection {
    pub rejected_by: String,
    pub rejected_by_role: Role,
    pub rejected_at_stage: Stage,
    pub rejection_reason: String,
    pub rejection_date: DateTime<Utc>,
    pub supplier_name: Option<String>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeKind {
    /// Sent by the contract team.
    Message,
    /// Reply from the owner or the supplier contact.
    Response,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeSender {
    ContractDrafter,
    Requester,
    Supplier,
    Admin,
}

/// Immutable contract-negotiation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exchange {
    pub id: Uuid,
    pub kind: ExchangeKind,
    pub sender_role: ExchangeSender,
    pub sender_email: String,
    pub body: String,
    #[serde(default)]
    pub attachments: Vec<String>,
    pub sent_at: DateTime<Utc>,
}

/// Contract stage payload: the drafter's decision and the append-only
/// negotiation log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractDrafter {
    pub decision: Option<StageReview>,
    #[serde(default)]
    exchanges: Vec<Exchange>,
}

impl ContractDrafter {
    pub fn exchanges(&self) -> &[Exchange] {
        &self.exchanges
    }

    pub(crate) fn append(&mut self, exchange: Exchange) {
        self.exchanges.push(exchange);
    }
}

/// One applied status/stage transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRecord {
    pub from_stage: Stage,
    pub to_stage: Stage,
    pub from_status: String,
    pub to_status: String,
    pub decision: Option<Decision>,
    pub actor: String,
    pub at: DateTime<Utc>,
}
