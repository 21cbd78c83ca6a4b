//! Table-driven stage model.
//!
//! Adding a stage means extending the rule and transition tables below; the
//! evaluator and the queue resolver only ever consult the tables.

use core::str::FromStr;
use std::collections::BTreeSet;

use onboard_auth::Role;
use onboard_core::DomainError;
use serde::{Deserialize, Serialize};

pub const STATUS_PENDING_REVIEW: &str = "pending_review";
pub const STATUS_REJECTED: &str = "rejected";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_CONTRACT_NEGOTIATING: &str = "contract_negotiating";

/// Workflow stage.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Pbp,
    Procurement,
    Opw,
    Contract,
    #[serde(alias = "ap")]
    ApControl,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Pbp,
        Stage::Procurement,
        Stage::Opw,
        Stage::Contract,
        Stage::ApControl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Pbp => "pbp",
            Stage::Procurement => "procurement",
            Stage::Opw => "opw",
            Stage::Contract => "contract",
            Stage::ApControl => "ap_control",
        }
    }
}

impl core::fmt::Display for Stage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "pbp" => Ok(Stage::Pbp),
            "procurement" => Ok(Stage::Procurement),
            "opw" => Ok(Stage::Opw),
            "contract" => Ok(Stage::Contract),
            "ap_control" | "ap" => Ok(Stage::ApControl),
            other => Err(DomainError::transition(format!("unknown stage '{other}'"))),
        }
    }
}

/// Review decision values recognised by the transition table.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
    InfoRequested,
    RouteToOpw,
    OutsideIr35,
    InsideIr35,
}

impl Decision {
    pub const ALL: [Decision; 6] = [
        Decision::Approved,
        Decision::Rejected,
        Decision::InfoRequested,
        Decision::RouteToOpw,
        Decision::OutsideIr35,
        Decision::InsideIr35,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approved => "approved",
            Decision::Rejected => "rejected",
            Decision::InfoRequested => "info_requested",
            Decision::RouteToOpw => "route_to_opw",
            Decision::OutsideIr35 => "outside_ir35",
            Decision::InsideIr35 => "inside_ir35",
        }
    }
}

impl core::fmt::Display for Decision {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Decision::ALL
            .into_iter()
            .find(|d| d.as_str() == normalized)
            .ok_or_else(|| DomainError::transition(format!("unknown decision '{s}'")))
    }
}

/// Per-stage rule: required role, waiting-status vocabulary and legacy markers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageRule {
    pub stage: Stage,
    pub role: Role,
    /// Statuses under which a submission waits for this stage.
    pub vocabulary: Vec<String>,
    /// Substrings identifying this stage inside legacy status strings.
    pub markers: Vec<String>,
    /// Status restored when the owner answers an info request.
    pub pending_status: String,
}

impl StageRule {
    fn new(stage: Stage, role: Role, vocabulary: &[&str], markers: &[&str], pending_status: &str) -> Self {
        Self {
            stage,
            role,
            vocabulary: vocabulary.iter().map(|s| s.to_string()).collect(),
            markers: markers.iter().map(|s| s.to_string()).collect(),
            pending_status: pending_status.to_string(),
        }
    }

    fn recognises(&self, status: &str) -> bool {
        let status = status.trim().to_ascii_lowercase();
        self.vocabulary.iter().any(|v| *v == status) || self.markers.iter().any(|m| status.contains(m.as_str()))
    }
}

/// One row of the transition table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionRule {
    pub from: Stage,
    pub decision: Decision,
    pub status: String,
    /// `None` keeps the submission at its current stage.
    pub to: Option<Stage>,
    pub terminal: bool,
}

impl TransitionRule {
    fn new(from: Stage, decision: Decision, status: &str, to: Option<Stage>, terminal: bool) -> Self {
        Self {
            from,
            decision,
            status: status.to_string(),
            to,
            terminal,
        }
    }
}

/// Resolved outcome of a `(stage, decision)` lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub status: String,
    pub stage: Stage,
    pub terminal: bool,
}

/// Stage tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageModel {
    rules: Vec<StageRule>,
    transitions: Vec<TransitionRule>,
}

impl Default for StageModel {
    fn default() -> Self {
        Self::standard()
    }
}

impl StageModel {
    pub fn new(rules: Vec<StageRule>, transitions: Vec<TransitionRule>) -> Self {
        Self { rules, transitions }
    }

    /// The onboarding workflow as operated today.
    pub fn standard() -> Self {
        use Decision::*;
        use Stage::*;

        let rules = vec![
            StageRule::new(
                Pbp,
                Role::Pbp,
                &[STATUS_PENDING_REVIEW, "pending_pbp_review", "pbp_info_requested"],
                &["pbp"],
                "pending_pbp_review",
            ),
            StageRule::new(
                Procurement,
                Role::Procurement,
                &["pbp_approved", "pending_procurement_review", "procurement_info_requested"],
                &["procurement"],
                "pending_procurement_review",
            ),
            StageRule::new(
                Opw,
                Role::Opw,
                &["pending_opw_review", "opw_info_requested"],
                &["opw", "ir35"],
                "pending_opw_review",
            ),
            StageRule::new(
                Contract,
                Role::Contract,
                &["pending_contract", "contract_drafting", STATUS_CONTRACT_NEGOTIATING],
                &["contract"],
                "pending_contract",
            ),
            StageRule::new(
                ApControl,
                Role::ApControl,
                &["pending_ap_review", "ap_info_requested"],
                &["ap_", "ap_control"],
                "pending_ap_review",
            ),
        ];

        let mut transitions = vec![
            TransitionRule::new(Pbp, Approved, "pbp_approved", Some(Procurement), false),
            TransitionRule::new(Pbp, InfoRequested, "pbp_info_requested", Some(Pbp), false),
            TransitionRule::new(Procurement, Approved, "pending_ap_review", Some(ApControl), false),
            TransitionRule::new(Procurement, RouteToOpw, "pending_opw_review", Some(Opw), false),
            TransitionRule::new(Procurement, InfoRequested, "procurement_info_requested", Some(Procurement), false),
            TransitionRule::new(Opw, OutsideIr35, "pending_contract", Some(Contract), false),
            TransitionRule::new(Opw, InsideIr35, "pending_ap_review", Some(ApControl), false),
            TransitionRule::new(Opw, InfoRequested, "opw_info_requested", Some(Opw), false),
            TransitionRule::new(Contract, Approved, "pending_ap_review", Some(ApControl), false),
            TransitionRule::new(ApControl, Approved, STATUS_COMPLETED, Some(ApControl), true),
        ];
        for stage in Stage::ALL {
            transitions.push(TransitionRule::new(stage, Rejected, STATUS_REJECTED, None, true));
        }

        Self::new(rules, transitions)
    }

    pub fn rules(&self) -> &[StageRule] {
        &self.rules
    }

    pub fn transitions(&self) -> &[TransitionRule] {
        &self.transitions
    }

    fn rule(&self, stage: Stage) -> Option<&StageRule> {
        self.rules.iter().find(|r| r.stage == stage)
    }

    /// `None` for a stage without a rule; callers must deny.
    pub fn role_for_stage(&self, stage: Stage) -> Option<Role> {
        self.rule(stage).map(|r| r.role)
    }

    /// Empty for a stage without a rule.
    pub fn status_vocabulary_for(&self, stage: Stage) -> BTreeSet<&str> {
        self.rule(stage)
            .map(|r| r.vocabulary.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn next_transition(&self, stage: Stage, decision: Decision) -> Option<Transition> {
        self.transitions
            .iter()
            .find(|t| t.from == stage && t.decision == decision)
            .map(|t| Transition {
                status: t.status.clone(),
                stage: t.to.unwrap_or(stage),
                terminal: t.terminal,
            })
    }

    /// Decisions the table accepts at `stage`.
    pub fn decisions_for(&self, stage: Stage) -> Vec<Decision> {
        self.transitions
            .iter()
            .filter(|t| t.from == stage)
            .map(|t| t.decision)
            .collect()
    }

    /// Pending status restored by a resubmission at `stage`.
    pub fn pending_status_for(&self, stage: Stage) -> Option<&str> {
        self.rule(stage).map(|r| r.pending_status.as_str())
    }

    /// Stages a status string points at, by exact vocabulary or marker.
    pub fn stages_for_status(&self, status: &str) -> BTreeSet<Stage> {
        self.rules
            .iter()
            .filter(|r| r.recognises(status))
            .map(|r| r.stage)
            .collect()
    }

    /// Access-relevant stages of a record: its `current_stage` plus every
    /// stage its status string points at.
    ///
    /// Both signals count so that records written by a path that only set
    /// one of the two fields remain reachable by the right reviewers.
    pub fn derived_stages(&self, status: &str, current_stage: Stage) -> BTreeSet<Stage> {
        let mut stages = self.stages_for_status(status);
        stages.insert(current_stage);
        stages
    }

    /// Best single stage for a legacy status string: exact vocabulary match
    /// first, then the first marker match in workflow order.
    pub fn stage_from_status(&self, status: &str) -> Option<Stage> {
        let status = status.trim().to_ascii_lowercase();
        self.rules
            .iter()
            .find(|r| r.vocabulary.iter().any(|v| *v == status))
            .or_else(|| self.rules.iter().find(|r| r.recognises(&status)))
            .map(|r| r.stage)
    }

    /// Whether `status` is an info-request status of `stage`.
    pub fn is_info_request(&self, stage: Stage, status: &str) -> bool {
        self.transitions.iter().any(|t| {
            t.from == stage && t.decision == Decision::InfoRequested && t.status.eq_ignore_ascii_case(status.trim())
        })
    }
}
