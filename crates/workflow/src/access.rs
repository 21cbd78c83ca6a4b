//! Authorization evaluator.
//!
//! Pure decision functions over `(principal, submission)`. The server calls
//! these before every read and write; the exported [`AccessRuleTable`] lets a
//! client-side guard render from the same rules without being trusted.

use onboard_auth::{Principal, Role};
use serde::Serialize;

use crate::stage::{Stage, StageModel, StageRule, TransitionRule};
use crate::submission::Submission;

/// Why access was granted (first match wins, in this order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "basis")]
pub enum AccessBasis {
    Admin,
    Owner,
    SupplierContact,
    StageReviewer { stage: Stage, role: Role },
    None,
}

/// Result of an access evaluation, for audit and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessExplanation {
    pub granted: bool,
    pub basis: AccessBasis,
    /// Stages the record points at through its status and current stage.
    pub derived_stages: Vec<Stage>,
    /// Roles that would grant stage-reviewer access.
    pub required_roles: Vec<Role>,
}

/// What the caller may do with one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPermissions {
    pub can_view: bool,
    pub can_edit: bool,
    pub can_edit_supplier_contact: bool,
    pub can_respond: bool,
    pub can_resubmit: bool,
    pub can_upload_documents: bool,
    pub reviewable_stages: Vec<Stage>,
}

/// Machine-readable rule table for client guards.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRuleTable<'a> {
    pub evaluation_order: [&'static str; 5],
    pub rejected_visible_to: [&'static str; 2],
    pub admin_role: Role,
    pub stages: &'a [StageRule],
    pub transitions: &'a [TransitionRule],
}

#[derive(Debug, Clone, Copy)]
pub struct AccessEvaluator<'a> {
    model: &'a StageModel,
}

impl<'a> AccessEvaluator<'a> {
    pub fn new(model: &'a StageModel) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &'a StageModel {
        self.model
    }

    pub fn is_owner(principal: &Principal, submission: &Submission) -> bool {
        principal.email_matches(submission.requester_email())
    }

    pub fn is_supplier_contact(principal: &Principal, submission: &Submission) -> bool {
        submission
            .supplier_contact_email()
            .is_some_and(|email| principal.email_matches(email))
    }

    /// Evaluate read access and say why.
    ///
    /// A rejected submission stays visible to its owner and to admins only.
    pub fn explain_access(&self, principal: &Principal, submission: &Submission) -> AccessExplanation {
        let derived: Vec<Stage> = self
            .model
            .derived_stages(submission.status(), submission.current_stage())
            .into_iter()
            .collect();
        let required_roles: Vec<Role> = derived
            .iter()
            .filter_map(|stage| self.model.role_for_stage(*stage))
            .collect();

        let basis = if principal.is_admin() {
            AccessBasis::Admin
        } else if Self::is_owner(principal, submission) {
            AccessBasis::Owner
        } else if submission.is_rejected() {
            AccessBasis::None
        } else if Self::is_supplier_contact(principal, submission) {
            AccessBasis::SupplierContact
        } else {
            derived
                .iter()
                .find_map(|stage| {
                    self.model
                        .role_for_stage(*stage)
                        .filter(|role| principal.has_role(*role))
                        .map(|role| AccessBasis::StageReviewer { stage: *stage, role })
                })
                .unwrap_or(AccessBasis::None)
        };

        AccessExplanation {
            granted: basis != AccessBasis::None,
            basis,
            derived_stages: derived,
            required_roles,
        }
    }

    pub fn can_access(&self, principal: &Principal, submission: &Submission) -> bool {
        self.explain_access(principal, submission).granted
    }

    /// Admin, or the stage's role plus general access.
    ///
    /// A stage without a rule denies everyone, admins included.
    pub fn can_review(&self, principal: &Principal, submission: &Submission, stage: Stage) -> bool {
        let Some(role) = self.model.role_for_stage(stage) else {
            return false;
        };
        principal.is_admin() || (principal.has_role(role) && self.can_access(principal, submission))
    }

    pub fn required_role(&self, stage: Stage) -> Option<Role> {
        self.model.role_for_stage(stage)
    }

    /// Field edits: anyone with access while the submission is open.
    pub fn can_edit(&self, principal: &Principal, submission: &Submission) -> bool {
        !submission.is_terminal() && self.can_access(principal, submission)
    }

    /// Only the owner or an admin may re-point the supplier contact.
    pub fn can_edit_supplier_contact(&self, principal: &Principal, submission: &Submission) -> bool {
        principal.is_admin() || Self::is_owner(principal, submission)
    }

    /// Owner or supplier replies during contract negotiation.
    pub fn can_respond(&self, principal: &Principal, submission: &Submission) -> bool {
        !submission.is_terminal()
            && submission.current_stage() == Stage::Contract
            && (principal.is_admin()
                || Self::is_owner(principal, submission)
                || Self::is_supplier_contact(principal, submission))
    }

    /// Owner answers an info request.
    pub fn can_resubmit(&self, principal: &Principal, submission: &Submission) -> bool {
        !submission.is_terminal()
            && self
                .model
                .is_info_request(submission.current_stage(), submission.status())
            && (principal.is_admin() || Self::is_owner(principal, submission))
    }

    pub fn permissions(&self, principal: &Principal, submission: &Submission) -> SubmissionPermissions {
        let can_view = self.can_access(principal, submission);
        let open = !submission.is_terminal();
        let stage = submission.current_stage();
        SubmissionPermissions {
            can_view,
            can_edit: open && can_view,
            can_edit_supplier_contact: open && self.can_edit_supplier_contact(principal, submission),
            can_respond: self.can_respond(principal, submission),
            can_resubmit: self.can_resubmit(principal, submission),
            can_upload_documents: open && can_view,
            reviewable_stages: if open && self.can_review(principal, submission, stage) {
                vec![stage]
            } else {
                Vec::new()
            },
        }
    }

    pub fn rule_table(&self) -> AccessRuleTable<'a> {
        AccessRuleTable {
            evaluation_order: ["admin", "owner", "supplier_contact", "stage_reviewer", "deny"],
            rejected_visible_to: ["admin", "owner"],
            admin_role: Role::Admin,
            stages: self.model.rules(),
            transitions: self.model.transitions(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use onboard_auth::{Identity, RoleRegistry};
    use onboard_core::SubmissionId;
    use proptest::prelude::*;

    use super::*;
    use crate::patch::SupplierDetails;
    use crate::submission::LegacyRecord;

    const OWNER: &str = "sarah.johnson@nhs.net";
    const SUPPLIER: &str = "jo@acme.co.uk";

    fn principal(email: &str, groups: &[&str]) -> Principal {
        Principal::resolve(
            Identity::new(email, "Someone", groups.iter().copied()),
            &RoleRegistry::with_defaults(),
        )
    }

    fn submission(status: &str, stage: Stage) -> Submission {
        Submission::from_legacy(
            LegacyRecord {
                submission_id: "SUP-2024-7K2QD".parse::<SubmissionId>().unwrap(),
                requester_email: OWNER.into(),
                requester_name: "Sarah Johnson".into(),
                supplier_contact_email: Some(SUPPLIER.into()),
                status: Some(status.into()),
                current_stage: Some(stage),
                details: SupplierDetails::default(),
                created_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
                updated_at: None,
            },
            &StageModel::standard(),
        )
        .unwrap()
    }

    #[test]
    fn owner_matches_case_insensitively_without_roles() {
        let model = StageModel::standard();
        let eval = AccessEvaluator::new(&model);
        let s = submission("pending_review", Stage::Pbp);
        let p = principal("Sarah.Johnson@NHS.net", &[]);
        let e = eval.explain_access(&p, &s);
        assert!(e.granted);
        assert_eq!(e.basis, AccessBasis::Owner);
    }

    #[test]
    fn supplier_contact_can_view_at_contract_stage() {
        let model = StageModel::standard();
        let eval = AccessEvaluator::new(&model);
        let s = submission("pending_contract", Stage::Contract);
        let p = principal(SUPPLIER, &[]);
        assert!(eval.can_access(&p, &s));
        assert!(eval.can_respond(&p, &s));
        assert!(!eval.can_review(&p, &s, Stage::Contract));
    }

    #[test]
    fn stage_reviewer_needs_matching_role() {
        let model = StageModel::standard();
        let eval = AccessEvaluator::new(&model);
        let s = submission("pbp_approved", Stage::Procurement);
        let procurement = principal("p@nhs.net", &["supplier-onboarding-procurement"]);
        let opw = principal("o@nhs.net", &["supplier-onboarding-opw-panel"]);
        assert!(eval.can_access(&procurement, &s));
        assert!(eval.can_review(&procurement, &s, Stage::Procurement));
        assert!(!eval.can_access(&opw, &s));
    }

    #[test]
    fn pbp_reviewer_cannot_review_at_procurement() {
        let model = StageModel::standard();
        let eval = AccessEvaluator::new(&model);
        let s = submission("pending_procurement_review", Stage::Procurement);
        let pbp = principal("pat@nhs.net", &["supplier-onboarding-pbp"]);
        assert!(!eval.can_review(&pbp, &s, Stage::Procurement));
    }

    #[test]
    fn status_marker_grants_access_when_stage_lags() {
        let model = StageModel::standard();
        let eval = AccessEvaluator::new(&model);
        // Legacy path wrote the status but left the stage behind.
        let s = submission("pending_opw_review", Stage::Procurement);
        let opw = principal("o@nhs.net", &["supplier-onboarding-opw-panel"]);
        let e = eval.explain_access(&opw, &s);
        assert_eq!(
            e.basis,
            AccessBasis::StageReviewer {
                stage: Stage::Opw,
                role: Role::Opw
            }
        );
        assert!(e.required_roles.contains(&Role::Procurement));
    }

    #[test]
    fn rejected_submission_visible_to_owner_and_admin_only() {
        let model = StageModel::standard();
        let eval = AccessEvaluator::new(&model);
        let s = submission("rejected", Stage::Opw);
        assert!(eval.can_access(&principal(OWNER, &[]), &s));
        assert!(eval.can_access(&principal("root@nhs.net", &["supplier-onboarding-admins"]), &s));
        assert!(!eval.can_access(&principal(SUPPLIER, &[]), &s));
        assert!(!eval.can_access(&principal("o@nhs.net", &["supplier-onboarding-opw-panel"]), &s));
        assert!(!eval.permissions(&principal(OWNER, &[]), &s).can_edit);
    }

    #[test]
    fn stage_without_rule_denies_review_even_for_admin() {
        let standard = StageModel::standard();
        let rules = standard
            .rules()
            .iter()
            .filter(|r| r.stage != Stage::Contract)
            .cloned()
            .collect();
        let model = StageModel::new(rules, standard.transitions().to_vec());
        let eval = AccessEvaluator::new(&model);
        let s = submission("pending_contract", Stage::Contract);
        let admin = principal("root@nhs.net", &["supplier-onboarding-admins"]);
        assert!(!eval.can_review(&admin, &s, Stage::Contract));
        assert!(eval.can_access(&admin, &s));
    }

    #[test]
    fn resubmit_only_after_info_request() {
        let model = StageModel::standard();
        let eval = AccessEvaluator::new(&model);
        let owner = principal(OWNER, &[]);
        assert!(eval.can_resubmit(&owner, &submission("pbp_info_requested", Stage::Pbp)));
        assert!(!eval.can_resubmit(&owner, &submission("pending_review", Stage::Pbp)));
        assert!(!eval.can_resubmit(&principal(SUPPLIER, &[]), &submission("pbp_info_requested", Stage::Pbp)));
    }

    #[test]
    fn rule_table_exports_as_json() {
        let model = StageModel::standard();
        let eval = AccessEvaluator::new(&model);
        let json = serde_json::to_value(eval.rule_table()).unwrap();
        assert_eq!(json["evaluationOrder"][0], "admin");
        assert_eq!(json["stages"].as_array().unwrap().len(), 5);
        assert_eq!(json["stages"][0]["role"], "PBP");
    }

    // ─────────────────────────────────────────────────────────────────────
    // Properties
    // ─────────────────────────────────────────────────────────────────────

    const GROUPS: [&str; 7] = [
        "supplier-onboarding-requesters",
        "supplier-onboarding-pbp",
        "supplier-onboarding-procurement",
        "supplier-onboarding-opw-panel",
        "supplier-onboarding-contract-drafters",
        "supplier-onboarding-ap-control",
        "unrelated-group",
    ];

    const STATUSES: [&str; 19] = [
        "pending_review",
        "pending_pbp_review",
        "pbp_info_requested",
        "pbp_approved",
        "pending_procurement_review",
        "procurement_info_requested",
        "pending_opw_review",
        "opw_info_requested",
        "pending_contract",
        "contract_drafting",
        "contract_negotiating",
        "pending_ap_review",
        "ap_info_requested",
        "completed",
        "rejected",
        "ir35_check",
        "on_hold",
        "approved",
        "",
    ];

    fn arb_stage() -> impl Strategy<Value = Stage> {
        prop::sample::select(Stage::ALL.to_vec())
    }

    fn arb_groups() -> impl Strategy<Value = Vec<&'static str>> {
        prop::sample::subsequence(GROUPS.to_vec(), 0..=GROUPS.len())
    }

    fn arb_email() -> impl Strategy<Value = String> {
        prop::sample::select(vec![
            OWNER.to_string(),
            OWNER.to_uppercase(),
            SUPPLIER.to_string(),
            "someone.else@nhs.net".to_string(),
            String::new(),
        ])
    }

    fn arb_submission() -> impl Strategy<Value = Submission> {
        (prop::sample::select(STATUSES.to_vec()), arb_stage())
            .prop_map(|(status, stage)| submission(status, stage))
    }

    proptest! {
        #[test]
        fn admin_always_has_access(s in arb_submission(), email in arb_email(), groups in arb_groups()) {
            let model = StageModel::standard();
            let eval = AccessEvaluator::new(&model);
            let mut groups = groups;
            groups.push("supplier-onboarding-admins");
            prop_assert!(eval.can_access(&principal(&email, &groups), &s));
        }

        #[test]
        fn owner_always_has_access(s in arb_submission(), groups in arb_groups()) {
            let model = StageModel::standard();
            let eval = AccessEvaluator::new(&model);
            prop_assert!(eval.can_access(&principal(OWNER, &groups), &s));
        }

        #[test]
        fn review_implies_access(s in arb_submission(), email in arb_email(), groups in arb_groups(), stage in arb_stage()) {
            let model = StageModel::standard();
            let eval = AccessEvaluator::new(&model);
            let p = principal(&email, &groups);
            if eval.can_review(&p, &s, stage) {
                prop_assert!(eval.can_access(&p, &s));
            }
        }

        #[test]
        fn strangers_without_stage_role_are_denied(s in arb_submission(), groups in arb_groups()) {
            let model = StageModel::standard();
            let eval = AccessEvaluator::new(&model);
            let p = principal("someone.else@nhs.net", &groups);
            let holds_derived_role = model
                .derived_stages(s.status(), s.current_stage())
                .into_iter()
                .filter_map(|stage| model.role_for_stage(stage))
                .any(|role| p.has_role(role));
            if !holds_derived_role {
                prop_assert!(!eval.can_access(&p, &s));
            }
        }
    }
}
