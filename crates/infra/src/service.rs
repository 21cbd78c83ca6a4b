//! Submission State Store service.
//!
//! Every mutation follows one pipeline:
//!
//! ```text
//! load -> authorize (audited on denial) -> decide (aggregate) -> save with
//! expected version -> audit (best effort)
//! ```
//!
//! Authorization is evaluated here against the server-resolved [`Principal`],
//! whatever an upstream guard may already have decided.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

use onboard_auth::{Principal, Role};
use onboard_core::{AggregateRoot, ExpectedVersion, SubmissionId};
use onboard_events::{AuditAction, AuditEvent, execute};
use onboard_workflow::{
    AccessEvaluator, AccessExplanation, AccessRuleTable, AttachDocument, CreateSubmission, Decision, DocumentRecord,
    DocumentType, ExchangeKind, ExchangeSender, FlagDuplicate, NewSubmission, PostExchange,
    RecordCompanyVerification, RecordDecision, Resubmit, Reviewer, Stage, StageModel, Submission, SubmissionCommand,
    SubmissionEvent, SubmissionPatch, SubmissionPermissions, SubmissionSummary, Transition, UpdateSubmission,
};

use crate::audit::AuditRecorder;
use crate::duplicates::DuplicateDetector;
use crate::error::WorkflowError;
use crate::external::{CompanyRegistry, DocumentStore};
use crate::store::{StoreError, SubmissionRepository};

const MAX_ID_ATTEMPTS: usize = 5;
const DEFAULT_MAX_DOCUMENT_BYTES: usize = 10 * 1024 * 1024;

/// A review decision as requested by a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewRequest {
    pub stage: Stage,
    pub decision: Decision,
    pub rationale: String,
    /// Version the caller last saw, if it sent one.
    pub expected_version: Option<u64>,
}

/// A contract-stage message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeRequest {
    pub body: String,
    pub attachments: Vec<String>,
}

/// What the caller may do with a submission, and why they can see it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessReport {
    pub submission_id: SubmissionId,
    pub version: u64,
    pub permissions: SubmissionPermissions,
    pub explanation: AccessExplanation,
}

#[derive(Clone)]
pub struct SubmissionService {
    store: Arc<dyn SubmissionRepository>,
    model: Arc<StageModel>,
    audit: AuditRecorder,
    documents: Arc<dyn DocumentStore>,
    registry: Arc<dyn CompanyRegistry>,
    duplicates: DuplicateDetector,
    max_document_bytes: usize,
}

impl SubmissionService {
    pub fn new(
        store: Arc<dyn SubmissionRepository>,
        model: Arc<StageModel>,
        audit: AuditRecorder,
        documents: Arc<dyn DocumentStore>,
        registry: Arc<dyn CompanyRegistry>,
    ) -> Self {
        Self {
            store,
            model,
            audit,
            documents,
            registry,
            duplicates: DuplicateDetector::new(),
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
        }
    }

    pub fn with_max_document_bytes(mut self, max: usize) -> Self {
        self.max_document_bytes = max;
        self
    }

    pub fn max_document_bytes(&self) -> usize {
        self.max_document_bytes
    }

    pub fn model(&self) -> &StageModel {
        &self.model
    }

    pub fn evaluator(&self) -> AccessEvaluator<'_> {
        AccessEvaluator::new(&self.model)
    }

    pub fn rule_table(&self) -> AccessRuleTable<'_> {
        self.evaluator().rule_table()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────

    #[instrument(skip(self, actor), fields(actor = %actor.email()), err)]
    pub async fn get(&self, id: &SubmissionId, actor: &Principal) -> Result<Submission, WorkflowError> {
        let submission = self.load(id).await?;
        self.require_access(actor, &submission)?;
        self.audit
            .record(self.audit.success(actor, AuditAction::SubmissionViewed, id.as_str()));
        Ok(submission)
    }

    /// Submissions the actor owns or is the supplier contact for, newest first.
    #[instrument(skip(self, actor), fields(actor = %actor.email()), err)]
    pub async fn list_mine(&self, actor: &Principal) -> Result<Vec<SubmissionSummary>, WorkflowError> {
        let evaluator = self.evaluator();
        let mut items: Vec<SubmissionSummary> = self
            .store
            .list_for_email(actor.email())
            .await?
            .iter()
            .filter(|s| evaluator.can_access(actor, s))
            .map(SubmissionSummary::from)
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }

    #[instrument(skip(self, actor), fields(actor = %actor.email()), err)]
    pub async fn access_report(&self, id: &SubmissionId, actor: &Principal) -> Result<AccessReport, WorkflowError> {
        let submission = self.load(id).await?;
        self.require_access(actor, &submission)?;
        let evaluator = self.evaluator();
        Ok(AccessReport {
            submission_id: id.clone(),
            version: submission.version(),
            permissions: evaluator.permissions(actor, &submission),
            explanation: evaluator.explain_access(actor, &submission),
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Create / update
    // ─────────────────────────────────────────────────────────────────────

    /// Create a submission at `pbp` / `pending_review`.
    ///
    /// The owner is `nhs_email` when given, otherwise the actor.
    #[instrument(skip(self, input, actor), fields(actor = %actor.email()), err)]
    pub async fn create(&self, input: NewSubmission, actor: &Principal) -> Result<Submission, WorkflowError> {
        if !actor.has_role(Role::Requester) {
            self.audit.denied(actor, "submissions", Some(Role::Requester));
            return Err(WorkflowError::denied("submissions", Some(Role::Requester)));
        }

        let requester_email = input
            .nhs_email
            .clone()
            .unwrap_or_else(|| actor.email().to_string());
        let requester_name = if actor.email_matches(&requester_email) {
            actor.display_name().to_string()
        } else {
            String::new()
        };
        let open = self.store.list_open().await?;

        for attempt in 1..=MAX_ID_ATTEMPTS {
            let id = SubmissionId::generate();
            let now = Utc::now();
            let mut submission = Submission::empty(id.clone());
            execute(
                &mut submission,
                &SubmissionCommand::Create(CreateSubmission {
                    submission_id: id.clone(),
                    requester_email: requester_email.clone(),
                    requester_name: requester_name.clone(),
                    supplier_contact_email: input.supplier_contact_email.clone(),
                    details: input.details.clone(),
                    occurred_at: now,
                }),
            )?;

            let duplicate_of = self.duplicates.find_duplicate(&submission, open.iter());
            if let Some(original) = &duplicate_of {
                execute(
                    &mut submission,
                    &SubmissionCommand::FlagDuplicate(FlagDuplicate {
                        duplicate_of: original.clone(),
                        occurred_at: now,
                    }),
                )?;
            }

            match self.store.insert(&submission).await {
                Ok(()) => {
                    tracing::info!(submission_id = %id, "submission created");
                    self.audit.record(
                        self.audit
                            .success(actor, AuditAction::SubmissionCreated, id.as_str())
                            .with_status_change(None, Some(submission.status().to_string())),
                    );
                    if let Some(original) = duplicate_of {
                        tracing::info!(submission_id = %id, duplicate_of = %original, "possible duplicate supplier");
                        self.audit
                            .record(self.audit.success(actor, AuditAction::DuplicateFlagged, id.as_str()));
                    }
                    return Ok(submission);
                }
                Err(StoreError::DuplicateId(taken)) => {
                    tracing::warn!(%taken, attempt, "submission id collision; regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(WorkflowError::Conflict("could not allocate a unique submission id".to_string()))
    }

    /// Apply an allow-listed patch.
    ///
    /// An empty patch only re-stamps `updated_at`.
    #[instrument(skip(self, patch, actor), fields(actor = %actor.email()), err)]
    pub async fn update(
        &self,
        id: &SubmissionId,
        patch: SubmissionPatch,
        expected_version: Option<u64>,
        actor: &Principal,
    ) -> Result<Submission, WorkflowError> {
        let mut submission = self.load(id).await?;
        self.require_access(actor, &submission)?;
        ensure_not_terminal(&submission)?;
        if patch.touches_supplier_contact() && !self.evaluator().can_edit_supplier_contact(actor, &submission) {
            return Err(self.deny(actor, id, None));
        }

        let previous_status = submission.status().to_string();
        let events = self
            .commit(
                &mut submission,
                SubmissionCommand::Update(UpdateSubmission {
                    patch,
                    actor: actor.email().to_string(),
                    occurred_at: Utc::now(),
                }),
                expected_version,
            )
            .await?;

        let changed_fields = events
            .iter()
            .find_map(|e| match e {
                SubmissionEvent::Updated(u) => Some(u.changed_fields.clone()),
                _ => None,
            })
            .unwrap_or_default();
        tracing::info!(submission_id = %id, changed = ?changed_fields, "submission updated");
        self.audit.record(
            self.audit
                .success(actor, AuditAction::SubmissionUpdated, id.as_str())
                .with_status_change(Some(previous_status), Some(submission.status().to_string()))
                .with_changed_fields(changed_fields),
        );
        Ok(submission)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reviews
    // ─────────────────────────────────────────────────────────────────────

    /// Record a stage decision and advance per the transition table.
    ///
    /// Checks run in a fixed order: existence, terminal state (for every
    /// caller, admins included), reviewer authorization, current stage, then
    /// the transition table.
    #[instrument(
        skip(self, request, actor),
        fields(actor = %actor.email(), stage = %request.stage, decision = %request.decision),
        err
    )]
    pub async fn record_review(
        &self,
        id: &SubmissionId,
        request: ReviewRequest,
        actor: &Principal,
    ) -> Result<Submission, WorkflowError> {
        let mut submission = self.load(id).await?;
        ensure_not_terminal(&submission)?;

        let evaluator = self.evaluator();
        let required = evaluator.required_role(request.stage);
        if !evaluator.can_review(actor, &submission, request.stage) {
            return Err(self.deny(actor, id, required));
        }
        if request.stage != submission.current_stage() {
            return Err(WorkflowError::Transition(format!(
                "submission is at stage '{}', not '{}'",
                submission.current_stage(),
                request.stage
            )));
        }
        let transition = self
            .model
            .next_transition(request.stage, request.decision)
            .ok_or_else(|| {
                WorkflowError::Transition(format!(
                    "decision '{}' is not available at stage '{}'",
                    request.decision, request.stage
                ))
            })?;

        let previous_status = submission.status().to_string();
        let terminal = transition.terminal;
        let events = self
            .commit(
                &mut submission,
                SubmissionCommand::RecordDecision(RecordDecision {
                    stage: request.stage,
                    decision: request.decision,
                    rationale: request.rationale,
                    reviewer: Reviewer::acting_for(actor, required),
                    transition,
                    occurred_at: Utc::now(),
                }),
                request.expected_version,
            )
            .await?;

        tracing::info!(
            submission_id = %id,
            from = %previous_status,
            to = %submission.status(),
            terminal,
            "review recorded"
        );
        let status_change = |event: AuditEvent| {
            event.with_status_change(Some(previous_status.clone()), Some(submission.status().to_string()))
        };
        self.audit.record(status_change(self.audit.success(
            actor,
            AuditAction::ReviewRecorded,
            id.as_str(),
        )));
        for event in &events {
            let action = match event {
                SubmissionEvent::Rejected(_) => AuditAction::SubmissionRejected,
                SubmissionEvent::Completed(_) => AuditAction::SubmissionCompleted,
                _ => continue,
            };
            self.audit
                .record(status_change(self.audit.success(actor, action, id.as_str())));
        }
        Ok(submission)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Contract exchanges
    // ─────────────────────────────────────────────────────────────────────

    /// Contract team message to the requester / supplier.
    #[instrument(skip(self, request, actor), fields(actor = %actor.email()), err)]
    pub async fn post_exchange(
        &self,
        id: &SubmissionId,
        request: ExchangeRequest,
        actor: &Principal,
    ) -> Result<Submission, WorkflowError> {
        let submission = self.load(id).await?;
        ensure_not_terminal(&submission)?;
        if !self.evaluator().can_review(actor, &submission, Stage::Contract) {
            return Err(self.deny(actor, id, Some(Role::Contract)));
        }
        let sender = if actor.is_admin() {
            ExchangeSender::Admin
        } else {
            ExchangeSender::ContractDrafter
        };
        self.append_exchange(submission, ExchangeKind::Message, sender, request, actor)
            .await
    }

    /// Owner or supplier contact reply during contract negotiation.
    #[instrument(skip(self, request, actor), fields(actor = %actor.email()), err)]
    pub async fn respond(
        &self,
        id: &SubmissionId,
        request: ExchangeRequest,
        actor: &Principal,
    ) -> Result<Submission, WorkflowError> {
        let submission = self.load(id).await?;
        self.require_access(actor, &submission)?;
        ensure_not_terminal(&submission)?;

        let sender = if actor.is_admin() {
            ExchangeSender::Admin
        } else if AccessEvaluator::is_owner(actor, &submission) {
            ExchangeSender::Requester
        } else if AccessEvaluator::is_supplier_contact(actor, &submission) {
            ExchangeSender::Supplier
        } else {
            return Err(self.deny(actor, id, None));
        };
        self.append_exchange(submission, ExchangeKind::Response, sender, request, actor)
            .await
    }

    async fn append_exchange(
        &self,
        mut submission: Submission,
        kind: ExchangeKind,
        sender_role: ExchangeSender,
        request: ExchangeRequest,
        actor: &Principal,
    ) -> Result<Submission, WorkflowError> {
        let id = submission.submission_id().clone();
        let previous_status = submission.status().to_string();
        self.commit(
            &mut submission,
            SubmissionCommand::PostExchange(PostExchange {
                exchange_id: Uuid::now_v7(),
                kind,
                sender_role,
                sender_email: actor.email().to_string(),
                body: request.body,
                attachments: request.attachments,
                occurred_at: Utc::now(),
            }),
            None,
        )
        .await?;

        tracing::info!(submission_id = %id, ?kind, exchanges = submission.exchanges().len(), "exchange appended");
        self.audit.record(
            self.audit
                .success(actor, AuditAction::ExchangeAppended, id.as_str())
                .with_status_change(Some(previous_status), Some(submission.status().to_string())),
        );
        Ok(submission)
    }

    /// Owner answers an info request; the stage's pending status is restored.
    #[instrument(skip(self, actor), fields(actor = %actor.email()), err)]
    pub async fn resubmit(&self, id: &SubmissionId, actor: &Principal) -> Result<Submission, WorkflowError> {
        let mut submission = self.load(id).await?;
        self.require_access(actor, &submission)?;
        ensure_not_terminal(&submission)?;
        if !(actor.is_admin() || AccessEvaluator::is_owner(actor, &submission)) {
            return Err(self.deny(actor, id, None));
        }

        let stage = submission.current_stage();
        if !self.model.is_info_request(stage, submission.status()) {
            return Err(WorkflowError::Transition(format!(
                "submission is not awaiting information (status '{}')",
                submission.status()
            )));
        }
        let status = self
            .model
            .pending_status_for(stage)
            .ok_or_else(|| WorkflowError::Transition(format!("stage '{stage}' has no pending status")))?
            .to_string();

        let previous_status = submission.status().to_string();
        self.commit(
            &mut submission,
            SubmissionCommand::Resubmit(Resubmit {
                actor: actor.email().to_string(),
                transition: Transition {
                    status,
                    stage,
                    terminal: false,
                },
                occurred_at: Utc::now(),
            }),
            None,
        )
        .await?;

        tracing::info!(submission_id = %id, %stage, "submission resubmitted");
        self.audit.record(
            self.audit
                .success(actor, AuditAction::SubmissionResubmitted, id.as_str())
                .with_status_change(Some(previous_status), Some(submission.status().to_string())),
        );
        Ok(submission)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Documents and external checks
    // ─────────────────────────────────────────────────────────────────────

    /// Store the bytes, then record metadata. Re-uploading a type replaces it.
    #[instrument(skip(self, bytes, actor), fields(actor = %actor.email(), size = bytes.len()), err)]
    pub async fn attach_document(
        &self,
        id: &SubmissionId,
        document_type: DocumentType,
        file_name: &str,
        bytes: &[u8],
        actor: &Principal,
    ) -> Result<Submission, WorkflowError> {
        let mut submission = self.load(id).await?;
        self.require_access(actor, &submission)?;
        ensure_not_terminal(&submission)?;

        if bytes.is_empty() {
            return Err(WorkflowError::invalid("file", "must not be empty"));
        }
        if bytes.len() > self.max_document_bytes {
            return Err(WorkflowError::invalid(
                "file",
                format!("must not exceed {} bytes", self.max_document_bytes),
            ));
        }
        if file_name.trim().is_empty() {
            return Err(WorkflowError::invalid("fileName", "is required"));
        }

        let storage_path = self.documents.put(id, document_type, file_name, bytes).await?;
        self.commit(
            &mut submission,
            SubmissionCommand::AttachDocument(AttachDocument {
                document: DocumentRecord::new(
                    document_type,
                    file_name.trim(),
                    storage_path,
                    bytes.len() as u64,
                    actor.email(),
                    Utc::now(),
                ),
            }),
            None,
        )
        .await?;

        tracing::info!(submission_id = %id, %document_type, sensitive = document_type.is_sensitive(), "document attached");
        self.audit.record(
            self.audit
                .success(actor, AuditAction::DocumentAttached, id.as_str())
                .with_changed_fields(vec![document_type.as_str().to_string()]),
        );
        Ok(submission)
    }

    /// Look the registration number up; an unavailable registry records `None`.
    #[instrument(skip(self, actor), fields(actor = %actor.email()), err)]
    pub async fn verify_company(&self, id: &SubmissionId, actor: &Principal) -> Result<Submission, WorkflowError> {
        let mut submission = self.load(id).await?;
        self.require_access(actor, &submission)?;
        ensure_not_terminal(&submission)?;

        let Some(number) = submission.details().company_registration_number.clone() else {
            return Err(WorkflowError::invalid("companyRegistrationNumber", "is required"));
        };
        let verified = match self.registry.is_registered(&number).await {
            Ok(found) => Some(found),
            Err(e) => {
                tracing::warn!(submission_id = %id, error = %e, "company registry lookup failed");
                None
            }
        };

        self.commit(
            &mut submission,
            SubmissionCommand::RecordCompanyVerification(RecordCompanyVerification {
                verified,
                occurred_at: Utc::now(),
            }),
            None,
        )
        .await?;

        tracing::info!(submission_id = %id, ?verified, "company verification recorded");
        self.audit
            .record(self.audit.success(actor, AuditAction::CompanyVerified, id.as_str()));
        Ok(submission)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Pipeline helpers
    // ─────────────────────────────────────────────────────────────────────

    async fn load(&self, id: &SubmissionId) -> Result<Submission, WorkflowError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(id.to_string()))
    }

    fn require_access(&self, actor: &Principal, submission: &Submission) -> Result<(), WorkflowError> {
        let explanation = self.evaluator().explain_access(actor, submission);
        if explanation.granted {
            return Ok(());
        }
        let required = explanation.required_roles.first().copied();
        Err(self.deny(actor, submission.submission_id(), required))
    }

    fn deny(&self, actor: &Principal, id: &SubmissionId, required: Option<Role>) -> WorkflowError {
        self.audit.denied(actor, id.as_str(), required);
        WorkflowError::denied(id.as_str(), required)
    }

    /// Decide, apply and save against the loaded version.
    ///
    /// A caller-supplied version must match what was loaded; the store then
    /// re-checks it so a concurrent save in between is also a conflict.
    async fn commit(
        &self,
        submission: &mut Submission,
        command: SubmissionCommand,
        expected_version: Option<u64>,
    ) -> Result<Vec<SubmissionEvent>, WorkflowError> {
        let loaded = submission.version();
        ExpectedVersion::from_precondition(expected_version).check(loaded)?;
        let events = execute(submission, &command)?;
        if events.is_empty() {
            return Ok(events);
        }
        self.store.save(submission, ExpectedVersion::Exact(loaded)).await?;
        Ok(events)
    }
}

fn ensure_not_terminal(submission: &Submission) -> Result<(), WorkflowError> {
    if submission.is_rejected() {
        return Err(WorkflowError::Transition(format!(
            "submission {} has been rejected",
            submission.submission_id()
        )));
    }
    if submission.is_completed() {
        return Err(WorkflowError::Transition(format!(
            "submission {} is already completed",
            submission.submission_id()
        )));
    }
    Ok(())
}
