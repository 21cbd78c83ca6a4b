//! Work queue resolver: what is waiting at a stage.

use std::sync::Arc;

use tracing::instrument;

use onboard_auth::Principal;
use onboard_events::AuditAction;
use onboard_workflow::{Stage, StageModel, SubmissionSummary};

use crate::audit::AuditRecorder;
use crate::error::WorkflowError;
use crate::store::SubmissionRepository;

#[derive(Clone)]
pub struct WorkQueueResolver {
    store: Arc<dyn SubmissionRepository>,
    model: Arc<StageModel>,
    audit: AuditRecorder,
}

impl WorkQueueResolver {
    pub fn new(store: Arc<dyn SubmissionRepository>, model: Arc<StageModel>, audit: AuditRecorder) -> Self {
        Self { store, model, audit }
    }

    /// Oldest-first queue for a stage key such as `"pbp"` or `"ap"`.
    ///
    /// A caller without the stage's role gets `AccessDenied`, never an empty
    /// list. An unknown stage key has no role: admins see an empty queue,
    /// everyone else is denied.
    #[instrument(skip(self, actor), fields(actor = %actor.email()), err)]
    pub async fn queue_for(&self, stage_key: &str, actor: &Principal) -> Result<Vec<SubmissionSummary>, WorkflowError> {
        let resource = format!("queue:{stage_key}");
        let Ok(stage) = stage_key.parse::<Stage>() else {
            if actor.is_admin() {
                return Ok(Vec::new());
            }
            self.audit.denied(actor, &resource, None);
            return Err(WorkflowError::denied(resource, None));
        };

        let required = self.model.role_for_stage(stage);
        let permitted = actor.is_admin() || required.is_some_and(|role| actor.has_role(role));
        if !permitted {
            self.audit.denied(actor, &resource, required);
            return Err(WorkflowError::denied(resource, required));
        }

        let vocabulary = self.model.status_vocabulary_for(stage);
        let mut items: Vec<SubmissionSummary> = self
            .store
            .list_at_stage(stage)
            .await?
            .iter()
            .filter(|s| s.current_stage() == stage && vocabulary.contains(s.status()))
            .map(SubmissionSummary::from)
            .collect();
        items.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.submission_id.cmp(&b.submission_id))
        });

        self.audit
            .record(self.audit.success(actor, AuditAction::QueueViewed, &resource));
        tracing::debug!(%stage, items = items.len(), "queue resolved");
        Ok(items)
    }
}
