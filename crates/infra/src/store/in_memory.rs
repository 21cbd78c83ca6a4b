use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use onboard_core::{AggregateRoot, ExpectedVersion, SubmissionId};
use onboard_workflow::{Stage, Submission};

use super::{StoreError, SubmissionRepository};

/// In-memory submission store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemorySubmissionStore {
    inner: RwLock<HashMap<SubmissionId, Submission>>,
}

impl InMemorySubmissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn filtered(&self, keep: impl Fn(&Submission) -> bool) -> Result<Vec<Submission>, StoreError> {
        let map = self
            .inner
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        let mut out: Vec<Submission> = map.values().filter(|s| keep(s)).cloned().collect();
        out.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.submission_id().cmp(b.submission_id()))
        });
        Ok(out)
    }
}

#[async_trait]
impl SubmissionRepository for InMemorySubmissionStore {
    async fn get(&self, id: &SubmissionId) -> Result<Option<Submission>, StoreError> {
        let map = self
            .inner
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(map.get(id).cloned())
    }

    async fn insert(&self, submission: &Submission) -> Result<(), StoreError> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        let id = submission.submission_id().clone();
        if map.contains_key(&id) {
            return Err(StoreError::DuplicateId(id));
        }
        map.insert(id, submission.clone());
        Ok(())
    }

    async fn save(&self, submission: &Submission, expected: ExpectedVersion) -> Result<(), StoreError> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        let id = submission.submission_id();
        let Some(current) = map.get(id) else {
            return Err(StoreError::Missing(id.clone()));
        };
        if !expected.matches(current.version()) {
            return Err(StoreError::Conflict(format!(
                "{id}: expected {expected:?}, stored version {}",
                current.version()
            )));
        }
        map.insert(id.clone(), submission.clone());
        Ok(())
    }

    async fn list_at_stage(&self, stage: Stage) -> Result<Vec<Submission>, StoreError> {
        self.filtered(|s| s.current_stage() == stage)
    }

    async fn list_for_email(&self, email: &str) -> Result<Vec<Submission>, StoreError> {
        let email = email.trim();
        if email.is_empty() {
            return Ok(Vec::new());
        }
        self.filtered(|s| {
            s.requester_email().eq_ignore_ascii_case(email)
                || s.supplier_contact_email().is_some_and(|c| c.eq_ignore_ascii_case(email))
        })
    }

    async fn list_open(&self) -> Result<Vec<Submission>, StoreError> {
        self.filtered(|s| !s.is_rejected())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use onboard_events::execute;
    use onboard_workflow::{CreateSubmission, SubmissionCommand, SupplierDetails, UpdateSubmission, SubmissionPatch};

    use super::*;

    fn new_submission(id: &str, email: &str, minutes_ago: i64) -> Submission {
        let id: SubmissionId = id.parse().unwrap();
        let mut s = Submission::empty(id.clone());
        execute(
            &mut s,
            &SubmissionCommand::Create(CreateSubmission {
                submission_id: id,
                requester_email: email.into(),
                requester_name: String::new(),
                supplier_contact_email: None,
                details: SupplierDetails::default(),
                occurred_at: Utc::now() - Duration::minutes(minutes_ago),
            }),
        )
        .unwrap();
        s
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_ids() {
        let store = InMemorySubmissionStore::new();
        let s = new_submission("SUP-2024-AAAAA", "a@nhs.net", 0);
        store.insert(&s).await.unwrap();
        assert!(matches!(store.insert(&s).await, Err(StoreError::DuplicateId(_))));
    }

    #[tokio::test]
    async fn stale_save_is_a_conflict() {
        let store = InMemorySubmissionStore::new();
        let s = new_submission("SUP-2024-AAAAA", "a@nhs.net", 0);
        store.insert(&s).await.unwrap();

        let mut first = s.clone();
        let mut second = s.clone();
        let update = SubmissionCommand::Update(UpdateSubmission {
            patch: SubmissionPatch::default(),
            actor: "a@nhs.net".into(),
            occurred_at: Utc::now(),
        });
        execute(&mut first, &update).unwrap();
        execute(&mut second, &update).unwrap();

        store.save(&first, ExpectedVersion::Exact(s.version())).await.unwrap();
        let err = store.save(&second, ExpectedVersion::Exact(s.version())).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn listings_are_oldest_first() {
        let store = InMemorySubmissionStore::new();
        store.insert(&new_submission("SUP-2024-BBBBB", "a@nhs.net", 1)).await.unwrap();
        store.insert(&new_submission("SUP-2024-AAAAA", "A@NHS.NET", 10)).await.unwrap();
        store.insert(&new_submission("SUP-2024-CCCCC", "b@nhs.net", 5)).await.unwrap();

        let ids: Vec<String> = store
            .list_at_stage(Stage::Pbp)
            .await
            .unwrap()
            .iter()
            .map(|s| s.submission_id().to_string())
            .collect();
        assert_eq!(ids, vec!["SUP-2024-AAAAA", "SUP-2024-CCCCC", "SUP-2024-BBBBB"]);

        let mine = store.list_for_email("a@nhs.net").await.unwrap();
        assert_eq!(mine.len(), 2);
        assert!(store.list_for_email("  ").await.unwrap().is_empty());
    }
}
