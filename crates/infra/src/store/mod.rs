//! Persistent store for submission records.
//!
//! The State Store service is the only writer. Every save carries an
//! [`ExpectedVersion`]; a mismatch surfaces as [`StoreError::Conflict`] rather
//! than silently overwriting a concurrent change.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use onboard_core::{ExpectedVersion, SubmissionId};
use onboard_workflow::{Stage, Submission};

mod in_memory;
mod postgres;

pub use in_memory::InMemorySubmissionStore;
pub use postgres::PostgresSubmissionStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Optimistic concurrency failure (stale version).
    #[error("optimistic concurrency check failed: {0}")]
    Conflict(String),

    /// Insert collided with an existing id.
    #[error("submission id already in use: {0}")]
    DuplicateId(SubmissionId),

    /// Save targeted a record that does not exist.
    #[error("submission not found: {0}")]
    Missing(SubmissionId),

    /// Stored payload could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// Backend unreachable or failing.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    async fn get(&self, id: &SubmissionId) -> Result<Option<Submission>, StoreError>;

    /// Insert a new record. Fails with `DuplicateId` if the id is taken.
    async fn insert(&self, submission: &Submission) -> Result<(), StoreError>;

    /// Replace a record whose stored version matches `expected`.
    async fn save(&self, submission: &Submission, expected: ExpectedVersion) -> Result<(), StoreError>;

    /// Records whose `current_stage` equals `stage`, any status.
    async fn list_at_stage(&self, stage: Stage) -> Result<Vec<Submission>, StoreError>;

    /// Records owned by, or naming as supplier contact, `email` (case-insensitive).
    async fn list_for_email(&self, email: &str) -> Result<Vec<Submission>, StoreError>;

    /// Records that are not rejected.
    async fn list_open(&self) -> Result<Vec<Submission>, StoreError>;
}

#[async_trait]
impl<S> SubmissionRepository for Arc<S>
where
    S: SubmissionRepository + ?Sized,
{
    async fn get(&self, id: &SubmissionId) -> Result<Option<Submission>, StoreError> {
        (**self).get(id).await
    }

    async fn insert(&self, submission: &Submission) -> Result<(), StoreError> {
        (**self).insert(submission).await
    }

    async fn save(&self, submission: &Submission, expected: ExpectedVersion) -> Result<(), StoreError> {
        (**self).save(submission, expected).await
    }

    async fn list_at_stage(&self, stage: Stage) -> Result<Vec<Submission>, StoreError> {
        (**self).list_at_stage(stage).await
    }

    async fn list_for_email(&self, email: &str) -> Result<Vec<Submission>, StoreError> {
        (**self).list_for_email(email).await
    }

    async fn list_open(&self) -> Result<Vec<Submission>, StoreError> {
        (**self).list_open().await
    }
}
