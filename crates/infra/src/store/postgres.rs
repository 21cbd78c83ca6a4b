//! Postgres-backed submission store.
//!
//! Each submission is one row: the full record as `jsonb` plus the columns
//! queries filter on. Saves are a single conditional `UPDATE`, so the status,
//! stage and review payload land together or not at all.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `DuplicateId` on insert |
//! | Database (other) | Any other | `Unavailable` |
//! | PoolClosed / Io / other | N/A | `Unavailable` |

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::instrument;

use onboard_core::{AggregateRoot, ExpectedVersion, SubmissionId};
use onboard_workflow::{Stage, Submission};

use super::{StoreError, SubmissionRepository};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS submissions (
    submission_id          TEXT PRIMARY KEY,
    requester_email        TEXT NOT NULL,
    supplier_contact_email TEXT,
    status                 TEXT NOT NULL,
    current_stage          TEXT NOT NULL,
    is_rejected            BOOLEAN NOT NULL DEFAULT FALSE,
    record                 JSONB NOT NULL,
    version                BIGINT NOT NULL,
    created_at             TIMESTAMPTZ NOT NULL,
    updated_at             TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS submissions_stage_created_idx ON submissions (current_stage, created_at);
CREATE INDEX IF NOT EXISTS submissions_requester_idx ON submissions (lower(requester_email));
CREATE INDEX IF NOT EXISTS submissions_supplier_idx ON submissions (lower(supplier_contact_email));
"#;

#[derive(Debug, Clone)]
pub struct PostgresSubmissionStore {
    pool: Arc<PgPool>,
}

impl PostgresSubmissionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Create the table and indexes if they are missing.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    async fn fetch_where(&self, operation: &str, clause: &str, bind: &str) -> Result<Vec<Submission>, StoreError> {
        let sql = format!("SELECT record, version FROM submissions WHERE {clause} ORDER BY created_at ASC, submission_id ASC");
        let rows = sqlx::query(&sql)
            .bind(bind)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        rows.iter().map(decode_row).collect()
    }
}

fn decode_row(row: &sqlx::postgres::PgRow) -> Result<Submission, StoreError> {
    let Json(record): Json<Submission> = row
        .try_get("record")
        .map_err(|e| StoreError::Corrupt(e.to_string()))?;
    let version: i64 = row.try_get("version").map_err(|e| StoreError::Corrupt(e.to_string()))?;
    if record.version() != version as u64 {
        return Err(StoreError::Corrupt(format!(
            "{}: record version {} differs from row version {version}",
            record.submission_id(),
            record.version()
        )));
    }
    Ok(record)
}

#[async_trait]
impl SubmissionRepository for PostgresSubmissionStore {
    #[instrument(skip(self), fields(submission_id = %id), err)]
    async fn get(&self, id: &SubmissionId) -> Result<Option<Submission>, StoreError> {
        let row = sqlx::query("SELECT record, version FROM submissions WHERE submission_id = $1")
            .bind(id.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get", e))?;
        row.as_ref().map(decode_row).transpose()
    }

    #[instrument(skip(self, submission), fields(submission_id = %submission.submission_id()), err)]
    async fn insert(&self, submission: &Submission) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO submissions (
                submission_id, requester_email, supplier_contact_email, status, current_stage,
                is_rejected, record, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(submission.submission_id().as_str())
        .bind(submission.requester_email())
        .bind(submission.supplier_contact_email())
        .bind(submission.status())
        .bind(submission.current_stage().as_str())
        .bind(submission.is_rejected())
        .bind(Json(submission))
        .bind(submission.version() as i64)
        .bind(submission.created_at())
        .bind(submission.updated_at())
        .execute(&*self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::DuplicateId(submission.submission_id().clone())),
            Err(e) => Err(map_sqlx_error("insert", e)),
        }
    }

    #[instrument(skip(self, submission), fields(submission_id = %submission.submission_id()), err)]
    async fn save(&self, submission: &Submission, expected: ExpectedVersion) -> Result<(), StoreError> {
        let expected_version = match expected {
            ExpectedVersion::Any => None,
            ExpectedVersion::Exact(v) => Some(v as i64),
        };
        let result = sqlx::query(
            r#"
            UPDATE submissions SET
                supplier_contact_email = $2,
                status = $3,
                current_stage = $4,
                is_rejected = $5,
                record = $6,
                version = $7,
                updated_at = $8
            WHERE submission_id = $1 AND ($9::BIGINT IS NULL OR version = $9)
            "#,
        )
        .bind(submission.submission_id().as_str())
        .bind(submission.supplier_contact_email())
        .bind(submission.status())
        .bind(submission.current_stage().as_str())
        .bind(submission.is_rejected())
        .bind(Json(submission))
        .bind(submission.version() as i64)
        .bind(submission.updated_at())
        .bind(expected_version)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("save", e))?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let exists = sqlx::query("SELECT version FROM submissions WHERE submission_id = $1")
            .bind(submission.submission_id().as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("save", e))?;
        match exists {
            None => Err(StoreError::Missing(submission.submission_id().clone())),
            Some(row) => {
                let stored: i64 = row.try_get("version").map_err(|e| StoreError::Corrupt(e.to_string()))?;
                Err(StoreError::Conflict(format!(
                    "{}: expected {expected:?}, stored version {stored}",
                    submission.submission_id()
                )))
            }
        }
    }

    async fn list_at_stage(&self, stage: Stage) -> Result<Vec<Submission>, StoreError> {
        self.fetch_where("list_at_stage", "current_stage = $1", stage.as_str()).await
    }

    async fn list_for_email(&self, email: &str) -> Result<Vec<Submission>, StoreError> {
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            return Ok(Vec::new());
        }
        self.fetch_where(
            "list_for_email",
            "lower(requester_email) = $1 OR lower(supplier_contact_email) = $1",
            &email,
        )
        .await
    }

    async fn list_open(&self) -> Result<Vec<Submission>, StoreError> {
        let rows = sqlx::query(
            "SELECT record, version FROM submissions WHERE NOT is_rejected ORDER BY created_at ASC, submission_id ASC",
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_open", e))?;
        rows.iter().map(decode_row).collect()
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            StoreError::Unavailable(format!("database error in {operation}: {}", db_err.message()))
        }
        sqlx::Error::PoolClosed => StoreError::Unavailable(format!("connection pool closed in {operation}")),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Corrupt(format!("decode error in {operation}: {err}"))
        }
        _ => StoreError::Unavailable(format!("sqlx error in {operation}: {err}")),
    }
}
