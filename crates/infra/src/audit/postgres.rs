//! Postgres audit sink.
//!
//! `record` is synchronous and must not block the request; the insert runs on
//! a spawned task and its failure is only logged.

use std::sync::Arc;

use sqlx::PgPool;

use onboard_events::{AuditEvent, AuditSink, AuditSinkError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS audit_events (
    id              UUID PRIMARY KEY,
    occurred_at     TIMESTAMPTZ NOT NULL,
    actor           TEXT NOT NULL,
    action          TEXT NOT NULL,
    resource        TEXT NOT NULL,
    previous_status TEXT,
    new_status      TEXT,
    outcome         TEXT NOT NULL,
    changed_fields  JSONB NOT NULL,
    required_role   TEXT
);
CREATE INDEX IF NOT EXISTS audit_events_resource_idx ON audit_events (resource, occurred_at);
"#;

#[derive(Debug, Clone)]
pub struct PostgresAuditSink {
    pool: Arc<PgPool>,
}

impl PostgresAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    pub async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::raw_sql(SCHEMA).execute(&*self.pool).await?;
        Ok(())
    }
}

impl AuditSink for PostgresAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), AuditSinkError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| AuditSinkError::Unavailable("no async runtime".to_string()))?;
        let pool = self.pool.clone();
        handle.spawn(async move {
            let outcome = serde_json::to_value(event.outcome)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            let result = sqlx::query(
                r#"
                INSERT INTO audit_events (
                    id, occurred_at, actor, action, resource,
                    previous_status, new_status, outcome, changed_fields, required_role
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(event.id)
            .bind(event.timestamp)
            .bind(&event.actor)
            .bind(event.action.as_str())
            .bind(&event.resource)
            .bind(event.previous_status.as_deref())
            .bind(event.new_status.as_deref())
            .bind(outcome)
            .bind(sqlx::types::Json(&event.changed_fields))
            .bind(event.required_role.as_deref())
            .execute(&*pool)
            .await;
            if let Err(e) = result {
                tracing::warn!(audit_id = %event.id, error = %e, "audit insert failed");
            }
        });
        Ok(())
    }
}
