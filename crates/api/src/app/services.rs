//! Service wiring: stores, audit sinks and collaborators behind the router.

use std::sync::Arc;

use sqlx::PgPool;

use onboard_auth::RoleRegistry;
use onboard_events::AuditSink;
use onboard_infra::{
    AppConfig, AuditRecorder, FanoutAuditSink, InMemoryDocumentStore, InMemorySubmissionStore, PostgresAuditSink,
    PostgresSubmissionStore, StaticCompanyRegistry, SubmissionRepository, SubmissionService, TracingAuditSink,
    WorkQueueResolver,
};
use onboard_workflow::StageModel;

/// Everything a handler needs, built once per process.
#[derive(Clone)]
pub struct AppServices {
    pub submissions: SubmissionService,
    pub queues: WorkQueueResolver,
    pub registry: Arc<RoleRegistry>,
    pub conceal_not_found: bool,
}

pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let (store, audit_sink): (Arc<dyn SubmissionRepository>, Arc<dyn AuditSink>) = match &config.database_url {
        Some(url) => {
            let pool = PgPool::connect(url).await?;
            let store = PostgresSubmissionStore::new(pool.clone());
            store.ensure_schema().await?;
            let audit = PostgresAuditSink::new(pool);
            audit.ensure_schema().await?;
            tracing::info!("using postgres submission store");
            let sinks: Vec<Arc<dyn AuditSink>> = vec![Arc::new(TracingAuditSink), Arc::new(audit)];
            let store: Arc<dyn SubmissionRepository> = Arc::new(store);
            let sink: Arc<dyn AuditSink> = Arc::new(FanoutAuditSink::new(sinks));
            (store, sink)
        }
        None => {
            tracing::info!("using in-memory submission store");
            let store: Arc<dyn SubmissionRepository> = Arc::new(InMemorySubmissionStore::new());
            let sink: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
            (store, sink)
        }
    };

    Ok(build_with(config, store, audit_sink))
}

/// Wire services over an explicit store and audit sink.
pub fn build_with(
    config: &AppConfig,
    store: Arc<dyn SubmissionRepository>,
    audit_sink: Arc<dyn AuditSink>,
) -> AppServices {
    let model = Arc::new(StageModel::standard());
    let audit = AuditRecorder::new(audit_sink);

    // No registry integration is configured; lookups record "unknown".
    let company_registry = Arc::new(StaticCompanyRegistry::offline());

    let submissions = SubmissionService::new(
        store.clone(),
        model.clone(),
        audit.clone(),
        Arc::new(InMemoryDocumentStore::new()),
        company_registry,
    );
    let queues = WorkQueueResolver::new(store, model, audit);

    AppServices {
        submissions,
        queues,
        registry: Arc::new(config.role_registry()),
        conceal_not_found: config.conceal_not_found,
    }
}
