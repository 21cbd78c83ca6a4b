//! Infrastructure layer: persistence, the Submission State Store service,
//! work queues, audit recording, external collaborators and configuration.

pub mod audit;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod external;
pub mod queue;
pub mod service;
pub mod store;

pub use audit::{AuditRecorder, FanoutAuditSink, PostgresAuditSink, TracingAuditSink};
pub use config::{AppConfig, ConfigError};
pub use duplicates::DuplicateDetector;
pub use error::WorkflowError;
pub use external::{
    CompanyRegistry, DocumentStore, ExternalError, InMemoryDocumentStore, StaticCompanyRegistry,
};
pub use queue::WorkQueueResolver;
pub use service::{AccessReport, ExchangeRequest, ReviewRequest, SubmissionService};
pub use store::{InMemorySubmissionStore, PostgresSubmissionStore, StoreError, SubmissionRepository};
