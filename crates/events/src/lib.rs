//! Domain events and the audit trail contract.

pub mod audit;
pub mod event;
pub mod handler;
pub mod in_memory_sink;

pub use audit::{AuditAction, AuditEvent, AuditOutcome, AuditSink, AuditSinkError};
pub use event::Event;
pub use handler::execute;
pub use in_memory_sink::InMemoryAuditSink;
