//! External collaborators consumed through narrow interfaces.

use thiserror::Error;

mod company_registry;
mod document_store;

pub use company_registry::{CompanyRegistry, StaticCompanyRegistry};
pub use document_store::{DocumentStore, InMemoryDocumentStore};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExternalError {
    #[error("{service} unavailable: {reason}")]
    Unavailable { service: &'static str, reason: String },

    #[error("{service} rejected the request: {reason}")]
    Rejected { service: &'static str, reason: String },
}
