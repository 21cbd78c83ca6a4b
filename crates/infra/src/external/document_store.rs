use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use onboard_core::SubmissionId;
use onboard_workflow::DocumentType;

use super::ExternalError;

/// Byte storage for uploaded documents. Returns the storage path.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn put(
        &self,
        submission_id: &SubmissionId,
        document_type: DocumentType,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<String, ExternalError>;
}

/// In-memory document store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.blobs.read().ok()?.get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn put(
        &self,
        submission_id: &SubmissionId,
        document_type: DocumentType,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<String, ExternalError> {
        let safe_name: String = file_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let path = format!("{submission_id}/{document_type}/{safe_name}");
        let mut blobs = self.blobs.write().map_err(|_| ExternalError::Unavailable {
            service: "document store",
            reason: "lock poisoned".to_string(),
        })?;
        blobs.insert(path.clone(), bytes.to_vec());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn path_is_keyed_by_submission_and_type() {
        let store = InMemoryDocumentStore::new();
        let id: SubmissionId = "SUP-2024-AAAAA".parse().unwrap();
        let path = store
            .put(&id, DocumentType::InsuranceCertificate, "../cover note.pdf", b"%PDF")
            .await
            .unwrap();
        assert_eq!(path, "SUP-2024-AAAAA/insurance_certificate/.._cover_note.pdf");
        assert_eq!(store.get(&path).as_deref(), Some(&b"%PDF"[..]));
    }
}
