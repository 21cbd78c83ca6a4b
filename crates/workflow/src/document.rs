use core::str::FromStr;

use chrono::{DateTime, Utc};
use onboard_core::DomainError;
use serde::{Deserialize, Serialize};

/// Document categories a submission can carry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    IdentityDocument,
    Ir35Assessment,
    InsuranceCertificate,
    BankDetails,
    CompanyRegistration,
    VatCertificate,
    Contract,
    Other,
}

impl DocumentType {
    pub const ALL: [DocumentType; 8] = [
        DocumentType::IdentityDocument,
        DocumentType::Ir35Assessment,
        DocumentType::InsuranceCertificate,
        DocumentType::BankDetails,
        DocumentType::CompanyRegistration,
        DocumentType::VatCertificate,
        DocumentType::Contract,
        DocumentType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::IdentityDocument => "identity_document",
            DocumentType::Ir35Assessment => "ir35_assessment",
            DocumentType::InsuranceCertificate => "insurance_certificate",
            DocumentType::BankDetails => "bank_details",
            DocumentType::CompanyRegistration => "company_registration",
            DocumentType::VatCertificate => "vat_certificate",
            DocumentType::Contract => "contract",
            DocumentType::Other => "other",
        }
    }

    /// Sensitive documents never leave the onboarding store.
    pub fn is_sensitive(&self) -> bool {
        matches!(self, DocumentType::IdentityDocument | DocumentType::Ir35Assessment)
    }
}

impl core::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        DocumentType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| DomainError::validation(format!("unknown document type '{s}'")))
    }
}

/// Document metadata. The bytes live in the document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub document_type: DocumentType,
    pub file_name: String,
    pub storage_path: String,
    pub size_bytes: u64,
    sensitive: bool,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
}

impl DocumentRecord {
    pub fn new(
        document_type: DocumentType,
        file_name: impl Into<String>,
        storage_path: impl Into<String>,
        size_bytes: u64,
        uploaded_by: impl Into<String>,
        uploaded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            document_type,
            file_name: file_name.into(),
            storage_path: storage_path.into(),
            size_bytes,
            sensitive: document_type.is_sensitive(),
            uploaded_by: uploaded_by.into(),
            uploaded_at,
        }
    }

    /// Always derived from the document type.
    pub fn is_sensitive(&self) -> bool {
        self.document_type.is_sensitive()
    }

    pub fn ticket_sync_eligible(&self) -> bool {
        !self.is_sensitive()
    }
}
