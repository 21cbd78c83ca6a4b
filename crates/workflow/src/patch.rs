//! Supplier details and the update allow-list.
//!
//! Only the keys in [`SubmissionPatch::ALLOWED_FIELDS`] are ever read from a
//! request body. Workflow columns (`status`, `currentStage`, reviews,
//! ownership) have no patch field at all, so a generic update cannot reach
//! them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Per-field validation failures, keyed by wire field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("invalid fields: {}", .0.keys().cloned().collect::<Vec<_>>().join(", "))]
pub struct FieldErrors(pub BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.insert(field.into(), message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    fn into_result<T>(self, value: T) -> Result<T, FieldErrors> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

/// Supplier-facing details captured on the request form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SupplierDetails {
    pub company_name: Option<String>,
    pub trading_name: Option<String>,
    pub company_registration_number: Option<String>,
    pub vat_number: Option<String>,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub address: Option<String>,
    pub service_description: Option<String>,
    pub justification: Option<String>,
    /// Whole pounds.
    pub estimated_annual_value: Option<u64>,
}

/// Sparse update restricted to the allow-list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPatch {
    pub company_name: Option<String>,
    pub trading_name: Option<String>,
    pub company_registration_number: Option<String>,
    pub vat_number: Option<String>,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub supplier_contact_email: Option<String>,
    pub address: Option<String>,
    pub service_description: Option<String>,
    pub justification: Option<String>,
    pub estimated_annual_value: Option<u64>,
}

/// A validated patch plus the keys that were dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPatch {
    pub patch: SubmissionPatch,
    pub ignored: Vec<String>,
}

const MAX_TEXT_LEN: usize = 4000;

impl SubmissionPatch {
    pub const ALLOWED_FIELDS: [&'static str; 11] = [
        "companyName",
        "tradingName",
        "companyRegistrationNumber",
        "vatNumber",
        "contactName",
        "contactPhone",
        "supplierContactEmail",
        "address",
        "serviceDescription",
        "justification",
        "estimatedAnnualValue",
    ];

    /// Parse a JSON request body against the allow-list.
    ///
    /// Unknown keys are collected in `ignored` and otherwise dropped.
    pub fn from_json(body: &Value) -> Result<ParsedPatch, FieldErrors> {
        let Some(map) = body.as_object() else {
            return Err(FieldErrors::single("body", "must be a JSON object"));
        };
        Self::from_map(map)
    }

    pub fn from_map(map: &Map<String, Value>) -> Result<ParsedPatch, FieldErrors> {
        let mut patch = SubmissionPatch::default();
        let mut errors = FieldErrors::new();
        let mut ignored = Vec::new();

        for (key, value) in map {
            match key.as_str() {
                "companyName" => patch.company_name = text(key, value, &mut errors),
                "tradingName" => patch.trading_name = text(key, value, &mut errors),
                "companyRegistrationNumber" => {
                    patch.company_registration_number =
                        text(key, value, &mut errors).map(|s| s.to_ascii_uppercase().replace(' ', ""))
                }
                "vatNumber" => patch.vat_number = text(key, value, &mut errors),
                "contactName" => patch.contact_name = text(key, value, &mut errors),
                "contactPhone" => patch.contact_phone = text(key, value, &mut errors),
                "supplierContactEmail" => {
                    patch.supplier_contact_email = text(key, value, &mut errors).and_then(|s| {
                        if is_email(&s) {
                            Some(s)
                        } else {
                            errors.add(key.clone(), "must be an e-mail address");
                            None
                        }
                    })
                }
                "address" => patch.address = text(key, value, &mut errors),
                "serviceDescription" => patch.service_description = text(key, value, &mut errors),
                "justification" => patch.justification = text(key, value, &mut errors),
                "estimatedAnnualValue" => match value.as_u64() {
                    Some(v) => patch.estimated_annual_value = Some(v),
                    None => errors.add(key.clone(), "must be a non-negative whole number"),
                },
                _ => ignored.push(key.clone()),
            }
        }

        errors.into_result(ParsedPatch { patch, ignored })
    }

    pub fn is_empty(&self) -> bool {
        *self == SubmissionPatch::default()
    }

    pub fn touches_supplier_contact(&self) -> bool {
        self.supplier_contact_email.is_some()
    }

    /// Wire names of the fields whose value would actually change.
    pub fn changed_fields(&self, details: &SupplierDetails, supplier_contact: Option<&str>) -> Vec<String> {
        let mut changed = Vec::new();
        let mut check = |name: &str, new: Option<&str>, old: Option<&str>| {
            if let Some(new) = new {
                if Some(new) != old {
                    changed.push(name.to_string());
                }
            }
        };
        check("companyName", self.company_name.as_deref(), details.company_name.as_deref());
        check("tradingName", self.trading_name.as_deref(), details.trading_name.as_deref());
        check(
            "companyRegistrationNumber",
            self.company_registration_number.as_deref(),
            details.company_registration_number.as_deref(),
        );
        check("vatNumber", self.vat_number.as_deref(), details.vat_number.as_deref());
        check("contactName", self.contact_name.as_deref(), details.contact_name.as_deref());
        check("contactPhone", self.contact_phone.as_deref(), details.contact_phone.as_deref());
        check("supplierContactEmail", self.supplier_contact_email.as_deref(), supplier_contact);
        check("address", self.address.as_deref(), details.address.as_deref());
        check(
            "serviceDescription",
            self.service_description.as_deref(),
            details.service_description.as_deref(),
        );
        check("justification", self.justification.as_deref(), details.justification.as_deref());
        if let Some(v) = self.estimated_annual_value {
            if Some(v) != details.estimated_annual_value {
                changed.push("estimatedAnnualValue".to_string());
            }
        }
        changed
    }

    pub fn apply_to(&self, details: &mut SupplierDetails, supplier_contact: &mut Option<String>) {
        fn set<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                target.clone_from(value);
            }
        }
        set(&mut details.company_name, &self.company_name);
        set(&mut details.trading_name, &self.trading_name);
        set(&mut details.company_registration_number, &self.company_registration_number);
        set(&mut details.vat_number, &self.vat_number);
        set(&mut details.contact_name, &self.contact_name);
        set(&mut details.contact_phone, &self.contact_phone);
        set(supplier_contact, &self.supplier_contact_email);
        set(&mut details.address, &self.address);
        set(&mut details.service_description, &self.service_description);
        set(&mut details.justification, &self.justification);
        set(&mut details.estimated_annual_value, &self.estimated_annual_value);
    }
}

/// Creation payload: the allow-listed details plus the optional owner e-mail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewSubmission {
    /// Owner e-mail when a requester raises the form on someone's behalf.
    pub nhs_email: Option<String>,
    pub supplier_contact_email: Option<String>,
    pub details: SupplierDetails,
}

impl NewSubmission {
    pub fn from_json(body: &Value) -> Result<NewSubmission, FieldErrors> {
        let Some(map) = body.as_object() else {
            return Err(FieldErrors::single("body", "must be a JSON object"));
        };

        let mut errors = FieldErrors::new();
        let nhs_email = match map.get("nhsEmail") {
            None | Some(Value::Null) => None,
            Some(value) => text("nhsEmail", value, &mut errors).and_then(|s| {
                if is_email(&s) {
                    Some(s)
                } else {
                    errors.add("nhsEmail", "must be an e-mail address");
                    None
                }
            }),
        };

        let patch = match SubmissionPatch::from_map(map) {
            Ok(parsed) => parsed.patch,
            Err(e) => {
                errors.0.extend(e.0);
                SubmissionPatch::default()
            }
        };
        if patch.company_name.is_none() && errors.get("companyName").is_none() {
            errors.add("companyName", "is required");
        }

        let mut details = SupplierDetails::default();
        let mut supplier_contact_email = None;
        patch.apply_to(&mut details, &mut supplier_contact_email);

        errors.into_result(NewSubmission {
            nhs_email,
            supplier_contact_email,
            details,
        })
    }
}

fn text(key: &str, value: &Value, errors: &mut FieldErrors) -> Option<String> {
    match value.as_str().map(str::trim) {
        Some("") => {
            errors.add(key, "must not be blank");
            None
        }
        Some(s) if s.chars().count() > MAX_TEXT_LEN => {
            errors.add(key, format!("must be at most {MAX_TEXT_LEN} characters"));
            None
        }
        Some(s) => Some(s.to_string()),
        None => {
            errors.add(key, "must be a string");
            None
        }
    }
}

/// Shape check only; deliverability is the identity provider's problem.
pub(crate) fn is_email(s: &str) -> bool {
    let s = s.trim();
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    match s.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.contains('@') && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn unknown_keys_are_ignored_not_stored() {
        let parsed = SubmissionPatch::from_json(&json!({
            "status": "completed",
            "currentStage": "ap_control",
            "requesterEmail": "mallory@evil.test",
            "tradingName": "Acme Health"
        }))
        .unwrap();
        assert_eq!(parsed.patch.trading_name.as_deref(), Some("Acme Health"));
        let mut ignored = parsed.ignored.clone();
        ignored.sort();
        assert_eq!(ignored, vec!["currentStage", "requesterEmail", "status"]);
    }

    #[test]
    fn invalid_values_are_reported_per_field() {
        let err = SubmissionPatch::from_json(&json!({
            "companyName": "  ",
            "supplierContactEmail": "not-an-email",
            "estimatedAnnualValue": -5
        }))
        .unwrap_err();
        assert_eq!(err.get("companyName"), Some("must not be blank"));
        assert_eq!(err.get("supplierContactEmail"), Some("must be an e-mail address"));
        assert!(err.get("estimatedAnnualValue").is_some());
    }

    #[test]
    fn text_limit_counts_characters_not_bytes() {
        let multibyte = "é".repeat(MAX_TEXT_LEN);
        let parsed = SubmissionPatch::from_json(&json!({ "justification": multibyte })).unwrap();
        assert_eq!(parsed.patch.justification.as_deref().map(|j| j.chars().count()), Some(MAX_TEXT_LEN));

        let err = SubmissionPatch::from_json(&json!({ "justification": "x".repeat(MAX_TEXT_LEN + 1) })).unwrap_err();
        assert!(err.get("justification").is_some());
    }

    #[test]
    fn non_object_body_is_rejected() {
        assert!(SubmissionPatch::from_json(&json!(["companyName"])).is_err());
    }

    #[test]
    fn empty_object_is_an_empty_patch() {
        let parsed = SubmissionPatch::from_json(&json!({})).unwrap();
        assert!(parsed.patch.is_empty());
    }

    #[test]
    fn changed_fields_only_lists_real_changes() {
        let details = SupplierDetails {
            company_name: Some("Acme".into()),
            ..SupplierDetails::default()
        };
        let patch = SubmissionPatch {
            company_name: Some("Acme".into()),
            vat_number: Some("GB123".into()),
            ..SubmissionPatch::default()
        };
        assert_eq!(patch.changed_fields(&details, None), vec!["vatNumber"]);
    }

    #[test]
    fn registration_numbers_are_normalised() {
        let parsed = SubmissionPatch::from_json(&json!({"companyRegistrationNumber": "ab 123456"})).unwrap();
        assert_eq!(parsed.patch.company_registration_number.as_deref(), Some("AB123456"));
    }

    #[test]
    fn new_submission_requires_company_name() {
        let err = NewSubmission::from_json(&json!({"tradingName": "Acme"})).unwrap_err();
        assert_eq!(err.get("companyName"), Some("is required"));
    }

    #[test]
    fn new_submission_reads_owner_email() {
        let new = NewSubmission::from_json(&json!({
            "companyName": "Acme Ltd",
            "nhsEmail": "sarah.johnson@nhs.net",
            "supplierContactEmail": "jo@acme.co.uk"
        }))
        .unwrap();
        assert_eq!(new.nhs_email.as_deref(), Some("sarah.johnson@nhs.net"));
        assert_eq!(new.supplier_contact_email.as_deref(), Some("jo@acme.co.uk"));
        assert_eq!(new.details.company_name.as_deref(), Some("Acme Ltd"));
    }

    #[test]
    fn email_shape() {
        assert!(is_email("a@b.co"));
        assert!(!is_email("a@b"));
        assert!(!is_email("a b@c.com"));
        assert!(!is_email("@c.com"));
    }
}
