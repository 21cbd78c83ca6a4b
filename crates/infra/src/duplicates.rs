//! Duplicate supplier detection.

use onboard_core::SubmissionId;
use onboard_workflow::Submission;

const COMPANY_SUFFIXES: [&str; 6] = ["limited", "ltd", "plc", "llp", "llc", "inc"];

/// Matches a new submission against existing, non-rejected ones by company
/// registration number or normalised company name.
#[derive(Debug, Default, Clone, Copy)]
pub struct DuplicateDetector;

impl DuplicateDetector {
    pub fn new() -> Self {
        Self
    }

    /// The oldest matching submission, if any.
    pub fn find_duplicate<'a, I>(&self, candidate: &Submission, existing: I) -> Option<SubmissionId>
    where
        I: IntoIterator<Item = &'a Submission>,
    {
        let number = candidate
            .details()
            .company_registration_number
            .as_deref()
            .map(normalize_registration)
            .filter(|n| !n.is_empty());
        let name = candidate
            .company_name()
            .map(normalize_company_name)
            .filter(|n| !n.is_empty());
        if number.is_none() && name.is_none() {
            return None;
        }

        existing
            .into_iter()
            .filter(|other| other.submission_id() != candidate.submission_id() && !other.is_rejected())
            .filter(|other| {
                let same_number = number.is_some()
                    && other
                        .details()
                        .company_registration_number
                        .as_deref()
                        .map(normalize_registration)
                        == number;
                let same_name = name.is_some() && other.company_name().map(normalize_company_name) == name;
                same_number || same_name
            })
            .min_by(|a, b| {
                a.created_at()
                    .cmp(&b.created_at())
                    .then_with(|| a.submission_id().cmp(b.submission_id()))
            })
            .map(|s| s.submission_id().clone())
    }
}

pub fn normalize_registration(number: &str) -> String {
    number
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_uppercase()
}

/// Lowercase, punctuation stripped, trailing legal-form suffixes removed.
pub fn normalize_company_name(name: &str) -> String {
    let cleaned: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let mut words: Vec<&str> = cleaned.split_whitespace().collect();
    while words.len() > 1 && words.last().is_some_and(|w| COMPANY_SUFFIXES.contains(w)) {
        words.pop();
    }
    words.join(" ")
}
