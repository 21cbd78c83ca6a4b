//! Strongly-typed identifiers used across the domain.

use core::str::FromStr;

use chrono::{Datelike, Utc};
use rand::{Rng, rngs::OsRng};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

const PREFIX: &str = "SUP";
const SUFFIX_LEN: usize = 5;

/// Suffix alphabet: digits and upper-case letters without `I`/`O`.
const SUFFIX_ALPHABET: &[u8] = b"0123456789ABCDEFGHJKLMNPQRSTUVWXYZ";

/// Identifier of a supplier submission, formatted `SUP-YYYY-XXXXX`.
///
/// The suffix is drawn from the operating system CSPRNG so identifiers cannot
/// be enumerated from one another. Immutable once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubmissionId(String);

impl SubmissionId {
    /// Generate a fresh identifier for the current calendar year.
    pub fn generate() -> Self {
        Self::generate_for_year(Utc::now().year())
    }

    /// Generate a fresh identifier for an explicit year.
    pub fn generate_for_year(year: i32) -> Self {
        let mut rng = OsRng;
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
            .collect();
        Self(format!("{PREFIX}-{year:04}-{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The year segment of the identifier.
    pub fn year(&self) -> i32 {
        self.0[PREFIX.len() + 1..PREFIX.len() + 5]
            .parse()
            .unwrap_or_default()
    }
}

impl core::fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SubmissionId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('-');
        let (Some(prefix), Some(year), Some(suffix), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(DomainError::invalid_id(format!("SubmissionId: malformed '{s}'")));
        };

        if prefix != PREFIX {
            return Err(DomainError::invalid_id("SubmissionId: missing SUP prefix"));
        }
        if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DomainError::invalid_id("SubmissionId: year must be 4 digits"));
        }
        // Legacy identifiers may use the full upper-case alphanumeric range.
        if suffix.len() != SUFFIX_LEN
            || !suffix
                .bytes()
                .all(|b| b.is_ascii_digit() || b.is_ascii_uppercase())
        {
            return Err(DomainError::invalid_id(
                "SubmissionId: suffix must be 5 upper-case alphanumerics",
            ));
        }

        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for SubmissionId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SubmissionId> for String {
    fn from(value: SubmissionId) -> Self {
        value.0
    }
}
