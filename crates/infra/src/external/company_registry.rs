use std::collections::HashSet;

use async_trait::async_trait;

use super::ExternalError;

/// Company registration lookup: `Ok(true)` registered, `Ok(false)` unknown.
#[async_trait]
pub trait CompanyRegistry: Send + Sync {
    async fn is_registered(&self, registration_number: &str) -> Result<bool, ExternalError>;
}

/// Fixed-answer registry for tests/dev.
#[derive(Debug, Default, Clone)]
pub struct StaticCompanyRegistry {
    known: HashSet<String>,
    offline: bool,
}

impl StaticCompanyRegistry {
    pub fn new<I, S>(known: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            known: known.into_iter().map(|s| normalize(s.as_ref())).collect(),
            offline: false,
        }
    }

    /// Every lookup fails as unavailable.
    pub fn offline() -> Self {
        Self {
            known: HashSet::new(),
            offline: true,
        }
    }
}

fn normalize(number: &str) -> String {
    number
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase()
}

#[async_trait]
impl CompanyRegistry for StaticCompanyRegistry {
    async fn is_registered(&self, registration_number: &str) -> Result<bool, ExternalError> {
        if self.offline {
            return Err(ExternalError::Unavailable {
                service: "company registry",
                reason: "offline".to_string(),
            });
        }
        Ok(self.known.contains(&normalize(registration_number)))
    }
}
