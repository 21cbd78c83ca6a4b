//! Versioned records and the command/event contract they follow.

use crate::error::{DomainError, DomainResult};

/// A record with an identity and a write counter.
pub trait AggregateRoot {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Number of events applied so far. Stores compare it on save, so two
    /// reviewers acting on the same loaded copy cannot both win.
    fn version(&self) -> u64;
}

/// Version a writer believes the stored record is at.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// First insert or an import; nothing to compare against.
    Any,
    Exact(u64),
}

impl ExpectedVersion {
    /// From an optional client precondition such as `If-Match`.
    pub fn from_precondition(version: Option<u64>) -> Self {
        version.map_or(ExpectedVersion::Any, ExpectedVersion::Exact)
    }

    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        match self {
            ExpectedVersion::Exact(v) if v != actual => Err(DomainError::conflict(format!(
                "record is at version {actual}, writer expected {v}"
            ))),
            _ => Ok(()),
        }
    }
}

/// Decide-then-apply contract for workflow records.
///
/// `handle` validates a command against current state and returns the events
/// it implies, touching nothing. `apply` folds one event in and bumps the
/// version. Neither performs IO.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    fn apply(&mut self, event: &Self::Event);

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}
