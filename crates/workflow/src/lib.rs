//! Supplier onboarding workflow domain.
//!
//! Stage model, the `Submission` aggregate and the authorization evaluator,
//! implemented purely as deterministic domain logic (no IO, no HTTP, no
//! storage). The evaluator is the single rule source for both server-side
//! enforcement and any client-side guard built from the exported rule table.

pub mod access;
pub mod document;
pub mod patch;
pub mod review;
pub mod stage;
pub mod submission;

pub use access::{AccessBasis, AccessEvaluator, AccessExplanation, AccessRuleTable, SubmissionPermissions};
pub use document::{DocumentRecord, DocumentType};
pub use patch::{FieldErrors, NewSubmission, ParsedPatch, SubmissionPatch, SupplierDetails};
pub use review::{
    ContractDrafter, Exchange, ExchangeKind, ExchangeSender, Rejection, Reviewer, StageReview,
    TransitionRecord,
};
pub use stage::{Decision, Stage, StageModel, StageRule, Transition, TransitionRule};
pub use submission::{
    AttachDocument, CreateSubmission, FlagDuplicate, LegacyRecord, PostExchange, RecordCompanyVerification,
    RecordDecision, Resubmit, Submission, SubmissionCommand, SubmissionEvent, SubmissionSummary,
    UpdateSubmission,
};
