//! `onboard-auth`: pure identity and role-resolution boundary.
//!
//! This crate is intentionally decoupled from HTTP, storage and the workflow
//! model. It turns a verified identity-provider payload into a [`Principal`]
//! whose role set is derived from group membership by the [`RoleRegistry`].

pub mod claims;
pub mod identity;
pub mod registry;
pub mod roles;

pub use claims::{Hs256TokenVerifier, IdentityClaims, TokenValidationError, TokenVerifier, validate_claims};
pub use identity::{Identity, Principal};
pub use registry::{RoleDefinition, RoleRegistry, RoleRegistryBuilder};
pub use roles::{Role, UnknownRole};
