//! HTTP API: server, routing, and request/response mapping.
//!
//! Presentation glue only. Every authorization decision is made by the
//! infrastructure services against the principal resolved here from a
//! verified token.

pub mod app;
pub mod context;
pub mod middleware;
