//! API-compatible types.
//!
//! The types in this module are serialised in an API-friendly way, e.g.:
//!
//! - IDs are serialised as hex strings.
//! - Datetimes are serialised as RFC 3339 strings.
//! - Field names are camelCase, matching the presentation layer.

pub mod audit;
pub mod auth;
pub mod election;
pub mod id;
pub mod reconcile;
pub mod response;
pub mod vote;
pub mod voter;
