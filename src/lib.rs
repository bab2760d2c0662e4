//! Gatekeeper - attribute-based access control engine
//!
//! Decides whether a subject may perform an action on a resource, derives the
//! object-side filter a data layer must apply, and masks records accordingly.

pub mod abac;
pub mod errors;
pub mod settings;
