//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `billing` - Canonical purchase events, entitlement arithmetic,
//!   webhook signatures and gitops-prefix validation

pub mod billing;
