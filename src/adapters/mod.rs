//! Adapters - implementations of the port interfaces.
//!
//! Adapters connect the billing core to external systems:
//! - `vendors` - per-vendor webhook verification and normalization
//! - `http` - axum routes exposing the webhook endpoints
//! - `postgres` - persistent ledger, tenant registry and user directory
//! - `quay` - container-registry account provisioning
//! - `github_api` - marketplace read API for the renewal scan
//! - `mailchimp` - newsletter subscription
//! - `email` - transactional notification delivery
//! - `memory` - in-memory test doubles shared by the test suites

pub mod email;
pub mod github_api;
pub mod http;
pub mod mailchimp;
pub mod memory;
pub mod postgres;
pub mod quay;
pub mod vendors;

pub use email::{HttpNotifier, NotifierConfig};
pub use github_api::{GithubApiConfig, GithubMarketplace};
pub use mailchimp::{MailchimpConfig, MailchimpList};
pub use postgres::{PostgresDirectory, PostgresPurchaseLedger, PostgresTenantRegistry};
pub use quay::{QuayConfig, QuayProvisioner};
pub use vendors::{
    FastspringAdapter, GithubAdapter, GithubCronAdapter, ManualAdapter, RawRequest, VendorAdapter,
};
