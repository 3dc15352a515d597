//! Application layer - webhook orchestration and scheduled reconciliation.
//!
//! Coordinates vendor adapters, the purchase ledger and the external
//! collaborators. All external access goes through ports.

pub mod gitops_allow;
pub mod orchestrator;
pub mod renewal_scan;
pub mod side_effects;

pub use gitops_allow::{SetPrefixError, SubscriptionService};
pub use orchestrator::{WebhookOrchestrator, WebhookOutcome};
pub use renewal_scan::{RenewalScanner, ScanReport};
pub use side_effects::SideEffectExecutor;
