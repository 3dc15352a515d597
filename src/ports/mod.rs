//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! - `PurchaseLedger` - the persisted store of canonical purchase events
//! - `TenantRegistry` - predicate match + paid-until extension for tenants
//! - `AccountProvisioner` - robot-account create/grant/delete/regenerate
//! - `MailingList` - fire-and-forget newsletter subscription
//! - `Notifier` - templated outbound email
//! - `MarketplaceApi` - vendor read API used by the renewal scanner
//! - `Directory` - buyer account lookup/creation

mod account_provisioner;
mod directory;
mod mailing_list;
mod marketplace_api;
mod notifier;
mod purchase_ledger;
mod tenant_registry;

pub use account_provisioner::{AccountProvisioner, ProvisionerError};
pub use directory::Directory;
pub use mailing_list::{MailingList, MailingListError};
pub use marketplace_api::{MarketplaceAccount, MarketplaceApi};
pub use notifier::{Notifier, NotifierError, TEMPLATE_EXIT_SURVEY, TEMPLATE_MANUAL_FULFILLMENT};
pub use purchase_ledger::{PurchaseLedger, ScanWindows};
pub use tenant_registry::{TenantCriteria, TenantRef, TenantRegistry};
