//! PostgreSQL adapters - database implementations of the persistence ports.
//!
//! - `PostgresPurchaseLedger` - canonical purchase-event store
//! - `PostgresTenantRegistry` - paid-tenant lookup and renewal
//! - `PostgresDirectory` - platform user directory

mod directory;
mod purchase_ledger;
mod tenant_registry;

pub use directory::PostgresDirectory;
pub use purchase_ledger::PostgresPurchaseLedger;
pub use tenant_registry::PostgresTenantRegistry;
