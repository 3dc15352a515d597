//! Billing domain: canonical purchase events, entitlement arithmetic,
//! webhook signature schemes and gitops-prefix validation.

mod entitlement;
mod errors;
mod event;
mod gitops;
mod signature;

pub use entitlement::{
    paid_until, parse_vendor_date, product_access_list, sku_grants_tenant, BillingCycle,
};
pub use errors::BillingError;
pub use event::{
    NewPurchaseEvent, PurchaseEvent, RobotName, Vendor, ACTION_CANCELLED, ACTION_PURCHASED,
};
pub use gitops::{validate_gitops_prefix, GitopsPrefixError};
pub use signature::{
    verify_commerce_signature, verify_internal_replay, verify_marketplace_signature,
};
