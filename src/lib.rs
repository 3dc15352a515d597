//! Marketplace Billing - webhook ingestion and entitlement reconciliation
//!
//! This crate normalizes purchase webhooks from the GitHub Marketplace and
//! FastSpring (plus operator-recorded manual purchases) into a canonical
//! ledger, and reconciles tenant entitlements and container-registry
//! access against it.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
