//! Application configuration module
//!
//! Type-safe configuration loading from environment variables using the
//! `config` and `dotenvy` crates. Values are read with the
//! `MARKETPLACE_BILLING` prefix and nested values use `__` as separator:
//!
//! - `MARKETPLACE_BILLING__SERVER__PORT=8080` -> `server.port = 8080`
//! - `MARKETPLACE_BILLING__DATABASE__URL=...` -> `database.url = ...`

mod database;
mod error;
mod features;
mod integrations;
mod server;
mod vendors;

pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use features::FeatureFlags;
pub use integrations::{MarketplaceConfig, NewsletterConfig, NotificationConfig, RegistryConfig};
pub use server::{Environment, ServerConfig};
pub use vendors::VendorConfig;

use serde::Deserialize;

/// Root application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment)
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration (PostgreSQL connection)
    pub database: DatabaseConfig,

    /// Vendor webhook secrets
    pub vendors: VendorConfig,

    /// GitHub Marketplace read API
    pub marketplace: MarketplaceConfig,

    /// Quay.io registry provisioning
    pub registry: RegistryConfig,

    /// Mailchimp newsletter
    pub newsletter: NewsletterConfig,

    /// Transactional notifications
    pub notification: NotificationConfig,

    /// Feature flags
    #[serde(default)]
    pub features: FeatureFlags,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("MARKETPLACE_BILLING")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.vendors.validate()?;
        self.marketplace.validate()?;
        self.registry.validate()?;
        self.newsletter.validate()?;
        self.notification.validate()?;
        self.features.validate()?;
        Ok(())
    }
}
