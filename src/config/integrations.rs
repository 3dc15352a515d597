//! Outbound integration configuration
//!
//! Settings for the external services the billing core calls out to: the
//! GitHub Marketplace read API, the Quay.io registry, Mailchimp and the
//! transactional notification endpoint.

use serde::Deserialize;

use super::error::ValidationError;

/// GitHub Marketplace read API (renewal scan)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarketplaceConfig {
    /// Personal access token with marketplace listing scope
    pub token: String,
}

impl MarketplaceConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.token.is_empty() {
            return Err(ValidationError::MissingRequired("MARKETPLACE_TOKEN"));
        }
        Ok(())
    }
}

/// Quay.io registry provisioning
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Organization owning the robot accounts and repositories
    #[serde(default = "default_organization")]
    pub organization: String,

    /// OAuth token with org admin scope
    pub token: String,
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.token.is_empty() {
            return Err(ValidationError::MissingRequired("REGISTRY_TOKEN"));
        }
        if self.organization.is_empty() {
            return Err(ValidationError::MissingRequired("REGISTRY_ORGANIZATION"));
        }
        Ok(())
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            organization: default_organization(),
            token: String::new(),
        }
    }
}

fn default_organization() -> String {
    "kiwitcms".to_string()
}

/// Mailchimp newsletter subscription
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewsletterConfig {
    /// Mailchimp API key; the datacenter is the suffix after the last '-'
    pub api_key: String,

    /// Audience (list) id to subscribe buyers to
    pub list_id: String,
}

impl NewsletterConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.api_key.is_empty() {
            return Err(ValidationError::MissingRequired("NEWSLETTER_API_KEY"));
        }
        if !self.api_key.contains('-') {
            return Err(ValidationError::InvalidMailchimpKey);
        }
        if self.list_id.is_empty() {
            return Err(ValidationError::MissingRequired("NEWSLETTER_LIST_ID"));
        }
        Ok(())
    }
}

/// Transactional notification delivery (exit surveys)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationConfig {
    /// HTTP endpoint of the template-mail service
    pub endpoint: String,

    /// Bearer token for the service
    pub api_key: String,

    /// From address on outgoing mail
    pub sender: String,
}

impl NotificationConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.endpoint.is_empty() {
            return Err(ValidationError::MissingRequired("NOTIFICATION_ENDPOINT"));
        }
        if self.sender.is_empty() {
            return Err(ValidationError::MissingRequired("NOTIFICATION_SENDER"));
        }
        Ok(())
    }
}
