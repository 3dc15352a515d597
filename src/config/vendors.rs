//! Vendor webhook configuration

use serde::Deserialize;

use super::error::ValidationError;

/// Webhook signing secrets, one per external vendor.
///
/// The internal-replay routes (manual, github-cron) have no secret: they
/// verify by payload identity instead.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VendorConfig {
    /// GitHub Marketplace webhook secret (X-Hub-Signature)
    pub github_webhook_secret: String,

    /// FastSpring webhook secret (X-FS-Signature)
    pub fastspring_webhook_secret: String,
}

impl VendorConfig {
    /// Validate vendor configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.github_webhook_secret.is_empty() {
            return Err(ValidationError::MissingRequired("GITHUB_WEBHOOK_SECRET"));
        }
        if self.fastspring_webhook_secret.is_empty() {
            return Err(ValidationError::MissingRequired(
                "FASTSPRING_WEBHOOK_SECRET",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_requires_both_secrets() {
        let mut config = VendorConfig::default();
        assert!(config.validate().is_err());

        config.github_webhook_secret = "hook-secret".to_string();
        assert!(config.validate().is_err());

        config.fastspring_webhook_secret = "fs-secret".to_string();
        assert!(config.validate().is_ok());
    }
}
