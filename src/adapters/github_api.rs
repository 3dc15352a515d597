//! GitHub Marketplace read-API adapter, used by the renewal scanner.

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;

use crate::domain::billing::BillingError;
use crate::ports::{MarketplaceAccount, MarketplaceApi};

const DEFAULT_BASE_URL: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("marketplace-billing/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct GithubApiConfig {
    pub base_url: String,
    pub token: SecretString,
}

impl GithubApiConfig {
    pub fn new(token: SecretString) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token,
        }
    }

    /// Overrides the API base URL (for tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

/// Wire shape of `GET /marketplace_listing/accounts/{id}`.
#[derive(Debug, Deserialize)]
struct AccountResponse {
    id: i64,
    login: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    organization_billing_email: Option<String>,
    #[serde(rename = "type")]
    account_type: String,
    url: String,
    marketplace_purchase: Value,
}

pub struct GithubMarketplace {
    config: GithubApiConfig,
    client: reqwest::Client,
}

impl GithubMarketplace {
    pub fn new(config: GithubApiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl MarketplaceApi for GithubMarketplace {
    async fn account_subscription(
        &self,
        account_id: i64,
    ) -> Result<Option<MarketplaceAccount>, BillingError> {
        let url = format!(
            "{}/marketplace_listing/accounts/{account_id}",
            self.config.base_url
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(self.config.token.expose_secret())
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .map_err(|e| BillingError::VendorApi(e.to_string()))?;

        // Not a subscriber (anymore) is an expected outcome.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(BillingError::VendorApi(format!(
                "account {account_id}: {}",
                response.status()
            )));
        }

        let account: AccountResponse = response
            .json()
            .await
            .map_err(|e| BillingError::VendorApi(e.to_string()))?;

        Ok(Some(MarketplaceAccount {
            id: account.id,
            login: account.login,
            email: account.email,
            organization_billing_email: account.organization_billing_email,
            account_type: account.account_type,
            url: account.url,
            marketplace_purchase: account.marketplace_purchase,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn account_response_tolerates_missing_emails() {
        let account: AccountResponse = serde_json::from_value(json!({
            "id": 18404719,
            "login": "kiwitcms",
            "type": "Organization",
            "url": "https://api.github.com/orgs/kiwitcms",
            "marketplace_purchase": {"billing_cycle": "monthly"}
        }))
        .unwrap();

        assert_eq!(account.id, 18404719);
        assert_eq!(account.email, None);
        assert_eq!(account.organization_billing_email, None);
        assert_eq!(account.account_type, "Organization");
    }
}
