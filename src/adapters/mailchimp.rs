//! Mailchimp mailing-list adapter.
//!
//! Adds new buyers to the newsletter list with status `pending`, so they
//! must opt in themselves. The port contract is fire-and-forget: the
//! caller swallows every error, this adapter only reports them.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;

use crate::ports::{MailingList, MailingListError};

#[derive(Debug, Clone)]
pub struct MailchimpConfig {
    /// API key; the datacenter suffix (after the `-`) selects the host.
    pub api_key: SecretString,
    pub list_id: String,
}

pub struct MailchimpList {
    config: MailchimpConfig,
    client: reqwest::Client,
}

impl MailchimpList {
    pub fn new(config: MailchimpConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn members_url(&self) -> Result<String, MailingListError> {
        let datacenter = self
            .config
            .api_key
            .expose_secret()
            .rsplit('-')
            .next()
            .filter(|dc| !dc.is_empty())
            .ok_or_else(|| MailingListError("api key carries no datacenter suffix".to_string()))?
            .to_string();
        Ok(format!(
            "https://{datacenter}.api.mailchimp.com/3.0/lists/{}/members",
            self.config.list_id
        ))
    }
}

#[async_trait]
impl MailingList for MailchimpList {
    async fn subscribe(&self, email: &str) -> Result<(), MailingListError> {
        let url = self.members_url()?;
        let response = self
            .client
            .post(&url)
            .basic_auth("anystring", Some(self.config.api_key.expose_secret()))
            .json(&json!({"email_address": email, "status": "pending"}))
            .send()
            .await
            .map_err(|e| MailingListError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MailingListError(format!(
                "subscribe returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
