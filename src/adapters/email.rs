//! HTTP notifier adapter.
//!
//! Posts templated-send requests to a transactional-email service
//! endpoint. The template itself is rendered by that service; this side
//! only names it and supplies the context map.

use std::collections::HashMap;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;

use crate::ports::{Notifier, NotifierError};

#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Full URL of the send endpoint.
    pub endpoint: String,
    pub api_key: SecretString,
    /// From-address attached to every message.
    pub sender: String,
}

pub struct HttpNotifier {
    config: NotifierConfig,
    client: reqwest::Client,
}

impl HttpNotifier {
    pub fn new(config: NotifierConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send(
        &self,
        recipients: &[String],
        template: &str,
        context: &HashMap<String, String>,
    ) -> Result<(), NotifierError> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&json!({
                "from": self.config.sender,
                "to": recipients,
                "template": template,
                "context": context,
            }))
            .send()
            .await
            .map_err(|e| NotifierError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifierError(format!(
                "send returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
