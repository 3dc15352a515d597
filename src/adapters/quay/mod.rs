//! Quay.io robot-account provisioner.
//!
//! Robot accounts live inside one organization and are addressed as
//! `<org>+<shortname>`. The API reports "robot not found" inside a 200/4xx
//! JSON message rather than a clean status, so responses are sniffed for
//! the known message strings. Retries are bounded with exponential backoff
//! and apply to 5xx responses only.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::domain::billing::RobotName;
use crate::ports::{AccountProvisioner, ProvisionerError};

const DEFAULT_BASE_URL: &str = "https://quay.io/api/v1";

/// Message returned by the API when a robot does not exist.
const ROBOT_NOT_FOUND: &str = "Could not find robot";

/// Message returned when creating a robot that already exists.
const ROBOT_EXISTS: &str = "Existing robot with name";

#[derive(Debug, Clone)]
pub struct QuayConfig {
    pub base_url: String,
    /// Organization owning the robot accounts and product repositories.
    pub organization: String,
    pub token: SecretString,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl QuayConfig {
    pub fn new(organization: impl Into<String>, token: SecretString) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            organization: organization.into(),
            token,
            max_retries: 3,
            retry_backoff: Duration::from_secs(2),
        }
    }

    /// Overrides the API base URL (for tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

pub struct QuayProvisioner {
    config: QuayConfig,
    client: reqwest::Client,
}

impl QuayProvisioner {
    pub fn new(config: QuayConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn robot_endpoint(&self, name: &RobotName) -> String {
        format!(
            "{}/organization/{}/robots/{}",
            self.config.base_url, self.config.organization, name
        )
    }

    /// Full robot username used in permission grants.
    fn robot_username(&self, name: &RobotName) -> String {
        format!("{}+{}", self.config.organization, name)
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value), ProvisionerError> {
        let mut attempt = 0;
        loop {
            let mut request = self
                .client
                .request(method.clone(), url)
                .bearer_auth(self.config.token.expose_secret());
            if let Some(body) = &body {
                request = request.json(body);
            }

            let response = request
                .send()
                .await
                .map_err(|e| ProvisionerError::Request(e.to_string()))?;
            let status = response.status();

            if status.is_server_error() && attempt < self.config.max_retries {
                let delay = self.config.retry_backoff * 2u32.pow(attempt);
                warn!(%url, %status, attempt, "server error, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            let payload = response.json::<Value>().await.unwrap_or(Value::Null);
            return Ok((status, payload));
        }
    }
}

fn message_of(payload: &Value) -> &str {
    payload
        .get("message")
        .or_else(|| payload.get("error_message"))
        .and_then(Value::as_str)
        .unwrap_or_default()
}

#[async_trait]
impl AccountProvisioner for QuayProvisioner {
    async fn create_account(&self, name: &RobotName) -> Result<(), ProvisionerError> {
        let url = self.robot_endpoint(name);
        let body = json!({"unstructured_metadata": {}, "description": ""});
        let (status, payload) = self.send(Method::PUT, &url, Some(body)).await?;

        if status.is_success() {
            debug!(robot = %name, "robot account created");
            return Ok(());
        }
        if message_of(&payload).contains(ROBOT_EXISTS) {
            return Err(ProvisionerError::AlreadyExists);
        }
        Err(ProvisionerError::Request(format!(
            "create robot {name}: {status}: {}",
            message_of(&payload)
        )))
    }

    async fn grant_read(&self, name: &RobotName, product: &str) -> Result<(), ProvisionerError> {
        let url = format!(
            "{}/repository/{}/{}/permissions/user/{}",
            self.config.base_url,
            self.config.organization,
            product,
            self.robot_username(name)
        );
        let (status, payload) = self
            .send(Method::PUT, &url, Some(json!({"role": "read"})))
            .await?;

        if status.is_success() {
            debug!(robot = %name, product, "read access granted");
            return Ok(());
        }
        Err(ProvisionerError::Request(format!(
            "grant read on {product} to {name}: {status}: {}",
            message_of(&payload)
        )))
    }

    async fn delete_account(&self, name: &RobotName) -> Result<(), ProvisionerError> {
        let url = self.robot_endpoint(name);
        let (status, payload) = self.send(Method::DELETE, &url, None).await?;

        if status.is_success() {
            debug!(robot = %name, "robot account deleted");
            return Ok(());
        }
        if status == StatusCode::NOT_FOUND || message_of(&payload).contains(ROBOT_NOT_FOUND) {
            return Err(ProvisionerError::NotFound);
        }
        Err(ProvisionerError::Request(format!(
            "delete robot {name}: {status}: {}",
            message_of(&payload)
        )))
    }

    async fn regenerate_token(&self, name: &RobotName) -> Result<String, ProvisionerError> {
        let url = format!("{}/regenerate", self.robot_endpoint(name));
        let (status, payload) = self.send(Method::POST, &url, None).await?;

        if status == StatusCode::NOT_FOUND || message_of(&payload).contains(ROBOT_NOT_FOUND) {
            return Err(ProvisionerError::NotFound);
        }
        if !status.is_success() {
            return Err(ProvisionerError::Request(format!(
                "regenerate token for {name}: {status}: {}",
                message_of(&payload)
            )));
        }
        payload
            .get("token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                ProvisionerError::Request(format!("regenerate token for {name}: no token in reply"))
            })
    }
}
