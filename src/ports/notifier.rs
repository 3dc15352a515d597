//! Outbound notifier port for templated email.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

/// Template used for the cancellation exit survey.
pub const TEMPLATE_EXIT_SURVEY: &str = "subscription-exit-survey";

/// Template confirming a back-office purchase to the operator-entered
/// contacts.
pub const TEMPLATE_MANUAL_FULFILLMENT: &str = "manual-subscription-notification";

#[derive(Debug, Error)]
#[error("notification error: {0}")]
pub struct NotifierError(pub String);

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends a templated email to the given recipients.
    async fn send(
        &self,
        recipients: &[String],
        template: &str,
        context: &HashMap<String, String>,
    ) -> Result<(), NotifierError>;
}
