//! Mailing-list subscriber port.
//!
//! Strictly fire-and-forget: the activation executor discards every error
//! returned here (malformed addresses included) so that list failures can
//! never affect the HTTP response or the ledger write.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("mailing list error: {0}")]
pub struct MailingListError(pub String);

#[async_trait]
pub trait MailingList: Send + Sync {
    /// Subscribes an email address to the newsletter list.
    async fn subscribe(&self, email: &str) -> Result<(), MailingListError>;
}
