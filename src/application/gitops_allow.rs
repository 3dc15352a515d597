//! Subscription self-service queries: the GitOps allow check, the
//! buyer-settable gitops prefix, and robot-credential regeneration.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::adapters::vendors::{fastspring, github};
use crate::domain::billing::{
    paid_until, parse_vendor_date, validate_gitops_prefix, BillingCycle, BillingError,
    GitopsPrefixError, RobotName, Vendor,
};
use crate::ports::{AccountProvisioner, Directory, ProvisionerError, PurchaseLedger};

/// Failures from setting a gitops prefix: either a field-level validation
/// message for the buyer or an underlying store error.
#[derive(Debug, thiserror::Error)]
pub enum SetPrefixError {
    #[error(transparent)]
    Invalid(#[from] GitopsPrefixError),

    #[error(transparent)]
    Billing(#[from] BillingError),
}

pub struct SubscriptionService {
    ledger: Arc<dyn PurchaseLedger>,
    provisioner: Arc<dyn AccountProvisioner>,
    directory: Arc<dyn Directory>,
}

impl SubscriptionService {
    pub fn new(
        ledger: Arc<dyn PurchaseLedger>,
        provisioner: Arc<dyn AccountProvisioner>,
        directory: Arc<dyn Directory>,
    ) -> Self {
        Self {
            ledger,
            provisioner,
            directory,
        }
    }

    /// Whether automated pipelines may keep processing `repo_url`: true
    /// when the most recent paid purchase whose `gitops_prefix` covers the
    /// URL is still within its paid-until window.
    pub async fn gitops_allow(
        &self,
        repo_url: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, BillingError> {
        let Some(record) = self.ledger.latest_paid_with_prefix_of(repo_url).await? else {
            debug!(repo_url, "no covering purchase");
            return Ok(false);
        };

        let cycle = match record.vendor.is_marketplace() {
            true => github::record_billing_cycle(&record),
            false => BillingCycle::Unrecognized,
        };
        let explicit = record
            .marketplace_next_billing_date()
            .and_then(|raw| parse_vendor_date(raw).ok());
        let until = paid_until(cycle, record.effective_date, explicit);

        Ok(now <= until)
    }

    /// Sets the gitops prefix on a purchase, exactly once, after the
    /// vendor- and SKU-specific validation rules.
    pub async fn set_gitops_prefix(
        &self,
        purchase_id: i64,
        value: &str,
    ) -> Result<(), SetPrefixError> {
        let record = self
            .ledger
            .find_by_id(purchase_id)
            .await?
            .ok_or_else(|| BillingError::ledger(format!("no purchase {purchase_id}")))?;

        // The directory lookup is only consulted for base self-support
        // SKUs, but doing it unconditionally keeps the validation pure.
        let namespace = self.directory.personal_namespace(&record.sender).await?;
        let sku = match record.vendor {
            Vendor::Github | Vendor::GithubCron => github::find_sku(&record.payload),
            Vendor::Fastspring => fastspring::find_sku(&record.payload),
            Vendor::Manual => record
                .payload
                .get("sku")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        }
        .unwrap_or_default();

        validate_gitops_prefix(
            record.vendor,
            &sku,
            record.gitops_prefix.as_deref(),
            value,
            namespace.as_deref(),
        )?;

        self.ledger.set_gitops_prefix(purchase_id, value).await?;
        Ok(())
    }

    /// Regenerates the robot credential for a subscription, returning the
    /// new token. Refused outright when the ledger has never recorded a
    /// purchase for the subscription.
    pub async fn regenerate_token(&self, subscription_id: &str) -> Result<String, BillingError> {
        if self.ledger.latest_purchase(subscription_id).await?.is_none() {
            debug!(subscription_id, "no purchase on record");
            return Err(BillingError::Forbidden);
        }

        let robot = RobotName::from_subscription(subscription_id);
        self.provisioner
            .regenerate_token(&robot)
            .await
            .map_err(|e| match e {
                ProvisionerError::NotFound => {
                    BillingError::Provisioning(format!("no robot account for {subscription_id}"))
                }
                other => BillingError::Provisioning(other.to_string()),
            })
    }
}
