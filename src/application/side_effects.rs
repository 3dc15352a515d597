//! Side-effect executors invoked by the webhook orchestrator.
//!
//! Thin callers into the external collaborators with documented tolerance
//! of partial failure: provisioner "already exists" / "not found" are
//! success, mailing-list failures are always swallowed, and a missing
//! tenant on renewal is a silent no-op.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::adapters::vendors::{TenantMatch, VendorAdapter};
use crate::domain::billing::{
    paid_until, product_access_list, BillingError, PurchaseEvent, RobotName,
};
use crate::ports::{
    AccountProvisioner, Directory, MailingList, Notifier, ProvisionerError, PurchaseLedger,
    TenantCriteria, TenantRegistry, TEMPLATE_EXIT_SURVEY, TEMPLATE_MANUAL_FULFILLMENT,
};

pub struct SideEffectExecutor {
    ledger: Arc<dyn PurchaseLedger>,
    tenants: Arc<dyn TenantRegistry>,
    provisioner: Arc<dyn AccountProvisioner>,
    mailing_list: Arc<dyn MailingList>,
    notifier: Arc<dyn Notifier>,
    directory: Arc<dyn Directory>,
}

impl SideEffectExecutor {
    pub fn new(
        ledger: Arc<dyn PurchaseLedger>,
        tenants: Arc<dyn TenantRegistry>,
        provisioner: Arc<dyn AccountProvisioner>,
        mailing_list: Arc<dyn MailingList>,
        notifier: Arc<dyn Notifier>,
        directory: Arc<dyn Directory>,
    ) -> Self {
        Self {
            ledger,
            tenants,
            provisioner,
            mailing_list,
            notifier,
            directory,
        }
    }

    /// Activation: ensure the buyer account exists, provision the robot
    /// account, grant read access per SKU token, subscribe to the
    /// newsletter.
    pub async fn activate(
        &self,
        adapter: &dyn VendorAdapter,
        record: &PurchaseEvent,
    ) -> Result<(), BillingError> {
        self.directory.ensure_user(&record.sender).await?;

        if let Some(subscription_id) = &record.subscription_id {
            let robot = RobotName::from_subscription(subscription_id);

            match self.provisioner.create_account(&robot).await {
                Ok(()) | Err(ProvisionerError::AlreadyExists) => {}
                Err(e) => return Err(BillingError::Provisioning(e.to_string())),
            }

            if let Some(sku) = adapter.find_sku_for(record) {
                for product in product_access_list(&sku) {
                    match self.provisioner.grant_read(&robot, product).await {
                        Ok(()) | Err(ProvisionerError::AlreadyExists) => {}
                        Err(e) => return Err(BillingError::Provisioning(e.to_string())),
                    }
                }
            }
        } else {
            warn!(
                purchase_id = record.id,
                "purchase has no subscription id, skipping robot provisioning"
            );
        }

        // Fire-and-forget: list failures (malformed addresses included)
        // never affect the response or the ledger write.
        if let Err(e) = self.mailing_list.subscribe(&record.sender).await {
            debug!(sender = %record.sender, error = %e, "mailing list subscription failed");
        }

        if let Some(recipients) = adapter.fulfillment_recipients(record) {
            let context: HashMap<String, String> = HashMap::new();
            if let Err(e) = self
                .notifier
                .send(&recipients, TEMPLATE_MANUAL_FULFILLMENT, &context)
                .await
            {
                warn!(purchase_id = record.id, error = %e, "fulfillment notification failed");
            }
        }

        Ok(())
    }

    /// Cancellation: best-effort robot deletion and an exit-survey email.
    ///
    /// Deliberately does not touch the buyer's platform account or any
    /// tenant: a buyer may hold several concurrent subscriptions and one
    /// cancellation must leave the others unaffected.
    pub async fn cancel(&self, record: &PurchaseEvent) {
        if let Some(subscription_id) = &record.subscription_id {
            let robot = RobotName::from_subscription(subscription_id);
            match self.provisioner.delete_account(&robot).await {
                Ok(()) | Err(ProvisionerError::NotFound) => {}
                Err(e) => {
                    warn!(robot = %robot, error = %e, "robot account deletion failed");
                }
            }
        }

        let recipients = vec![record.sender.clone()];
        let context: HashMap<String, String> = HashMap::new();
        if let Err(e) = self
            .notifier
            .send(&recipients, TEMPLATE_EXIT_SURVEY, &context)
            .await
        {
            warn!(sender = %record.sender, error = %e, "exit survey notification failed");
        }
    }

    /// Recurring billing: extend the matching tenant's paid-until date.
    /// No matching tenant means the buyer has not created one yet (or
    /// already unsubscribed) and is a silent no-op.
    pub async fn renew(
        &self,
        adapter: &dyn VendorAdapter,
        record: &PurchaseEvent,
    ) -> Result<(), BillingError> {
        let Some(tenant_match) = adapter.tenant_match(record) else {
            return Ok(());
        };
        let criteria = self.resolve_criteria(tenant_match).await?;

        let Some(tenant) = self.tenants.find_paid_tenant(&criteria).await? else {
            debug!(purchase_id = record.id, "no paid tenant matches, nothing to extend");
            return Ok(());
        };

        let extended = paid_until(
            adapter.billing_cycle(record),
            record.effective_date,
            adapter.next_billing_date(record),
        );
        self.tenants.extend_paid_until(tenant.id, extended).await?;

        debug!(
            tenant_id = tenant.id,
            paid_until = %extended,
            "tenant paid-until extended"
        );
        Ok(())
    }

    /// Lowers an adapter-produced match to registry criteria; the one
    /// ledger-dependent variant collects every sender ever recorded for
    /// the subscription.
    async fn resolve_criteria(
        &self,
        tenant_match: TenantMatch,
    ) -> Result<TenantCriteria, BillingError> {
        Ok(match tenant_match {
            TenantMatch::OwnerInOrganization {
                identities,
                organization,
            } => TenantCriteria::OwnerInOrganization {
                identities,
                organization,
            },
            TenantMatch::SubscriptionSenders {
                subscription_id,
                current_sender,
            } => {
                let senders = self
                    .ledger
                    .senders_for_subscription(&subscription_id)
                    .await?;
                TenantCriteria::SubscriptionSenders {
                    senders,
                    current_sender,
                }
            }
            TenantMatch::ContactAddresses { identities } => {
                TenantCriteria::ContactAddresses { identities }
            }
        })
    }
}
