//! Reconciliation orchestrator - the vendor-agnostic webhook engine.
//!
//! One strictly sequential state machine per inbound request:
//! verify → optional short-circuit → normalize → persist → classify →
//! side effects. No partial commit is ever visible to the caller: a mapper
//! failure fails the request loudly instead of silently dropping events.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::adapters::vendors::{RawRequest, VendorAdapter};
use crate::domain::billing::{BillingError, NewPurchaseEvent};
use crate::ports::PurchaseLedger;

use super::side_effects::SideEffectExecutor;

/// Terminal result of processing one webhook request. The HTTP layer maps
/// each variant onto a fixed plain-text response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// All events in the batch processed.
    Ok,
    /// The vendor's pre-processing short-circuited (e.g. connectivity ping).
    ShortCircuit(String),
    /// A cancellation was processed; the batch stopped there.
    Cancelled,
}

impl WebhookOutcome {
    pub fn body(&self) -> &str {
        match self {
            WebhookOutcome::Ok => "ok",
            WebhookOutcome::ShortCircuit(body) => body,
            WebhookOutcome::Cancelled => "cancelled",
        }
    }
}

pub struct WebhookOrchestrator {
    ledger: Arc<dyn PurchaseLedger>,
    effects: Arc<SideEffectExecutor>,
    /// Operational flag for environments without reachable external
    /// provisioning: activation side effects are skipped entirely, the
    /// ledger write still happens.
    skip_provisioning: bool,
}

impl WebhookOrchestrator {
    pub fn new(
        ledger: Arc<dyn PurchaseLedger>,
        effects: Arc<SideEffectExecutor>,
        skip_provisioning: bool,
    ) -> Self {
        Self {
            ledger,
            effects,
            skip_provisioning,
        }
    }

    pub async fn process(
        &self,
        adapter: &dyn VendorAdapter,
        request: &RawRequest,
    ) -> Result<WebhookOutcome, BillingError> {
        adapter.verify(request)?;

        if let Some(body) = adapter.pre_process_request(request) {
            debug!(vendor = %adapter.vendor(), "request short-circuited before processing");
            return Ok(WebhookOutcome::ShortCircuit(body));
        }

        let payload: Value = serde_json::from_slice(&request.body)
            .map_err(|e| BillingError::malformed(format!("request body is not JSON: {e}")))?;
        let events = adapter.pre_process_payload(&payload)?;

        info!(
            vendor = %adapter.vendor(),
            events = events.len(),
            "processing webhook"
        );

        for event in events {
            let record = self
                .ledger
                .append(NewPurchaseEvent {
                    vendor: adapter.vendor(),
                    action: adapter.purchase_action(&event)?,
                    sender: adapter.purchase_sender(&event)?,
                    subscription_id: adapter.purchase_subscription(&event)?,
                    effective_date: adapter.purchase_effective_date(&event)?,
                    should_have_tenant: adapter.purchase_should_have_tenant(&event),
                    payload: event,
                })
                .await?;

            if adapter.action_is_cancelled(&record) {
                // Terminal for the batch: a cancellation payload carries
                // exactly one subscription in every vendor's semantics.
                self.effects.cancel(&record).await;
                info!(purchase_id = record.id, "subscription cancelled");
                return Ok(WebhookOutcome::Cancelled);
            } else if adapter.action_is_activated(&record) {
                if self.skip_provisioning {
                    info!(
                        purchase_id = record.id,
                        "provisioning disabled, recording only"
                    );
                } else {
                    self.effects.activate(adapter, &record).await?;
                    info!(purchase_id = record.id, "subscription activated");
                }
            } else if adapter.action_is_recurring_billing(&record) {
                self.effects.renew(adapter, &record).await?;
            } else {
                // Unrecognized vendor actions are recorded for audit and
                // change no entitlement.
                debug!(
                    purchase_id = record.id,
                    action = %record.action,
                    "persist-only event"
                );
            }
        }

        Ok(WebhookOutcome::Ok)
    }
}
