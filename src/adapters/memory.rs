//! In-memory implementations of every port, for tests and local runs.
//!
//! Deterministic and lock-based; methods panic on poisoned locks, which is
//! acceptable here but rules these out for production use. The recording
//! variants capture calls so tests can assert on side effects.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::billing::{BillingError, NewPurchaseEvent, PurchaseEvent, RobotName};
use crate::ports::{
    AccountProvisioner, Directory, MailingList, MailingListError, MarketplaceAccount,
    MarketplaceApi, Notifier, NotifierError, ProvisionerError, PurchaseLedger, ScanWindows,
    TenantCriteria, TenantRef, TenantRegistry,
};

// ════════════════════════════════════════════════════════════════════════════
// Purchase ledger
// ════════════════════════════════════════════════════════════════════════════

/// In-memory purchase ledger.
#[derive(Default)]
pub struct InMemoryLedger {
    rows: RwLock<Vec<PurchaseEvent>>,
    next_id: AtomicI64,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// All rows, in insertion order (for test assertions).
    pub fn rows(&self) -> Vec<PurchaseEvent> {
        self.rows.read().expect("ledger lock").clone()
    }

    pub fn row_count(&self) -> usize {
        self.rows.read().expect("ledger lock").len()
    }

    /// Inserts a fully-formed row, bypassing id/timestamp assignment.
    /// Lets tests pin `received_on` for idempotency scenarios.
    pub fn insert_raw(&self, row: PurchaseEvent) {
        let mut rows = self.rows.write().expect("ledger lock");
        self.next_id.fetch_max(row.id + 1, Ordering::SeqCst);
        rows.push(row);
    }

    fn latest_of<'a, I>(candidates: I) -> Option<&'a PurchaseEvent>
    where
        I: Iterator<Item = &'a PurchaseEvent>,
    {
        candidates.max_by_key(|row| (row.received_on, row.id))
    }
}

#[async_trait]
impl PurchaseLedger for InMemoryLedger {
    async fn append(&self, event: NewPurchaseEvent) -> Result<PurchaseEvent, BillingError> {
        let row = PurchaseEvent {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            vendor: event.vendor,
            action: event.action,
            sender: event.sender,
            subscription_id: event.subscription_id,
            effective_date: event.effective_date,
            received_on: Utc::now(),
            should_have_tenant: event.should_have_tenant,
            gitops_prefix: None,
            payload: event.payload,
        };
        self.rows.write().expect("ledger lock").push(row.clone());
        Ok(row)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<PurchaseEvent>, BillingError> {
        let rows = self.rows.read().expect("ledger lock");
        Ok(rows.iter().find(|row| row.id == id).cloned())
    }

    async fn latest_purchase(
        &self,
        subscription_id: &str,
    ) -> Result<Option<PurchaseEvent>, BillingError> {
        let rows = self.rows.read().expect("ledger lock");
        Ok(Self::latest_of(rows.iter().filter(|row| {
            row.is_purchased() && row.subscription_id.as_deref() == Some(subscription_id)
        }))
        .cloned())
    }

    async fn senders_for_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Vec<String>, BillingError> {
        let rows = self.rows.read().expect("ledger lock");
        let mut senders = Vec::new();
        for row in rows.iter() {
            if row.subscription_id.as_deref() == Some(subscription_id)
                && !senders.contains(&row.sender)
            {
                senders.push(row.sender.clone());
            }
        }
        Ok(senders)
    }

    async fn renewal_candidates(
        &self,
        windows: &ScanWindows,
    ) -> Result<Vec<PurchaseEvent>, BillingError> {
        let rows = self.rows.read().expect("ledger lock");
        let in_window = |at: DateTime<Utc>| {
            (at >= windows.monthly.0 && at <= windows.monthly.1)
                || (at >= windows.yearly.0 && at <= windows.yearly.1)
        };
        let mut candidates: Vec<PurchaseEvent> = rows
            .iter()
            .filter(|row| {
                row.vendor.is_marketplace()
                    && row.is_purchased()
                    && row.marketplace_price_in_cents().unwrap_or(0) > 0
                    && in_window(row.received_on)
            })
            .cloned()
            .collect();
        candidates.sort_by_key(|row| std::cmp::Reverse((row.received_on, row.id)));
        Ok(candidates)
    }

    async fn has_rows_for_account_after(
        &self,
        account_id: i64,
        after: DateTime<Utc>,
    ) -> Result<bool, BillingError> {
        let rows = self.rows.read().expect("ledger lock");
        Ok(rows.iter().any(|row| {
            row.marketplace_account_id() == Some(account_id) && row.received_on > after
        }))
    }

    async fn set_gitops_prefix(
        &self,
        purchase_id: i64,
        prefix: &str,
    ) -> Result<(), BillingError> {
        let mut rows = self.rows.write().expect("ledger lock");
        let row = rows
            .iter_mut()
            .find(|row| row.id == purchase_id)
            .ok_or_else(|| BillingError::ledger(format!("no purchase {purchase_id}")))?;
        if row.gitops_prefix.as_deref().is_some_and(|p| !p.is_empty()) {
            return Err(BillingError::ledger("gitops prefix already set"));
        }
        row.gitops_prefix = Some(prefix.to_string());
        Ok(())
    }

    async fn latest_paid_with_prefix_of(
        &self,
        repo_url: &str,
    ) -> Result<Option<PurchaseEvent>, BillingError> {
        let repo_url = repo_url.to_lowercase();
        let rows = self.rows.read().expect("ledger lock");
        Ok(Self::latest_of(rows.iter().filter(|row| {
            row.is_purchased()
                && row.marketplace_price_in_cents().unwrap_or(0) > 0
                && row
                    .gitops_prefix
                    .as_deref()
                    .is_some_and(|p| !p.is_empty() && repo_url.starts_with(&p.to_lowercase()))
        }))
        .cloned())
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tenant registry
// ════════════════════════════════════════════════════════════════════════════

/// Tenant as stored by the in-memory registry.
#[derive(Debug, Clone)]
pub struct StoredTenant {
    pub id: i64,
    pub owner: String,
    pub organization: String,
    pub paid_until: Option<DateTime<Utc>>,
    /// Auxiliary contact list (designated billing contacts).
    pub extra_contacts: Vec<String>,
}

/// In-memory tenant registry implementing the layered predicate match.
#[derive(Default)]
pub struct InMemoryTenantRegistry {
    tenants: RwLock<Vec<StoredTenant>>,
}

impl InMemoryTenantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tenant: StoredTenant) {
        self.tenants.write().expect("registry lock").push(tenant);
    }

    pub fn paid_until_of(&self, tenant_id: i64) -> Option<DateTime<Utc>> {
        let tenants = self.tenants.read().expect("registry lock");
        tenants
            .iter()
            .find(|t| t.id == tenant_id)
            .and_then(|t| t.paid_until)
    }

    fn matches(tenant: &StoredTenant, criteria: &TenantCriteria) -> bool {
        match criteria {
            TenantCriteria::OwnerInOrganization {
                identities,
                organization,
            } => identities.contains(&tenant.owner) && &tenant.organization == organization,
            TenantCriteria::SubscriptionSenders {
                senders,
                current_sender,
            } => senders.contains(&tenant.owner) || tenant.extra_contacts.contains(current_sender),
            TenantCriteria::ContactAddresses { identities } => identities.contains(&tenant.owner),
        }
    }
}

#[async_trait]
impl TenantRegistry for InMemoryTenantRegistry {
    async fn find_paid_tenant(
        &self,
        criteria: &TenantCriteria,
    ) -> Result<Option<TenantRef>, BillingError> {
        let tenants = self.tenants.read().expect("registry lock");
        Ok(tenants
            .iter()
            .filter(|t| t.paid_until.is_some())
            .find(|t| Self::matches(t, criteria))
            .map(|t| TenantRef {
                id: t.id,
                organization: t.organization.clone(),
                paid_until: t.paid_until,
            }))
    }

    async fn extend_paid_until(
        &self,
        tenant_id: i64,
        paid_until: DateTime<Utc>,
    ) -> Result<(), BillingError> {
        let mut tenants = self.tenants.write().expect("registry lock");
        let tenant = tenants
            .iter_mut()
            .find(|t| t.id == tenant_id)
            .ok_or_else(|| BillingError::Registry(format!("no tenant {tenant_id}")))?;
        tenant.paid_until = Some(paid_until);
        Ok(())
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Account provisioner
// ════════════════════════════════════════════════════════════════════════════

/// Recording provisioner: tracks created accounts and granted products.
#[derive(Default)]
pub struct RecordingProvisioner {
    accounts: Mutex<Vec<String>>,
    grants: Mutex<Vec<(String, String)>>,
    deletions: Mutex<Vec<String>>,
    fail_create: Mutex<bool>,
}

impl RecordingProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accounts(&self) -> Vec<String> {
        self.accounts.lock().expect("provisioner lock").clone()
    }

    /// `(robot, product)` pairs granted read access, in call order.
    pub fn grants(&self) -> Vec<(String, String)> {
        self.grants.lock().expect("provisioner lock").clone()
    }

    pub fn deletions(&self) -> Vec<String> {
        self.deletions.lock().expect("provisioner lock").clone()
    }

    pub fn fail_next_create(&self) {
        *self.fail_create.lock().expect("provisioner lock") = true;
    }
}

#[async_trait]
impl AccountProvisioner for RecordingProvisioner {
    async fn create_account(&self, name: &RobotName) -> Result<(), ProvisionerError> {
        if std::mem::take(&mut *self.fail_create.lock().expect("provisioner lock")) {
            return Err(ProvisionerError::Request("simulated failure".to_string()));
        }
        let mut accounts = self.accounts.lock().expect("provisioner lock");
        if accounts.iter().any(|a| a == name.as_str()) {
            return Err(ProvisionerError::AlreadyExists);
        }
        accounts.push(name.as_str().to_string());
        Ok(())
    }

    async fn grant_read(&self, name: &RobotName, product: &str) -> Result<(), ProvisionerError> {
        self.grants
            .lock()
            .expect("provisioner lock")
            .push((name.as_str().to_string(), product.to_string()));
        Ok(())
    }

    async fn delete_account(&self, name: &RobotName) -> Result<(), ProvisionerError> {
        self.deletions
            .lock()
            .expect("provisioner lock")
            .push(name.as_str().to_string());
        let mut accounts = self.accounts.lock().expect("provisioner lock");
        let before = accounts.len();
        accounts.retain(|a| a != name.as_str());
        if accounts.len() == before {
            return Err(ProvisionerError::NotFound);
        }
        Ok(())
    }

    async fn regenerate_token(&self, name: &RobotName) -> Result<String, ProvisionerError> {
        let accounts = self.accounts.lock().expect("provisioner lock");
        if !accounts.iter().any(|a| a == name.as_str()) {
            return Err(ProvisionerError::NotFound);
        }
        Ok(format!("token-{name}"))
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Mailing list, notifier, directory
// ════════════════════════════════════════════════════════════════════════════

/// Recording mailing list; optionally fails every call to exercise the
/// swallow-all contract.
#[derive(Default)]
pub struct RecordingMailingList {
    subscribed: Mutex<Vec<String>>,
    always_fail: bool,
}

impl RecordingMailingList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            subscribed: Mutex::new(Vec::new()),
            always_fail: true,
        }
    }

    pub fn subscribed(&self) -> Vec<String> {
        self.subscribed.lock().expect("mailing list lock").clone()
    }
}

#[async_trait]
impl MailingList for RecordingMailingList {
    async fn subscribe(&self, email: &str) -> Result<(), MailingListError> {
        if self.always_fail {
            return Err(MailingListError("simulated failure".to_string()));
        }
        self.subscribed
            .lock()
            .expect("mailing list lock")
            .push(email.to_string());
        Ok(())
    }
}

/// Recording notifier.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(Vec<String>, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(recipients, template)` pairs, in call order.
    pub fn sent(&self) -> Vec<(Vec<String>, String)> {
        self.sent.lock().expect("notifier lock").clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(
        &self,
        recipients: &[String],
        template: &str,
        _context: &HashMap<String, String>,
    ) -> Result<(), NotifierError> {
        self.sent
            .lock()
            .expect("notifier lock")
            .push((recipients.to_vec(), template.to_string()));
        Ok(())
    }
}

/// In-memory directory: remembers ensured users and maps identities to
/// personal namespaces.
#[derive(Default)]
pub struct InMemoryDirectory {
    users: Mutex<Vec<String>>,
    namespaces: Mutex<HashMap<String, String>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespace(identity: &str, namespace: &str) -> Self {
        let dir = Self::new();
        dir.namespaces
            .lock()
            .expect("directory lock")
            .insert(identity.to_string(), namespace.to_string());
        dir
    }

    pub fn users(&self) -> Vec<String> {
        self.users.lock().expect("directory lock").clone()
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn ensure_user(&self, identity: &str) -> Result<(), BillingError> {
        let mut users = self.users.lock().expect("directory lock");
        if !users.iter().any(|u| u == identity) {
            users.push(identity.to_string());
        }
        Ok(())
    }

    async fn personal_namespace(
        &self,
        identity: &str,
    ) -> Result<Option<String>, BillingError> {
        let namespaces = self.namespaces.lock().expect("directory lock");
        Ok(namespaces.get(identity).cloned())
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Marketplace read API
// ════════════════════════════════════════════════════════════════════════════

/// Stub marketplace read API with pre-programmed per-account responses.
#[derive(Default)]
pub struct StubMarketplaceApi {
    accounts: Mutex<HashMap<i64, MarketplaceAccount>>,
    failing_accounts: Mutex<Vec<i64>>,
    calls: Mutex<Vec<i64>>,
}

impl StubMarketplaceApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_account(&self, account: MarketplaceAccount) {
        self.accounts
            .lock()
            .expect("api lock")
            .insert(account.id, account);
    }

    /// Makes lookups for this account id fail with a transport error.
    pub fn fail_account(&self, account_id: i64) {
        self.failing_accounts
            .lock()
            .expect("api lock")
            .push(account_id);
    }

    /// Account ids queried, in call order.
    pub fn calls(&self) -> Vec<i64> {
        self.calls.lock().expect("api lock").clone()
    }
}

#[async_trait]
impl MarketplaceApi for StubMarketplaceApi {
    async fn account_subscription(
        &self,
        account_id: i64,
    ) -> Result<Option<MarketplaceAccount>, BillingError> {
        self.calls.lock().expect("api lock").push(account_id);
        if self
            .failing_accounts
            .lock()
            .expect("api lock")
            .contains(&account_id)
        {
            return Err(BillingError::VendorApi("simulated failure".to_string()));
        }
        Ok(self
            .accounts
            .lock()
            .expect("api lock")
            .get(&account_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Duration, TimeZone};
    use serde_json::json;

    use crate::domain::billing::Vendor;

    fn purchased_row(id: i64, sender: &str, received_on: DateTime<Utc>) -> PurchaseEvent {
        PurchaseEvent {
            id,
            vendor: Vendor::Fastspring,
            action: "purchased".to_string(),
            sender: sender.to_string(),
            subscription_id: Some("fs-SUB-1".to_string()),
            effective_date: received_on,
            received_on,
            should_have_tenant: true,
            gitops_prefix: None,
            payload: json!({"sku": "x-tenant+version"}),
        }
    }

    #[tokio::test]
    async fn latest_purchase_prefers_the_newest_row() {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let ledger = InMemoryLedger::new();

        // Newest row inserted first: the answer depends on `received_on`,
        // never on insertion order.
        ledger.insert_raw(purchased_row(2, "renewed@example.com", base));
        ledger.insert_raw(purchased_row(
            1,
            "original@example.com",
            base - Duration::days(3),
        ));

        let latest = ledger.latest_purchase("fs-SUB-1").await.unwrap().unwrap();
        assert_eq!(latest.sender, "renewed@example.com");
        assert_eq!(latest.id, 2);
    }

    #[tokio::test]
    async fn latest_purchase_ignores_other_actions_and_subscriptions() {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let ledger = InMemoryLedger::new();
        ledger.insert_raw(purchased_row(1, "buyer@example.com", base));

        let mut cancelled = purchased_row(2, "buyer@example.com", base + Duration::days(1));
        cancelled.action = "cancelled".to_string();
        ledger.insert_raw(cancelled);

        let latest = ledger.latest_purchase("fs-SUB-1").await.unwrap().unwrap();
        assert_eq!(latest.id, 1);

        assert!(ledger.latest_purchase("fs-SUB-2").await.unwrap().is_none());
    }
}
