//! End-to-end webhook scenarios through the HTTP surface.
//!
//! These tests drive the real router with signed vendor payloads and
//! assert on the observable outcome: ledger rows, registry robot
//! accounts, repository grants, newsletter subscriptions and tenant
//! paid-until dates.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use secrecy::SecretString;
use serde_json::json;
use sha1::Sha1;
use sha2::Sha256;
use tower::ServiceExt;

use marketplace_billing::adapters::http::{router, AppState};
use marketplace_billing::adapters::memory::{
    InMemoryDirectory, InMemoryLedger, InMemoryTenantRegistry, RecordingMailingList,
    RecordingNotifier, RecordingProvisioner, StoredTenant,
};
use marketplace_billing::adapters::vendors::{
    FastspringAdapter, GithubAdapter, GithubCronAdapter, ManualAdapter,
};
use marketplace_billing::application::{SideEffectExecutor, WebhookOrchestrator};
use marketplace_billing::domain::billing::Vendor;

const GITHUB_SECRET: &str = "hook-secret";
const FASTSPRING_SECRET: &str = "fs-secret";

// =============================================================================
// Test Infrastructure
// =============================================================================

struct TestApp {
    router: axum::Router,
    ledger: Arc<InMemoryLedger>,
    tenants: Arc<InMemoryTenantRegistry>,
    provisioner: Arc<RecordingProvisioner>,
    mailing_list: Arc<RecordingMailingList>,
}

impl TestApp {
    fn new() -> Self {
        let ledger = Arc::new(InMemoryLedger::new());
        let tenants = Arc::new(InMemoryTenantRegistry::new());
        let provisioner = Arc::new(RecordingProvisioner::new());
        let mailing_list = Arc::new(RecordingMailingList::new());

        let effects = Arc::new(SideEffectExecutor::new(
            ledger.clone(),
            tenants.clone(),
            provisioner.clone(),
            mailing_list.clone(),
            Arc::new(RecordingNotifier::new()),
            Arc::new(InMemoryDirectory::new()),
        ));
        let orchestrator = Arc::new(WebhookOrchestrator::new(ledger.clone(), effects, false));

        let state = AppState {
            orchestrator,
            github: Arc::new(GithubAdapter::new(SecretString::new(
                GITHUB_SECRET.to_string(),
            ))),
            fastspring: Arc::new(FastspringAdapter::new(SecretString::new(
                FASTSPRING_SECRET.to_string(),
            ))),
            manual: Arc::new(ManualAdapter::new()),
            github_cron: Arc::new(GithubCronAdapter::new()),
        };

        TestApp {
            router: router(state),
            ledger,
            tenants,
            provisioner,
            mailing_list,
        }
    }

    async fn post(
        &self,
        path: &str,
        signature_header: (&str, &str),
        body: Vec<u8>,
    ) -> (StatusCode, String) {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .header(signature_header.0, signature_header.1)
            .body(Body::from(body))
            .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }
}

fn sign_github(body: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha1>::new_from_slice(GITHUB_SECRET.as_bytes()).expect("hmac accepts any key size");
    mac.update(body);
    format!("sha1={}", hex_encode(&mac.finalize().into_bytes()))
}

fn sign_fastspring(body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(FASTSPRING_SECRET.as_bytes())
        .expect("hmac accepts any key size");
    mac.update(body);
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn marketplace_purchase_body(price_in_cents: i64) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "action": "purchased",
        "effective_date": "2019-04-01T00:00:00+00:00",
        "sender": {"login": "atodorov", "email": "buyer@example.com"},
        "marketplace_purchase": {
            "account": {
                "id": 18404719,
                "login": "kiwitcms",
                "organization_billing_email": "billing@example.com",
                "type": "Organization",
                "url": "https://api.github.com/orgs/kiwitcms"
            },
            "billing_cycle": "monthly",
            "next_billing_date": "2019-05-01T00:00:00+00:00",
            "plan": {
                "monthly_price_in_cents": price_in_cents,
                "name": "Private Tenant",
                "bullets": [
                    "Unlimited users",
                    "Docker repositories: quay.io/kiwitcms/version, https://quay.io/kiwitcms/enterprise"
                ]
            }
        }
    }))
    .unwrap()
}

fn charge_completed_body(email: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "events": [{
            "id": "Gl_Xo3kYT2SWQtogF3xXJQ",
            "type": "subscription.charge.completed",
            "data": {
                "id": "TUmTFphXT6aRsJ_7hIlW1g",
                "subscription": {
                    "id": "TUmTFphXT6aRsJ_7hIlW1g",
                    "sku": "x-tenant+version",
                    "intervalUnit": "month"
                },
                "changed": 1654041600000i64,
                "next": 1656806400000i64,
                "account": {"contact": {"email": email}}
            }
        }]
    }))
    .unwrap()
}

fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
}

// =============================================================================
// Marketplace purchase
// =============================================================================

#[tokio::test]
async fn marketplace_purchase_provisions_registry_access() {
    let app = TestApp::new();

    let body = marketplace_purchase_body(3200);
    let signature = sign_github(&body);
    let (status, text) = app
        .post("/hooks/github", ("X-Hub-Signature", &signature), body)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "ok");

    let rows = app.ledger.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].vendor, Vendor::Github);
    assert_eq!(rows[0].subscription_id.as_deref(), Some("gh-18404719"));
    assert_eq!(rows[0].sender, "buyer@example.com");

    // One robot account, read access per repository from the plan bullet.
    assert_eq!(app.provisioner.accounts(), vec!["gh_18404719"]);
    assert_eq!(
        app.provisioner.grants(),
        vec![
            ("gh_18404719".to_string(), "version".to_string()),
            ("gh_18404719".to_string(), "enterprise".to_string()),
        ]
    );
    assert_eq!(app.mailing_list.subscribed(), vec!["buyer@example.com"]);
}

#[tokio::test]
async fn free_plan_is_recorded_without_provisioning() {
    let app = TestApp::new();

    let body = marketplace_purchase_body(0);
    let signature = sign_github(&body);
    let (status, text) = app
        .post("/hooks/github", ("X-Hub-Signature", &signature), body)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "ok");
    assert_eq!(app.ledger.row_count(), 1);
    assert!(app.provisioner.accounts().is_empty());
    assert!(app.provisioner.grants().is_empty());
}

// =============================================================================
// FastSpring renewal
// =============================================================================

#[tokio::test]
async fn charge_completed_extends_the_buyers_tenant() {
    let app = TestApp::new();
    app.tenants.insert(StoredTenant {
        id: 7,
        owner: "buyer@example.com".to_string(),
        organization: "buyer-org".to_string(),
        paid_until: Some(utc(2022, 6, 1, 23, 59, 59)),
        extra_contacts: vec![],
    });

    let body = charge_completed_body("buyer@example.com");
    let signature = sign_fastspring(&body);
    let (status, text) = app
        .post("/hooks/fastspring", ("X-FS-Signature", &signature), body)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "ok");

    // The explicit next-charge date wins, normalized to end of day.
    assert_eq!(
        app.tenants.paid_until_of(7),
        Some(utc(2022, 7, 3, 23, 59, 59))
    );
}

#[tokio::test]
async fn charge_completed_without_a_tenant_still_acknowledges() {
    let app = TestApp::new();

    let body = charge_completed_body("nobody@example.com");
    let signature = sign_fastspring(&body);
    let (status, text) = app
        .post("/hooks/fastspring", ("X-FS-Signature", &signature), body)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "ok");
    assert_eq!(app.ledger.row_count(), 1);
}

// =============================================================================
// Forged signatures
// =============================================================================

#[tokio::test]
async fn forged_marketplace_signature_leaves_no_trace() {
    let app = TestApp::new();

    let body = marketplace_purchase_body(3200);
    let (status, text) = app
        .post("/hooks/github", ("X-Hub-Signature", "sha1=deadbeef"), body)
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(text.is_empty());
    assert_eq!(app.ledger.row_count(), 0);
    assert!(app.provisioner.accounts().is_empty());
}

#[tokio::test]
async fn forged_fastspring_signature_leaves_no_trace() {
    let app = TestApp::new();

    let body = charge_completed_body("buyer@example.com");
    let (status, text) = app
        .post("/hooks/fastspring", ("X-FS-Signature", "bm90LXZhbGlk"), body)
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(text.is_empty());
    assert_eq!(app.ledger.row_count(), 0);
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn cancellation_answers_cancelled_and_removes_the_robot() {
    let app = TestApp::new();

    // Purchase first so the robot exists.
    let body = marketplace_purchase_body(3200);
    let signature = sign_github(&body);
    app.post("/hooks/github", ("X-Hub-Signature", &signature), body)
        .await;

    let mut payload: serde_json::Value =
        serde_json::from_slice(&marketplace_purchase_body(3200)).unwrap();
    payload["action"] = json!("cancelled");
    let body = serde_json::to_vec(&payload).unwrap();
    let signature = sign_github(&body);
    let (status, text) = app
        .post("/hooks/github", ("X-Hub-Signature", &signature), body)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "cancelled");
    assert_eq!(app.provisioner.deletions(), vec!["gh_18404719"]);
    assert_eq!(app.ledger.row_count(), 2);
}
