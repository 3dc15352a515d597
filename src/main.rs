//! Service entry point: configuration, adapter wiring, HTTP server and the
//! periodic renewal scan.

use std::sync::Arc;

use chrono::Utc;
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use marketplace_billing::adapters::http::AppState;
use marketplace_billing::adapters::vendors::{
    FastspringAdapter, GithubAdapter, GithubCronAdapter, ManualAdapter,
};
use marketplace_billing::adapters::{
    GithubApiConfig, GithubMarketplace, HttpNotifier, MailchimpConfig, MailchimpList,
    NotifierConfig, PostgresDirectory, PostgresPurchaseLedger, PostgresTenantRegistry, QuayConfig,
    QuayProvisioner,
};
use marketplace_billing::application::{RenewalScanner, SideEffectExecutor, WebhookOrchestrator};
use marketplace_billing::config::AppConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .init();

    let pool = PgPoolOptions::new()
        .min_connections(config.database.min_connections)
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .connect(&config.database.url)
        .await?;

    let ledger = Arc::new(PostgresPurchaseLedger::new(pool.clone()));
    let tenants = Arc::new(PostgresTenantRegistry::new(pool.clone()));
    let directory = Arc::new(PostgresDirectory::new(pool));

    let provisioner = Arc::new(QuayProvisioner::new(QuayConfig::new(
        config.registry.organization.clone(),
        SecretString::new(config.registry.token.clone()),
    )));
    let mailing_list = Arc::new(MailchimpList::new(MailchimpConfig {
        api_key: SecretString::new(config.newsletter.api_key.clone()),
        list_id: config.newsletter.list_id.clone(),
    }));
    let notifier = Arc::new(HttpNotifier::new(NotifierConfig {
        endpoint: config.notification.endpoint.clone(),
        api_key: SecretString::new(config.notification.api_key.clone()),
        sender: config.notification.sender.clone(),
    }));

    let effects = Arc::new(SideEffectExecutor::new(
        ledger.clone(),
        tenants,
        provisioner,
        mailing_list,
        notifier,
        directory,
    ));
    let orchestrator = Arc::new(WebhookOrchestrator::new(
        ledger.clone(),
        effects,
        config.features.skip_provisioning,
    ));

    if config.features.enable_renewal_scan {
        let api = Arc::new(GithubMarketplace::new(GithubApiConfig::new(
            SecretString::new(config.marketplace.token.clone()),
        )));
        let scanner = RenewalScanner::new(ledger, api, orchestrator.clone());
        let every =
            std::time::Duration::from_secs(config.features.renewal_scan_interval_hours * 3600);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                match scanner.run(Utc::now()).await {
                    Ok(report) => info!(
                        examined = report.examined,
                        synthesized = report.synthesized,
                        failures = report.failures,
                        "renewal scan finished"
                    ),
                    Err(e) => error!(error = %e, "renewal scan aborted"),
                }
            }
        });
    }

    let state = AppState {
        orchestrator,
        github: Arc::new(GithubAdapter::new(SecretString::new(
            config.vendors.github_webhook_secret.clone(),
        ))),
        fastspring: Arc::new(FastspringAdapter::new(SecretString::new(
            config.vendors.fastspring_webhook_secret.clone(),
        ))),
        manual: Arc::new(ManualAdapter::new()),
        github_cron: Arc::new(GithubCronAdapter::new()),
    };

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "marketplace-billing listening");
    axum::serve(listener, marketplace_billing::adapters::http::router(state)).await?;

    Ok(())
}
