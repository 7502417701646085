use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kitchen_payments::adapters::http::{app_router, WebhookAppState};
use kitchen_payments::adapters::notifications::LoggingNotifier;
use kitchen_payments::adapters::postgres::{
    PostgresBookingService, PostgresBookingStore, PostgresPayeeDirectory,
    PostgresTransactionLedger, PostgresWebhookEventRepository,
};
use kitchen_payments::adapters::rate_limiter::InMemoryRateLimiter;
use kitchen_payments::adapters::stripe::{StripeConfig, StripePaymentProcessor};
use kitchen_payments::application::{
    ReconciliationPorts, ReconciliationServices, ReconciliationSettings,
};
use kitchen_payments::config::{AppConfig, ServerConfig};
use kitchen_payments::domain::payments::{VerificationMode, WebhookVerifier};
use kitchen_payments::ports::WebhookEventRepository;

/// Processed event ids are kept well past the processor's retry horizon.
const EVENT_RETENTION_DAYS: i64 = 30;
const EVENT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(&config.server);

    config.validate().context("Invalid configuration")?;

    let mode = VerificationMode::resolve(
        config.payment.webhook_secret().cloned(),
        config.is_production(),
    )?;
    if !mode.is_enforced() {
        tracing::warn!("webhook signature verification is disabled");
    }

    let connect_options = config
        .database
        .connect_options()
        .context("Invalid database URL")?;
    let pool = PgPoolOptions::new()
        .min_connections(config.database.min_connections)
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .idle_timeout(config.database.idle_timeout())
        .connect_with(connect_options)
        .await
        .context("Failed to connect to database")?;

    if config.database.run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;
        tracing::info!("database migrations applied");
    }

    let processor = StripePaymentProcessor::new(StripeConfig::from_payment_config(&config.payment))?;
    if config.payment.is_test_mode() {
        tracing::info!("processor client running with a test-mode key");
    }

    let events = Arc::new(PostgresWebhookEventRepository::new(pool.clone()));
    let ports = ReconciliationPorts {
        processor: Arc::new(processor),
        ledger: Arc::new(PostgresTransactionLedger::new(pool.clone())),
        bookings: Arc::new(PostgresBookingStore::new(pool.clone())),
        booking_service: Arc::new(PostgresBookingService::new(pool.clone())),
        payees: Arc::new(PostgresPayeeDirectory::new(pool.clone())),
        notifier: Arc::new(LoggingNotifier::new()),
        events: events.clone(),
    };
    let services = ReconciliationServices::new(
        ports,
        ReconciliationSettings::from_config(&config.payment),
    );

    let state = WebhookAppState {
        router: Arc::new(services.router(WebhookVerifier::new(mode))),
        reprocessor: Arc::new(services.reprocessor()),
        rate_limiter: Arc::new(InMemoryRateLimiter::from_config(&config.rate_limit)),
        manual_secret: config.payment.manual_secret().cloned().map(Arc::new),
        production: config.is_production(),
    };

    tokio::spawn(sweep_processed_events(events));

    let app = app_router(state)
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(TraceLayer::new_for_http());

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(%addr, environment = ?config.server.environment, "kitchen-payments listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

/// JSON logs in production, human-readable otherwise; `RUST_LOG` wins over
/// the configured level.
fn init_tracing(server: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(server.log_level.clone()));
    let registry = tracing_subscriber::registry().with(filter);

    if server.is_production() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn sweep_processed_events(events: Arc<PostgresWebhookEventRepository>) {
    let mut interval = tokio::time::interval(EVENT_SWEEP_INTERVAL);
    loop {
        interval.tick().await;
        let cutoff = chrono::Utc::now() - chrono::Duration::days(EVENT_RETENTION_DAYS);
        match events.delete_before(cutoff).await {
            Ok(0) => {}
            Ok(deleted) => tracing::info!(deleted, "expired webhook event records removed"),
            Err(e) => tracing::warn!(error = %e, "webhook event sweep failed"),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutdown signal received");
}
