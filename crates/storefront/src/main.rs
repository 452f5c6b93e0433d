//! Mercato storefront server.
//!
//! # Architecture
//!
//! - Axum web framework, Askama templates for the home page and emails
//! - `PostgreSQL` via sqlx for the catalog, orders and processed webhook events
//! - Stripe REST API for payment intents, signed webhooks for reconciliation
//! - S3 (or local disk) for media, Vite manifest for static assets
//! - Background mail queue in front of SMTP

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use mercato_storefront::{
    config::StorefrontConfig,
    db::{self, PgOrderStore},
    retry::RetryPolicy,
    routes,
    services::{LogMailer, MailQueue, Mailer, SmtpMailer, mail_queue::DEFAULT_CAPACITY},
    state::{AppState, Backends},
    storage::MediaStorage,
    stripe::StripeClient,
};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &StorefrontConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn mailer(config: &StorefrontConfig) -> Arc<dyn Mailer> {
    match config.email.as_ref().map(SmtpMailer::new) {
        Some(Ok(smtp)) => Arc::new(smtp),
        Some(Err(e)) => {
            tracing::error!(error = %e, "SMTP misconfigured, logging emails instead");
            Arc::new(LogMailer)
        }
        None => {
            tracing::warn!("SMTP not configured, logging emails instead");
            Arc::new(LogMailer)
        }
    }
}

#[tokio::main]
async fn main() {
    // Load configuration from environment (needed for Sentry init)
    let config = StorefrontConfig::from_env().expect("Failed to load configuration");

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "mercato_storefront=info,tower_http=debug".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let pool = db::create_pool(&config.database_url)
        .await
        .expect("Failed to create database pool");
    tracing::info!("Database pool created");

    // NOTE: Migrations are NOT run automatically on startup.
    // Run them explicitly via: cargo run -p mercato-cli -- migrate

    let (mail, mail_worker) =
        MailQueue::start(mailer(&config), RetryPolicy::default(), DEFAULT_CAPACITY);
    let media = MediaStorage::from_config(&config.storage).await;
    if config.storage.use_s3 {
        tracing::info!("Media stored in S3 with local fallback");
    }

    let backends = Backends {
        orders: Arc::new(PgOrderStore::new(pool.clone())),
        gateway: Arc::new(StripeClient::new(
            config.stripe.secret_key.clone(),
            &config.stripe.api_base,
        )),
        media,
        mail,
    };
    let state = AppState::new(config.clone(), pool, backends);

    let app = routes::app(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction());

    let addr = config.socket_addr();
    tracing::info!("storefront listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // The router (and with it every queue sender) is gone; let the worker
    // finish what was already queued.
    if let Err(e) = mail_worker.await {
        tracing::error!(error = %e, "Mail worker ended abnormally");
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
