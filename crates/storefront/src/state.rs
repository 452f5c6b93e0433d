//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::assets::AssetResolver;
use crate::config::StorefrontConfig;
use crate::db::OrderStore;
use crate::middleware::SecurityHeaders;
use crate::services::{CatalogService, MailQueue};
use crate::storage::MediaStorage;
use crate::stripe::{PaymentGateway, WebhookVerifier};
use crate::webhooks::WebhookHandler;

/// Backends the state is assembled from.
///
/// `main` wires the `PostgreSQL` store and the Stripe client; tests swap in
/// in-memory implementations.
pub struct Backends {
    pub orders: Arc<dyn OrderStore>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub media: MediaStorage,
    pub mail: MailQueue,
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    catalog: CatalogService,
    orders: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGateway>,
    webhooks: WebhookHandler,
    media: MediaStorage,
    assets: AssetResolver,
    mail: MailQueue,
    security: SecurityHeaders,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(config: StorefrontConfig, pool: PgPool, backends: Backends) -> Self {
        let Backends {
            orders,
            gateway,
            media,
            mail,
        } = backends;

        let static_url = config.storage.public_static_url();
        let assets = AssetResolver::new(&config.assets, &static_url);
        let security = SecurityHeaders::new(&static_url, config.assets.dev_server_url.as_deref());
        let webhooks = WebhookHandler::new(
            WebhookVerifier::new(config.stripe.webhook_secret.clone()),
            Arc::clone(&orders),
            Arc::clone(&gateway),
            mail.clone(),
            config.pricing,
            config.base_url.trim_end_matches('/'),
        );

        Self {
            inner: Arc::new(AppStateInner {
                catalog: CatalogService::new(pool.clone()),
                config,
                pool,
                orders,
                gateway,
                webhooks,
                media,
                assets,
                mail,
                security,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Cached product catalog.
    #[must_use]
    pub fn catalog(&self) -> &CatalogService {
        &self.inner.catalog
    }

    #[must_use]
    pub fn orders(&self) -> &dyn OrderStore {
        self.inner.orders.as_ref()
    }

    #[must_use]
    pub fn gateway(&self) -> &dyn PaymentGateway {
        self.inner.gateway.as_ref()
    }

    #[must_use]
    pub fn webhooks(&self) -> &WebhookHandler {
        &self.inner.webhooks
    }

    #[must_use]
    pub fn media(&self) -> &MediaStorage {
        &self.inner.media
    }

    /// Vite asset resolver.
    #[must_use]
    pub fn assets(&self) -> &AssetResolver {
        &self.inner.assets
    }

    #[must_use]
    pub fn mail(&self) -> &MailQueue {
        &self.inner.mail
    }

    /// Header values for the security headers middleware.
    #[must_use]
    pub fn security_headers(&self) -> SecurityHeaders {
        self.inner.security.clone()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! State over in-memory backends and a lazily connecting pool.

    use std::path::PathBuf;

    use secrecy::SecretString;
    use sqlx::postgres::PgPoolOptions;

    use mercato_core::{CurrencyCode, DeliveryPricing};

    use super::*;
    use crate::config::{AssetConfig, StorageConfig, StripeConfig};
    use crate::retry::RetryPolicy;
    use crate::services::Mailer;
    use crate::storage::{LocalStore, ObjectStore};

    pub const WEBHOOK_SECRET: &str = "whsec_route_test";
    pub const STAFF_TOKEN: &str = "staff-token-9f8e7d6c5b4a39281706f5e4d3c2b1a0";

    pub fn config(media_root: PathBuf) -> StorefrontConfig {
        StorefrontConfig {
            database_url: SecretString::from("postgres://localhost/mercato_test"),
            host: [127, 0, 0, 1].into(),
            port: 8000,
            base_url: "https://shop.example.com".to_string(),
            stripe: StripeConfig {
                secret_key: SecretString::from("sk_test_routes"),
                webhook_secret: SecretString::from(WEBHOOK_SECRET),
                currency: CurrencyCode::USD,
                api_base: "http://127.0.0.1:9".to_string(),
            },
            storage: StorageConfig {
                use_s3: false,
                s3: None,
                media_location: "media".to_string(),
                static_location: "static".to_string(),
                media_root,
                static_root: PathBuf::from("staticfiles"),
                media_url: "/media".to_string(),
                static_url: "/static".to_string(),
            },
            assets: AssetConfig {
                manifest_path: PathBuf::from("does-not-exist/manifest.json"),
                dev_server_url: None,
            },
            email: None,
            pricing: DeliveryPricing::default(),
            staff_api_token: Some(SecretString::from(STAFF_TOKEN)),
            sentry_dsn: None,
            sentry_environment: None,
        }
    }

    /// Build state; must run inside a Tokio runtime.
    pub fn state(
        config: StorefrontConfig,
        orders: Arc<dyn OrderStore>,
        gateway: Arc<dyn PaymentGateway>,
        primary: Option<Arc<dyn ObjectStore>>,
        mailer: Arc<dyn Mailer>,
    ) -> AppState {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/mercato_test")
            .unwrap_or_else(|e| panic!("lazy pool: {e}"));
        let (mail, _worker) = MailQueue::start(mailer, RetryPolicy::immediate(1), 8);
        let media = MediaStorage::new(
            primary,
            LocalStore::new(config.storage.media_root.clone(), &config.storage.media_url),
            RetryPolicy::immediate(3),
        );
        AppState::new(
            config,
            pool,
            Backends {
                orders,
                gateway,
                media,
                mail,
            },
        )
    }
}
