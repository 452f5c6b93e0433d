//! Product catalog reads, cached with `moka` (5-minute TTL).
//!
//! Stock levels change when orders are placed, so the webhook and checkout
//! paths call [`CatalogService::invalidate_all`] after writing an order.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use sqlx::PgPool;
use tracing::{debug, instrument};

use mercato_core::ProductId;

use crate::db::{ProductRepository, RepositoryError};
use crate::models::Product;

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
enum CacheKey {
    All,
    Product(ProductId),
}

#[derive(Debug, Clone)]
enum CacheValue {
    Products(Arc<Vec<Product>>),
    Product(Box<Product>),
}

/// Cached access to the product catalog.
#[derive(Clone)]
pub struct CatalogService {
    inner: Arc<CatalogInner>,
}

struct CatalogInner {
    pool: PgPool,
    cache: Cache<CacheKey, CacheValue>,
}

impl std::fmt::Debug for CatalogService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogService")
            .field("cached_entries", &self.inner.cache.entry_count())
            .finish_non_exhaustive()
    }
}

impl CatalogService {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();
        Self {
            inner: Arc::new(CatalogInner { pool, cache }),
        }
    }

    /// Every product, by name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the database read fails.
    #[instrument(skip(self))]
    pub async fn list_products(&self) -> Result<Arc<Vec<Product>>, RepositoryError> {
        if let Some(CacheValue::Products(products)) = self.inner.cache.get(&CacheKey::All).await {
            debug!("Catalog cache hit");
            return Ok(products);
        }

        let products = Arc::new(ProductRepository::new(&self.inner.pool).list().await?);
        self.inner
            .cache
            .insert(CacheKey::All, CacheValue::Products(Arc::clone(&products)))
            .await;
        Ok(products)
    }

    /// A single product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the database read fails.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let key = CacheKey::Product(id);
        if let Some(CacheValue::Product(product)) = self.inner.cache.get(&key).await {
            debug!("Product cache hit");
            return Ok(Some(*product));
        }

        let product = ProductRepository::new(&self.inner.pool).get(id).await?;
        if let Some(product) = &product {
            self.inner
                .cache
                .insert(key, CacheValue::Product(Box::new(product.clone())))
                .await;
        }
        Ok(product)
    }

    /// Drop every cached entry.
    pub async fn invalidate_all(&self) {
        self.inner.cache.invalidate_all();
        self.inner.cache.run_pending_tasks().await;
    }
}
