//! Media storage with local fallback.

use std::sync::Arc;

use bytes::Bytes;

use super::{
    LocalStore, ObjectStore, S3Store, SavedObject, StorageError, content_type_for, normalize_name,
};
use crate::config::StorageConfig;
use crate::retry::RetryPolicy;

/// Uploaded media (product images and the like).
///
/// Writes go to the primary store when one is configured. If the primary
/// fails its connectivity probe, or every upload attempt fails, the bytes
/// are written to the local fallback instead so the upload is never lost.
#[derive(Clone)]
pub struct MediaStorage {
    primary: Option<Arc<dyn ObjectStore>>,
    fallback: LocalStore,
    policy: RetryPolicy,
}

impl std::fmt::Debug for MediaStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStorage")
            .field("primary", &self.primary.as_ref().map(|p| p.backend()))
            .field("fallback", &self.fallback)
            .field("policy", &self.policy)
            .finish()
    }
}

impl MediaStorage {
    #[must_use]
    pub fn new(
        primary: Option<Arc<dyn ObjectStore>>,
        fallback: LocalStore,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            primary,
            fallback,
            policy,
        }
    }

    /// Build from configuration: S3 primary when `USE_S3` is on, local disk
    /// under `MEDIA_ROOT` always.
    pub async fn from_config(config: &StorageConfig) -> Self {
        let fallback = LocalStore::new(&config.media_root, &config.media_url);
        let primary: Option<Arc<dyn ObjectStore>> = match (&config.s3, config.use_s3) {
            (Some(s3), true) => Some(Arc::new(S3Store::connect(s3, &config.media_location).await)),
            _ => None,
        };
        Self::new(primary, fallback, RetryPolicy::default())
    }

    /// Store `body` under `name`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidKey` for an unusable name, or the local
    /// filesystem error if the fallback write itself fails.
    pub async fn save(&self, name: &str, body: Bytes) -> Result<SavedObject, StorageError> {
        let name = normalize_name(name)?;
        let content_type = content_type_for(&name);

        let Some(primary) = &self.primary else {
            return self.save_locally(name, body, &content_type).await;
        };

        if let Err(e) = primary.probe().await {
            tracing::warn!(error = %e, name = %name, "Media store unreachable, saving locally");
            return self.save_locally(name, body, &content_type).await;
        }

        let result = self
            .policy
            .run("media upload", |_| {
                primary.put(&name, body.clone(), &content_type)
            })
            .await;

        match result {
            Ok(()) => Ok(SavedObject {
                url: primary.url(&name),
                backend: primary.backend(),
                name,
            }),
            Err(exhausted) => {
                tracing::error!(
                    error = %exhausted.last_error,
                    attempts = exhausted.attempts,
                    name = %name,
                    "Media upload failed, saving locally"
                );
                self.save_locally(name, body, &content_type).await
            }
        }
    }

    /// Public URL for a stored name, from the primary store when configured.
    #[must_use]
    pub fn url(&self, name: &str) -> String {
        self.primary
            .as_ref()
            .map_or_else(|| self.fallback.url(name), |p| p.url(name))
    }

    async fn save_locally(
        &self,
        name: String,
        body: Bytes,
        content_type: &str,
    ) -> Result<SavedObject, StorageError> {
        self.fallback.put(&name, body, content_type).await?;
        Ok(SavedObject {
            url: self.fallback.url(&name),
            backend: self.fallback.backend(),
            name,
        })
    }
}
