//! Static file storage.

use std::sync::Arc;

use bytes::Bytes;

use super::{ObjectStore, SavedObject, StorageError, content_type_for, normalize_name};
use crate::retry::RetryPolicy;

/// Collected static assets (CSS, JS, fonts, the Vite build).
///
/// Uploads are retried like media uploads, but a failed upload is an error:
/// assets written anywhere other than the configured store would never be
/// served.
#[derive(Clone)]
pub struct StaticStorage {
    store: Arc<dyn ObjectStore>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for StaticStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticStorage")
            .field("backend", &self.store.backend())
            .field("policy", &self.policy)
            .finish()
    }
}

impl StaticStorage {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// Check the store is reachable.
    ///
    /// # Errors
    ///
    /// Returns the backend error when the probe fails.
    pub async fn probe(&self) -> Result<(), StorageError> {
        self.store.probe().await
    }

    /// Store `body` under `name`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidKey` for an unusable name, or
    /// `StorageError::RetriesExhausted` wrapping the last failure.
    pub async fn save(&self, name: &str, body: Bytes) -> Result<SavedObject, StorageError> {
        let name = normalize_name(name)?;
        let content_type = content_type_for(&name);

        self.policy
            .run("static upload", |_| {
                self.store.put(&name, body.clone(), &content_type)
            })
            .await
            .map_err(|exhausted| StorageError::RetriesExhausted {
                key: name.clone(),
                attempts: exhausted.attempts,
                source: Box::new(exhausted.last_error),
            })?;

        Ok(SavedObject {
            url: self.store.url(&name),
            backend: self.store.backend(),
            name,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::error::Error as _;
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::storage::testing::{FailureMode, MemoryStore};

    #[tokio::test]
    async fn test_saves_after_transient_failure() {
        let store = Arc::new(MemoryStore::new(FailureMode::FirstPuts(1)));
        let storage = StaticStorage::new(store.clone(), RetryPolicy::immediate(3));

        let saved = storage.save("css/site.css", Bytes::from_static(b"body{}")).await.unwrap();

        assert_eq!(saved.url, "https://cdn.test/css/site.css");
        assert_eq!(store.put_attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_reraises_after_retries() {
        let store = Arc::new(MemoryStore::new(FailureMode::AlwaysTransient));
        let storage = StaticStorage::new(store.clone(), RetryPolicy::immediate(3));

        let err = storage.save("css/site.css", Bytes::from_static(b"body{}")).await.unwrap_err();

        match &err {
            StorageError::RetriesExhausted { key, attempts, .. } => {
                assert_eq!(key, "css/site.css");
                assert_eq!(*attempts, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.source().is_some());
        assert!(store.get("css/site.css").is_none());
    }
}
