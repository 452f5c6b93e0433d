//! Media and static file storage.
//!
//! # Backends
//!
//! - [`S3Store`] - S3 or an S3-compatible service, optionally fronted by CloudFront
//! - [`LocalStore`] - A directory on the local filesystem
//!
//! # Policies
//!
//! - [`MediaStorage`] - Uploads to S3 with retries and falls back to local disk
//!   when S3 is unreachable or the retries run out. Product media must never
//!   be lost because the bucket is having a bad day.
//! - [`StaticStorage`] - Uploads with retries but never falls back: static
//!   assets are only servable from the CDN-backed bucket.

mod local;
mod media;
mod s3;
mod static_files;

pub use local::LocalStore;
pub use media::MediaStorage;
pub use s3::S3Store;
pub use static_files::StaticStorage;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

use crate::retry::Retryable;

/// Region used when none is configured.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Errors that can occur when storing objects.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Network or throttling failure that may succeed if repeated.
    #[error("transient storage failure during {operation}: {message}")]
    Transient {
        operation: &'static str,
        message: String,
    },

    /// The backend rejected the request (credentials, permissions, bucket).
    #[error("storage backend rejected {operation}: {message}")]
    Backend {
        operation: &'static str,
        message: String,
    },

    /// Local filesystem error.
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    /// Object name is empty or escapes its location.
    #[error("invalid object name: {0}")]
    InvalidKey(String),

    /// Every attempt failed.
    #[error("upload of {key} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        key: String,
        attempts: u32,
        #[source]
        source: Box<Self>,
    },
}

impl Retryable for StorageError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Which backend ended up holding an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    S3,
    Local,
}

/// An object that was stored successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedObject {
    /// Name relative to the storage location.
    pub name: String,
    /// Public URL of the object.
    pub url: String,
    /// Backend holding the bytes.
    pub backend: Backend,
}

/// A place objects can be written to.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Backend kind, for reporting.
    fn backend(&self) -> Backend;

    /// Cheap connectivity check (a single list call for S3).
    async fn probe(&self) -> Result<(), StorageError>;

    /// Write `body` under `key`, replacing any existing object.
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), StorageError>;

    /// Whether an object exists under `key`.
    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    /// Public URL for `key`.
    fn url(&self, key: &str) -> String;
}

/// Strip trailing inline comments and whitespace from a region string.
///
/// Environment files in the wild contain values such as
/// `eu-west-2  # London`; the SDK rejects those verbatim.
#[must_use]
pub fn sanitize_region(raw: &str) -> String {
    let region = raw.split('#').next().unwrap_or_default().trim();
    let region = region.split_whitespace().next().unwrap_or_default();
    if region.is_empty() {
        DEFAULT_REGION.to_string()
    } else {
        region.to_string()
    }
}

/// Normalise an object name: forward slashes, no leading slash, no `.`/`..`
/// segments, no empty segments.
///
/// # Errors
///
/// Returns `StorageError::InvalidKey` if the name is empty or contains `..`.
pub fn normalize_name(name: &str) -> Result<String, StorageError> {
    let unified = name.replace('\\', "/");
    let mut segments = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => return Err(StorageError::InvalidKey(name.to_string())),
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        return Err(StorageError::InvalidKey(name.to_string()));
    }
    Ok(segments.join("/"))
}

/// Join a location prefix and an already-normalised name into an object key.
#[must_use]
pub fn object_key(location: &str, name: &str) -> String {
    let location = location.trim_matches('/');
    if location.is_empty() {
        name.to_string()
    } else {
        format!("{location}/{name}")
    }
}

/// Content type for a file name, from its extension.
#[must_use]
pub fn content_type_for(name: &str) -> String {
    mime_guess::from_path(name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory object store that can be told to fail.

    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    /// How the fake store behaves on `put`.
    #[derive(Debug, Clone, Copy)]
    pub enum FailureMode {
        Never,
        /// Fail transiently for the first N puts.
        FirstPuts(u32),
        /// Every put fails transiently.
        AlwaysTransient,
        /// Every put is rejected.
        AlwaysRejected,
        /// The probe fails.
        Unreachable,
    }

    pub struct MemoryStore {
        pub objects: Mutex<HashMap<String, Bytes>>,
        pub put_attempts: AtomicU32,
        mode: FailureMode,
    }

    impl MemoryStore {
        pub fn new(mode: FailureMode) -> Self {
            Self {
                objects: Mutex::new(HashMap::new()),
                put_attempts: AtomicU32::new(0),
                mode,
            }
        }

        pub fn get(&self, key: &str) -> Option<Bytes> {
            self.objects.lock().ok()?.get(key).cloned()
        }
    }

    #[async_trait]
    impl ObjectStore for MemoryStore {
        fn backend(&self) -> Backend {
            Backend::S3
        }

        async fn probe(&self) -> Result<(), StorageError> {
            match self.mode {
                FailureMode::Unreachable => Err(StorageError::Transient {
                    operation: "list_objects",
                    message: "connection refused".to_string(),
                }),
                _ => Ok(()),
            }
        }

        async fn put(&self, key: &str, body: Bytes, _content_type: &str) -> Result<(), StorageError> {
            let attempt = self.put_attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let fail = match self.mode {
                FailureMode::Never => None,
                FailureMode::FirstPuts(n) if attempt <= n => Some(true),
                FailureMode::FirstPuts(_) => None,
                FailureMode::AlwaysTransient | FailureMode::Unreachable => Some(true),
                FailureMode::AlwaysRejected => Some(false),
            };
            match fail {
                Some(true) => Err(StorageError::Transient {
                    operation: "put_object",
                    message: "timed out".to_string(),
                }),
                Some(false) => Err(StorageError::Backend {
                    operation: "put_object",
                    message: "AccessDenied".to_string(),
                }),
                None => {
                    if let Ok(mut objects) = self.objects.lock() {
                        objects.insert(key.to_string(), body);
                    }
                    Ok(())
                }
            }
        }

        async fn exists(&self, key: &str) -> Result<bool, StorageError> {
            Ok(self.get(key).is_some())
        }

        fn url(&self, key: &str) -> String {
            format!("https://cdn.test/{key}")
        }
    }
}
