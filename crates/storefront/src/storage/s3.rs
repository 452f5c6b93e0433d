//! S3 object store.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use secrecy::ExposeSecret;

use super::{Backend, ObjectStore, StorageError, object_key};
use crate::config::S3Config;

/// Objects under a key prefix in an S3 bucket.
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
    location: String,
    public_base_url: String,
}

impl std::fmt::Debug for S3Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Store")
            .field("bucket", &self.bucket)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

impl S3Store {
    /// Build a client for `config`, storing objects under `location`.
    ///
    /// Static credentials are used when both halves are configured; the
    /// default provider chain otherwise. No request is made here; call
    /// [`ObjectStore::probe`] to check connectivity.
    pub async fn connect(config: &S3Config, location: &str) -> Self {
        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared_config);

        if let (Some(access), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            let creds = Credentials::new(
                access.clone(),
                secret.expose_secret().to_string(),
                None,
                None,
                "mercato-static",
            );
            builder = builder.credentials_provider(creds);
        }

        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint.clone()).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
            location: location.trim_matches('/').to_string(),
            public_base_url: config.public_base_url(),
        }
    }

    fn key(&self, name: &str) -> String {
        object_key(&self.location, name)
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn backend(&self) -> Backend {
        Backend::S3
    }

    async fn probe(&self) -> Result<(), StorageError> {
        self.client
            .list_objects_v2()
            .bucket(&self.bucket)
            .max_keys(1)
            .send()
            .await
            .map_err(|e| classify("list_objects_v2", &e))?;
        Ok(())
    }

    async fn put(&self, name: &str, body: Bytes, content_type: &str) -> Result<(), StorageError> {
        let key = self.key(name);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| classify("put_object", &e))?;
        tracing::debug!(bucket = %self.bucket, key = %key, "Uploaded object");
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool, StorageError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.key(name))
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(service_err)) if service_err.err().is_not_found() => {
                Ok(false)
            }
            Err(e) => Err(classify("head_object", &e)),
        }
    }

    fn url(&self, name: &str) -> String {
        format!("{}/{}", self.public_base_url, self.key(name))
    }
}

/// Sort an SDK failure into something worth retrying or not.
///
/// Timeouts, dispatch failures, unparsable responses, throttling and 5xx
/// responses are transient. Everything else (bad credentials, missing bucket,
/// access denied) is a rejection.
fn classify<E>(operation: &'static str, err: &SdkError<E, HttpResponse>) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let transient = match err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            true
        }
        SdkError::ServiceError(ctx) => is_transient_status(ctx.raw().status().as_u16()),
        _ => false,
    };
    let message = DisplayErrorContext(err).to_string();
    if transient {
        StorageError::Transient { operation, message }
    } else {
        StorageError::Backend { operation, message }
    }
}

const fn is_transient_status(status: u16) -> bool {
    status == 429 || status >= 500
}
