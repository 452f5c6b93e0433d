//! Static file collection.
//!
//! Walks a source directory and stores every file through
//! [`StaticStorage`]: S3 when it is enabled (or forced), the local
//! `STATIC_ROOT` otherwise.
//!
//! The Vite build under `dist/` is left out unless `--preserve-vite` is
//! given. When it is included, hashed file names are kept as they are and
//! the Vite manifest goes up last, so a page never references an asset that
//! is not there yet.

use std::error::Error as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use mercato_storefront::config::{ConfigError, S3Config, StorageConfig};
use mercato_storefront::retry::RetryPolicy;
use mercato_storefront::storage::{LocalStore, ObjectStore, S3Store, StaticStorage, StorageError};
use thiserror::Error;
use walkdir::WalkDir;

/// Vite build directory, relative to the source directory.
const VITE_DIR: &str = "dist";

/// Where Vite may write its manifest, relative to the source directory.
const VITE_MANIFESTS: [&str; 2] = ["dist/.vite/manifest.json", "dist/manifest.json"];

/// Command line options.
#[derive(Debug, Clone)]
pub struct Options {
    pub source: PathBuf,
    pub preserve_vite: bool,
    pub show_error_details: bool,
    pub force_s3: bool,
    pub dry_run: bool,
}

#[derive(Debug, Error)]
pub enum CollectError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("--force-s3 requires AWS_STORAGE_BUCKET_NAME")]
    MissingBucket,

    #[error("--force-s3 requires AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY")]
    MissingCredentials,

    #[error("static storage is unreachable: {0}")]
    Unreachable(#[source] StorageError),

    #[error("source directory {} does not exist", .0.display())]
    MissingSource(PathBuf),

    #[error("failed to walk source directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("{failed} of {total} files failed to upload")]
    UploadsFailed { failed: usize, total: usize },
}

/// A file to store, with its name relative to the source directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFile {
    pub path: PathBuf,
    pub name: String,
}

/// Outcome of an upload run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub uploaded: usize,
    pub failed: usize,
}

/// Run the command.
///
/// # Errors
///
/// Returns `CollectError` for configuration problems, an unreachable store,
/// or when any upload failed.
pub async fn run(options: &Options) -> Result<(), CollectError> {
    let config = StorageConfig::from_env()?;
    let s3 = s3_target(&config, options.force_s3)?;
    let files = plan(&options.source, options.preserve_vite)?;

    if options.dry_run {
        for file in &files {
            tracing::info!(name = %file.name, "Would collect");
        }
        tracing::info!(files = files.len(), "Dry run, nothing uploaded");
        return Ok(());
    }

    let store: Arc<dyn ObjectStore> = match s3 {
        Some(s3) => {
            tracing::info!(bucket = %s3.bucket, location = %config.static_location, "Collecting to S3");
            Arc::new(S3Store::connect(s3, &config.static_location).await)
        }
        None => {
            tracing::info!(root = %config.static_root.display(), "Collecting to local static root");
            Arc::new(LocalStore::new(&config.static_root, &config.static_url))
        }
    };
    let storage = StaticStorage::new(store, RetryPolicy::default());
    storage.probe().await.map_err(CollectError::Unreachable)?;

    let summary = upload(&storage, &files, options.show_error_details).await;

    #[allow(clippy::print_stdout)]
    {
        println!(
            "{} static files collected, {} failed.",
            summary.uploaded, summary.failed
        );
    }

    if summary.failed > 0 {
        return Err(CollectError::UploadsFailed {
            failed: summary.failed,
            total: files.len(),
        });
    }
    Ok(())
}

/// The S3 settings to collect into, or `None` for the local static root.
///
/// # Errors
///
/// With `force_s3`, returns `CollectError::MissingBucket` or
/// `CollectError::MissingCredentials` when S3 is not fully configured.
pub fn s3_target(config: &StorageConfig, force_s3: bool) -> Result<Option<&S3Config>, CollectError> {
    if force_s3 {
        let s3 = config.s3.as_ref().ok_or(CollectError::MissingBucket)?;
        if !s3.has_credentials() {
            return Err(CollectError::MissingCredentials);
        }
        return Ok(Some(s3));
    }
    Ok(config.s3.as_ref().filter(|_| config.use_s3))
}

/// List the files under `source` in upload order.
///
/// # Errors
///
/// Returns `CollectError::MissingSource` if `source` is not a directory, or
/// `CollectError::Walk` if it cannot be read.
pub fn plan(source: &Path, preserve_vite: bool) -> Result<Vec<PlannedFile>, CollectError> {
    if !source.is_dir() {
        return Err(CollectError::MissingSource(source.to_path_buf()));
    }

    let mut files = Vec::new();
    let mut skipped = 0usize;
    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if !preserve_vite && is_vite_build(&name) {
            skipped += 1;
            continue;
        }
        files.push(PlannedFile {
            path: entry.into_path(),
            name,
        });
    }

    if skipped > 0 {
        tracing::info!(skipped, "Skipping Vite build output (use --preserve-vite to include it)");
    }

    // Stable: everything else keeps its walk order.
    files.sort_by_key(|f| VITE_MANIFESTS.contains(&f.name.as_str()));
    Ok(files)
}

fn is_vite_build(name: &str) -> bool {
    name.strip_prefix(VITE_DIR).is_some_and(|rest| rest.starts_with('/'))
}

/// Store every planned file, counting successes and failures.
pub async fn upload(storage: &StaticStorage, files: &[PlannedFile], show_error_details: bool) -> Summary {
    let mut summary = Summary::default();

    for file in files {
        let body = match tokio::fs::read(&file.path).await {
            Ok(body) => Bytes::from(body),
            Err(e) => {
                report_failure(&file.name, &e, show_error_details);
                summary.failed += 1;
                continue;
            }
        };

        match storage.save(&file.name, body).await {
            Ok(saved) => {
                tracing::debug!(name = %saved.name, url = %saved.url, "Collected");
                summary.uploaded += 1;
            }
            Err(e) => {
                report_failure(&file.name, &e, show_error_details);
                summary.failed += 1;
            }
        }
    }
    summary
}

fn report_failure(name: &str, error: &(dyn std::error::Error + 'static), show_error_details: bool) {
    if show_error_details {
        tracing::error!(name, error = %error_chain(error), "Failed to collect");
    } else {
        tracing::error!(name, error = %error, "Failed to collect");
    }
}

/// An error and all of its sources, one per line.
#[must_use]
pub fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut chain = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        chain.push_str("\n  caused by: ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::error::Error as _;
    use std::fs;

    use secrecy::SecretString;

    use super::*;

    fn write(root: &Path, name: &str, body: &str) {
        let path = root.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    fn source_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "css/site.css", "body{}");
        write(dir.path(), "dist/.vite/manifest.json", "{}");
        write(dir.path(), "dist/assets/main-4f2a.js", "console.log(1)");
        write(dir.path(), "distance.txt", "not vite");
        write(dir.path(), "img/logo.svg", "<svg/>");
        dir
    }

    fn names(files: &[PlannedFile]) -> Vec<&str> {
        files.iter().map(|f| f.name.as_str()).collect()
    }

    fn storage_config(use_s3: bool, s3: Option<S3Config>) -> StorageConfig {
        StorageConfig {
            use_s3,
            s3,
            media_location: "media".to_string(),
            static_location: "static".to_string(),
            media_root: PathBuf::from("media"),
            static_root: PathBuf::from("staticfiles"),
            media_url: "/media".to_string(),
            static_url: "/static".to_string(),
        }
    }

    fn s3(with_credentials: bool) -> S3Config {
        S3Config {
            bucket: "mercato-assets".to_string(),
            region: "eu-west-2".to_string(),
            access_key_id: with_credentials.then(|| "AKIAEXAMPLE".to_string()),
            secret_access_key: with_credentials.then(|| SecretString::from("s3cr3t-value")),
            endpoint_url: None,
            cloudfront_domain: None,
        }
    }

    #[test]
    fn test_plan_skips_vite_build_by_default() {
        let dir = source_tree();
        let files = plan(dir.path(), false).unwrap();
        assert_eq!(names(&files), vec!["css/site.css", "distance.txt", "img/logo.svg"]);
    }

    #[test]
    fn test_plan_uploads_manifest_last() {
        let dir = source_tree();
        let files = plan(dir.path(), true).unwrap();
        assert_eq!(
            names(&files),
            vec![
                "css/site.css",
                "dist/assets/main-4f2a.js",
                "distance.txt",
                "img/logo.svg",
                "dist/.vite/manifest.json",
            ]
        );
    }

    #[test]
    fn test_plan_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let err = plan(&dir.path().join("nope"), false).unwrap_err();
        assert!(matches!(err, CollectError::MissingSource(_)));
    }

    #[test]
    fn test_force_s3_requires_bucket_and_credentials() {
        let no_bucket = storage_config(false, None);
        assert!(matches!(s3_target(&no_bucket, true), Err(CollectError::MissingBucket)));

        let no_credentials = storage_config(false, Some(s3(false)));
        assert!(matches!(
            s3_target(&no_credentials, true),
            Err(CollectError::MissingCredentials)
        ));

        let ready = storage_config(false, Some(s3(true)));
        assert_eq!(s3_target(&ready, true).unwrap().unwrap().bucket, "mercato-assets");
    }

    #[test]
    fn test_target_follows_use_s3_without_force() {
        let off = storage_config(false, Some(s3(true)));
        assert!(s3_target(&off, false).unwrap().is_none());

        // The default provider chain may supply credentials.
        let on = storage_config(true, Some(s3(false)));
        assert!(s3_target(&on, false).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_upload_copies_to_local_root() {
        let source = source_tree();
        let target = tempfile::tempdir().unwrap();
        let storage = StaticStorage::new(
            Arc::new(LocalStore::new(target.path(), "/static")),
            RetryPolicy::immediate(1),
        );

        let files = plan(source.path(), true).unwrap();
        let summary = upload(&storage, &files, false).await;

        assert_eq!(summary, Summary { uploaded: 5, failed: 0 });
        assert_eq!(
            fs::read_to_string(target.path().join("dist/assets/main-4f2a.js")).unwrap(),
            "console.log(1)"
        );
    }

    #[tokio::test]
    async fn test_upload_counts_failures() {
        let source = source_tree();
        let target = tempfile::tempdir().unwrap();
        // A file where the root directory should be makes every write fail.
        let blocked = target.path().join("blocked");
        fs::write(&blocked, "").unwrap();
        let storage = StaticStorage::new(
            Arc::new(LocalStore::new(&blocked, "/static")),
            RetryPolicy::immediate(2),
        );

        let files = plan(source.path(), false).unwrap();
        let summary = upload(&storage, &files, true).await;

        assert_eq!(summary, Summary { uploaded: 0, failed: 3 });
    }

    #[test]
    fn test_error_chain_includes_sources() {
        let err = StorageError::RetriesExhausted {
            key: "css/site.css".to_string(),
            attempts: 3,
            source: Box::new(StorageError::Transient {
                operation: "put_object",
                message: "timed out".to_string(),
            }),
        };
        let chain = error_chain(&err);
        assert!(chain.starts_with("upload of css/site.css failed after 3 attempts"));
        assert!(chain.contains("caused by: transient storage failure during put_object: timed out"));
        assert!(err.source().is_some());
    }
}
