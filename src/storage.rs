//! Blob storage for uploaded documents.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use rand::{Rng, distr::Alphanumeric};
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use tracing::{info, instrument, warn};

use crate::error::AppError;

pub const DOCUMENTS_BUCKET: &str = "documents";

static UNSAFE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("static regex is valid"));

#[rocket::async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` at `path` inside `bucket` and returns the stored path.
    async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>) -> Result<String, AppError>;

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), AppError>;

    fn public_url(&self, bucket: &str, path: &str) -> String;
}

/// Keeps the last path segment and replaces unsafe characters with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned = UNSAFE_CHARS.replace_all(base, "_");
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

/// `{collection}/{unix_millis}-{random}-{sanitized name}`
pub fn object_path(collection: &str, file_name: &str, now: DateTime<Utc>) -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();

    format!(
        "{}/{}-{}-{}",
        collection,
        now.timestamp_millis(),
        suffix,
        sanitize_file_name(file_name)
    )
}

/// Rejects absolute paths and parent traversal.
fn checked_relative(path: &str) -> Result<&Path, AppError> {
    let relative = Path::new(path);
    let safe = relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)));

    if safe && !path.is_empty() {
        Ok(relative)
    } else {
        Err(AppError::Storage(format!("Invalid object path: {}", path)))
    }
}

pub struct LocalBlobStore {
    root: PathBuf,
    public_base: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base: &str) -> Self {
        Self {
            root: root.into(),
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }

    fn locate(&self, bucket: &str, path: &str) -> Result<PathBuf, AppError> {
        Ok(self
            .root
            .join(checked_relative(bucket)?)
            .join(checked_relative(path)?))
    }
}

#[rocket::async_trait]
impl BlobStore for LocalBlobStore {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>) -> Result<String, AppError> {
        let target = self.locate(bucket, path)?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;

        info!("Stored object");
        Ok(path.to_string())
    }

    #[instrument(skip(self))]
    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), AppError> {
        let mut failures = Vec::new();

        for path in paths {
            let target = self.locate(bucket, path)?;
            match tokio::fs::remove_file(&target).await {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    warn!(path = %path, "Object already absent");
                }
                Err(err) => failures.push(format!("{}: {}", path, err)),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(AppError::Storage(failures.join("; ")))
        }
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/{}/{}", self.public_base, bucket, path)
    }
}

#[cfg(test)]
pub mod memory {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    /// In-process store with switchable failures.
    #[derive(Default)]
    pub struct MemoryBlobStore {
        objects: Mutex<HashMap<String, Vec<u8>>>,
        pub fail_uploads: AtomicBool,
        pub fail_removals: AtomicBool,
    }

    impl MemoryBlobStore {
        pub fn new() -> Self {
            Self::default()
        }

        fn key(bucket: &str, path: &str) -> String {
            format!("{}/{}", bucket, path)
        }

        pub fn contains(&self, bucket: &str, path: &str) -> bool {
            self.objects
                .lock()
                .unwrap()
                .contains_key(&Self::key(bucket, path))
        }

        pub fn len(&self) -> usize {
            self.objects.lock().unwrap().len()
        }

        pub fn set_fail_removals(&self, fail: bool) {
            self.fail_removals.store(fail, Ordering::SeqCst);
        }

        pub fn set_fail_uploads(&self, fail: bool) {
            self.fail_uploads.store(fail, Ordering::SeqCst);
        }
    }

    #[rocket::async_trait]
    impl BlobStore for MemoryBlobStore {
        async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>) -> Result<String, AppError> {
            if self.fail_uploads.load(Ordering::SeqCst) {
                return Err(AppError::Storage("upload rejected".to_string()));
            }
            checked_relative(path)?;
            self.objects
                .lock()
                .unwrap()
                .insert(Self::key(bucket, path), bytes);
            Ok(path.to_string())
        }

        async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), AppError> {
            if self.fail_removals.load(Ordering::SeqCst) {
                return Err(AppError::Storage("removal rejected".to_string()));
            }
            let mut objects = self.objects.lock().unwrap();
            for path in paths {
                objects.remove(&Self::key(bucket, path));
            }
            Ok(())
        }

        fn public_url(&self, bucket: &str, path: &str) -> String {
            format!("/storage/{}/{}", bucket, path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn object_paths_are_namespaced_and_sanitized() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        let path = object_path("materi_pu", "../Bab 1: Silogisme.pdf", now);

        let (collection, rest) = path.split_once('/').unwrap();
        assert_eq!(collection, "materi_pu");
        let parts: Vec<&str> = rest.splitn(3, '-').collect();
        assert_eq!(parts[0], now.timestamp_millis().to_string());
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts[2], "Bab_1_Silogisme.pdf");
    }

    #[test]
    fn sanitize_never_returns_empty_or_hidden_names() {
        assert_eq!(sanitize_file_name("..."), "file");
        assert_eq!(sanitize_file_name(".env"), "env");
        assert_eq!(sanitize_file_name("C:\\tmp\\soal.docx"), "soal.docx");
    }

    #[test]
    fn traversal_is_rejected() {
        assert!(checked_relative("../etc/passwd").is_err());
        assert!(checked_relative("/abs").is_err());
        assert!(checked_relative("materi_pu/1-abc-x.pdf").is_ok());
    }

    #[tokio::test]
    async fn local_store_writes_and_removes() {
        let root = std::env::temp_dir().join(format!("blob-test-{}", uuid::Uuid::new_v4()));
        let store = LocalBlobStore::new(&root, "/storage/");

        let path = store
            .upload(DOCUMENTS_BUCKET, "latsol_pk/1-abc-soal.pdf", b"%PDF".to_vec())
            .await
            .unwrap();
        assert!(root.join(DOCUMENTS_BUCKET).join(&path).exists());
        assert_eq!(
            store.public_url(DOCUMENTS_BUCKET, &path),
            "/storage/documents/latsol_pk/1-abc-soal.pdf"
        );

        store.remove(DOCUMENTS_BUCKET, &[path.clone()]).await.unwrap();
        assert!(!root.join(DOCUMENTS_BUCKET).join(&path).exists());
        // Removing an absent object is not an error.
        store.remove(DOCUMENTS_BUCKET, &[path]).await.unwrap();

        let _ = std::fs::remove_dir_all(root);
    }
}
