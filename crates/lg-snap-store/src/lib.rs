#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used))]

pub mod fs;
#[cfg(feature = "s3")]
pub mod s3;

use std::path::Path;
use std::time::Duration;

use lg_core::tags::Tag;
use lg_core::types::ObjectSummary;
use thiserror::Error;

pub const SNAP_CONTENT_TYPE: &str = "image/jpeg";
pub const TOKEN_CONTENT_TYPE: &str = "text/plain";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid object key {0:?}")]
    InvalidKey(String),
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("unsupported store root: {0}")]
    UnsupportedRoot(String),
    #[error("tag sidecar for {key} is corrupt: {source}")]
    CorruptTags {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("runtime error: {0}")]
    Runtime(String),
}

/// One page of an ascending listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectSummary>,
    /// Present when more keys remain; pass back to `list_page` to continue.
    pub next_continuation: Option<String>,
}

/// The shared bucket, seen as a flat key space with per-object tags.
///
/// - Listings are ascending by key.
/// - `put_tags` replaces the whole tag set of an object.
pub trait SnapStore: Send + Sync + 'static {
    fn list_page(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        continuation: Option<&str>,
    ) -> Result<ListPage, StoreError>;

    fn put_object(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), StoreError>;
    fn get_object(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    fn get_tags(&self, key: &str) -> Result<Vec<Tag>, StoreError>;
    fn put_tags(&self, key: &str, tags: &[Tag]) -> Result<(), StoreError>;

    /// Time-limited URL a viewer can fetch the object body from.
    fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String, StoreError>;
}

/// Follows continuation tokens until the listing is exhausted.
pub fn list_all(
    store: &dyn SnapStore,
    prefix: &str,
    start_after: Option<&str>,
) -> Result<Vec<ObjectSummary>, StoreError> {
    let mut out = Vec::new();
    let mut continuation: Option<String> = None;
    loop {
        let page = store.list_page(prefix, start_after, continuation.as_deref())?;
        out.extend(page.objects);
        match page.next_continuation {
            Some(next) if continuation.as_deref() != Some(next.as_str()) => {
                continuation = Some(next)
            }
            _ => break,
        }
    }
    Ok(out)
}

/// Opens the store named by `root`: `s3://bucket[/prefix]` or a local directory.
pub fn open_from_root(root: &str) -> Result<Box<dyn SnapStore>, StoreError> {
    if let Some(rest) = root.strip_prefix("s3://") {
        #[cfg(feature = "s3")]
        {
            return Ok(Box::new(s3::S3SnapStore::from_env_url(rest)?));
        }
        #[cfg(not(feature = "s3"))]
        {
            let _ = rest;
            return Err(StoreError::UnsupportedRoot(format!(
                "{root} (built without the s3 feature)"
            )));
        }
    }
    if root.contains("://") {
        return Err(StoreError::UnsupportedRoot(root.to_string()));
    }
    Ok(Box::new(fs::FsSnapStore::new(root)))
}

pub(crate) fn validate_key(key: &str) -> Result<(), StoreError> {
    let ok = !key.trim().is_empty()
        && !key.contains('/')
        && !key.contains('\\')
        && !key.contains("..")
        && !key.chars().any(char::is_control);
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), std::io::Error> {
    use std::io::Write;

    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "path must have parent")
    })?;
    std::fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "bad filename"))?;
    // Leading dot keeps in-flight writes out of listings.
    let tmp = parent.join(format!(
        ".{file_name}.tmp.{}.{}",
        std::process::id(),
        lg_observe::time::unix_time_ms()
    ));

    {
        let mut f = std::fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }

    std::fs::rename(tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_validation() {
        assert!(validate_key("snap|2024-05-01T12:34:56.789Z|c|t|.jpg").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("a/b").is_err());
        assert!(validate_key("..").is_err());
        assert!(validate_key("a\nb").is_err());
    }

    #[test]
    fn open_from_root_rejects_unknown_schemes() {
        assert!(matches!(
            open_from_root("gs://bucket"),
            Err(StoreError::UnsupportedRoot(_))
        ));
        assert!(open_from_root("/tmp/looking-glass").is_ok());
    }
}
