use std::time::Duration;

use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::{AggregatedBytes, ByteStream};
use aws_sdk_s3::types::Tagging;
use chrono::{DateTime, Utc};
use lg_core::tags::Tag;
use lg_core::types::ObjectSummary;
use lg_observe::runtime::block_on;
use tracing::debug;

use crate::{validate_key, ListPage, SnapStore, StoreError};

const MAX_ATTEMPTS: u32 = 4;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct S3SnapStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
    page_size: i32,
}

impl S3SnapStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: String, prefix: String) -> Self {
        Self {
            client,
            bucket,
            prefix: prefix.trim_matches('/').to_string(),
            page_size: 1000,
        }
    }

    /// Create a store from a `s3://bucket/prefix` URL with the leading scheme stripped
    /// (i.e. pass `bucket/prefix`).
    pub fn from_env_url(rest: &str) -> Result<Self, StoreError> {
        let (bucket, prefix) = parse_bucket_prefix(rest)?;
        let client = block_on(client_from_env())??;
        Ok(Self::new(client, bucket, prefix))
    }

    pub fn with_page_size(mut self, page_size: i32) -> Self {
        self.page_size = page_size.clamp(1, 1000);
        self
    }

    fn full_key(&self, key: &str) -> Result<String, StoreError> {
        validate_key(key)?;
        Ok(self.join(key))
    }

    fn join(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{key}", self.prefix)
        }
    }

    fn strip(&self, full: &str) -> Option<String> {
        if self.prefix.is_empty() {
            return Some(full.to_string());
        }
        full.strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .map(str::to_string)
    }
}

impl SnapStore for S3SnapStore {
    fn list_page(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        continuation: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        let req = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(self.join(prefix))
            .set_start_after(start_after.map(|k| self.join(k)))
            .set_continuation_token(continuation.map(str::to_string))
            .max_keys(self.page_size);
        let out = block_on(req.send())?
            .map_err(|e| StoreError::Runtime(format!("s3 list_objects_v2 failed: {e:?}")))?;

        let mut objects = Vec::with_capacity(out.contents().len());
        for obj in out.contents() {
            let Some(full) = obj.key() else {
                continue;
            };
            let Some(key) = self.strip(full) else {
                continue;
            };
            let last_modified = obj
                .last_modified()
                .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()))
                .unwrap_or_default();
            objects.push(ObjectSummary {
                key,
                last_modified,
                size: obj.size().unwrap_or(0).max(0) as u64,
            });
        }

        let next_continuation = if out.is_truncated().unwrap_or(false) {
            out.next_continuation_token().map(str::to_string)
        } else {
            None
        };
        debug!(
            bucket = %self.bucket,
            prefix,
            objects = objects.len(),
            truncated = next_continuation.is_some(),
            "listed page"
        );
        Ok(ListPage {
            objects,
            next_continuation,
        })
    }

    fn put_object(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), StoreError> {
        let req = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(self.full_key(key)?)
            .content_type(content_type)
            .body(ByteStream::from(bytes.to_vec()));
        block_on(req.send())?
            .map_err(|e| StoreError::Runtime(format!("s3 put_object failed: {e:?}")))?;
        Ok(())
    }

    fn get_object(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let full = self.full_key(key)?;
        let c = self.client.clone();
        let bucket = self.bucket.clone();
        let requested = key.to_string();
        block_on(async move {
            let out = c
                .get_object()
                .bucket(bucket)
                .key(full)
                .send()
                .await
                .map_err(|e| map_get_err(&requested, e))?;
            let bytes: AggregatedBytes = out.body.collect().await.map_err(|e| {
                StoreError::Runtime(format!("get_object body collect failed: {e:?}"))
            })?;
            Ok(bytes.into_bytes().to_vec())
        })?
    }

    fn get_tags(&self, key: &str) -> Result<Vec<Tag>, StoreError> {
        let req = self
            .client
            .get_object_tagging()
            .bucket(&self.bucket)
            .key(self.full_key(key)?);
        let out = block_on(req.send())?.map_err(|e| match e {
            aws_sdk_s3::error::SdkError::ServiceError(ref se)
                if se.raw().status().as_u16() == 404 =>
            {
                StoreError::NotFound(key.to_string())
            }
            other => StoreError::Runtime(format!("s3 get_object_tagging failed: {other:?}")),
        })?;
        Ok(out
            .tag_set()
            .iter()
            .map(|t| Tag::new(t.key(), t.value()))
            .collect())
    }

    fn put_tags(&self, key: &str, tags: &[Tag]) -> Result<(), StoreError> {
        let mut tag_set = Vec::with_capacity(tags.len());
        for t in tags {
            let tag = aws_sdk_s3::types::Tag::builder()
                .key(&t.key)
                .value(&t.value)
                .build()
                .map_err(|e| StoreError::Runtime(format!("build tag failed: {e}")))?;
            tag_set.push(tag);
        }
        let tagging = Tagging::builder()
            .set_tag_set(Some(tag_set))
            .build()
            .map_err(|e| StoreError::Runtime(format!("build tagging failed: {e}")))?;
        let req = self
            .client
            .put_object_tagging()
            .bucket(&self.bucket)
            .key(self.full_key(key)?)
            .tagging(tagging);
        block_on(req.send())?.map_err(|e| match e {
            aws_sdk_s3::error::SdkError::ServiceError(ref se)
                if se.raw().status().as_u16() == 404 =>
            {
                StoreError::NotFound(key.to_string())
            }
            other => StoreError::Runtime(format!("s3 put_object_tagging failed: {other:?}")),
        })?;
        Ok(())
    }

    fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String, StoreError> {
        let cfg = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StoreError::Runtime(format!("invalid presign ttl: {e}")))?;
        let req = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.full_key(key)?);
        let presigned = block_on(req.presigned(cfg))?
            .map_err(|e| StoreError::Runtime(format!("s3 presign get_object failed: {e:?}")))?;
        Ok(presigned.uri().to_string())
    }
}

fn parse_bucket_prefix(rest: &str) -> Result<(String, String), StoreError> {
    let s = rest.trim().trim_matches('/');
    let mut it = s.splitn(2, '/');
    let bucket = it.next().unwrap_or("").trim();
    if bucket.is_empty() {
        return Err(StoreError::UnsupportedRoot(format!(
            "invalid s3 store root: s3://{rest}"
        )));
    }
    let prefix = it.next().unwrap_or("").trim_matches('/').to_string();
    Ok((bucket.to_string(), prefix))
}

/// Build an S3 client from the ambient environment.
///
/// - Default: standard AWS resolution (region/creds from env/config/role).
/// - Optional: override endpoint via `LG_S3_ENDPOINT_URL` (MinIO or other S3-compatible stores).
/// - Optional: `LG_S3_FORCE_PATH_STYLE=1` to force path-style addressing.
pub async fn client_from_env() -> Result<aws_sdk_s3::Client, StoreError> {
    let cfg = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

    let endpoint_url: Option<String> = std::env::var("LG_S3_ENDPOINT_URL").ok();
    let force_path_style = match parse_env_bool("LG_S3_FORCE_PATH_STYLE")? {
        Some(v) => v,
        None => endpoint_url.is_some(),
    };

    let mut b = aws_sdk_s3::config::Builder::from(&cfg)
        .retry_config(RetryConfig::standard().with_max_attempts(MAX_ATTEMPTS))
        .timeout_config(
            TimeoutConfig::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .operation_attempt_timeout(ATTEMPT_TIMEOUT)
                .build(),
        );
    if let Some(url) = endpoint_url {
        b = b.endpoint_url(url);
    }
    if force_path_style {
        b = b.force_path_style(true);
    }

    Ok(aws_sdk_s3::Client::from_conf(b.build()))
}

fn parse_env_bool(key: &str) -> Result<Option<bool>, StoreError> {
    match std::env::var(key) {
        Ok(v) => parse_bool(&v).map(Some).ok_or_else(|| {
            StoreError::Runtime(format!(
                "invalid boolean env var {key}={v:?} (expected true/false/1/0)"
            ))
        }),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(StoreError::Runtime(format!(
            "read env var {key} failed: {e}"
        ))),
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

fn map_get_err(
    key: &str,
    err: aws_sdk_s3::error::SdkError<aws_sdk_s3::operation::get_object::GetObjectError>,
) -> StoreError {
    match err {
        aws_sdk_s3::error::SdkError::ServiceError(ref se) => {
            if se.err().is_no_such_key() {
                StoreError::NotFound(key.to_string())
            } else {
                StoreError::Runtime(format!("s3 get_object service error: {err:?}"))
            }
        }
        other => StoreError::Runtime(format!("s3 get_object failed: {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_store(prefix: &str) -> S3SnapStore {
        let conf = aws_sdk_s3::Config::builder()
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new("us-east-1"))
            .build();
        S3SnapStore::new(
            aws_sdk_s3::Client::from_conf(conf),
            "bucket".to_string(),
            prefix.to_string(),
        )
    }

    #[test]
    fn bucket_and_prefix_are_split() {
        assert_eq!(
            parse_bucket_prefix("bucket/app/dev/").unwrap(),
            ("bucket".to_string(), "app/dev".to_string())
        );
        assert_eq!(
            parse_bucket_prefix("bucket").unwrap(),
            ("bucket".to_string(), String::new())
        );
        assert!(matches!(
            parse_bucket_prefix("/"),
            Err(StoreError::UnsupportedRoot(_))
        ));
    }

    #[test]
    fn prefix_is_joined_and_stripped() {
        let store = offline_store("/app/");
        assert_eq!(store.full_key("snap|a").unwrap(), "app/snap|a");
        assert_eq!(store.strip("app/snap|a").as_deref(), Some("snap|a"));
        assert_eq!(store.strip("other/snap|a"), None);

        let bare = offline_store("");
        assert_eq!(bare.full_key("snap|a").unwrap(), "snap|a");
        assert!(bare.full_key("a/b").is_err());
    }

    #[test]
    fn booleans_accept_common_spellings() {
        assert_eq!(parse_bool(" Yes "), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn missing_object_error_names_the_key() {
        use aws_sdk_s3::config::http::HttpResponse;
        use aws_sdk_s3::error::SdkError;
        use aws_sdk_s3::operation::get_object::GetObjectError;
        use aws_sdk_s3::primitives::SdkBody;
        use aws_sdk_s3::types::error::NoSuchKey;

        let raw = HttpResponse::new(404u16.try_into().unwrap(), SdkBody::empty());
        let err = SdkError::service_error(
            GetObjectError::NoSuchKey(NoSuchKey::builder().build()),
            raw,
        );
        match map_get_err("snap|a", err) {
            StoreError::NotFound(key) => assert_eq!(key, "snap|a"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }
}
