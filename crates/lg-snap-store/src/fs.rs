use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lg_core::tags::Tag;
use lg_core::types::ObjectSummary;

use crate::{validate_key, write_atomic, ListPage, SnapStore, StoreError};

pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Directory-backed store: bodies under `objects/`, tag sets as JSON under `tags/`.
#[derive(Debug, Clone)]
pub struct FsSnapStore {
    root: PathBuf,
    page_size: usize,
}

impl FsSnapStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.root.join("objects").join(key))
    }

    fn tags_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.root.join("tags").join(format!("{key}.json")))
    }

    fn require_object(&self, key: &str) -> Result<PathBuf, StoreError> {
        let path = self.object_path(key)?;
        if !path.is_file() {
            return Err(StoreError::NotFound(key.to_string()));
        }
        Ok(path)
    }
}

impl SnapStore for FsSnapStore {
    fn list_page(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        continuation: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        let dir = self.root.join("objects");
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ListPage::default())
            }
            Err(err) => return Err(StoreError::Io(err)),
        };

        let lower_bound = match (start_after, continuation) {
            (Some(a), Some(c)) => Some(a.max(c)),
            (a, c) => a.or(c),
        };

        let mut names: Vec<String> = Vec::new();
        for entry in entries {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.starts_with('.') || !name.starts_with(prefix) {
                continue;
            }
            if lower_bound.is_some_and(|b| name.as_str() <= b) {
                continue;
            }
            names.push(name);
        }
        names.sort();

        let more = names.len() > self.page_size;
        names.truncate(self.page_size);

        let mut objects = Vec::with_capacity(names.len());
        for name in names {
            let meta = std::fs::metadata(dir.join(&name))?;
            let last_modified: DateTime<Utc> = meta.modified()?.into();
            objects.push(ObjectSummary {
                key: name,
                last_modified,
                size: meta.len(),
            });
        }

        let next_continuation = if more {
            objects.last().map(|o| o.key.clone())
        } else {
            None
        };
        Ok(ListPage {
            objects,
            next_continuation,
        })
    }

    fn put_object(&self, key: &str, bytes: &[u8], _content_type: &str) -> Result<(), StoreError> {
        let path = self.object_path(key)?;
        write_atomic(&path, bytes)?;
        Ok(())
    }

    fn get_object(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.object_path(key)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    fn get_tags(&self, key: &str) -> Result<Vec<Tag>, StoreError> {
        self.require_object(key)?;
        let path = self.tags_path(key)?;
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StoreError::Io(err)),
        };
        serde_json::from_slice(&bytes).map_err(|source| StoreError::CorruptTags {
            key: key.to_string(),
            source,
        })
    }

    fn put_tags(&self, key: &str, tags: &[Tag]) -> Result<(), StoreError> {
        self.require_object(key)?;
        let path = self.tags_path(key)?;
        let bytes = serde_json::to_vec(tags).map_err(|source| StoreError::CorruptTags {
            key: key.to_string(),
            source,
        })?;
        write_atomic(&path, &bytes)?;
        Ok(())
    }

    fn presign_get(&self, key: &str, _expires_in: Duration) -> Result<String, StoreError> {
        let path = self.require_object(key)?;
        Ok(format!("file://{}", path.display()))
    }
}
