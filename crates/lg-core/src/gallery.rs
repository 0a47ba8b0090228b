use chrono::{DateTime, Utc};

use crate::snap_key::SnapKey;
use crate::types::ObjectSummary;

pub const DEFAULT_COLUMNS: usize = 2;

/// BlurHash rendered in place of a hidden snap until it is revealed.
pub const BLUR_HASH: &str = "LEHV6nWB2yk8pyo0adR*.7kCMdnj";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryEntry {
    pub key: SnapKey,
    pub object: ObjectSummary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthBucket {
    /// `YYYY-MM`
    pub month: String,
    pub rows: Vec<Vec<GalleryEntry>>,
}

#[derive(Debug, Clone, Default)]
pub struct Gallery {
    /// Newest first.
    pub entries: Vec<GalleryEntry>,
    pub skipped: Vec<String>,
}

impl Gallery {
    /// Takes a full ascending listing and reverses it, so the newest snap comes first.
    pub fn from_listing(objects: Vec<ObjectSummary>) -> Self {
        let mut gallery = Gallery::default();
        for obj in objects.into_iter().rev() {
            match SnapKey::parse(&obj.key) {
                Ok(key) => gallery.entries.push(GalleryEntry { key, object: obj }),
                Err(_) => gallery.skipped.push(obj.key),
            }
        }
        gallery
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn rows(&self, columns: usize) -> Vec<Vec<GalleryEntry>> {
        chunk_rows(&self.entries, columns)
    }

    /// Month buckets, newest month first. Entries keep their newest-first order.
    pub fn by_month(&self, columns: usize) -> Vec<MonthBucket> {
        let mut groups: Vec<(String, Vec<GalleryEntry>)> = Vec::new();
        for entry in &self.entries {
            let month = entry.key.month();
            match groups.last_mut() {
                Some((m, items)) if *m == month => items.push(entry.clone()),
                _ => groups.push((month, vec![entry.clone()])),
            }
        }
        groups
            .into_iter()
            .map(|(month, items)| MonthBucket {
                month,
                rows: chunk_rows(&items, columns),
            })
            .collect()
    }
}

fn chunk_rows(entries: &[GalleryEntry], columns: usize) -> Vec<Vec<GalleryEntry>> {
    entries
        .chunks(columns.max(1))
        .map(|row| row.to_vec())
        .collect()
}

/// Row holding the entry at `idx`, used to restore the scroll position.
pub fn row_index(idx: usize, columns: usize) -> usize {
    idx / columns.max(1)
}

/// Whole days since `start`. Zero or negative means there is no streak to show.
pub fn streak_days(start: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - start).num_seconds().div_euclid(24 * 60 * 60)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Thumbnail {
    Placeholder { blurhash: &'static str },
    Image { url: String },
}

/// Hidden snaps stay obfuscated until the viewer reveals them.
pub fn thumbnail(entry: &SnapKey, url: String, revealed: bool) -> Thumbnail {
    if entry.is_hidden() && !revealed {
        Thumbnail::Placeholder {
            blurhash: BLUR_HASH,
        }
    } else {
        Thumbnail::Image { url }
    }
}
