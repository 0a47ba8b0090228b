use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PushToken(pub String);

impl ClientId {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PushToken {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Token body without the `ExponentPushToken[...]` wrapper, for display.
    pub fn short(&self) -> &str {
        let s = self.0.as_str();
        s.strip_prefix("ExponentPushToken[")
            .and_then(|rest| rest.strip_suffix(']'))
            .unwrap_or(s)
    }
}

impl fmt::Display for PushToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry of an object listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSummary {
    pub key: String,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}

/// Marker for the most recently opened snap.
///
/// `key` feeds the listing's `start_after`; `last_modified` is the strict lower bound
/// for what counts as pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastSnap {
    pub key: Option<String>,
    pub last_modified: DateTime<Utc>,
}

impl LastSnap {
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            key: None,
            last_modified: now,
        }
    }
}

impl From<&ObjectSummary> for LastSnap {
    fn from(obj: &ObjectSummary) -> Self {
        Self {
            key: Some(obj.key.clone()),
            last_modified: obj.last_modified,
        }
    }
}
