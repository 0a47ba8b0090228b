use std::collections::VecDeque;

use crate::snap_key::SnapKey;
use crate::types::{ClientId, LastSnap, ObjectSummary};

/// A received snap that has not been opened yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSnap {
    pub key: SnapKey,
    pub object: ObjectSummary,
}

impl PendingSnap {
    /// Marker to persist once this snap has been opened.
    pub fn marker(&self) -> LastSnap {
        LastSnap::from(&self.object)
    }
}

#[derive(Debug, Clone)]
pub struct PendingFilter<'a> {
    pub client: &'a ClientId,
    pub self_send: bool,
    pub last: &'a LastSnap,
}

impl PendingFilter<'_> {
    /// Listing offset to use so already-opened keys are not fetched again.
    pub fn start_after(&self) -> Option<&str> {
        self.last.key.as_deref()
    }

    pub fn accepts(&self, key: &SnapKey, object: &ObjectSummary) -> bool {
        if !self.self_send && &key.sender == self.client {
            return false;
        }
        object.last_modified > self.last.last_modified
    }
}

/// Opened-oldest-first queue of pending snaps. Its length is the badge count.
#[derive(Debug, Clone, Default)]
pub struct PendingQueue {
    snaps: VecDeque<PendingSnap>,
    skipped: Vec<String>,
}

impl PendingQueue {
    /// Builds the queue from an ascending listing. Keys that do not parse are kept
    /// aside in `skipped` rather than failing the whole poll.
    pub fn from_listing(objects: &[ObjectSummary], filter: &PendingFilter<'_>) -> Self {
        let mut queue = PendingQueue::default();
        for obj in objects {
            match SnapKey::parse(&obj.key) {
                Ok(key) => {
                    if filter.accepts(&key, obj) {
                        queue.snaps.push_back(PendingSnap {
                            key,
                            object: obj.clone(),
                        });
                    }
                }
                Err(_) => queue.skipped.push(obj.key.clone()),
            }
        }
        queue
    }

    pub fn len(&self) -> usize {
        self.snaps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snaps.is_empty()
    }

    pub fn pop(&mut self) -> Option<PendingSnap> {
        self.snaps.pop_front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingSnap> {
        self.snaps.iter()
    }

    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }
}
