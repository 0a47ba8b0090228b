#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used))]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lg_core::gallery::Gallery;
use lg_core::pending::{PendingFilter, PendingQueue, PendingSnap};
use lg_core::snap_key::{KeyError, ObjectKind, SnapKey, TokenKey, Visibility};
use lg_core::tags::{validate_reaction, Caption, SnapMetadata, TagError};
use lg_core::types::{ClientId, LastSnap, ObjectSummary, PushToken};
use lg_notify::{fan_out, Notifier, NotifyError, PushNotification};
use lg_observe::metrics::{Counter, DurationAgg, Gauge, ScopedTimer};
use lg_snap_store::{list_all, SnapStore, StoreError, SNAP_CONTENT_TYPE, TOKEN_CONTENT_TYPE};
use thiserror::Error;
use tracing::{info, warn};

pub const NEW_SNAP_BODY: &str = "New Snap 🔍";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("notify error: {0}")]
    Notify(#[from] NotifyError),
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("tag error: {0}")]
    Tag(#[from] TagError),
    #[error("display name must be set before sending")]
    MissingDisplayName,
}

#[derive(Debug, Clone)]
pub struct SnapClientConfig {
    pub client_id: ClientId,
    pub push_token: PushToken,
    /// Title of every notification this client sends.
    pub display_name: String,
    /// Deliver own snaps to this client too.
    pub self_send: bool,
    pub url_ttl: Duration,
}

#[derive(Debug, Default)]
pub struct ClientMetrics {
    pub snaps_sent_total: Counter,
    pub snaps_opened_total: Counter,
    pub reactions_total: Counter,
    pub list_requests_total: Counter,
    pub notifications_sent_total: Counter,
    pub notifications_rejected_total: Counter,
    pub notify_failures_total: Counter,
    pub caption_failures_total: Counter,
    pub pending_snaps: Gauge,
    pub list_latency: DurationAgg,
}

/// A snap ready to view.
#[derive(Debug, Clone)]
pub struct OpenedSnap {
    pub key: SnapKey,
    pub url: String,
    pub metadata: SnapMetadata,
    /// Marker the caller persists so the snap is not pending again.
    pub marker: LastSnap,
}

#[derive(Clone)]
pub struct SnapClient {
    store: Arc<dyn SnapStore>,
    notifier: Arc<dyn Notifier>,
    cfg: SnapClientConfig,
    metrics: Arc<ClientMetrics>,
}

impl SnapClient {
    pub fn new(
        store: Arc<dyn SnapStore>,
        notifier: Arc<dyn Notifier>,
        cfg: SnapClientConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            cfg,
            metrics: Arc::new(ClientMetrics::default()),
        }
    }

    pub fn metrics(&self) -> Arc<ClientMetrics> {
        self.metrics.clone()
    }

    pub fn config(&self) -> &SnapClientConfig {
        &self.cfg
    }

    /// Publishes this client's push token so peers can notify it.
    pub fn register_token(&self) -> Result<TokenKey, ClientError> {
        let key = TokenKey::new(self.cfg.client_id.clone(), self.cfg.push_token.clone())?;
        self.store.put_object(
            &key.to_string(),
            self.cfg.push_token.as_str().as_bytes(),
            TOKEN_CONTENT_TYPE,
        )?;
        info!(
            target: "lg_events",
            event = "token_registered",
            client_id = %self.cfg.client_id,
            key = %key,
            "registered push token"
        );
        Ok(key)
    }

    /// Uploads a snap and notifies every peer.
    ///
    /// The upload is the commit point: a failed caption write or notification is logged
    /// and counted but does not fail the send.
    pub fn send_snap(
        &self,
        jpeg: &[u8],
        visibility: Visibility,
        caption: Option<Caption>,
        now: DateTime<Utc>,
    ) -> Result<SnapKey, ClientError> {
        if self.cfg.display_name.trim().is_empty() {
            return Err(ClientError::MissingDisplayName);
        }
        let key = SnapKey::new(
            self.cfg.client_id.clone(),
            self.cfg.push_token.clone(),
            visibility,
            now,
        )?;
        let raw_key = key.to_string();

        // Encode before uploading so a caption that cannot be stored fails the send early.
        let caption_tags = match caption {
            Some(caption) => Some(
                SnapMetadata {
                    caption: Some(caption),
                    ..Default::default()
                }
                .to_tags()?,
            ),
            None => None,
        };

        self.store.put_object(&raw_key, jpeg, SNAP_CONTENT_TYPE)?;
        self.metrics.snaps_sent_total.inc();
        info!(
            target: "lg_events",
            event = "snap_uploaded",
            client_id = %self.cfg.client_id,
            key = %raw_key,
            bytes = jpeg.len() as u64,
            hidden = key.is_hidden(),
            "uploaded snap"
        );

        if let Some(tags) = caption_tags {
            if let Err(err) = self.store.put_tags(&raw_key, &tags) {
                self.metrics.caption_failures_total.inc();
                warn!(?err, key = %raw_key, "caption write failed");
            }
        }

        let notification = PushNotification {
            title: self.cfg.display_name.clone(),
            body: Some(NEW_SNAP_BODY.to_string()),
            badge: Some(1),
        };
        let ignore = (!self.cfg.self_send).then_some(&self.cfg.client_id);
        if let Err(err) = self.notify_peers(&notification, ignore) {
            self.metrics.notify_failures_total.inc();
            warn!(?err, key = %raw_key, "peer notification failed");
        }
        Ok(key)
    }

    fn notify_peers(
        &self,
        notification: &PushNotification,
        ignore: Option<&ClientId>,
    ) -> Result<(), ClientError> {
        let tokens = self.registered_tokens()?;
        let messages = fan_out(&tokens, notification, ignore);
        let report = self.notifier.send(&messages)?;
        self.metrics
            .notifications_sent_total
            .inc_by(report.accepted as u64);
        self.metrics
            .notifications_rejected_total
            .inc_by(report.rejected as u64);
        Ok(())
    }

    /// Every parseable token key in the bucket.
    pub fn registered_tokens(&self) -> Result<Vec<TokenKey>, ClientError> {
        let objects = self.list(ObjectKind::Token, None)?;
        let mut tokens = Vec::with_capacity(objects.len());
        for obj in objects {
            match TokenKey::parse(&obj.key) {
                Ok(t) => tokens.push(t),
                Err(err) => warn!(key = %obj.key, %err, "skipping malformed token key"),
            }
        }
        Ok(tokens)
    }

    fn list(
        &self,
        kind: ObjectKind,
        start_after: Option<&str>,
    ) -> Result<Vec<ObjectSummary>, ClientError> {
        let _timer = ScopedTimer::new(&self.metrics.list_latency);
        self.metrics.list_requests_total.inc();
        Ok(list_all(self.store.as_ref(), kind.prefix(), start_after)?)
    }

    /// Snaps received since `last`, oldest first. The queue length is the badge count.
    pub fn check_pending(&self, last: &LastSnap) -> Result<PendingQueue, ClientError> {
        let filter = PendingFilter {
            client: &self.cfg.client_id,
            self_send: self.cfg.self_send,
            last,
        };
        let objects = self.list(ObjectKind::Snap, filter.start_after())?;
        let queue = PendingQueue::from_listing(&objects, &filter);
        for key in queue.skipped() {
            warn!(%key, "skipping malformed snap key");
        }
        self.metrics.pending_snaps.set(queue.len() as u64);
        info!(
            target: "lg_events",
            event = "pending_checked",
            client_id = %self.cfg.client_id,
            listed = objects.len() as u64,
            pending = queue.len() as u64,
            "checked for new snaps"
        );
        Ok(queue)
    }

    pub fn open(&self, snap: &PendingSnap) -> Result<OpenedSnap, ClientError> {
        let raw_key = snap.object.key.as_str();
        let url = self.store.presign_get(raw_key, self.cfg.url_ttl)?;
        let metadata = self.metadata(raw_key)?;
        self.metrics.snaps_opened_total.inc();
        self.metrics.pending_snaps.dec();
        info!(
            target: "lg_events",
            event = "snap_opened",
            client_id = %self.cfg.client_id,
            key = %raw_key,
            sender = %snap.key.sender,
            "opened snap"
        );
        Ok(OpenedSnap {
            key: snap.key.clone(),
            url,
            metadata,
            marker: snap.marker(),
        })
    }

    pub fn metadata(&self, raw_key: &str) -> Result<SnapMetadata, ClientError> {
        let tags = self.store.get_tags(raw_key)?;
        let meta = SnapMetadata::from_tags(&tags);
        for tag in &meta.malformed {
            warn!(key = %raw_key, tag = %tag, "keeping unparseable tag as-is");
        }
        Ok(meta)
    }

    pub fn snap_url(&self, raw_key: &str) -> Result<String, ClientError> {
        Ok(self.store.presign_get(raw_key, self.cfg.url_ttl)?)
    }

    /// Replaces the caption, keeping reactions and foreign tags.
    pub fn set_caption(&self, raw_key: &str, caption: Caption) -> Result<(), ClientError> {
        SnapKey::parse(raw_key)?;
        let mut meta = self.metadata(raw_key)?;
        meta.set_caption(caption);
        self.store.put_tags(raw_key, &meta.to_tags()?)?;
        info!(
            target: "lg_events",
            event = "caption_set",
            key = %raw_key,
            "updated caption"
        );
        Ok(())
    }

    /// Records a reaction on the snap and pushes it to the sender.
    pub fn react(&self, raw_key: &str, emoji: &str) -> Result<(), ClientError> {
        validate_reaction(emoji)?;
        let key = SnapKey::parse(raw_key)?;

        let mut meta = self.metadata(raw_key)?;
        meta.set_reaction(&self.cfg.client_id, emoji);
        self.store.put_tags(raw_key, &meta.to_tags()?)?;
        self.metrics.reactions_total.inc();
        info!(
            target: "lg_events",
            event = "reaction_recorded",
            client_id = %self.cfg.client_id,
            key = %raw_key,
            emoji,
            "recorded reaction"
        );

        let sender = key.token_key();
        if sender.token.is_empty() {
            return Ok(());
        }
        let notification = PushNotification {
            title: self.cfg.display_name.clone(),
            body: Some(emoji.to_string()),
            badge: None,
        };
        let messages = fan_out(std::slice::from_ref(&sender), &notification, None);
        let report = self.notifier.send(&messages)?;
        self.metrics
            .notifications_sent_total
            .inc_by(report.accepted as u64);
        self.metrics
            .notifications_rejected_total
            .inc_by(report.rejected as u64);
        Ok(())
    }

    /// Every snap in the bucket, newest first.
    pub fn gallery(&self) -> Result<Gallery, ClientError> {
        let objects = self.list(ObjectKind::Snap, None)?;
        let gallery = Gallery::from_listing(objects);
        for key in &gallery.skipped {
            warn!(%key, "skipping malformed snap key");
        }
        Ok(gallery)
    }
}
