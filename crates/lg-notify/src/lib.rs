#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used))]

pub mod expo;

use std::collections::HashSet;

use lg_core::snap_key::TokenKey;
use lg_core::types::ClientId;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("push endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushNotification {
    pub title: String,
    pub body: Option<String>,
    pub badge: Option<u32>,
}

/// One message in the push service's request array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushMessage {
    pub to: String,
    pub sound: &'static str,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<u32>,
}

impl PushMessage {
    pub fn new(to: impl Into<String>, notification: &PushNotification) -> Self {
        Self {
            to: to.into(),
            sound: "default",
            title: notification.title.clone(),
            body: notification.body.clone(),
            badge: notification.badge,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendReport {
    pub accepted: usize,
    pub rejected: usize,
}

impl SendReport {
    pub fn merge(&mut self, other: SendReport) {
        self.accepted += other.accepted;
        self.rejected += other.rejected;
    }
}

/// Delivery seam for push messages.
pub trait Notifier: Send + Sync + 'static {
    fn send(&self, messages: &[PushMessage]) -> Result<SendReport, NotifyError>;
}

/// Builds one message per registered peer token.
///
/// Skips the `ignore`d client (normally the sender), empty tokens, and tokens already
/// addressed (a client re-registering the same token under a new key).
pub fn fan_out(
    tokens: &[TokenKey],
    notification: &PushNotification,
    ignore: Option<&ClientId>,
) -> Vec<PushMessage> {
    let mut seen: HashSet<&str> = HashSet::new();
    tokens
        .iter()
        .filter(|t| ignore != Some(&t.client))
        .filter(|t| !t.token.is_empty())
        .filter(|t| seen.insert(t.token.as_str()))
        .map(|t| PushMessage::new(t.token.as_str(), notification))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lg_core::types::PushToken;

    fn token(client: &str, token: &str) -> TokenKey {
        TokenKey {
            client: ClientId(client.to_string()),
            token: PushToken(token.to_string()),
        }
    }

    #[test]
    fn fan_out_skips_sender_empty_and_duplicate_tokens() {
        let tokens = vec![
            token("me", "t-me"),
            token("alice", "t-alice"),
            token("bob", ""),
            token("alice-old", "t-alice"),
            token("carol", "t-carol"),
        ];
        let n = PushNotification {
            title: "Sam".to_string(),
            body: Some("New Snap 🔍".to_string()),
            badge: Some(1),
        };
        let msgs = fan_out(&tokens, &n, Some(&ClientId("me".to_string())));
        let to: Vec<&str> = msgs.iter().map(|m| m.to.as_str()).collect();
        assert_eq!(to, ["t-alice", "t-carol"]);
        assert_eq!(msgs[0].sound, "default");
        assert_eq!(msgs[0].badge, Some(1));
    }

    #[test]
    fn fan_out_without_ignore_includes_everyone() {
        let tokens = vec![token("me", "t-me"), token("alice", "t-alice")];
        let n = PushNotification {
            title: "Sam".to_string(),
            body: None,
            badge: None,
        };
        assert_eq!(fan_out(&tokens, &n, None).len(), 2);
    }

    #[test]
    fn message_omits_absent_fields() {
        let n = PushNotification {
            title: "Sam".to_string(),
            body: Some("🔥".to_string()),
            badge: None,
        };
        let json = serde_json::to_value(PushMessage::new("t", &n)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"to": "t", "sound": "default", "title": "Sam", "body": "🔥"})
        );
    }
}
