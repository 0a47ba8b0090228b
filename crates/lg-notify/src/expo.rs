use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::{Notifier, NotifyError, PushMessage, SendReport};

pub const EXPO_PUSH_URL: &str = "https://exp.host/--/api/v2/push/send";

/// The Expo push API accepts at most this many messages per request.
pub const MAX_MESSAGES_PER_REQUEST: usize = 100;

#[derive(Debug, Deserialize)]
struct PushResponse {
    #[serde(default)]
    data: Vec<PushTicket>,
}

#[derive(Debug, Deserialize)]
struct PushTicket {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExpoPushClient {
    http: reqwest::Client,
    endpoint: String,
}

impl ExpoPushClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    /// Sends every chunk even when one fails; a failed chunk's messages count as
    /// rejected. Errors only when no chunk got through.
    pub async fn send_all(&self, messages: &[PushMessage]) -> Result<SendReport, NotifyError> {
        let mut report = SendReport::default();
        let mut first_err = None;
        let mut delivered_chunks = 0usize;
        for chunk in messages.chunks(MAX_MESSAGES_PER_REQUEST) {
            match self.send_chunk(chunk).await {
                Ok(chunk_report) => {
                    delivered_chunks += 1;
                    report.merge(chunk_report);
                }
                Err(err) => {
                    warn!(
                        target: "lg_events",
                        event = "push_batch_failed",
                        messages = chunk.len(),
                        error = %err,
                        "push batch failed"
                    );
                    report.rejected += chunk.len();
                    first_err.get_or_insert(err);
                }
            }
        }
        match first_err {
            Some(err) if delivered_chunks == 0 => Err(err),
            _ => Ok(report),
        }
    }

    async fn send_chunk(&self, chunk: &[PushMessage]) -> Result<SendReport, NotifyError> {
        let resp = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(chunk)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if status != reqwest::StatusCode::OK {
            return Err(NotifyError::Status {
                status: status.as_u16(),
                body,
            });
        }

        // Tickets are informational; an unparseable body still means the batch was taken.
        let tickets = match serde_json::from_str::<PushResponse>(&body) {
            Ok(parsed) => parsed.data,
            Err(err) => {
                warn!(?err, "push response body was not a ticket list");
                return Ok(SendReport {
                    accepted: chunk.len(),
                    rejected: 0,
                });
            }
        };

        let mut report = SendReport::default();
        if tickets.len() < chunk.len() {
            let missing = chunk.len() - tickets.len();
            report.rejected += missing;
            warn!(
                tickets = tickets.len(),
                messages = chunk.len(),
                "push response is missing tickets; counting the rest as rejected"
            );
        }
        for (ticket, msg) in tickets.iter().zip(chunk) {
            if ticket.status == "ok" {
                report.accepted += 1;
            } else {
                report.rejected += 1;
                warn!(
                    target: "lg_events",
                    event = "push_ticket_error",
                    to = %msg.to,
                    message = ticket.message.as_deref().unwrap_or(""),
                    "push message rejected"
                );
            }
        }
        info!(
            target: "lg_events",
            event = "push_batch_sent",
            messages = chunk.len(),
            accepted = report.accepted,
            rejected = report.rejected,
            "sent push batch"
        );
        Ok(report)
    }
}

impl Notifier for ExpoPushClient {
    fn send(&self, messages: &[PushMessage]) -> Result<SendReport, NotifyError> {
        if messages.is_empty() {
            return Ok(SendReport::default());
        }
        lg_observe::runtime::block_on(self.send_all(messages))?
    }
}
