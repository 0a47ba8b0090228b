//! Object key scheme for snaps and push tokens.
//!
//! ```text
//! snap|2024-05-01T12:34:56.789Z|<client>|<token>|.jpg
//! snap|2024-05-01T12:34:56.789Z|<client>|<token>||hide.jpg
//! token|<client>|<token>|.txt
//! ```
//!
//! Timestamps are fixed-width UTC with millisecond precision, so ascending key order
//! under the `snap` prefix is also ascending send time.

use std::fmt;

use chrono::{DateTime, Datelike, SecondsFormat, SubsecRound, Utc};
use thiserror::Error;

use crate::types::{ClientId, PushToken};

pub const FIELD_DELIMITER: char = '|';
pub const SNAP_PREFIX: &str = "snap";
pub const TOKEN_PREFIX: &str = "token";
pub const HIDDEN_SNAP_MARKER: &str = "hide";
pub const SNAP_EXTENSION: &str = ".jpg";
pub const TOKEN_EXTENSION: &str = ".txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Snap,
    Token,
}

impl ObjectKind {
    /// Listing prefix for every object of this kind.
    pub fn prefix(self) -> &'static str {
        match self {
            ObjectKind::Snap => SNAP_PREFIX,
            ObjectKind::Token => TOKEN_PREFIX,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("key must start with {expected:?}")]
    WrongPrefix { expected: &'static str },
    #[error("key has {found} fields, expected {expected}")]
    FieldCount { expected: &'static str, found: usize },
    #[error("key is missing extension {0:?}")]
    MissingExtension(&'static str),
    #[error("invalid timestamp {0:?}")]
    Timestamp(String),
    #[error("client id must be non-empty")]
    EmptyClientId,
    #[error("{field} contains a reserved character: {value:?}")]
    ReservedCharacter { field: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapKey {
    pub sent_at: DateTime<Utc>,
    pub sender: ClientId,
    pub sender_token: PushToken,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenKey {
    pub client: ClientId,
    pub token: PushToken,
}

fn validate_component(field: &'static str, value: &str) -> Result<(), KeyError> {
    let reserved = value
        .chars()
        .any(|c| c == FIELD_DELIMITER || c == '/' || c == '\\' || c.is_control());
    if reserved {
        return Err(KeyError::ReservedCharacter {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

fn validate_client(client: &ClientId) -> Result<(), KeyError> {
    if client.0.trim().is_empty() {
        return Err(KeyError::EmptyClientId);
    }
    validate_component("client id", client.as_str())
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses a key timestamp. Only the canonical form produced by `format_timestamp` is
/// accepted, otherwise key order would stop tracking send order.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, KeyError> {
    let parsed = DateTime::parse_from_rfc3339(s)
        .map_err(|_| KeyError::Timestamp(s.to_string()))?
        .with_timezone(&Utc);
    if format_timestamp(&parsed) != s {
        return Err(KeyError::Timestamp(s.to_string()));
    }
    Ok(parsed)
}

impl SnapKey {
    pub fn new(
        sender: ClientId,
        sender_token: PushToken,
        visibility: Visibility,
        now: DateTime<Utc>,
    ) -> Result<Self, KeyError> {
        validate_client(&sender)?;
        validate_component("push token", sender_token.as_str())?;
        if !(0..=9999).contains(&now.year()) {
            return Err(KeyError::Timestamp(now.to_rfc3339()));
        }
        Ok(Self {
            sent_at: now.trunc_subsecs(3),
            sender,
            sender_token,
            visibility,
        })
    }

    pub fn parse(key: &str) -> Result<Self, KeyError> {
        let rest = key
            .strip_prefix(SNAP_PREFIX)
            .and_then(|r| r.strip_prefix(FIELD_DELIMITER))
            .ok_or(KeyError::WrongPrefix {
                expected: SNAP_PREFIX,
            })?;
        let fields: Vec<&str> = rest.split(FIELD_DELIMITER).collect();

        let visibility = match fields.as_slice() {
            [_, _, _, tail] => {
                if *tail != SNAP_EXTENSION {
                    return Err(KeyError::MissingExtension(SNAP_EXTENSION));
                }
                Visibility::Visible
            }
            [_, _, _, empty, tail] => {
                let marker = tail
                    .strip_suffix(SNAP_EXTENSION)
                    .ok_or(KeyError::MissingExtension(SNAP_EXTENSION))?;
                if !empty.is_empty() || marker != HIDDEN_SNAP_MARKER {
                    return Err(KeyError::FieldCount {
                        expected: "5 or 6",
                        found: fields.len() + 1,
                    });
                }
                Visibility::Hidden
            }
            _ => {
                return Err(KeyError::FieldCount {
                    expected: "5 or 6",
                    found: fields.len() + 1,
                })
            }
        };

        let sent_at = parse_timestamp(fields[0])?;
        let sender = ClientId(fields[1].to_string());
        validate_client(&sender)?;
        Ok(Self {
            sent_at,
            sender,
            sender_token: PushToken(fields[2].to_string()),
            visibility,
        })
    }

    pub fn is_hidden(&self) -> bool {
        self.visibility == Visibility::Hidden
    }

    /// Key of the sender's registered push token.
    pub fn token_key(&self) -> TokenKey {
        TokenKey {
            client: self.sender.clone(),
            token: self.sender_token.clone(),
        }
    }

    /// `YYYY-MM` bucket of the send time.
    pub fn month(&self) -> String {
        format!("{:04}-{:02}", self.sent_at.year(), self.sent_at.month())
    }
}

impl fmt::Display for SnapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = FIELD_DELIMITER;
        write!(
            f,
            "{SNAP_PREFIX}{d}{}{d}{}{d}{}{d}",
            format_timestamp(&self.sent_at),
            self.sender,
            self.sender_token
        )?;
        if self.is_hidden() {
            write!(f, "{d}{HIDDEN_SNAP_MARKER}")?;
        }
        f.write_str(SNAP_EXTENSION)
    }
}

impl TokenKey {
    pub fn new(client: ClientId, token: PushToken) -> Result<Self, KeyError> {
        validate_client(&client)?;
        validate_component("push token", token.as_str())?;
        Ok(Self { client, token })
    }

    pub fn parse(key: &str) -> Result<Self, KeyError> {
        let fields: Vec<&str> = key.split(FIELD_DELIMITER).collect();
        let [prefix, client, token, tail] = fields.as_slice() else {
            return Err(KeyError::FieldCount {
                expected: "4",
                found: fields.len(),
            });
        };
        if *prefix != TOKEN_PREFIX {
            return Err(KeyError::WrongPrefix {
                expected: TOKEN_PREFIX,
            });
        }
        if *tail != TOKEN_EXTENSION {
            return Err(KeyError::MissingExtension(TOKEN_EXTENSION));
        }
        Self::new(ClientId(client.to_string()), PushToken(token.to_string()))
    }
}

impl fmt::Display for TokenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = FIELD_DELIMITER;
        write!(
            f,
            "{TOKEN_PREFIX}{d}{}{d}{}{d}{TOKEN_EXTENSION}",
            self.client, self.token
        )
    }
}
