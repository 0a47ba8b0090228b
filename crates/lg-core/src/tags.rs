//! Snap metadata stored as object tags.
//!
//! Tag values only admit `A-Z a-z 0-9 space + - = . _ : / @`, so free text goes through
//! `escape_tag_text`. `@` is the sentinel:
//!
//! - `@` becomes `@@`
//! - a newline becomes `@n`
//! - any other disallowed character becomes `@u<hex>.` (e.g. `@u1f525.`)

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ClientId;

pub const TAG_KEY_MAX_LEN: usize = 128;
pub const TAG_VALUE_MAX_LEN: usize = 256;
pub const MAX_TAGS_PER_OBJECT: usize = 10;

pub const CAPTION_TAG_KEY: &str = "caption";
pub const REACTION_TAG_PREFIX: &str = "reaction/";
pub const CAPTION_FIELD_DELIMITER: char = ':';

const ESCAPE: char = '@';

pub const REACTION_EMOJIS: [&str; 6] = ["❤️", "😂", "😮", "😢", "🔥", "👍"];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TagError {
    #[error("dangling escape at end of tag text")]
    DanglingEscape,
    #[error("unknown escape sequence @{0}")]
    UnknownEscape(char),
    #[error("invalid escaped code point {0:?}")]
    BadCodePoint(String),
    #[error("tag {key:?} value is {len} chars (max {TAG_VALUE_MAX_LEN})")]
    ValueTooLong { key: String, len: usize },
    #[error("tag key {0:?} is too long or contains disallowed characters")]
    BadKey(String),
    #[error("caption value {0:?} is missing its position fields")]
    MissingPosition(String),
    #[error("caption position {0} is not a number in [0, 1]")]
    BadPosition(String),
    #[error("object would carry {0} tags (max {MAX_TAGS_PER_OBJECT})")]
    TooManyTags(usize),
    #[error("{0:?} is not a supported reaction")]
    UnsupportedReaction(String),
}

pub fn is_tag_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, ' ' | '+' | '-' | '=' | '.' | '_' | ':' | '/' | '@')
}

pub fn escape_tag_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            ESCAPE => out.push_str("@@"),
            '\n' => out.push_str("@n"),
            c if is_tag_char(c) => out.push(c),
            c => out.push_str(&format!("@u{:x}.", c as u32)),
        }
    }
    out
}

pub fn unescape_tag_text(s: &str) -> Result<String, TagError> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != ESCAPE {
            out.push(c);
            continue;
        }
        match chars.next() {
            None => return Err(TagError::DanglingEscape),
            Some(ESCAPE) => out.push(ESCAPE),
            Some('n') => out.push('\n'),
            Some('u') => {
                let mut hex = String::new();
                loop {
                    match chars.next() {
                        Some('.') => break,
                        Some(h) if h.is_ascii_hexdigit() && hex.len() < 6 => hex.push(h),
                        Some(h) => {
                            hex.push(h);
                            return Err(TagError::BadCodePoint(hex));
                        }
                        None => return Err(TagError::BadCodePoint(hex)),
                    }
                }
                let decoded = u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| TagError::BadCodePoint(hex.clone()))?;
                out.push(decoded);
            }
            Some(other) => return Err(TagError::UnknownEscape(other)),
        }
    }
    Ok(out)
}

fn validate_tag_key(key: &str) -> Result<(), TagError> {
    if key.is_empty() || key.chars().count() > TAG_KEY_MAX_LEN || !key.chars().all(is_tag_char) {
        return Err(TagError::BadKey(key.to_string()));
    }
    Ok(())
}

fn checked_value(key: &str, value: String) -> Result<String, TagError> {
    let len = value.chars().count();
    if len > TAG_VALUE_MAX_LEN {
        return Err(TagError::ValueTooLong {
            key: key.to_string(),
            len,
        });
    }
    Ok(value)
}

/// Caption text placed at a normalized position on the photo.
#[derive(Debug, Clone, PartialEq)]
pub struct Caption {
    pub text: String,
    pub x: f32,
    pub y: f32,
}

fn parse_position(s: &str) -> Result<f32, TagError> {
    let v: f32 = s
        .trim()
        .parse()
        .map_err(|_| TagError::BadPosition(s.to_string()))?;
    if !(0.0..=1.0).contains(&v) {
        return Err(TagError::BadPosition(s.to_string()));
    }
    Ok(v)
}

impl Caption {
    pub fn new(text: impl Into<String>, x: f32, y: f32) -> Result<Self, TagError> {
        for v in [x, y] {
            if !(0.0..=1.0).contains(&v) {
                return Err(TagError::BadPosition(v.to_string()));
            }
        }
        Ok(Self {
            text: text.into(),
            x,
            y,
        })
    }

    pub fn to_tag_value(&self) -> Result<String, TagError> {
        let d = CAPTION_FIELD_DELIMITER;
        let value = format!("{}{d}{}{d}{}", escape_tag_text(&self.text), self.x, self.y);
        checked_value(CAPTION_TAG_KEY, value)
    }

    /// Splits from the right: the last two fields are the position, everything before
    /// them is text, whatever delimiters it contains.
    pub fn from_tag_value(value: &str) -> Result<Self, TagError> {
        let mut it = value.rsplitn(3, CAPTION_FIELD_DELIMITER);
        let y = it.next();
        let x = it.next();
        let text = it.next();
        let (Some(text), Some(x), Some(y)) = (text, x, y) else {
            return Err(TagError::MissingPosition(value.to_string()));
        };
        Ok(Self {
            text: unescape_tag_text(text)?,
            x: parse_position(x)?,
            y: parse_position(y)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    pub client: ClientId,
    pub emoji: String,
}

pub fn validate_reaction(emoji: &str) -> Result<(), TagError> {
    if REACTION_EMOJIS.contains(&emoji) {
        Ok(())
    } else {
        Err(TagError::UnsupportedReaction(emoji.to_string()))
    }
}

/// Everything a snap carries in its tag set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapMetadata {
    pub caption: Option<Caption>,
    pub reactions: Vec<Reaction>,
    /// Tags this client does not interpret, written back untouched.
    pub other: Vec<Tag>,
    /// Keys of caption or reaction tags that failed to parse. Those tags are kept in
    /// `other` until this client overwrites them.
    pub malformed: Vec<String>,
}

impl SnapMetadata {
    /// Never fails: a caption or reaction tag that does not parse is treated like an
    /// unknown tag, so one bad writer cannot make a snap unreadable.
    pub fn from_tags(tags: &[Tag]) -> Self {
        let mut meta = SnapMetadata::default();
        for tag in tags {
            let parsed = if tag.key == CAPTION_TAG_KEY {
                Caption::from_tag_value(&tag.value).map(|c| meta.caption = Some(c))
            } else if let Some(client) = tag.key.strip_prefix(REACTION_TAG_PREFIX) {
                unescape_tag_text(&tag.value).map(|emoji| {
                    meta.reactions.push(Reaction {
                        client: ClientId(client.to_string()),
                        emoji,
                    })
                })
            } else {
                meta.other.push(tag.clone());
                continue;
            };
            if parsed.is_err() {
                meta.malformed.push(tag.key.clone());
                meta.other.push(tag.clone());
            }
        }
        meta
    }

    /// Replaces the caption, dropping any unparseable caption tag it supersedes.
    pub fn set_caption(&mut self, caption: Caption) {
        self.other.retain(|t| t.key != CAPTION_TAG_KEY);
        self.malformed.retain(|k| k.as_str() != CAPTION_TAG_KEY);
        self.caption = Some(caption);
    }

    pub fn to_tags(&self) -> Result<Vec<Tag>, TagError> {
        let mut tags = Vec::with_capacity(1 + self.reactions.len() + self.other.len());
        if let Some(caption) = &self.caption {
            tags.push(Tag::new(CAPTION_TAG_KEY, caption.to_tag_value()?));
        }
        for r in &self.reactions {
            let key = format!("{REACTION_TAG_PREFIX}{}", r.client);
            validate_tag_key(&key)?;
            let value = checked_value(&key, escape_tag_text(&r.emoji))?;
            tags.push(Tag::new(key, value));
        }
        tags.extend(self.other.iter().cloned());
        if tags.len() > MAX_TAGS_PER_OBJECT {
            return Err(TagError::TooManyTags(tags.len()));
        }
        Ok(tags)
    }

    /// Records `client`'s reaction, replacing any earlier one from the same client.
    pub fn set_reaction(&mut self, client: &ClientId, emoji: &str) {
        let key = format!("{REACTION_TAG_PREFIX}{client}");
        self.other.retain(|t| t.key != key);
        self.malformed.retain(|k| *k != key);
        if let Some(existing) = self.reactions.iter_mut().find(|r| &r.client == client) {
            existing.emoji = emoji.to_string();
        } else {
            self.reactions.push(Reaction {
                client: client.clone(),
                emoji: emoji.to_string(),
            });
        }
    }

    pub fn reaction_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for r in &self.reactions {
            *counts.entry(r.emoji.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_doubles_sentinel_and_encodes_newlines() {
        assert_eq!(escape_tag_text("a@b\nc"), "a@@b@nc");
        assert_eq!(unescape_tag_text("a@@b@nc").unwrap(), "a@b\nc");
    }

    #[test]
    fn escape_output_is_tag_safe() {
        let escaped = escape_tag_text("Sunset! 🔥 #nofilter, right?");
        assert!(escaped.chars().all(is_tag_char), "{escaped}");
        assert_eq!(
            unescape_tag_text(&escaped).unwrap(),
            "Sunset! 🔥 #nofilter, right?"
        );
    }

    #[test]
    fn unescape_rejects_malformed_input() {
        assert_eq!(unescape_tag_text("abc@"), Err(TagError::DanglingEscape));
        assert_eq!(unescape_tag_text("@x"), Err(TagError::UnknownEscape('x')));
        assert!(matches!(
            unescape_tag_text("@ud800."),
            Err(TagError::BadCodePoint(_))
        ));
        assert!(matches!(
            unescape_tag_text("@u1f525"),
            Err(TagError::BadCodePoint(_))
        ));
    }

    #[test]
    fn caption_text_may_contain_the_field_delimiter() {
        let c = Caption::new("time: 10:30", 0.25, 0.75).unwrap();
        let value = c.to_tag_value().unwrap();
        assert_eq!(value, "time: 10:30:0.25:0.75");
        assert_eq!(Caption::from_tag_value(&value).unwrap(), c);
    }

    #[test]
    fn caption_rejects_out_of_range_position() {
        assert!(Caption::new("x", 1.5, 0.0).is_err());
        assert!(matches!(
            Caption::from_tag_value("hi:0.5:-0.1"),
            Err(TagError::BadPosition(_))
        ));
        assert!(matches!(
            Caption::from_tag_value("no position"),
            Err(TagError::MissingPosition(_))
        ));
    }

    #[test]
    fn caption_value_length_is_capped() {
        let c = Caption::new("a".repeat(250), 0.5, 0.5).unwrap();
        assert!(matches!(
            c.to_tag_value(),
            Err(TagError::ValueTooLong { .. })
        ));
    }

    #[test]
    fn reaction_replaces_previous_from_same_client() {
        let mut meta = SnapMetadata::default();
        let alice = ClientId("alice".to_string());
        meta.set_reaction(&alice, "🔥");
        meta.set_reaction(&ClientId("bob".to_string()), "🔥");
        meta.set_reaction(&alice, "😂");
        let counts = meta.reaction_counts();
        assert_eq!(counts.get("🔥"), Some(&1));
        assert_eq!(counts.get("😂"), Some(&1));
    }

    #[test]
    fn metadata_preserves_unknown_tags() {
        let tags = vec![
            Tag::new("caption", "hello@@world:0.1:0.2"),
            Tag::new("reaction/bob", "@u1f525."),
            Tag::new("retention", "7d"),
        ];
        let meta = SnapMetadata::from_tags(&tags);
        assert_eq!(meta.caption.as_ref().map(|c| c.text.as_str()), Some("hello@world"));
        assert_eq!(meta.reactions[0].emoji, "🔥");
        assert_eq!(meta.to_tags().unwrap(), tags);
    }

    #[test]
    fn tag_limit_is_enforced() {
        let mut meta = SnapMetadata::default();
        for i in 0..11 {
            meta.set_reaction(&ClientId(format!("c{i}")), "👍");
        }
        assert_eq!(meta.to_tags(), Err(TagError::TooManyTags(11)));
    }

    #[test]
    fn malformed_tags_are_kept_not_fatal() {
        let tags = vec![
            Tag::new("caption", "hello"),
            Tag::new("reaction/bob", "@x"),
            Tag::new("reaction/carol", "@u1f525."),
        ];
        let mut meta = SnapMetadata::from_tags(&tags);
        assert_eq!(meta.caption, None);
        assert_eq!(meta.malformed, ["caption", "reaction/bob"]);
        assert_eq!(meta.reactions.len(), 1);
        assert_eq!(meta.to_tags().unwrap().len(), 3);

        meta.set_caption(Caption::new("fixed", 0.5, 0.5).unwrap());
        meta.set_reaction(&ClientId("bob".to_string()), "👍");
        let rewritten = meta.to_tags().unwrap();
        let keys: Vec<&str> = rewritten.iter().map(|t| t.key.as_str()).collect();
        assert_eq!(keys, ["caption", "reaction/carol", "reaction/bob"]);
        assert_eq!(rewritten[0].value, "fixed:0.5:0.5");
        assert!(meta.malformed.is_empty());
    }
}
