use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lg_core::types::{ClientId, LastSnap, PushToken};

pub const STATE_VERSION: u32 = 1;

const STATE_DIR: &str = "looking-glass";
const STATE_FILE: &str = "state.json";

/// Everything the CLI remembers between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientState {
    pub version: u32,
    pub client_id: ClientId,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub push_token: PushToken,
    #[serde(default)]
    pub self_send: bool,
    pub last_snap: LastSnap,
}

impl ClientState {
    /// Fresh identity; only snaps arriving after `now` will be pending.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            version: STATE_VERSION,
            client_id: ClientId(uuid::Uuid::new_v4().to_string()),
            display_name: String::new(),
            push_token: PushToken::default(),
            self_send: false,
            last_snap: LastSnap::starting_at(now),
        }
    }

    pub fn load_or_init(path: &Path, now: DateTime<Utc>) -> Result<Self> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let state = Self::new(now);
                state.save(path)?;
                tracing::info!(
                    target: "lg_events",
                    event = "state_initialized",
                    client_id = %state.client_id,
                    path = %path.display(),
                    "created client state"
                );
                return Ok(state);
            }
            Err(err) => {
                return Err(err).with_context(|| format!("reading {}", path.display()));
            }
        };
        let state: Self = serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing {}", path.display()))?;
        if state.version != STATE_VERSION {
            return Err(anyhow!(
                "{} has state version {}, expected {STATE_VERSION}",
                path.display(),
                state.version
            ));
        }
        Ok(state)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow!("state path {} has no parent", path.display()))?;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
        let bytes = serde_json::to_vec_pretty(self)?;

        let file_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .ok_or_else(|| anyhow!("state path {} has no file name", path.display()))?;
        let tmp = parent.join(format!(".{file_name}.tmp.{}", std::process::id()));
        std::fs::write(&tmp, bytes).with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
        Ok(())
    }
}

/// `<config dir>/looking-glass/state.json`, or a dot-directory in the working directory
/// when the platform has no config dir.
pub fn default_state_path() -> PathBuf {
    match dirs_next::config_dir() {
        Some(dir) => dir.join(STATE_DIR).join(STATE_FILE),
        None => PathBuf::from(format!(".{STATE_DIR}")).join(STATE_FILE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!(
                "lg-cli-state-{name}-{}-{}",
                std::process::id(),
                lg_observe::time::unix_time_ms()
            ))
            .join(STATE_FILE)
    }

    #[test]
    fn first_load_creates_identity_and_marker() {
        let path = temp_path("init");
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let state = ClientState::load_or_init(&path, now).unwrap();
        assert_eq!(state.version, STATE_VERSION);
        assert!(uuid::Uuid::parse_str(state.client_id.as_str()).is_ok());
        assert_eq!(state.last_snap, LastSnap::starting_at(now));
        assert!(path.is_file());

        let later = now + chrono::Duration::days(1);
        let again = ClientState::load_or_init(&path, later).unwrap();
        assert_eq!(again, state);
    }

    #[test]
    fn save_round_trips_updates() {
        let path = temp_path("save");
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut state = ClientState::new(now);
        state.display_name = "Sam".to_string();
        state.push_token = PushToken("ExponentPushToken[abc]".to_string());
        state.last_snap = LastSnap {
            key: Some("snap|2024-05-02T00:00:00.000Z|x|t|.jpg".to_string()),
            last_modified: now,
        };
        state.save(&path).unwrap();

        let loaded = ClientState::load_or_init(&path, now).unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn unknown_version_is_rejected() {
        let path = temp_path("version");
        let mut state = ClientState::new(Utc::now());
        state.version = STATE_VERSION + 1;
        state.save(&path).unwrap();
        assert!(ClientState::load_or_init(&path, Utc::now()).is_err());
    }
}
