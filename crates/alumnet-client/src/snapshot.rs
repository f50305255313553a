//! Per-user persistence of the conversation cache.
//!
//! A snapshot is written at shutdown and read back at startup, never on every
//! mutation. Each session user gets one JSON file under the data directory;
//! logout deletes it.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use alumnet_shared::message::Message;
use alumnet_shared::types::UserId;

use crate::error::{ClientError, Result};

/// Everything needed to restore a user's conversation view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub viewer: UserId,
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub selected: Option<UserId>,
    #[serde(default)]
    pub unread: HashMap<UserId, u32>,
    /// Every non-empty cached sequence, loaded or not.
    #[serde(default)]
    pub conversations: HashMap<UserId, Vec<Message>>,
    /// Conversations whose full history had been fetched.
    #[serde(default)]
    pub loaded: Vec<UserId>,
}

pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// Store under the platform data directory:
    /// - Linux: `~/.local/share/alumnet/sessions/`
    /// - macOS: `~/Library/Application Support/org.alumnet.alumnet/sessions/`
    pub fn new() -> Result<Self> {
        let project_dirs =
            ProjectDirs::from("org", "alumnet", "alumnet").ok_or(ClientError::NoDataDir)?;
        Ok(Self::at(project_dirs.data_dir().join("sessions")))
    }

    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn save(&self, snapshot: &SessionSnapshot) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;

        let path = self.path_for(&snapshot.viewer);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(snapshot)?;

        // Write-then-rename so a crash never leaves a truncated snapshot.
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;

        info!(
            user = %snapshot.viewer.short(),
            conversations = snapshot.conversations.len(),
            "session snapshot saved"
        );
        Ok(())
    }

    /// `Ok(None)` when the user has no snapshot yet.
    pub fn load(&self, user: &UserId) -> Result<Option<SessionSnapshot>> {
        let path = self.path_for(user);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(user = %user.short(), "no session snapshot");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let snapshot: SessionSnapshot = serde_json::from_slice(&bytes)?;
        // Sanitized file names can collide; the embedded viewer cannot.
        if &snapshot.viewer != user {
            debug!(user = %user.short(), "snapshot belongs to another user, ignoring");
            return Ok(None);
        }
        Ok(Some(snapshot))
    }

    /// Remove the user's snapshot. Missing files are fine.
    pub fn clear(&self, user: &UserId) -> Result<()> {
        match std::fs::remove_file(self.path_for(user)) {
            Ok(()) => {
                info!(user = %user.short(), "session snapshot cleared");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn path_for(&self, user: &UserId) -> PathBuf {
        let name: String = user
            .as_str()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}
