//! Shadow snapshot — a plain-JSON mirror of bots and personas kept next
//! to the database.
//!
//! If the database is lost or comes up empty while the shadow has
//! content, startup restores from the shadow instead. Writes go to a
//! temp file first, then rename into place, so a crash mid-write never
//! leaves a torn snapshot.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::state::{BotProfile, Persona};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadowSnapshot {
    pub saved_at: DateTime<Utc>,
    pub bots: Vec<BotProfile>,
    pub personas: Vec<Persona>,
}

pub struct ShadowFile {
    path: PathBuf,
}

impl ShadowFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn write(&self, bots: &[BotProfile], personas: &[Persona]) -> Result<()> {
        let snapshot = ShadowSnapshot {
            saved_at: Utc::now(),
            bots: bots.to_vec(),
            personas: personas.to_vec(),
        };
        let json = serde_json::to_string_pretty(&snapshot)?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).context("failed to write shadow snapshot")?;
        fs::rename(&tmp, &self.path).context("failed to move shadow snapshot into place")?;
        Ok(())
    }

    /// Read the snapshot, if present and parseable. A corrupt shadow is
    /// logged and treated as absent.
    pub fn read(&self) -> Option<ShadowSnapshot> {
        let raw = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "ignoring corrupt shadow snapshot");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ConversationMode, Gender};
    use tempfile::tempdir;
    use uuid::Uuid;

    fn bot(name: &str) -> BotProfile {
        BotProfile {
            id: Uuid::new_v4(),
            name: name.into(),
            personality: "Quiet, observant.".into(),
            scenario: String::new(),
            avatar_ref: None,
            mode: ConversationMode::Normal,
            gender: Gender::Fluid,
            persona_id: None,
        }
    }

    #[test]
    fn test_write_read_roundtrip() {
        let dir = tempdir().unwrap();
        let shadow = ShadowFile::new(dir.path().join("shadow.json"));

        let bots = vec![bot("Mira"), bot("Nyx")];
        shadow.write(&bots, &[]).unwrap();

        let snapshot = shadow.read().unwrap();
        assert_eq!(snapshot.bots.len(), 2);
        assert_eq!(snapshot.bots[0].id, bots[0].id);
        assert!(snapshot.personas.is_empty());
    }

    #[test]
    fn test_missing_file_reads_none() {
        let dir = tempdir().unwrap();
        let shadow = ShadowFile::new(dir.path().join("absent.json"));
        assert!(shadow.read().is_none());
    }

    #[test]
    fn test_corrupt_file_reads_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shadow.json");
        fs::write(&path, "{not json").unwrap();
        assert!(ShadowFile::new(path).read().is_none());
    }

    #[test]
    fn test_rewrite_replaces_previous() {
        let dir = tempdir().unwrap();
        let shadow = ShadowFile::new(dir.path().join("shadow.json"));
        shadow.write(&[bot("Mira")], &[]).unwrap();
        shadow.write(&[], &[]).unwrap();
        assert!(shadow.read().unwrap().bots.is_empty());
    }
}
