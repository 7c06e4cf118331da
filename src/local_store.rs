use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const STORE_DIR: &str = "dota_insights";
const STORE_FILE: &str = "local_store.json";
const STORE_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    #[serde(default)]
    player_id: Option<String>,
    #[serde(default)]
    player_id_changes: u32,
    #[serde(default)]
    player_id_locked: bool,
    #[serde(default)]
    anti_tilt_pause_until: Option<i64>,
}

/// Last identity record seen from the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirroredIdentity {
    pub player_id: Option<String>,
    pub change_count: u32,
    pub is_locked: bool,
}

/// Best-effort mirror of client-side keys. Never authoritative: a missing or unreadable
/// file reads as empty and write failures are reported but harmless.
#[derive(Debug, Clone)]
pub struct LocalStore {
    path: Option<PathBuf>,
}

impl LocalStore {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// XDG cache location, or a no-op store when no home directory is known.
    pub fn default_location() -> Self {
        Self { path: store_path() }
    }

    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn identity(&self) -> MirroredIdentity {
        let file = self.load();
        MirroredIdentity {
            player_id: file.player_id,
            change_count: file.player_id_changes,
            is_locked: file.player_id_locked,
        }
    }

    pub fn save_identity(&self, identity: &MirroredIdentity) -> Result<()> {
        let mut file = self.load();
        file.player_id = identity.player_id.clone();
        file.player_id_changes = identity.change_count;
        file.player_id_locked = identity.is_locked;
        self.save(&file)
    }

    pub fn anti_tilt_pause_until(&self) -> Option<i64> {
        self.load().anti_tilt_pause_until
    }

    pub fn save_anti_tilt_pause_until(&self, until: Option<i64>) -> Result<()> {
        let mut file = self.load();
        file.anti_tilt_pause_until = until;
        self.save(&file)
    }

    fn load(&self) -> StoreFile {
        let Some(path) = self.path.as_ref() else {
            return StoreFile::default();
        };
        let Ok(raw) = fs::read_to_string(path) else {
            return StoreFile::default();
        };
        match serde_json::from_str::<StoreFile>(&raw) {
            Ok(file) if file.version == STORE_VERSION => file,
            _ => StoreFile::default(),
        }
    }

    fn save(&self, file: &StoreFile) -> Result<()> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("create store dir {}", dir.display()))?;
        }
        let mut file = file.clone();
        file.version = STORE_VERSION;
        let json = serde_json::to_string_pretty(&file).context("serialize local store")?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).context("write local store")?;
        fs::rename(&tmp, path).context("swap local store")?;
        Ok(())
    }
}

fn store_path() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME") {
        if !base.trim().is_empty() {
            return Some(PathBuf::from(base).join(STORE_DIR).join(STORE_FILE));
        }
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(
        PathBuf::from(home)
            .join(".cache")
            .join(STORE_DIR)
            .join(STORE_FILE),
    )
}
