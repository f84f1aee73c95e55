//! Boundary between live sessions and persisted player progress
//!
//! The store is a plain load/save-by-identity interface. The gateway on top
//! of it knows which fields a live session owns (position, level, hp,
//! max hp) and merges exactly those into the stored record, leaving
//! experience, gold, inventory and the rest as the store had them.

use crate::session::Session;
use log::{debug, error};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shared::{GameProgress, IdentityId, LeaderboardEntry, Position};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed progress data: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InventoryItem {
    pub item_id: String,
    pub quantity: u32,
}

/// Item id per equipment slot
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Equipment {
    pub helmet: Option<String>,
    pub amulet: Option<String>,
    pub backpack: Option<String>,
    pub weapon: Option<String>,
    pub armor: Option<String>,
    pub shield: Option<String>,
    pub ring: Option<String>,
    pub legs: Option<String>,
    pub arrows: Option<String>,
    pub boots: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkillUnlock {
    pub skill_id: String,
    pub unlocked: bool,
}

/// Everything persisted for one identity
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerRecord {
    #[serde(default)]
    pub name: Option<String>,
    pub progress: GameProgress,
    #[serde(default)]
    pub inventory: Vec<InventoryItem>,
    #[serde(default)]
    pub equipment: Equipment,
    #[serde(default)]
    pub skills: Vec<SkillUnlock>,
}

pub trait ProgressStore: Send + Sync {
    fn load(&self, identity_id: IdentityId) -> Result<Option<PlayerRecord>, StoreError>;
    fn save(&self, identity_id: IdentityId, record: &PlayerRecord) -> Result<(), StoreError>;
    fn top_players(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, StoreError>;
}

// Highest level first, then most experience
fn rank(records: &HashMap<IdentityId, PlayerRecord>, limit: usize) -> Vec<LeaderboardEntry> {
    let mut ranked: Vec<(&IdentityId, &PlayerRecord)> = records.iter().collect();
    ranked.sort_by(|(a_id, a), (b_id, b)| {
        b.progress
            .level
            .cmp(&a.progress.level)
            .then(b.progress.experience.cmp(&a.progress.experience))
            .then(a_id.cmp(b_id))
    });

    ranked
        .into_iter()
        .take(limit)
        .map(|(_, record)| LeaderboardEntry {
            player_name: record.name.clone(),
            level: record.progress.level,
            experience: record.progress.experience,
            gold: record.progress.gold,
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<IdentityId, PlayerRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressStore for MemoryStore {
    fn load(&self, identity_id: IdentityId) -> Result<Option<PlayerRecord>, StoreError> {
        Ok(self.records.lock().get(&identity_id).cloned())
    }

    fn save(&self, identity_id: IdentityId, record: &PlayerRecord) -> Result<(), StoreError> {
        self.records.lock().insert(identity_id, record.clone());
        Ok(())
    }

    fn top_players(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, StoreError> {
        Ok(rank(&self.records.lock(), limit))
    }
}

/// All records in one JSON file, rewritten on every save
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    records: Mutex<HashMap<IdentityId, PlayerRecord>>,
}

impl JsonFileStore {
    /// Opens `path`, starting empty when the file does not exist yet
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let records = match std::fs::read_to_string(&path) {
            Ok(data) => serde_json::from_str(&data)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    fn persist(&self, records: &HashMap<IdentityId, PlayerRecord>) -> Result<(), StoreError> {
        // Write beside the target and rename so readers never see half a file
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(records)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl ProgressStore for JsonFileStore {
    fn load(&self, identity_id: IdentityId) -> Result<Option<PlayerRecord>, StoreError> {
        Ok(self.records.lock().get(&identity_id).cloned())
    }

    fn save(&self, identity_id: IdentityId, record: &PlayerRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock();
        records.insert(identity_id, record.clone());
        self.persist(&records)
    }

    fn top_players(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, StoreError> {
        Ok(rank(&self.records.lock(), limit))
    }
}

/// The session-owned fields of one player, copied out of the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProgress {
    pub identity_id: IdentityId,
    pub display_name: String,
    pub position: Position,
    pub level: u32,
    pub hp: u32,
    pub max_hp: u32,
}

impl From<&Session> for SessionProgress {
    fn from(session: &Session) -> Self {
        Self {
            identity_id: session.identity_id,
            display_name: session.display_name.clone(),
            position: session.position,
            level: session.level,
            hp: session.hp,
            max_hp: session.max_hp,
        }
    }
}

pub struct SyncGateway {
    store: Arc<dyn ProgressStore>,
}

impl SyncGateway {
    pub fn new(store: Arc<dyn ProgressStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Stored progress for `identity_id`, creating a fresh record on first
    /// contact
    pub fn load_snapshot(&self, identity_id: IdentityId) -> Result<GameProgress, StoreError> {
        if let Some(record) = self.store.load(identity_id)? {
            return Ok(record.progress);
        }

        let record = PlayerRecord::default();
        self.store.save(identity_id, &record)?;
        debug!("Created progress record for identity {}", identity_id);
        Ok(record.progress)
    }

    pub fn flush_one(&self, progress: &SessionProgress) -> Result<(), StoreError> {
        let mut record = self
            .store
            .load(progress.identity_id)?
            .unwrap_or_default();

        record.name = Some(progress.display_name.clone());
        record.progress.position = progress.position;
        record.progress.level = progress.level;
        record.progress.hp = progress.hp;
        record.progress.max_hp = progress.max_hp;

        self.store.save(progress.identity_id, &record)
    }

    /// Saves every entry of `batch`, logging the ones that fail. Returns
    /// how many were saved.
    pub fn flush(&self, batch: &[SessionProgress]) -> usize {
        let mut saved = 0;
        for progress in batch {
            match self.flush_one(progress) {
                Ok(()) => saved += 1,
                Err(e) => error!(
                    "Failed to save progress for identity {}: {}",
                    progress.identity_id, e
                ),
            }
        }
        saved
    }

    pub fn top_players(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, StoreError> {
        self.store.top_players(limit)
    }
}
