use crate::common::{Config, DevMode, FaceLockError, Result};
use crate::core::embedding::Embedding;
use crate::core::matcher::Identity;
use crate::storage::{new_identity_id, newest_first, AccessEvent, Datastore};
use chrono::Utc;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

const STORAGE_VERSION: u32 = 1;
const ACCESS_LOG_FILE: &str = "access_log.jsonl";
const IDENTITIES_DIR: &str = "identities";

#[derive(Serialize, Deserialize)]
struct StoredIdentity {
    version: u32,
    identity: Identity,
}

/// Identities as one bincode file each, access events as JSON lines.
pub struct FileStore {
    identities_dir: PathBuf,
    access_log: PathBuf,
}

fn persistence(context: &str) -> impl FnOnce(std::io::Error) -> FaceLockError + '_ {
    move |e| FaceLockError::Persistence(format!("{}: {}", context, e))
}

impl FileStore {
    pub fn new_with_paths(data_dir: &Path) -> Result<Self> {
        let identities_dir = data_dir.join(IDENTITIES_DIR);
        fs::create_dir_all(&identities_dir)
            .map_err(persistence("Failed to create data directory"))?;

        Ok(Self {
            identities_dir,
            access_log: data_dir.join(ACCESS_LOG_FILE),
        })
    }

    /// Data directory precedence: `[storage] data_dir`, then `--dev`, then
    /// the platform data directory.
    pub fn open(config: &Config, dev_mode: &DevMode) -> Result<Self> {
        let data_dir = match (&config.storage.data_dir, dev_mode.data_dir()) {
            (Some(dir), _) => dir.clone(),
            (None, Some(dir)) => dir,
            (None, None) => ProjectDirs::from("com", "facelock", "FaceLock")
                .ok_or_else(|| FaceLockError::Persistence("Failed to get project dirs".into()))?
                .data_dir()
                .to_path_buf(),
        };

        tracing::debug!("FileStore using data directory: {:?}", data_dir);
        Self::new_with_paths(&data_dir)
    }

    fn identity_files(&self) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.identities_dir)
            .map_err(persistence("Failed to read identities"))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(persistence("Failed to read identities"))?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("bincode") {
                files.push(path);
            }
        }
        Ok(files)
    }

    fn read_identity(path: &Path) -> Result<Identity> {
        let data = fs::read(path).map_err(persistence("Failed to read identity"))?;
        let stored: StoredIdentity = bincode::deserialize(&data)
            .map_err(|e| FaceLockError::Persistence(format!("Failed to deserialize: {}", e)))?;

        if stored.version > STORAGE_VERSION {
            return Err(FaceLockError::Persistence(format!(
                "Identity written by a newer storage version ({} > {})", stored.version, STORAGE_VERSION
            )));
        }
        Ok(stored.identity)
    }
}

impl Datastore for FileStore {
    /// Sorted by enrollment time so gallery order is stable across runs.
    /// Unreadable files are skipped with a warning.
    fn list_identities(&self) -> Result<Vec<Identity>> {
        let mut identities = Vec::new();
        for path in self.identity_files()? {
            match Self::read_identity(&path) {
                Ok(identity) => identities.push(identity),
                Err(e) => tracing::warn!("Skipping identity file {:?}: {}", path, e),
            }
        }

        identities.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(identities)
    }

    fn identity_exists(&self, name: &str) -> Result<bool> {
        Ok(self.list_identities()?.iter().any(|identity| identity.name == name))
    }

    fn create_identity(&self, name: &str, embeddings: Vec<Embedding>) -> Result<Identity> {
        if embeddings.is_empty() {
            return Err(FaceLockError::Persistence("Refusing to store an identity without embeddings".into()));
        }

        let identity = Identity {
            id: new_identity_id(),
            name: name.to_string(),
            embeddings,
            created_at: Utc::now(),
        };
        let stored = StoredIdentity { version: STORAGE_VERSION, identity };
        let encoded = bincode::serialize(&stored)
            .map_err(|e| FaceLockError::Persistence(format!("Failed to serialize: {}", e)))?;

        let path = self.identities_dir.join(format!("{}.bincode", stored.identity.id));
        fs::write(&path, encoded).map_err(persistence("Failed to write identity"))?;

        tracing::info!("Stored identity {} ({}) with {} embeddings",
                       stored.identity.name, stored.identity.id, stored.identity.embeddings.len());
        Ok(stored.identity)
    }

    fn append_access_event(&self, event: &AccessEvent) -> Result<()> {
        let mut line = serde_json::to_string(event)
            .map_err(|e| FaceLockError::Persistence(format!("Failed to encode access event: {}", e)))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.access_log)
            .map_err(persistence("Failed to open access log"))?;
        file.write_all(line.as_bytes())
            .map_err(persistence("Failed to append access event"))
    }

    fn list_access_events(&self, limit: usize) -> Result<Vec<AccessEvent>> {
        if !self.access_log.exists() {
            return Ok(Vec::new());
        }

        let file = fs::File::open(&self.access_log).map_err(persistence("Failed to open access log"))?;
        let mut events = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(persistence("Failed to read access log"))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AccessEvent>(&line) {
                Ok(event) => events.push(event),
                Err(e) => tracing::warn!("Skipping malformed access log line {}: {}", index + 1, e),
            }
        }

        Ok(newest_first(events, limit))
    }
}
