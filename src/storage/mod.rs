//! Credential persistence.
//!
//! Storage is split in two layers: a dumb [`KeyValueStore`] that moves
//! strings in and out of some durable backend, and the [`CredentialStore`]
//! that owns the credential pair and the cached user snapshot under fixed,
//! versioned keys. The pipeline and auth service only ever talk to the
//! latter, so swapping the backend never touches the protocol code.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::models::{Credentials, UserIdentity};

/// Versioned storage keys. Bump the version if the serialized shape of the
/// values ever changes incompatibly.
pub const CREDENTIALS_KEY: &str = "trackit.v1.credentials";
pub const USER_KEY: &str = "trackit.v1.user";

/// Minimal durable string storage.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Volatile in-memory backend. Used by tests and by hosts that handle
/// persistence themselves.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// File-backed store: a single JSON document rewritten whole on every
/// mutation, so a reader never observes a partial write of one field.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl JsonFileStore {
    /// Open (or create) the store at `path`. An unreadable or malformed
    /// document is treated as empty rather than an error; the caller is
    /// responsible for re-authenticating when credentials turn out absent.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str::<HashMap<String, String>>(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Discarding malformed store file");
                    HashMap::new()
                }
            },
            Err(_) => {
                debug!(path = %path.display(), "No existing store file, starting empty");
                HashMap::new()
            }
        };

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    async fn persist(&self, entries: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let raw = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, raw)
            .await
            .map_err(|e| anyhow!("failed to save store {}: {}", self.path.display(), e))
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), value);
        self.persist(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        self.persist(&entries).await
    }
}

/// Owner of the stored credentials and cached user identity.
///
/// Reads never fail: structurally invalid persisted data is reported as
/// absent (with a log line), which downstream code treats the same as "not
/// signed in".
pub struct CredentialStore {
    backend: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// The stored credential pair, if present and well-formed.
    pub async fn credentials(&self) -> Option<Credentials> {
        self.read_json(CREDENTIALS_KEY).await
    }

    pub async fn set_credentials(&self, credentials: &Credentials) -> Result<()> {
        let raw = serde_json::to_string(credentials)?;
        self.backend.set(CREDENTIALS_KEY, raw).await?;
        debug!("Credentials stored");
        Ok(())
    }

    /// The cached user identity snapshot, if present and well-formed.
    pub async fn user_snapshot(&self) -> Option<UserIdentity> {
        self.read_json(USER_KEY).await
    }

    pub async fn set_user_snapshot(&self, user: &UserIdentity) -> Result<()> {
        let raw = serde_json::to_string(user)?;
        self.backend.set(USER_KEY, raw).await?;
        Ok(())
    }

    /// Remove both stored values.
    pub async fn clear(&self) -> Result<()> {
        self.backend.remove(CREDENTIALS_KEY).await?;
        self.backend.remove(USER_KEY).await?;
        info!("Stored credentials cleared");
        Ok(())
    }

    async fn read_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.backend.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, error = %e, "Storage backend read failed, treating as absent");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "Stored value is malformed, treating as absent");
                None
            }
        }
    }
}
