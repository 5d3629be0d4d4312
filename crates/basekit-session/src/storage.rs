//! Credential persistence
//!
//! The session store writes through a `CredentialStorage` on every sign-in,
//! refresh and sign-out, and reads it back once at startup.

use async_trait::async_trait;
use basekit_core::{Credential, Error, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

#[async_trait]
pub trait CredentialStorage: Send + Sync {
    async fn load(&self) -> Result<Option<Credential>>;
    async fn save(&self, credential: &Credential) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

/// Process-lifetime storage; nothing survives a restart
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    slot: Arc<Mutex<Option<Credential>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that already holds `credential`, as if persisted by an earlier run
    pub fn with_credential(credential: Credential) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(credential))),
        }
    }

    /// What is currently stored
    pub fn stored(&self) -> Option<Credential> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl CredentialStorage for MemoryStorage {
    async fn load(&self) -> Result<Option<Credential>> {
        Ok(self.stored())
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(credential.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

/// JSON file storage
///
/// Writes go to a sibling temp file that is renamed over the target, so a
/// crash mid-write never leaves a truncated credential behind. On unix the
/// file is readable by the owner only.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Build from a configured path, expanding a leading `~`
    pub fn from_config_path(path: &str) -> Self {
        Self::new(expand_tilde(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStorage for FileStorage {
    async fn load(&self) -> Result<Option<Credential>> {
        let path = self.path.clone();
        let contents = match tokio::fs::read(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::Persistence(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        match serde_json::from_slice::<Credential>(&contents) {
            Ok(credential) => {
                debug!("Loaded credential from {}", path.display());
                Ok(Some(credential))
            }
            Err(e) => {
                warn!("Ignoring unreadable credential file {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        let data = serde_json::to_vec_pretty(credential)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomic(&path, &data))
            .await
            .map_err(|e| Error::Persistence(format!("Credential write task failed: {}", e)))?
            .map_err(|e| Error::Persistence(format!("Failed to write credential: {}", e)))
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Persistence(format!(
                "Failed to remove {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

/// Removes the temp file unless the write was committed
struct TempFileGuard {
    path: PathBuf,
    committed: bool,
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

fn write_atomic(target: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut temp = target.as_os_str().to_owned();
    temp.push(".tmp");
    let mut guard = TempFileGuard {
        path: PathBuf::from(temp),
        committed: false,
    };

    let mut file = File::create(&guard.path)?;
    restrict_permissions(&file)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&guard.path, target)?;
    guard.committed = true;
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(file: &File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &File) -> std::io::Result<()> {
    Ok(())
}

fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn credential() -> Credential {
        Credential::new(
            "access-1",
            "refresh-1",
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_memory_storage_roundtrip() {
        let storage = MemoryStorage::new();
        assert!(storage.load().await.unwrap().is_none());

        storage.save(&credential()).await.unwrap();
        assert_eq!(storage.load().await.unwrap(), Some(credential()));

        storage.clear().await.unwrap();
        assert!(storage.stored().is_none());
    }

    #[tokio::test]
    async fn test_file_storage_persists_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/session.json");

        FileStorage::new(&path).save(&credential()).await.unwrap();

        let reopened = FileStorage::new(&path);
        assert_eq!(reopened.load().await.unwrap(), Some(credential()));
        assert!(!temp_dir.path().join("nested/session.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_file_storage_missing_file_is_absent() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path().join("none.json"));

        assert!(storage.load().await.unwrap().is_none());
        assert!(storage.clear().await.is_ok());
    }

    #[tokio::test]
    async fn test_file_storage_corrupt_file_is_absent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.json");
        fs::write(&path, b"{not json").unwrap();

        assert!(FileStorage::new(&path).load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_storage_clear_removes_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.json");
        let storage = FileStorage::new(&path);

        storage.save(&credential()).await.unwrap();
        storage.clear().await.unwrap();
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_storage_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.json");
        FileStorage::new(&path).save(&credential()).await.unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde("/tmp/session.json"), PathBuf::from("/tmp/session.json"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/.basekit/s.json"), home.join(".basekit/s.json"));
        }
    }
}
