use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

/// Durable home of the session token: one named slot holding a string.
#[async_trait]
pub trait TokenStorage: Send + Sync {
    async fn read(&self) -> anyhow::Result<Option<String>>;
    async fn write(&self, token: &str) -> anyhow::Result<()>;
    async fn remove(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileTokenStorage {
    path: PathBuf,
}

impl FileTokenStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TokenStorage for FileTokenStorage {
    async fn read(&self) -> anyhow::Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(s) if s.is_empty() => Ok(None),
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, token: &str) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, token.as_bytes()).await?;
        Ok(())
    }

    async fn remove(&self) -> anyhow::Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// Slot that lives as long as the process.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryTokenStorage {
    slot: RwLock<Option<String>>,
}

#[cfg(test)]
impl MemoryTokenStorage {
    pub fn with_token(token: &str) -> Self {
        Self { slot: RwLock::new(Some(token.to_string())) }
    }
}

#[cfg(test)]
#[async_trait]
impl TokenStorage for MemoryTokenStorage {
    async fn read(&self) -> anyhow::Result<Option<String>> {
        Ok(self.slot.read().await.clone())
    }

    async fn write(&self, token: &str) -> anyhow::Result<()> {
        *self.slot.write().await = Some(token.to_string());
        Ok(())
    }

    async fn remove(&self) -> anyhow::Result<()> {
        *self.slot.write().await = None;
        Ok(())
    }
}

/// Slot that can be read but never changed.
#[cfg(test)]
pub struct ReadOnlyStorage(pub Option<String>);

#[cfg(test)]
#[async_trait]
impl TokenStorage for ReadOnlyStorage {
    async fn read(&self) -> anyhow::Result<Option<String>> {
        Ok(self.0.clone())
    }

    async fn write(&self, _token: &str) -> anyhow::Result<()> {
        anyhow::bail!("read-only file system")
    }

    async fn remove(&self) -> anyhow::Result<()> {
        anyhow::bail!("read-only file system")
    }
}

/// What the client core and the route guard need to know about the session.
#[async_trait]
pub trait SessionState: Send + Sync {
    /// Token attached to outgoing requests.
    async fn token(&self) -> Option<String>;
    /// Whether the durable slot holds a token right now.
    async fn is_persisted(&self) -> anyhow::Result<bool>;
    /// Adopt a freshly issued credential.
    async fn establish(&self, token: &str) -> anyhow::Result<()>;
    /// Drop the credential after the backend rejected it.
    async fn invalidate(&self) -> anyhow::Result<()>;
}

/// Holds at most one token, mirrored into a [`TokenStorage`] slot.
///
/// `set` and `clear` are the only mutators and always update memory and the
/// slot together. `load` rehydrates memory from the slot once per process.
pub struct SessionStore {
    token: RwLock<Option<String>>,
    storage: Arc<dyn TokenStorage>,
    loaded: AtomicBool,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn TokenStorage>) -> Self {
        Self { token: RwLock::new(None), storage, loaded: AtomicBool::new(false) }
    }

    pub async fn load(&self) -> anyhow::Result<()> {
        if self.loaded.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(stored) = self.storage.read().await? {
            *self.token.write().await = Some(stored);
            tracing::debug!("session token restored from storage");
        }
        Ok(())
    }

    pub async fn set(&self, token: &str) -> anyhow::Result<()> {
        let mut guard = self.token.write().await;
        self.storage.write(token).await?;
        *guard = Some(token.to_string());
        self.loaded.store(true, Ordering::SeqCst);
        tracing::info!("session token stored");
        Ok(())
    }

    pub async fn clear(&self) -> anyhow::Result<()> {
        let mut guard = self.token.write().await;
        self.storage.remove().await?;
        *guard = None;
        tracing::info!("session token cleared");
        Ok(())
    }

    pub async fn current(&self) -> Option<String> {
        self.token.read().await.clone()
    }
}

#[async_trait]
impl SessionState for SessionStore {
    async fn token(&self) -> Option<String> {
        self.current().await
    }

    async fn is_persisted(&self) -> anyhow::Result<bool> {
        Ok(self.storage.read().await?.is_some_and(|t| !t.is_empty()))
    }

    async fn establish(&self, token: &str) -> anyhow::Result<()> {
        self.set(token).await
    }

    async fn invalidate(&self) -> anyhow::Result<()> {
        self.clear().await
    }
}
