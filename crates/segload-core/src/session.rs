//! Stable per-client session identifier.
//!
//! The identifier is attached to every range request as a correlation header.
//! It is generated once, persisted through an [`IdentityStore`], and reused on
//! later runs. When the store cannot be read or written the identifier still
//! works for the current process, it just won't survive a restart.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rand::Rng;
use tracing::{debug, warn};

const PREFIX: &str = "session_";
const SUFFIX_LEN: usize = 9;
const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        Self(format!("{PREFIX}{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolves the identifier from `store`, creating and persisting one when
    /// absent. Storage failures degrade to an in-memory identifier.
    pub fn get_or_create(store: &dyn IdentityStore) -> Self {
        match store.load() {
            Ok(Some(id)) => {
                debug!(session_id = %id, "Reusing stored session id");
                return id;
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Session id store unreadable, using in-memory id"),
        }

        let id = Self::generate();
        if let Err(e) = store.save(&id) {
            warn!(error = %e, session_id = %id, "Failed to persist session id, using in-memory id");
        }
        id
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Durable storage for the session identifier.
pub trait IdentityStore: Send + Sync {
    fn load(&self) -> io::Result<Option<SessionId>>;
    fn save(&self, id: &SessionId) -> io::Result<()>;
}

/// Identifier kept in a single text file.
#[derive(Debug, Clone)]
pub struct FileIdentityStore {
    path: PathBuf,
}

impl FileIdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn clear(&self) -> io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

impl IdentityStore for FileIdentityStore {
    fn load(&self) -> io::Result<Option<SessionId>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => {
                let trimmed = content.trim();
                if trimmed.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(SessionId::from(trimmed)))
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn save(&self, id: &SessionId) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, id.as_str())
    }
}

#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    slot: Mutex<Option<SessionId>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn load(&self) -> io::Result<Option<SessionId>> {
        let slot = self
            .slot
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "identity store poisoned"))?;
        Ok(slot.clone())
    }

    fn save(&self, id: &SessionId) -> io::Result<()> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "identity store poisoned"))?;
        *slot = Some(id.clone());
        Ok(())
    }
}
