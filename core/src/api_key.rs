use crate::error::ApiKeyStoreError;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const FILE_NAME: &str = "api_key.json";

/// Locally persisted API key, the first source consulted at session start.
#[derive(Clone, Debug)]
pub struct ApiKeyStore {
    path: PathBuf,
}

#[derive(Serialize, Deserialize)]
struct StoredKey {
    api_key: String,
}

impl ApiKeyStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            path: root.as_ref().join(FILE_NAME),
        }
    }

    /// Store under the user's config directory, or `.threadline/` when no home
    /// directory can be determined.
    pub fn default_location() -> Self {
        let root = BaseDirs::new()
            .map(|base| base.config_dir().join("threadline"))
            .unwrap_or_else(|| PathBuf::from(".threadline"));
        Self::new(root)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored key. A missing file or blank key is `Ok(None)`.
    pub fn load(&self) -> Result<Option<String>, ApiKeyStoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(self.io_error(source)),
        };
        let stored: StoredKey =
            serde_json::from_str(&contents).map_err(|source| ApiKeyStoreError::Corrupt {
                path: self.path.display().to_string(),
                source,
            })?;
        let key = stored.api_key.trim();
        Ok((!key.is_empty()).then(|| key.to_string()))
    }

    /// Like [`load`](Self::load) but logs and swallows failures; used during
    /// session assembly where a broken store must not block startup.
    pub fn load_or_warn(&self) -> Option<String> {
        match self.load() {
            Ok(key) => key,
            Err(err) => {
                tracing::warn!(%err, "ignoring unreadable api key store");
                None
            }
        }
    }

    pub fn save(&self, api_key: &str) -> Result<(), ApiKeyStoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }
        let serialized = serde_json::to_vec_pretty(&StoredKey {
            api_key: api_key.to_string(),
        })
        .map_err(|source| ApiKeyStoreError::Corrupt {
            path: self.path.display().to_string(),
            source,
        })?;
        fs::write(&self.path, serialized).map_err(|source| self.io_error(source))
    }

    pub fn clear(&self) -> Result<(), ApiKeyStoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(self.io_error(source)),
        }
    }

    fn io_error(&self, source: std::io::Error) -> ApiKeyStoreError {
        ApiKeyStoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}
