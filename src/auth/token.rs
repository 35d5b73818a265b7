//! Token storage for the cached Barndoor user token

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directory under the user's home that holds SDK state
const STORE_DIR: &str = ".barndoor";
/// Token file name inside [`STORE_DIR`]
const TOKEN_FILE: &str = "token.json";

/// Errors that can occur during token storage operations
#[derive(Debug, Error)]
pub enum TokenError {
    /// The platform reports no home directory for the current user
    #[error("Could not determine the user's home directory")]
    NoHomeDirectory,

    /// I/O error during storage operations
    #[error("Storage I/O error at {path}: {source}")]
    Io {
        /// File or directory involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TokenError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// What [`TokenStorage::save`] writes
#[derive(Debug, Serialize)]
struct StoredToken<'a> {
    token: &'a str,
}

/// What [`TokenStorage::load`] accepts.
///
/// Older tooling wrote `access_token`, and some files carry both. `token`
/// wins when both are present. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct TokenFile {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

impl TokenFile {
    fn into_token(self) -> Option<String> {
        self.token.or(self.access_token)
    }
}

/// Token storage for persisting the user token
///
/// Holds exactly one token. Every save fully rewrites the file.
#[derive(Debug, Clone)]
pub struct TokenStorage {
    storage_path: PathBuf,
}

impl TokenStorage {
    /// Create token storage at the default path (`~/.barndoor/token.json`)
    ///
    /// # Errors
    ///
    /// Returns `TokenError::NoHomeDirectory` if the home directory is unknown.
    pub fn new() -> Result<Self, TokenError> {
        Ok(Self {
            storage_path: default_token_path()?,
        })
    }

    /// Create token storage with custom path
    #[must_use]
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            storage_path: path.into(),
        }
    }

    /// Get the storage path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.storage_path
    }

    /// Load the cached token.
    ///
    /// Returns `None` when the file is missing, unreadable, not JSON, or has no
    /// token field. The token itself is not inspected.
    #[must_use]
    pub fn load(&self) -> Option<String> {
        let content = match std::fs::read_to_string(&self.storage_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.storage_path.display(), "No cached token");
                return None;
            }
            Err(e) => {
                tracing::warn!(path = %self.storage_path.display(), "Could not read token file: {e}");
                return None;
            }
        };

        match serde_json::from_str::<TokenFile>(&content) {
            Ok(file) => file.into_token(),
            Err(e) => {
                tracing::warn!(path = %self.storage_path.display(), "Ignoring unparseable token file: {e}");
                None
            }
        }
    }

    /// Save token to storage, replacing any previous one
    ///
    /// The file is written next to its final location and renamed into place,
    /// so readers never see a half-written token. On Unix the file is `0600`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save(&self, token: &str) -> Result<(), TokenError> {
        if let Some(parent) = self.storage_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TokenError::io(parent, e))?;
        }

        let content = serde_json::to_string(&StoredToken { token })?;

        let tmp_path = self.storage_path.with_extension("json.tmp");
        let written = write_private(&tmp_path, content.as_bytes())
            .map_err(|e| TokenError::io(&tmp_path, e))
            .and_then(|()| {
                std::fs::rename(&tmp_path, &self.storage_path)
                    .map_err(|e| TokenError::io(&self.storage_path, e))
            });
        if let Err(e) = written {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e);
        }

        tracing::debug!(path = %self.storage_path.display(), "Saved user token");
        Ok(())
    }

    /// Delete the stored token. Succeeds when nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be deleted.
    pub fn clear(&self) -> Result<(), TokenError> {
        match std::fs::remove_file(&self.storage_path) {
            Ok(()) => {
                tracing::debug!(path = %self.storage_path.display(), "Cleared cached token");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TokenError::io(&self.storage_path, e)),
        }
    }

    /// Check whether a token is cached (without validating it)
    #[must_use]
    pub fn has_token(&self) -> bool {
        self.load().is_some()
    }
}

/// Create `path` readable only by the owner and write `content` to it.
///
/// The mode is set at creation so the token is never world-readable, even
/// briefly. A stale file left by an earlier crash is truncated.
fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    std::os::unix::fs::OpenOptionsExt::mode(&mut options, 0o600);

    let mut file = options.open(path)?;
    #[cfg(unix)]
    {
        // A pre-existing file keeps its old mode
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(content)?;
    file.sync_all()
}

/// Default token path: `<home>/.barndoor/token.json`
///
/// # Errors
///
/// Returns `TokenError::NoHomeDirectory` if the home directory is unknown.
pub fn default_token_path() -> Result<PathBuf, TokenError> {
    dirs::home_dir()
        .map(|home| home.join(STORE_DIR).join(TOKEN_FILE))
        .ok_or(TokenError::NoHomeDirectory)
}

/// Save a token to the default location
///
/// # Errors
///
/// Returns an error if the home directory is unknown or the write fails.
pub fn save_user_token(token: &str) -> Result<(), TokenError> {
    TokenStorage::new()?.save(token)
}

/// Load the token from the default location, if any
#[must_use]
pub fn load_user_token() -> Option<String> {
    TokenStorage::new().ok()?.load()
}

/// Remove the token from the default location
///
/// # Errors
///
/// Returns an error if the home directory is unknown or deletion fails.
pub fn clear_cached_token() -> Result<(), TokenError> {
    TokenStorage::new()?.clear()
}
