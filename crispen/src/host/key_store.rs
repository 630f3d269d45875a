//! API credential storage
//!
//! A single short secret kept in `key.txt` inside the work folder, surviving
//! restarts. When no key has been saved the configured environment variable
//! is consulted instead.

use std::fs;
use std::path::PathBuf;

use eyre::{Context, Result};
use tracing::debug;

/// Persistent store for the API credential
pub trait KeyStore: Send + Sync {
    /// The saved key, or `None` when nothing (non-empty) is stored
    fn get(&self) -> Result<Option<String>>;

    /// Save a key, trimming surrounding whitespace
    fn set(&self, key: &str) -> Result<()>;
}

/// File-backed key store with an environment variable fallback
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    path: PathBuf,
    env_var: Option<String>,
}

impl FileKeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            env_var: None,
        }
    }

    /// Fall back to this environment variable when the file holds no key
    pub fn with_env_fallback(mut self, env_var: impl Into<String>) -> Self {
        self.env_var = Some(env_var.into());
        self
    }

    fn read_file(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => {
                let key = content.trim();
                Ok(if key.is_empty() { None } else { Some(key.to_string()) })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).context(format!("Failed to read {}", self.path.display())),
        }
    }
}

impl KeyStore for FileKeyStore {
    fn get(&self) -> Result<Option<String>> {
        debug!(path = ?self.path, "FileKeyStore::get: called");
        if let Some(key) = self.read_file()? {
            debug!("FileKeyStore::get: found key in file");
            return Ok(Some(key));
        }

        if let Some(var) = &self.env_var
            && let Ok(value) = std::env::var(var)
            && !value.trim().is_empty()
        {
            debug!(%var, "FileKeyStore::get: using environment fallback");
            return Ok(Some(value.trim().to_string()));
        }

        debug!("FileKeyStore::get: no key");
        Ok(None)
    }

    fn set(&self, key: &str) -> Result<()> {
        debug!(path = ?self.path, "FileKeyStore::set: called");
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("Failed to create key directory")?;
        }
        fs::write(&self.path, key.trim()).context(format!("Failed to write {}", self.path.display()))
    }
}

/// Mask a key for display, keeping a short prefix and suffix
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}
