//! Cookie sources for the shopper's logged-in session

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::traits::{CredentialProvider, SessionCookie};

/// Injects nothing; sessions rely on the browser profile alone
pub struct NoCredentials;

impl CredentialProvider for NoCredentials {
    fn cookies(&self) -> Vec<SessionCookie> {
        Vec::new()
    }
}

/// Cookies read once from a JSON array of `{"name": .., "value": ..}`
pub struct CookieFile {
    path: PathBuf,
    cookies: Vec<SessionCookie>,
}

impl CookieFile {
    /// # Errors
    ///
    /// Fails if the file cannot be read or is not a cookie array.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read cookie file {}", path.display()))?;
        let cookies: Vec<SessionCookie> = serde_json::from_str(&raw)
            .with_context(|| format!("malformed cookie file {}", path.display()))?;

        if cookies.is_empty() {
            warn!("Cookie file {} is empty", path.display());
        } else {
            info!("Loaded {} cookies from {}", cookies.len(), path.display());
        }

        Ok(Self {
            path: path.to_path_buf(),
            cookies,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialProvider for CookieFile {
    fn cookies(&self) -> Vec<SessionCookie> {
        self.cookies.clone()
    }
}
