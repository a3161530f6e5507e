use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::auth::token::Credentials;
use crate::error::{Error, Result};

/// What actually lands on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CredentialPayload {
    credentials: Credentials,
    /// When this credential set was written
    stored_at: DateTime<Utc>,
}

/// File-backed persistence for the single credential set
#[derive(Debug, Clone)]
pub struct CredentialFile {
    path: PathBuf,
}

impl CredentialFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the credential set, replacing whatever was there
    pub async fn store(&self, credentials: &Credentials) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::storage(format!("Failed to create credential directory: {}", e)))?;
        }

        let payload = CredentialPayload {
            credentials: credentials.clone(),
            stored_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&payload)
            .map_err(|e| Error::storage(format!("Failed to serialize credentials: {}", e)))?;

        // Write then rename so a crash never leaves half a credential set
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)
            .await
            .map_err(|e| Error::storage(format!("Failed to write credential file: {}", e)))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| Error::storage(format!("Failed to replace credential file: {}", e)))?;

        debug!(path = %self.path.display(), "Credentials persisted");
        Ok(())
    }

    /// Load the credential set, `None` if nothing usable is stored
    pub async fn load(&self) -> Result<Option<Credentials>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No credential file found");
            return Ok(None);
        }

        let json = fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::storage(format!("Failed to read credential file: {}", e)))?;

        match serde_json::from_str::<CredentialPayload>(&json) {
            Ok(payload) => {
                debug!(stored_at = %payload.stored_at, "Credentials loaded from disk");
                Ok(Some(payload.credentials))
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Ignoring unreadable credential file"
                );
                Ok(None)
            }
        }
    }

    /// Remove the credential file if it exists
    pub async fn clear(&self) -> Result<()> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No credential file to remove");
            return Ok(());
        }

        fs::remove_file(&self.path)
            .await
            .map_err(|e| Error::storage(format!("Failed to remove credential file: {}", e)))?;
        info!(path = %self.path.display(), "Credential file removed");
        Ok(())
    }
}
