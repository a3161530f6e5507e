use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

use crate::auth::storage::CredentialFile;
use crate::auth::token::{AuthEvent, Credentials, LogoutReason, Principal};
use crate::error::Result;

const AUTH_EVENT_CAPACITY: usize = 16;

/// Process-wide holder of the current credential set.
///
/// The only writers are [`TokenStore::set_tokens`] (login and the refresh
/// path) and [`TokenStore::logout`]. Readers always see either the old or
/// the new set in full.
pub struct TokenStore {
    /// Current credential set
    current: Arc<RwLock<Option<Credentials>>>,
    /// Persistence, if enabled
    storage: Option<Arc<CredentialFile>>,
    /// Credential change notifications
    events: broadcast::Sender<AuthEvent>,
}

impl TokenStore {
    /// In-memory store; credentials die with the process
    pub fn in_memory() -> Self {
        info!("Credential persistence disabled, tokens only stored in memory");
        Self::build(None)
    }

    /// Store that persists every change to `storage`
    pub fn with_storage(storage: CredentialFile) -> Self {
        Self::build(Some(Arc::new(storage)))
    }

    fn build(storage: Option<Arc<CredentialFile>>) -> Self {
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Self {
            current: Arc::new(RwLock::new(None)),
            storage,
            events,
        }
    }

    /// Load a previously persisted credential set. No-op if none exists.
    pub async fn hydrate(&self) -> Result<()> {
        let Some(storage) = &self.storage else {
            debug!("Credential persistence disabled, nothing to hydrate");
            return Ok(());
        };

        match storage.load().await? {
            Some(credentials) => {
                info!(principal = %credentials.principal.id, "Hydrated stored credentials");
                *self.current.write().await = Some(credentials);
            }
            None => debug!("No stored credentials"),
        }
        Ok(())
    }

    /// Atomically replace the credential set and persist it
    pub async fn set_tokens(
        &self,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        principal: Principal,
    ) -> Result<()> {
        let credentials = Credentials::new(access_token, refresh_token, principal);
        let principal = credentials.principal.clone();

        // Memory only changes once the save succeeded
        let mut guard = self.current.write().await;
        if let Some(storage) = &self.storage {
            storage.store(&credentials).await?;
        }
        let previous = guard.replace(credentials);
        drop(guard);

        let at = Utc::now();
        let event = match previous {
            Some(prev) if prev.principal.id == principal.id => AuthEvent::Refreshed { principal, at },
            _ => AuthEvent::LoggedIn { principal, at },
        };
        let _ = self.events.send(event);
        Ok(())
    }

    /// Clear in-memory and persisted state. Idempotent.
    pub async fn logout(&self, reason: LogoutReason) -> Result<()> {
        let had_credentials = self.current.write().await.take().is_some();

        if let Some(storage) = &self.storage {
            storage.clear().await?;
        }

        if had_credentials {
            info!(reason = ?reason, "Logged out");
            let _ = self.events.send(AuthEvent::LoggedOut {
                reason,
                at: Utc::now(),
            });
        } else {
            debug!("Logout requested with no credentials present");
        }
        Ok(())
    }

    /// Snapshot of the full credential set
    pub async fn credentials(&self) -> Option<Credentials> {
        self.current.read().await.clone()
    }

    pub async fn access_token(&self) -> Option<String> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|c| c.access_token.clone())
    }

    pub async fn refresh_token(&self) -> Option<String> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|c| c.refresh_token.clone())
    }

    pub async fn principal(&self) -> Option<Principal> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|c| c.principal.clone())
    }

    pub async fn is_authenticated(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// Receive credential change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

// All state lives behind Arc, clones share the same credential set
impl Clone for TokenStore {
    fn clone(&self) -> Self {
        Self {
            current: Arc::clone(&self.current),
            storage: self.storage.clone(),
            events: self.events.clone(),
        }
    }
}
