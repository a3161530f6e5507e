use std::sync::Arc;

use tracing::{debug, info};

// Export modules
pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod sessions;

pub use api::{ApiRequest, Attempt, HttpClient, ReqwestHttpClient, RequestPipeline};
pub use auth::{AuthEvent, AuthGate, Credentials, GateState, LogoutReason, Principal, Role, TokenStore};
pub use config::{Config, ConfigManager};
pub use error::{Error, ErrorCategory, ErrorCode, Result};
pub use sessions::{
    HistoryFilter, Session, SessionController, SessionList, SessionStatus, SessionWatch, WatchEvent,
};

use auth::CredentialFile;

/// Crate version, reported by the CLI
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The wired-up client: one token store shared by one request pipeline, the
/// auth gate and the session controller
pub struct AdminClient {
    pipeline: Arc<RequestPipeline>,
    gate: AuthGate,
    sessions: SessionController,
}

impl AdminClient {
    /// Build a client talking to the configured service over reqwest
    pub fn new(config: &Config) -> Self {
        Self::with_http(config, Arc::new(ReqwestHttpClient::new()))
    }

    /// Build a client over an arbitrary HTTP implementation
    pub fn with_http(config: &Config, http: Arc<dyn HttpClient>) -> Self {
        let store = match (&config.auth.credentials_path, config.auth.persist_credentials) {
            (Some(path), true) => {
                debug!(path = %path.display(), "Persisting credentials");
                TokenStore::with_storage(CredentialFile::new(path))
            }
            _ => {
                debug!("Keeping credentials in memory only");
                TokenStore::in_memory()
            }
        };

        let pipeline = Arc::new(RequestPipeline::new(http, config.api.base_url.clone(), store));
        let gate = AuthGate::new(Arc::clone(&pipeline));
        let sessions = SessionController::new(Arc::clone(&pipeline), config.sessions.poll_interval());

        info!(base_url = %config.api.base_url, "Admin client ready");
        Self {
            pipeline,
            gate,
            sessions,
        }
    }

    pub fn store(&self) -> &TokenStore {
        self.pipeline.store()
    }

    pub fn pipeline(&self) -> &Arc<RequestPipeline> {
        &self.pipeline
    }

    pub fn gate(&self) -> &AuthGate {
        &self.gate
    }

    pub fn sessions(&self) -> &SessionController {
        &self.sessions
    }

    /// Finish an OAuth login from the callback URL the browser landed on
    pub async fn login(&self, callback_url: &str) -> Result<Principal> {
        self.pipeline
            .auth()
            .complete_login(self.store(), callback_url)
            .await
    }

    /// Explicit logout
    pub async fn logout(&self) -> Result<()> {
        self.store().logout(LogoutReason::UserRequested).await
    }
}

#[cfg(test)]
mod tests;
