use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use crate::api::pipeline::RequestPipeline;
use crate::auth::token::{LogoutReason, Principal};

/// Where the gate currently stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    /// Check in progress; show a placeholder
    Loading,
    /// Privileged principal verified; protected content may render
    Authorized(Principal),
    /// No usable credentials; send the user to log in
    RedirectToLogin,
    /// Authenticated, but the role is not allowed here
    Unauthorized,
    /// The check could not complete (network or server fault)
    Failed(String),
}

/// Bootstraps the token store, verifies the principal's role and gates
/// access to protected views.
///
/// Single process only: credential changes made by another process are not
/// observed.
pub struct AuthGate {
    pipeline: Arc<RequestPipeline>,
    state: watch::Sender<GateState>,
}

impl AuthGate {
    pub fn new(pipeline: Arc<RequestPipeline>) -> Self {
        let (state, _) = watch::channel(GateState::Loading);
        Self { pipeline, state }
    }

    /// Current gate state
    pub fn state(&self) -> GateState {
        self.state.borrow().clone()
    }

    /// Whether protected content may render
    pub fn is_open(&self) -> bool {
        matches!(*self.state.borrow(), GateState::Authorized(_))
    }

    /// Follow gate state changes
    pub fn subscribe(&self) -> watch::Receiver<GateState> {
        self.state.subscribe()
    }

    /// Run the startup check
    #[instrument(skip(self))]
    pub async fn activate(&self) -> GateState {
        self.state.send_replace(GateState::Loading);
        let outcome = self.check().await;
        info!(state = ?outcome, "Auth gate settled");
        self.state.send_replace(outcome.clone());
        outcome
    }

    async fn check(&self) -> GateState {
        let store = self.pipeline.store();

        if let Err(e) = store.hydrate().await {
            error!(error = %e, "Could not load stored credentials");
            return GateState::Failed(e.to_string());
        }

        if store.refresh_token().await.is_none() {
            return GateState::RedirectToLogin;
        }

        // The exchange doubles as a liveness check of the stored token
        let credentials = match self.pipeline.revalidate().await {
            Ok(credentials) => credentials,
            Err(e) if e.is_auth() => {
                warn!(error = %e, "Stored session is no longer valid");
                return GateState::RedirectToLogin;
            }
            Err(e) => {
                error!(error = %e, "Session check failed");
                return GateState::Failed(e.to_string());
            }
        };

        let principal = credentials.principal;
        if !principal.role.is_privileged() {
            warn!(principal = %principal.id, role = ?principal.role, "Principal lacks a privileged role");
            if let Err(e) = store.logout(LogoutReason::Unauthorized).await {
                error!(error = %e, "Failed to clear credentials");
            }
            return GateState::Unauthorized;
        }

        GateState::Authorized(principal)
    }

    /// Wait until the check has settled
    pub async fn settled(&self) -> GateState {
        let mut rx = self.state.subscribe();
        let settled = match rx.wait_for(|state| *state != GateState::Loading).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        };
        settled
    }
}
