use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role granted to a principal by the remote service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "worker", alias = "operator")]
    Operator,
    #[serde(rename = "admin", alias = "administrator")]
    Administrator,
    /// Any role this client does not know about
    #[serde(other)]
    Unknown,
}

impl Role {
    /// Whether this role may use the admin console
    pub fn is_privileged(&self) -> bool {
        matches!(self, Role::Operator | Role::Administrator)
    }
}

/// Authenticated identity returned by the remote service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: String,
    #[serde(alias = "username", alias = "name")]
    pub display_name: String,
    pub role: Role,
    /// Paid entitlement flag
    #[serde(default, alias = "isPremium")]
    pub entitled: bool,
}

/// The full credential set. Tokens and principal only ever change together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// Short-lived bearer token
    pub access_token: String,
    /// Longer-lived token exchanged for a new pair
    pub refresh_token: String,
    /// Identity the tokens belong to
    #[serde(alias = "user")]
    pub principal: Principal,
}

impl Credentials {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        principal: Principal,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            principal,
        }
    }
}

/// Why a credential set was discarded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogoutReason {
    /// The user asked to log out
    UserRequested,
    /// The refresh exchange was rejected or impossible
    RefreshFailed,
    /// The principal is not allowed to use the console
    Unauthorized,
}

/// Events published whenever the credential set changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// A fresh login stored a new credential set
    LoggedIn {
        principal: Principal,
        at: DateTime<Utc>,
    },
    /// The refresh path rotated the token pair
    Refreshed {
        principal: Principal,
        at: DateTime<Utc>,
    },
    /// Credentials were cleared
    LoggedOut {
        reason: LogoutReason,
        at: DateTime<Utc>,
    },
}
