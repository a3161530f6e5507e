use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session status. Authoritative on the remote side; this client only
/// observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Queued,
    Pending,
    Provisioning,
    Ready,
    Active,
    Ending,
    Recyclable,
    Ended,
    Failed,
}

impl SessionStatus {
    pub const ALL: [SessionStatus; 9] = [
        SessionStatus::Queued,
        SessionStatus::Pending,
        SessionStatus::Provisioning,
        SessionStatus::Ready,
        SessionStatus::Active,
        SessionStatus::Ending,
        SessionStatus::Recyclable,
        SessionStatus::Ended,
        SessionStatus::Failed,
    ];

    /// `ended` and `failed` never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Ended | SessionStatus::Failed)
    }

    /// Direct transitions the orchestrator may perform from this status
    pub fn successors(&self) -> &'static [SessionStatus] {
        use SessionStatus::*;
        match self {
            Queued => &[Pending],
            Pending => &[Provisioning, Failed],
            Provisioning => &[Ready, Failed],
            Ready => &[Active, Recyclable],
            Active => &[Ending, Recyclable],
            Ending => &[Ended],
            Recyclable => &[Ended],
            Ended | Failed => &[],
        }
    }

    /// Whether `next` can be observed after `self`, allowing for
    /// intermediate states that happened between two polls
    pub fn can_reach(&self, next: SessionStatus) -> bool {
        let mut frontier: VecDeque<SessionStatus> = self.successors().iter().copied().collect();
        let mut seen = Vec::new();
        while let Some(status) = frontier.pop_front() {
            if status == next {
                return true;
            }
            if !seen.contains(&status) {
                seen.push(status);
                frontier.extend(status.successors().iter().copied());
            }
        }
        false
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Queued => "queued",
            SessionStatus::Pending => "pending",
            SessionStatus::Provisioning => "provisioning",
            SessionStatus::Ready => "ready",
            SessionStatus::Active => "active",
            SessionStatus::Ending => "ending",
            SessionStatus::Recyclable => "recyclable",
            SessionStatus::Ended => "ended",
            SessionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SessionStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown session status '{}'", s))
    }
}

/// Why a session ended. Display only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    UserEnded,
    Expired,
    Disconnected,
    ConnectionTimeout,
    Recycled,
    AdminEnded,
    Kicked,
    ProvisioningFailed,
    #[serde(other)]
    Unknown,
}

impl TerminationReason {
    pub fn label(&self) -> &'static str {
        match self {
            TerminationReason::UserEnded => "Ended by user",
            TerminationReason::Expired => "Time limit reached",
            TerminationReason::Disconnected => "Player disconnected",
            TerminationReason::ConnectionTimeout => "Player never connected",
            TerminationReason::Recycled => "Server recycled",
            TerminationReason::AdminEnded => "Ended by an administrator",
            TerminationReason::Kicked => "Kicked",
            TerminationReason::ProvisioningFailed => "Server failed to start",
            TerminationReason::Unknown => "Unknown",
        }
    }
}

/// Where to connect once the server is up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDetails {
    pub host: String,
    pub port: u16,
    pub secret: Option<String>,
}

impl ConnectionDetails {
    /// Console command a game client pastes to join
    pub fn connect_command(&self) -> String {
        match &self.secret {
            Some(secret) => format!("connect {}:{}; password {}", self.host, self.port, secret),
            None => format!("connect {}:{}", self.host, self.port),
        }
    }
}

/// A remotely provisioned editor/game server session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    #[serde(alias = "userId")]
    pub owner_id: String,
    #[serde(default, alias = "username")]
    pub owner_name: Option<String>,
    pub map_name: String,
    pub status: SessionStatus,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default, alias = "password")]
    pub secret: Option<String>,
    #[serde(default)]
    pub queue_position: Option<u32>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub queued_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub connection_timeout_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub termination_reason: Option<TerminationReason>,
    #[serde(default, alias = "isEditorMode")]
    pub editor_mode: bool,
    #[serde(default)]
    pub collection_id: Option<String>,
}

impl Session {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Queue position, only meaningful while queued
    pub fn queue_position(&self) -> Option<u32> {
        match self.status {
            SessionStatus::Queued => self.queue_position,
            _ => None,
        }
    }

    /// Connection details, exposed only once the server is ready
    pub fn connection(&self) -> Option<ConnectionDetails> {
        match (self.status, &self.host, self.port) {
            (SessionStatus::Ready | SessionStatus::Active, Some(host), Some(port)) => {
                Some(ConnectionDetails {
                    host: host.clone(),
                    port,
                    secret: self.secret.clone(),
                })
            }
            _ => None,
        }
    }

    /// Display label for why the session ended
    pub fn termination_label(&self) -> Option<&'static str> {
        if !self.is_terminal() {
            return None;
        }
        self.termination_reason.map(|reason| reason.label())
    }

    /// Seconds left before the remote side expires the session
    pub fn seconds_remaining(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }
}

/// A principal who used up their session allowance.
/// Recomputed on every fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExhaustedUser {
    #[serde(alias = "id")]
    pub user_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(alias = "usedSeconds")]
    pub consumed_seconds: u64,
    pub limit_seconds: u64,
}

impl ExhaustedUser {
    pub fn remaining_seconds(&self) -> u64 {
        self.limit_seconds.saturating_sub(self.consumed_seconds)
    }
}

/// History listing filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryFilter {
    /// 1-based page number
    pub page: u32,
    pub limit: u32,
    pub status: Option<SessionStatus>,
    /// Free-text search on the owner
    pub search: Option<String>,
}

impl HistoryFilter {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.max(1),
            status: None,
            search: None,
        }
    }

    pub fn status(mut self, status: SessionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        let search = search.into();
        let trimmed = search.trim();
        self.search = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }
}

impl Default for HistoryFilter {
    fn default() -> Self {
        Self::new(1, 20)
    }
}

/// One page of a paginated listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    #[serde(alias = "data")]
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u64 {
        if self.limit == 0 {
            return 0;
        }
        self.total.div_ceil(self.limit as u64)
    }

    pub fn has_next(&self) -> bool {
        (self.page as u64) < self.total_pages()
    }
}

/// Body of the start call
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartEditorSession<'a> {
    pub map_name: &'a str,
    pub collection_id: &'a str,
}

/// Body of the end call
#[derive(Debug, Clone, Serialize)]
pub struct EndSession<'a> {
    pub id: &'a str,
}

/// Acknowledgement returned by the end call
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Acknowledgement {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use serde_json::{json, Value};

    /// Wire JSON for a session in the given status
    pub fn session_json(id: &str, status: &str) -> Value {
        json!({
            "id": id,
            "userId": "u1",
            "username": "ana",
            "mapName": "de_mirage",
            "status": status,
            "createdAt": "2026-10-19T10:00:00Z",
            "expiresAt": "2026-10-19T11:00:00Z",
            "isEditorMode": true,
            "collectionId": "col-1"
        })
    }

    pub fn session(id: &str, status: SessionStatus) -> Session {
        serde_json::from_value(session_json(id, status.as_str())).unwrap()
    }
}
