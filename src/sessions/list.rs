use std::collections::HashSet;

use tracing::debug;

use crate::sessions::model::Session;

/// One row of the running-sessions table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRow {
    pub session: Session,
    /// An end request was sent and the server has not confirmed it yet
    pub ending_requested: bool,
}

/// Running sessions as last reported by the server.
///
/// Rows are replaced wholesale on each poll. Ending a session only marks
/// the row; it leaves the list once a poll stops reporting it or reports it
/// in a terminal state.
#[derive(Debug, Clone, Default)]
pub struct SessionList {
    rows: Vec<SessionRow>,
    pending_end: HashSet<String>,
}

impl SessionList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the rows with a fresh poll result
    pub fn apply_poll(&mut self, sessions: Vec<Session>) {
        let live: Vec<Session> = sessions.into_iter().filter(|s| !s.is_terminal()).collect();

        self.pending_end.retain(|id| {
            let still_listed = live.iter().any(|s| &s.id == id);
            if !still_listed {
                debug!(session_id = %id, "End confirmed");
            }
            still_listed
        });

        self.rows = live
            .into_iter()
            .map(|session| SessionRow {
                ending_requested: self.pending_end.contains(&session.id),
                session,
            })
            .collect();
    }

    /// Flag a row whose end request was accepted. Returns `false` when the
    /// session is not listed.
    pub fn mark_end_requested(&mut self, id: &str) -> bool {
        let Some(row) = self.rows.iter_mut().find(|row| row.session.id == id) else {
            return false;
        };
        row.ending_requested = true;
        self.pending_end.insert(id.to_string());
        true
    }

    pub fn rows(&self) -> &[SessionRow] {
        &self.rows
    }

    pub fn get(&self, id: &str) -> Option<&SessionRow> {
        self.rows.iter().find(|row| row.session.id == id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
