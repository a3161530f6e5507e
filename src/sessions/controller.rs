use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, info, instrument, warn};

use crate::api::envelope;
use crate::api::pipeline::{ApiRequest, RequestPipeline};
use crate::error::{Error, Result};
use crate::sessions::model::{
    Acknowledgement, EndSession, ExhaustedUser, HistoryFilter, Page, Session, StartEditorSession,
};
use crate::sessions::watch::{ListWatch, SessionTracker, SessionWatch, Watch};

pub const EDITOR_PATH: &str = "/sessions/editor";
pub const ACTIVE_PATH: &str = "/sessions/active";
pub const RUNNING_PATH: &str = "/sessions/running";
pub const HISTORY_PATH: &str = "/sessions/history";
pub const EXHAUSTED_PATH: &str = "/sessions/exhausted-users";
pub const END_PATH: &str = "/sessions/end";
pub const SESSIONS_PATH: &str = "/sessions";

/// Creates, observes, lists and terminates editor sessions.
///
/// Session status belongs to the remote orchestrator. Nothing here changes
/// it locally; every status this client shows came from a poll.
#[derive(Clone)]
pub struct SessionController {
    pipeline: Arc<RequestPipeline>,
    poll_interval: Duration,
}

impl SessionController {
    pub fn new(pipeline: Arc<RequestPipeline>, poll_interval: Duration) -> Self {
        Self {
            pipeline,
            poll_interval,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Ask the orchestrator for a new editor session
    #[instrument(skip(self))]
    pub async fn start_editor_session(&self, map_name: &str, collection_id: &str) -> Result<Session> {
        let map_name = map_name.trim();
        let collection_id = collection_id.trim();
        if map_name.is_empty() {
            return Err(Error::validation("mapName", "A map is required"));
        }
        if collection_id.is_empty() {
            return Err(Error::validation("collectionId", "A collection is required"));
        }

        let request = ApiRequest::post(
            EDITOR_PATH,
            &StartEditorSession {
                map_name,
                collection_id,
            },
        )?;
        let response = self.pipeline.send(&request).await?;
        let session: Session = envelope::sessions(&response)?;

        info!(
            session_id = %session.id,
            status = %session.status,
            queue_position = ?session.queue_position(),
            "Editor session requested"
        );
        Ok(session)
    }

    /// The caller's current session, if any
    #[instrument(skip(self), level = "debug")]
    pub async fn get_active_session(&self) -> Result<Option<Session>> {
        fetch_active(&self.pipeline).await
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn get_session(&self, id: &str) -> Result<Session> {
        fetch_session(&self.pipeline, id).await
    }

    /// Every session currently holding a server
    #[instrument(skip(self), level = "debug")]
    pub async fn get_running_sessions(&self) -> Result<Vec<Session>> {
        fetch_running(&self.pipeline).await
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn get_session_history(&self, filter: &HistoryFilter) -> Result<Page<Session>> {
        let mut request = ApiRequest::get(HISTORY_PATH)
            .query("page", filter.page)
            .query("limit", filter.limit);
        if let Some(status) = filter.status {
            request = request.query("status", status.as_str());
        }
        if let Some(search) = &filter.search {
            request = request.query("search", search);
        }

        let response = self.pipeline.send(&request).await?;
        let page: Page<Session> = envelope::sessions(&response)?;
        debug!(items = page.items.len(), total = page.total, "History page loaded");
        Ok(page)
    }

    /// Principals that used up their allowance. Always fetched fresh.
    #[instrument(skip(self), level = "debug")]
    pub async fn get_exhausted_users(&self) -> Result<Vec<ExhaustedUser>> {
        let response = self.pipeline.send(&ApiRequest::get(EXHAUSTED_PATH)).await?;
        envelope::sessions(&response)
    }

    /// Request termination. The session keeps its status until a later poll
    /// reports the change.
    #[instrument(skip(self))]
    pub async fn end_session(&self, id: &str) -> Result<Acknowledgement> {
        require_id(id)?;
        let request = ApiRequest::post(END_PATH, &EndSession { id })?;
        let response = self.pipeline.send(&request).await?;

        // Some deployments answer with an empty envelope
        let acknowledgement = if response.body().trim().is_empty() {
            Acknowledgement::default()
        } else {
            envelope::sessions::<Option<Acknowledgement>>(&response)?.unwrap_or_default()
        };
        info!(session_id = %id, "End requested");
        Ok(acknowledgement)
    }

    /// Follow the caller's active session until it ends or disappears
    pub fn watch_active(&self) -> SessionWatch {
        let pipeline = Arc::clone(&self.pipeline);
        SessionWatch::spawn(self.poll_interval, SessionTracker::new(), move || {
            let pipeline = Arc::clone(&pipeline);
            async move { fetch_active(&pipeline).await }.boxed()
        })
    }

    /// Follow one session by id
    pub fn watch_session(&self, id: &str) -> SessionWatch {
        self.spawn_session_watch(id.to_string(), SessionTracker::new())
    }

    /// Follow a session this client just started, validating the next
    /// observations against its known status
    pub fn watch_started(&self, session: Session) -> SessionWatch {
        let id = session.id.clone();
        self.spawn_session_watch(id, SessionTracker::starting_from(session))
    }

    /// Poll the running sessions until stopped
    pub fn watch_running(&self) -> ListWatch {
        let pipeline = Arc::clone(&self.pipeline);
        ListWatch::spawn(self.poll_interval, move || {
            let pipeline = Arc::clone(&pipeline);
            async move { fetch_running(&pipeline).await }.boxed()
        })
    }

    pub fn stop_watching<W: Watch>(&self, watch: W) {
        debug!(watch_id = %watch.id(), "Stopping watch");
        watch.stop();
    }

    fn spawn_session_watch(&self, id: String, tracker: SessionTracker) -> SessionWatch {
        let pipeline = Arc::clone(&self.pipeline);
        SessionWatch::spawn(self.poll_interval, tracker, move || {
            let pipeline = Arc::clone(&pipeline);
            let id = id.clone();
            async move {
                match fetch_session(&pipeline, &id).await {
                    Ok(session) => Ok(Some(session)),
                    Err(Error::Domain { status: 404, .. }) => Ok(None),
                    Err(e) => Err(e),
                }
            }
            .boxed()
        })
    }
}

fn require_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(Error::validation("id", "A session id is required"));
    }
    Ok(())
}

async fn fetch_active(pipeline: &RequestPipeline) -> Result<Option<Session>> {
    match pipeline.send(&ApiRequest::get(ACTIVE_PATH)).await {
        Ok(response) => envelope::sessions(&response),
        Err(Error::Domain { status: 404, .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

async fn fetch_session(pipeline: &RequestPipeline, id: &str) -> Result<Session> {
    require_id(id)?;
    let response = pipeline.send(&ApiRequest::get(SESSIONS_PATH).segment(id)).await?;
    envelope::sessions(&response)
}

async fn fetch_running(pipeline: &RequestPipeline) -> Result<Vec<Session>> {
    let response = pipeline.send(&ApiRequest::get(RUNNING_PATH)).await?;
    let sessions: Vec<Session> = envelope::sessions(&response)?;
    if sessions.iter().any(Session::is_terminal) {
        warn!("Running list contains terminal sessions");
    }
    Ok(sessions)
}
