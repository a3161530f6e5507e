//! Cancellable polling of remote session state.
//!
//! A watch is one spawned task polling at a fixed cadence. The returned
//! handle owns the task: stopping or dropping it cancels the watch. A poll
//! already in flight is allowed to finish, but its response is discarded.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::sessions::model::{Session, SessionStatus};

const SHUTDOWN_CHANNEL_SIZE: usize = 1;

/// Result of feeding one polled session into a [`SessionTracker`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// First sighting of this session
    First,
    /// Status moved along the state graph
    Transitioned {
        from: SessionStatus,
        to: SessionStatus,
    },
    /// Same status, other fields changed (e.g. queue position)
    Updated,
    /// Nothing changed
    Unchanged,
    /// Status is not reachable from the current one; not applied
    Ignored {
        from: SessionStatus,
        to: SessionStatus,
    },
    /// A terminal state was already observed; not applied
    AfterTerminal,
}

impl Observation {
    /// Whether the observation changed the tracked session
    pub fn applied(&self) -> bool {
        matches!(
            self,
            Observation::First | Observation::Transitioned { .. } | Observation::Updated
        )
    }
}

/// Client-side view of one session's lifecycle.
///
/// Applies only observations that follow the documented state graph and
/// freezes once a terminal state is seen.
#[derive(Debug, Clone, Default)]
pub struct SessionTracker {
    current: Option<Session>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker seeded with a session already known to the caller
    pub fn starting_from(session: Session) -> Self {
        Self {
            current: Some(session),
        }
    }

    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    /// Whether a terminal state has been observed
    pub fn is_finished(&self) -> bool {
        self.current.as_ref().is_some_and(Session::is_terminal)
    }

    pub fn observe(&mut self, session: Session) -> Observation {
        let Some(current) = &self.current else {
            self.current = Some(session);
            return Observation::First;
        };

        if current.is_terminal() {
            return Observation::AfterTerminal;
        }

        if current.id != session.id {
            debug!(previous = %current.id, next = %session.id, "Tracking a different session");
            self.current = Some(session);
            return Observation::First;
        }

        let (from, to) = (current.status, session.status);
        if from == to {
            if *current == session {
                return Observation::Unchanged;
            }
            self.current = Some(session);
            return Observation::Updated;
        }

        if !from.can_reach(to) {
            return Observation::Ignored { from, to };
        }

        self.current = Some(session);
        Observation::Transitioned { from, to }
    }
}

/// Events delivered to the owner of a [`SessionWatch`]
#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// The tracked session changed
    Updated(Session),
    /// A terminal state was observed; the watch has stopped
    Finished(Session),
    /// The server no longer reports the session; the watch has stopped
    Gone,
    /// A poll failed. Authorization failures stop the watch, anything else
    /// is retried at the normal cadence.
    Failed(Error),
}

/// Events delivered to the owner of a [`ListWatch`]
#[derive(Debug, Clone)]
pub enum ListEvent {
    /// Fresh list of sessions
    Snapshot(Vec<Session>),
    /// A poll failed. Authorization failures stop the watch.
    Failed(Error),
}

/// Owning handle of a polling task
#[derive(Debug)]
pub struct PollHandle {
    id: Uuid,
    cancelled: Arc<AtomicBool>,
    shutdown: Option<mpsc::Sender<()>>,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether the polling task has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop polling. Any response still in flight is discarded.
    pub fn cancel(&mut self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            debug!(watch_id = %self.id, "Cancelling poll task");
        }
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.try_send(());
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Spawn a task that calls `fetch` immediately and then every `interval`,
/// handing each result to `on_result` until it breaks or the handle is
/// cancelled.
pub fn spawn_poller<T, F, H>(interval: Duration, fetch: F, mut on_result: H) -> PollHandle
where
    T: Send + 'static,
    F: Fn() -> BoxFuture<'static, Result<T>> + Send + Sync + 'static,
    H: FnMut(Result<T>) -> ControlFlow<()> + Send + 'static,
{
    let id = Uuid::new_v4();
    let cancelled = Arc::new(AtomicBool::new(false));
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(SHUTDOWN_CHANNEL_SIZE);

    let task = tokio::spawn({
        let cancelled = Arc::clone(&cancelled);
        async move {
            debug!(watch_id = %id, interval_ms = interval.as_millis() as u64, "Poll task started");
            // The first tick completes immediately
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {}
                }

                let result = fetch().await;

                if cancelled.load(Ordering::SeqCst) {
                    debug!(watch_id = %id, "Discarding response received after cancellation");
                    break;
                }

                if on_result(result).is_break() {
                    break;
                }
            }
            debug!(watch_id = %id, "Poll task stopped");
        }
    });

    PollHandle {
        id,
        cancelled,
        shutdown: Some(shutdown_tx),
        task,
    }
}

/// Common surface of the watch handles
pub trait Watch {
    fn id(&self) -> Uuid;

    /// Stop polling; a response still in flight is discarded
    fn stop(self);
}

/// Watch over a single session until it reaches a terminal state
#[derive(Debug)]
pub struct SessionWatch {
    handle: PollHandle,
    events: mpsc::UnboundedReceiver<WatchEvent>,
    latest: Arc<Mutex<Option<Session>>>,
}

impl SessionWatch {
    /// Start watching. `fetch` returns `None` when the server no longer
    /// reports the session.
    pub fn spawn<F>(interval: Duration, tracker: SessionTracker, fetch: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<Option<Session>>> + Send + Sync + 'static,
    {
        let (events_tx, events) = mpsc::unbounded_channel();
        let latest = Arc::new(Mutex::new(tracker.current().cloned()));
        let mut tracker = tracker;

        let handle = spawn_poller(interval, fetch, {
            let latest = Arc::clone(&latest);
            move |result: Result<Option<Session>>| {
                let session = match result {
                    Ok(Some(session)) => session,
                    Ok(None) => {
                        info!("Watched session is no longer reported");
                        let _ = events_tx.send(WatchEvent::Gone);
                        return ControlFlow::Break(());
                    }
                    Err(e) => {
                        let fatal = e.is_auth();
                        warn!(error = %e, fatal, "Session poll failed");
                        let _ = events_tx.send(WatchEvent::Failed(e));
                        return if fatal {
                            ControlFlow::Break(())
                        } else {
                            ControlFlow::Continue(())
                        };
                    }
                };

                let session_id = session.id.clone();
                let observation = tracker.observe(session);
                match &observation {
                    Observation::Ignored { from, to } => {
                        warn!(session_id = %session_id, %from, %to, "Ignoring out-of-order status");
                        return ControlFlow::Continue(());
                    }
                    Observation::AfterTerminal => return ControlFlow::Break(()),
                    Observation::Unchanged => return ControlFlow::Continue(()),
                    Observation::Transitioned { from, to } => {
                        info!(session_id = %session_id, %from, %to, "Session status changed");
                    }
                    Observation::First | Observation::Updated => {}
                }

                let Some(current) = tracker.current().cloned() else {
                    return ControlFlow::Continue(());
                };
                if let Ok(mut latest) = latest.lock() {
                    *latest = Some(current.clone());
                }

                if current.is_terminal() {
                    let _ = events_tx.send(WatchEvent::Finished(current));
                    ControlFlow::Break(())
                } else {
                    let _ = events_tx.send(WatchEvent::Updated(current));
                    ControlFlow::Continue(())
                }
            }
        });

        Self {
            handle,
            events,
            latest,
        }
    }

    pub fn id(&self) -> Uuid {
        self.handle.id()
    }

    /// Next event, or `None` once the watch has stopped and all events
    /// were consumed
    pub async fn next(&mut self) -> Option<WatchEvent> {
        self.events.recv().await
    }

    /// Last applied observation
    pub fn latest(&self) -> Option<Session> {
        self.latest.lock().ok().and_then(|latest| latest.clone())
    }

    /// Stop watching
    pub fn stop(mut self) {
        self.handle.cancel();
    }
}

/// Watch over a list of sessions; polls until stopped
#[derive(Debug)]
pub struct ListWatch {
    handle: PollHandle,
    events: mpsc::UnboundedReceiver<ListEvent>,
}

impl ListWatch {
    pub fn spawn<F>(interval: Duration, fetch: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<Vec<Session>>> + Send + Sync + 'static,
    {
        let (events_tx, events) = mpsc::unbounded_channel();

        let handle = spawn_poller(interval, fetch, move |result| match result {
            Ok(sessions) => {
                debug!(count = sessions.len(), "Session list refreshed");
                let _ = events_tx.send(ListEvent::Snapshot(sessions));
                ControlFlow::Continue(())
            }
            Err(e) => {
                let fatal = e.is_auth();
                warn!(error = %e, fatal, "Session list poll failed");
                let _ = events_tx.send(ListEvent::Failed(e));
                if fatal {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            }
        });

        Self { handle, events }
    }

    pub fn id(&self) -> Uuid {
        self.handle.id()
    }

    pub async fn next(&mut self) -> Option<ListEvent> {
        self.events.recv().await
    }

    pub fn stop(mut self) {
        self.handle.cancel();
    }
}

impl Watch for SessionWatch {
    fn id(&self) -> Uuid {
        SessionWatch::id(self)
    }

    fn stop(self) {
        SessionWatch::stop(self)
    }
}

impl Watch for ListWatch {
    fn id(&self) -> Uuid {
        ListWatch::id(self)
    }

    fn stop(self) {
        ListWatch::stop(self)
    }
}
