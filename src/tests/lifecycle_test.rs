//! Session lifecycle over HTTP

use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use tokio::time::timeout;

use super::{config_for, sessions_body};
use crate::auth::token::{Principal, Role};
use crate::sessions::model::fixtures::session_json;
use crate::sessions::{ListEvent, SessionList};
use crate::{AdminClient, Error, SessionStatus, WatchEvent};

const WAIT: Duration = Duration::from_secs(5);

async fn logged_in(server_url: &str, dir: &TempDir) -> AdminClient {
    let client = AdminClient::new(&config_for(server_url, dir.path()));
    client
        .store()
        .set_tokens(
            "a1",
            "r1",
            Principal {
                id: "u1".into(),
                display_name: "ana".into(),
                role: Role::Operator,
                entitled: false,
            },
        )
        .await
        .unwrap();
    client
}

#[tokio::test]
async fn test_start_and_watch_until_ended() {
    let mut server = mockito::Server::new_async().await;
    let dir = TempDir::new().unwrap();

    let mut queued = session_json("s1", "queued");
    queued["queuePosition"] = json!(1);
    let start = server
        .mock("POST", "/api/sessions/editor")
        .match_header("authorization", "Bearer a1")
        .match_body(mockito::Matcher::PartialJsonString(
            r#"{"mapName":"de_mirage","collectionId":"col-1"}"#.into(),
        ))
        .with_status(201)
        .with_body(sessions_body(queued))
        .expect(1)
        .create_async()
        .await;

    let mut ready = session_json("s1", "ready");
    ready["host"] = json!("10.0.0.5");
    ready["port"] = json!(27015);
    let mut ended = session_json("s1", "ended");
    ended["terminationReason"] = json!("user_ended");

    server
        .mock("GET", "/api/sessions/s1")
        .with_status(200)
        .with_body(sessions_body(ready))
        .expect(1)
        .create_async()
        .await;
    server
        .mock("GET", "/api/sessions/s1")
        .with_status(200)
        .with_body(sessions_body(ended))
        .create_async()
        .await;

    let client = logged_in(&server.url(), &dir).await;
    let session = client
        .sessions()
        .start_editor_session("de_mirage", "col-1")
        .await
        .unwrap();
    assert_eq!(session.queue_position(), Some(1));
    start.assert_async().await;

    let mut watch = client.sessions().watch_started(session);

    let Ok(Some(WatchEvent::Updated(ready))) = timeout(WAIT, watch.next()).await else {
        panic!("expected the ready observation");
    };
    assert!(ready.connection().is_some());

    let Ok(Some(WatchEvent::Finished(ended))) = timeout(WAIT, watch.next()).await else {
        panic!("expected the terminal observation");
    };
    assert_eq!(ended.status, SessionStatus::Ended);
    assert_eq!(ended.termination_label(), Some("Ended by user"));
    assert!(ended.connection().is_none());

    // Nothing is polled after a terminal state
    assert!(matches!(timeout(WAIT, watch.next()).await, Ok(None)));
}

#[tokio::test]
async fn test_quota_rejection_over_http() {
    let mut server = mockito::Server::new_async().await;
    let dir = TempDir::new().unwrap();

    server
        .mock("POST", "/api/sessions/editor")
        .with_status(403)
        .with_body(r#"{"message":["Daily editor time exhausted"],"statusCode":403}"#)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/api/auth/refresh")
        .expect(0)
        .create_async()
        .await;

    let client = logged_in(&server.url(), &dir).await;
    let err = client
        .sessions()
        .start_editor_session("de_mirage", "col-1")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Domain { status: 403, ref message } if message == "Daily editor time exhausted"));
    refresh.assert_async().await;
    assert!(client.store().is_authenticated().await);
}

#[tokio::test]
async fn test_running_list_confirms_end() {
    let mut server = mockito::Server::new_async().await;
    let dir = TempDir::new().unwrap();

    server
        .mock("GET", "/api/sessions/running")
        .with_status(200)
        .with_body(sessions_body(json!([session_json("s1", "active")])))
        .expect(1)
        .create_async()
        .await;
    server
        .mock("GET", "/api/sessions/running")
        .with_status(200)
        .with_body(sessions_body(json!([])))
        .create_async()
        .await;
    let end = server
        .mock("POST", "/api/sessions/end")
        .match_body(mockito::Matcher::JsonString(r#"{"id":"s1"}"#.into()))
        .with_status(200)
        .with_body(sessions_body(json!({"success": true})))
        .expect(1)
        .create_async()
        .await;

    let client = logged_in(&server.url(), &dir).await;
    let mut watch = client.sessions().watch_running();
    let mut list = SessionList::new();

    let Ok(Some(ListEvent::Snapshot(first))) = timeout(WAIT, watch.next()).await else {
        panic!("expected a first snapshot");
    };
    list.apply_poll(first);
    assert_eq!(list.len(), 1);

    client.sessions().end_session("s1").await.unwrap();
    assert!(list.mark_end_requested("s1"));
    assert!(list.get("s1").unwrap().ending_requested);
    end.assert_async().await;

    let Ok(Some(ListEvent::Snapshot(next))) = timeout(WAIT, watch.next()).await else {
        panic!("expected a second snapshot");
    };
    list.apply_poll(next);
    assert!(list.is_empty());

    client.sessions().stop_watching(watch);
}
