//! Token handling through the wired-up client

use mockito::Matcher;
use tempfile::TempDir;

use super::{config_for, sessions_body, token_body};
use crate::auth::token::{Principal, Role};
use crate::sessions::model::fixtures::session_json;
use crate::{AdminClient, GateState};
use serde_json::json;

fn admin() -> Principal {
    Principal {
        id: "u1".into(),
        display_name: "ana".into(),
        role: Role::Administrator,
        entitled: true,
    }
}

#[tokio::test]
async fn test_refresh_rotates_and_persists_tokens() {
    let mut server = mockito::Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let config = config_for(&server.url(), dir.path());

    let rejected = server
        .mock("GET", "/api/sessions/running")
        .match_header("authorization", "Bearer a1")
        .with_status(401)
        .with_body(r#"{"message":"Unauthorized","statusCode":401}"#)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/api/auth/refresh")
        .match_body(Matcher::JsonString(r#"{"refreshToken":"r1"}"#.into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_body("a2", "r2", "admin"))
        .expect(1)
        .create_async()
        .await;
    let accepted = server
        .mock("GET", "/api/sessions/running")
        .match_header("authorization", "Bearer a2")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(sessions_body(json!([session_json("s1", "active")])))
        .expect(1)
        .create_async()
        .await;

    let client = AdminClient::new(&config);
    client.store().set_tokens("a1", "r1", admin()).await.unwrap();

    let running = client.sessions().get_running_sessions().await.unwrap();
    assert_eq!(running.len(), 1);

    rejected.assert_async().await;
    refresh.assert_async().await;
    accepted.assert_async().await;

    // A fresh client picks up the rotated pair from disk
    let restarted = AdminClient::new(&config);
    restarted.store().hydrate().await.unwrap();
    assert_eq!(restarted.store().access_token().await.as_deref(), Some("a2"));
    assert_eq!(restarted.store().refresh_token().await.as_deref(), Some("r2"));
}

#[tokio::test]
async fn test_rejected_refresh_clears_credential_file() {
    let mut server = mockito::Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let config = config_for(&server.url(), dir.path());

    let refresh = server
        .mock("POST", "/api/auth/refresh")
        .with_status(401)
        .with_body(r#"{"message":"Invalid refresh token"}"#)
        .expect(1)
        .create_async()
        .await;

    let seeded = AdminClient::new(&config);
    seeded.store().set_tokens("a1", "r1", admin()).await.unwrap();
    let credentials_file = dir.path().join("credentials.json");
    assert!(credentials_file.exists());

    let client = AdminClient::new(&config);
    assert_eq!(client.gate().activate().await, GateState::RedirectToLogin);

    refresh.assert_async().await;
    assert!(!client.store().is_authenticated().await);
    assert!(!credentials_file.exists());
}

#[tokio::test]
async fn test_login_then_gate_opens_for_worker() {
    let mut server = mockito::Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let config = config_for(&server.url(), dir.path());

    let me = server
        .mock("GET", "/api/auth/me")
        .match_header("authorization", "Bearer a1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({"data": {"id": "u1", "username": "ana", "role": "worker"}, "statusCode": 200})
                .to_string(),
        )
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/api/auth/refresh")
        .match_body(Matcher::JsonString(r#"{"refreshToken":"r1"}"#.into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_body("a2", "r2", "worker"))
        .expect(1)
        .create_async()
        .await;

    let client = AdminClient::new(&config);
    let principal = client
        .login("http://localhost:5173/auth/callback?accessToken=a1&refreshToken=r1")
        .await
        .unwrap();
    assert_eq!(principal.role, Role::Operator);

    let state = client.gate().activate().await;
    assert!(matches!(state, GateState::Authorized(ref p) if p.id == "u1"));
    assert!(client.gate().is_open());

    me.assert_async().await;
    refresh.assert_async().await;
    assert_eq!(client.store().access_token().await.as_deref(), Some("a2"));
}

#[tokio::test]
async fn test_logout_is_idempotent() {
    let server = mockito::Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let client = AdminClient::new(&config_for(&server.url(), dir.path()));

    client.store().set_tokens("a1", "r1", admin()).await.unwrap();
    client.logout().await.unwrap();
    client.logout().await.unwrap();

    assert!(!client.store().is_authenticated().await);
    assert!(!dir.path().join("credentials.json").exists());
}
