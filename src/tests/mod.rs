//! End-to-end tests against a local HTTP server
//!
//! These drive the wired-up `AdminClient` through the real reqwest client,
//! with `mockito` standing in for the remote service.

pub mod client_test;
pub mod lifecycle_test;

use std::path::Path;

use serde_json::{json, Value};

use crate::config::{ApiConfig, AuthConfig, Config, SessionConfig};

/// Config pointing at a mock server, persisting credentials under `dir`
pub fn config_for(server_url: &str, dir: &Path) -> Config {
    Config {
        api: ApiConfig {
            base_url: format!("{}/api", server_url),
        },
        auth: AuthConfig {
            persist_credentials: true,
            credentials_path: Some(dir.join("credentials.json")),
        },
        sessions: SessionConfig {
            poll_interval_ms: 10,
            history_page_size: 20,
        },
    }
}

/// Body of a successful refresh exchange
pub fn token_body(access: &str, refresh: &str, role: &str) -> String {
    json!({
        "data": {
            "accessToken": access,
            "refreshToken": refresh,
            "user": {"id": "u1", "username": "ana", "role": role}
        },
        "statusCode": 200,
        "timestamp": "2026-10-19T10:00:00Z"
    })
    .to_string()
}

/// Sessions-group body, wrapped twice
pub fn sessions_body(data: Value) -> String {
    json!({
        "data": {"data": data, "statusCode": 200},
        "statusCode": 200,
        "timestamp": "2026-10-19T10:00:00Z"
    })
    .to_string()
}
