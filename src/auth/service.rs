use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::api::envelope;
use crate::api::http_client::{HttpClient, SimpleHttpResponse};
use crate::api::{bearer_header, endpoint};
use crate::auth::store::TokenStore;
use crate::auth::token::{Credentials, Principal};
use crate::error::{Error, Result};

pub const REFRESH_PATH: &str = "/auth/refresh";
pub const ME_PATH: &str = "/auth/me";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Token pair carried back by the OAuth login callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackTokens {
    pub access_token: String,
    pub refresh_token: String,
}

/// Raw authentication exchanges against the remote service.
///
/// These calls never go through the request pipeline: a refresh must not
/// itself trigger a refresh.
pub struct AuthService {
    http: Arc<dyn HttpClient>,
    base_url: String,
}

impl AuthService {
    pub fn new(http: Arc<dyn HttpClient>, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Exchange a refresh token for a fresh credential set
    #[instrument(skip_all, level = "debug")]
    pub async fn refresh(&self, refresh_token: &str) -> Result<Credentials> {
        let url = endpoint(&self.base_url, REFRESH_PATH);
        let body = serde_json::to_string(&RefreshRequest { refresh_token })?;

        let response = self.http.post(&url, HashMap::new(), body).await.map_err(|e| {
            error!(error = %e, "Refresh exchange could not be sent");
            e
        })?;

        if response.is_success() {
            let credentials: Credentials = envelope::auth(&response)?;
            debug!(principal = %credentials.principal.id, "Refresh exchange succeeded");
            return Ok(credentials);
        }

        warn!(status = response.status(), "Refresh exchange rejected");
        Err(rejection(&response, "Refresh token rejected"))
    }

    /// Fetch the principal the given access token belongs to
    #[instrument(skip_all, level = "debug")]
    pub async fn me(&self, access_token: &str) -> Result<Principal> {
        let url = endpoint(&self.base_url, ME_PATH);
        let response = self.http.get(&url, bearer_header(access_token)).await?;

        if response.is_success() {
            return envelope::auth(&response);
        }
        Err(rejection(&response, "Access token rejected"))
    }

    /// Complete an OAuth login: read the token pair from the callback URL,
    /// look up the principal and commit the whole set at once.
    #[instrument(skip_all)]
    pub async fn complete_login(&self, store: &TokenStore, callback_url: &str) -> Result<Principal> {
        let tokens = parse_callback(callback_url)?;
        let principal = self.me(&tokens.access_token).await?;

        store
            .set_tokens(tokens.access_token, tokens.refresh_token, principal.clone())
            .await?;
        info!(principal = %principal.id, role = ?principal.role, "Login completed");
        Ok(principal)
    }
}

/// Map a non-success auth response onto the error taxonomy
fn rejection(response: &SimpleHttpResponse, fallback: &str) -> Error {
    let message = envelope::error_message(response.body()).unwrap_or_else(|| fallback.to_string());
    if response.status() >= 500 {
        Error::server(response.status(), message)
    } else {
        Error::auth(message)
    }
}

/// Read `accessToken` and `refreshToken` from an OAuth callback URL.
///
/// Both query parameters and a fragment (`#accessToken=...`) are accepted.
pub fn parse_callback(callback_url: &str) -> Result<CallbackTokens> {
    let url = Url::parse(callback_url)
        .map_err(|e| Error::validation("callback", format!("not a valid URL: {}", e)))?;

    let mut pairs: HashMap<String, String> = url.query_pairs().into_owned().collect();
    if let Some(fragment) = url.fragment() {
        for (key, value) in url::form_urlencoded::parse(fragment.as_bytes()).into_owned() {
            pairs.entry(key).or_insert(value);
        }
    }

    if let Some(error) = pairs.get("error") {
        return Err(Error::auth(format!("Login was refused: {}", error)));
    }

    let take = |key: &str| {
        pairs
            .get(key)
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or_else(|| Error::validation("callback", format!("missing '{}'", key)))
    };

    Ok(CallbackTokens {
        access_token: take("accessToken")?,
        refresh_token: take("refreshToken")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::http_client::mock::MockHttpClient;
    use crate::api::http_client::HttpMethod;
    use crate::auth::token::Role;
    use serde_json::json;

    const BASE: &str = "https://admin.example.com/api";

    #[test]
    fn test_parse_callback() {
        let tokens =
            parse_callback("http://localhost:5173/auth/callback?accessToken=a1&refreshToken=r1")
                .unwrap();
        assert_eq!(tokens.access_token, "a1");
        assert_eq!(tokens.refresh_token, "r1");

        let tokens =
            parse_callback("http://localhost:5173/auth/callback#accessToken=a2&refreshToken=r2")
                .unwrap();
        assert_eq!(tokens.access_token, "a2");

        assert!(matches!(
            parse_callback("http://localhost:5173/auth/callback?accessToken=a1"),
            Err(Error::Validation { .. })
        ));
        assert!(matches!(
            parse_callback("http://localhost:5173/auth/callback?error=access_denied"),
            Err(Error::Auth { .. })
        ));
        assert!(parse_callback("not a url").is_err());
    }

    #[tokio::test]
    async fn test_refresh_rejection_is_auth_error() {
        let http = MockHttpClient::new();
        http.mock_json(
            HttpMethod::POST,
            format!("{BASE}/auth/refresh"),
            401,
            &json!({"message": "Invalid refresh token", "statusCode": 401}),
        );
        let service = AuthService::new(Arc::new(http.clone()), BASE);

        let err = service.refresh("stale").await.unwrap_err();
        assert!(matches!(err, Error::Auth { ref reason } if reason == "Invalid refresh token"));

        let request = &http.get_requests()[0];
        assert!(request.bearer().is_none());
        assert_eq!(
            request.body.as_deref(),
            Some(r#"{"refreshToken":"stale"}"#)
        );
    }

    #[tokio::test]
    async fn test_complete_login_commits_full_set() {
        let http = MockHttpClient::new();
        http.mock_json(
            HttpMethod::GET,
            format!("{BASE}/auth/me"),
            200,
            &json!({"data": {"id": "u1", "username": "ana", "role": "admin"}}),
        );
        let service = AuthService::new(Arc::new(http.clone()), BASE);
        let store = TokenStore::in_memory();

        let principal = service
            .complete_login(&store, "http://localhost/cb?accessToken=a1&refreshToken=r1")
            .await
            .unwrap();

        assert_eq!(principal.role, Role::Administrator);
        let creds = store.credentials().await.unwrap();
        assert_eq!(creds.access_token, "a1");
        assert_eq!(creds.refresh_token, "r1");
        assert_eq!(http.get_requests()[0].bearer(), Some("a1"));
    }
}
