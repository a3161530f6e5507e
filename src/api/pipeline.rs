use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, debug_span, error, info, instrument, warn, Instrument};
use url::Url;

use crate::api::envelope;
use crate::api::http_client::{HttpClient, HttpMethod, SimpleHttpResponse};
use crate::api::{bearer_header, endpoint};
use crate::auth::service::AuthService;
use crate::auth::store::TokenStore;
use crate::auth::token::{Credentials, LogoutReason};
use crate::error::{Error, Result};

/// Description of one outbound call
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    method: HttpMethod,
    path: String,
    segments: Vec<String>,
    query: Vec<(String, String)>,
    body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::GET,
            path: path.into(),
            segments: Vec::new(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post<B: Serialize>(path: impl Into<String>, body: &B) -> Result<Self> {
        Ok(Self {
            method: HttpMethod::POST,
            path: path.into(),
            segments: Vec::new(),
            query: Vec::new(),
            body: Some(serde_json::to_value(body)?),
        })
    }

    /// Append one path segment; `/`, `?` and `#` inside it are escaped
    pub fn segment(mut self, segment: impl Into<String>) -> Self {
        self.segments.push(segment.into());
        self
    }

    /// Append a query parameter
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn url(&self, base_url: &str) -> Result<String> {
        let joined = endpoint(base_url, &self.path);
        if self.query.is_empty() && self.segments.is_empty() {
            return Ok(joined);
        }
        let mut url = Url::parse(&joined)
            .map_err(|e| Error::validation("url", format!("'{}' is not a valid URL: {}", joined, e)))?;
        if !self.segments.is_empty() {
            url.path_segments_mut()
                .map_err(|_| Error::validation("url", format!("'{}' cannot take path segments", joined)))?
                .extend(self.segments.iter());
        }
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(self.query.iter());
        }
        Ok(url.to_string())
    }
}

/// Whether a call has already been re-issued after a refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// First dispatch; a 401 may trigger one refresh
    First,
    /// Already re-issued; a 401 propagates unchanged
    Retried,
}

/// Wraps every outbound call: attaches the bearer token and runs the
/// refresh-once protocol on authorization failure.
pub struct RequestPipeline {
    http: Arc<dyn HttpClient>,
    base_url: String,
    store: TokenStore,
    auth: AuthService,
    /// Serializes refresh exchanges across concurrent failures
    refresh_lock: Mutex<()>,
}

impl RequestPipeline {
    pub fn new(http: Arc<dyn HttpClient>, base_url: impl Into<String>, store: TokenStore) -> Self {
        let base_url = base_url.into();
        Self {
            auth: AuthService::new(Arc::clone(&http), base_url.clone()),
            http,
            base_url,
            store,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue a call that has not been retried yet
    pub async fn send(&self, request: &ApiRequest) -> Result<SimpleHttpResponse> {
        self.send_with(request, Attempt::First).await
    }

    /// Issue a call carrying an explicit retry marker. Only a
    /// [`Attempt::First`] call may refresh; the re-issue goes back through
    /// here as [`Attempt::Retried`].
    pub fn send_with<'a>(
        &'a self,
        request: &'a ApiRequest,
        attempt: Attempt,
    ) -> BoxFuture<'a, Result<SimpleHttpResponse>> {
        let span = debug_span!("send", method = %request.method, path = %request.path, ?attempt);
        async move {
            let (response, token_used) = self.dispatch(request).await?;
            if !response.is_unauthorized() {
                return finish(response);
            }

            let message = unauthorized_message(&response);
            if attempt == Attempt::Retried {
                warn!("Authorization failed on a retried call, giving up");
                return Err(Error::auth(message));
            }

            debug!("Authorization failed, attempting token refresh");
            if let Err(e) = self.recover(token_used.as_deref()).await {
                warn!(error = %e, "Token refresh failed, session ended");
                return Err(Error::auth(message));
            }

            debug!("Re-issuing call with refreshed token");
            self.send_with(request, Attempt::Retried).await
        }
        .instrument(span)
        .boxed()
    }

    /// Re-validate the stored refresh token, rotating the credential set.
    ///
    /// A rejected exchange logs out; transport failures and server faults
    /// leave the stored credentials untouched.
    #[instrument(skip(self))]
    pub async fn revalidate(&self) -> Result<Credentials> {
        let _guard = self.refresh_lock.lock().await;

        let Some(refresh_token) = self.store.refresh_token().await else {
            return Err(Error::auth("No refresh token available"));
        };

        match self.auth.refresh(&refresh_token).await {
            Ok(credentials) => {
                // The old pair is spent; keeping it would only fail later
                if let Err(e) = self.commit(&credentials).await {
                    self.force_logout().await;
                    return Err(e);
                }
                Ok(credentials)
            }
            Err(e) if e.is_auth() => {
                self.force_logout().await;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Send one request with whatever access token is current
    async fn dispatch(&self, request: &ApiRequest) -> Result<(SimpleHttpResponse, Option<String>)> {
        let url = request.url(&self.base_url)?;
        let token = self.store.access_token().await;
        let headers = match &token {
            Some(token) => bearer_header(token),
            None => HashMap::new(),
        };

        let response = match request.method {
            HttpMethod::GET => self.http.get(&url, headers).await?,
            HttpMethod::POST => {
                let body = request
                    .body
                    .as_ref()
                    .map(Value::to_string)
                    .unwrap_or_else(|| "{}".to_string());
                self.http.post(&url, headers, body).await?
            }
        };

        debug!(status = response.status(), "Response received");
        Ok((response, token))
    }

    /// Obtain a fresh credential set after `rejected_token` was refused.
    ///
    /// If another call already rotated the tokens while this one waited for
    /// the lock, the new access token is reused instead of spending the
    /// refresh token again. Any failure, including a failed save, forces a
    /// logout.
    async fn recover(&self, rejected_token: Option<&str>) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;

        let current = self.store.credentials().await;
        let refresh_token = match current {
            Some(creds) if Some(creds.access_token.as_str()) != rejected_token => {
                debug!("Credentials already rotated by a concurrent call");
                return Ok(());
            }
            Some(creds) => creds.refresh_token,
            None => {
                self.force_logout().await;
                return Err(Error::auth("No refresh token available"));
            }
        };

        let refreshed = match self.auth.refresh(&refresh_token).await {
            Ok(credentials) => self.commit(&credentials).await,
            Err(e) => Err(e),
        };
        if let Err(e) = refreshed {
            self.force_logout().await;
            return Err(e);
        }
        Ok(())
    }

    /// Drop the credential set after a failed refresh. The in-memory set is
    /// gone even when the file cannot be removed.
    async fn force_logout(&self) {
        if let Err(e) = self.store.logout(LogoutReason::RefreshFailed).await {
            error!(error = %e, "Failed to clear stored credentials");
        }
    }

    async fn commit(&self, credentials: &Credentials) -> Result<()> {
        self.store
            .set_tokens(
                credentials.access_token.clone(),
                credentials.refresh_token.clone(),
                credentials.principal.clone(),
            )
            .await?;
        info!(principal = %credentials.principal.id, "Credentials refreshed");
        Ok(())
    }
}

fn unauthorized_message(response: &SimpleHttpResponse) -> String {
    envelope::error_message(response.body()).unwrap_or_else(|| "Unauthorized".to_string())
}

/// Map a non-401 response onto the error taxonomy
fn finish(response: SimpleHttpResponse) -> Result<SimpleHttpResponse> {
    if response.is_success() {
        return Ok(response);
    }

    let status = response.status();
    let message = envelope::error_message(response.body());
    if status >= 500 {
        Err(Error::server(
            status,
            message.unwrap_or_else(|| format!("Server error ({})", status)),
        ))
    } else {
        Err(Error::domain(
            status,
            message.unwrap_or_else(|| format!("Request rejected ({})", status)),
        ))
    }
}
