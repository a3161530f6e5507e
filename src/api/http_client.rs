use std::collections::HashMap;
use std::fmt;

use crate::error::Result;

/// HTTP method enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    GET,
    POST,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::GET => write!(f, "GET"),
            HttpMethod::POST => write!(f, "POST"),
        }
    }
}

/// A very simple version that only holds response data
#[derive(Debug, Clone)]
pub struct SimpleHttpResponse {
    /// HTTP status code
    status_code: u16,
    /// Response body
    body: String,
    /// Response headers
    headers: HashMap<String, String>,
}

impl SimpleHttpResponse {
    /// Create a new response
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status_code: status,
            body: body.into(),
            headers: HashMap::new(),
        }
    }

    /// Add a header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Get a header value by (case-insensitive) name
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Get the status code
    pub fn status(&self) -> u16 {
        self.status_code
    }

    /// Get a reference to the response body
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Get the body as text (consumes the response)
    pub fn text(self) -> String {
        self.body
    }

    /// Parse body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Check if successful (2xx status)
    pub fn is_success(&self) -> bool {
        self.status_code >= 200 && self.status_code < 300
    }

    /// Check if the server rejected the caller's credentials
    pub fn is_unauthorized(&self) -> bool {
        self.status_code == 401
    }
}

/// Trait for HTTP client operations, allowing for mocking
#[async_trait::async_trait]
pub trait HttpClient: Send + Sync {
    /// Perform HTTP GET request and return a SimpleHttpResponse
    async fn get(&self, url: &str, headers: HashMap<String, String>) -> Result<SimpleHttpResponse>;

    /// Perform HTTP POST request and return a SimpleHttpResponse
    async fn post(
        &self,
        url: &str,
        headers: HashMap<String, String>,
        body: String,
    ) -> Result<SimpleHttpResponse>;
}

/// Implementation of HttpClient using reqwest
pub struct ReqwestHttpClient {
    /// Internal reqwest client
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Create a new ReqwestHttpClient
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    async fn into_simple(response: reqwest::Response) -> Result<SimpleHttpResponse> {
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;

        let mut result = SimpleHttpResponse::new(status, body);
        if let Some(content_type) = content_type {
            result = result.with_header("content-type", content_type);
        }
        Ok(result)
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &str, headers: HashMap<String, String>) -> Result<SimpleHttpResponse> {
        let mut request = self.client.get(url);

        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = request.send().await?;
        Self::into_simple(response).await
    }

    async fn post(
        &self,
        url: &str,
        headers: HashMap<String, String>,
        body: String,
    ) -> Result<SimpleHttpResponse> {
        let mut request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);

        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = request.send().await?;
        Self::into_simple(response).await
    }
}

/// Mock implementation of HttpClient for testing
#[cfg(test)]
pub mod mock {
    use super::*;
    use crate::error::Error;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// A request the mock has seen
    #[derive(Debug, Clone)]
    pub struct RecordedRequest {
        pub method: HttpMethod,
        pub url: String,
        pub headers: HashMap<String, String>,
        pub body: Option<String>,
    }

    impl RecordedRequest {
        /// Bearer token carried by the request, if any
        pub fn bearer(&self) -> Option<&str> {
            self.headers
                .get("Authorization")
                .and_then(|v| v.strip_prefix("Bearer "))
        }
    }

    #[derive(Debug, Clone)]
    enum MockReply {
        Response(SimpleHttpResponse),
        Failure(String),
    }

    #[derive(Debug, Clone)]
    struct Scripted {
        reply: MockReply,
        delay: Option<Duration>,
    }

    /// A mock HTTP client that returns scripted responses.
    ///
    /// Responses for a `(method, url)` pair are served in order; the last one
    /// keeps being served once the queue is down to a single entry.
    #[derive(Clone, Default)]
    pub struct MockHttpClient {
        responses: Arc<Mutex<HashMap<(HttpMethod, String), VecDeque<Scripted>>>>,
        requests: Arc<Mutex<Vec<RecordedRequest>>>,
    }

    impl MockHttpClient {
        /// Create a new mock client
        pub fn new() -> Self {
            Self::default()
        }

        fn push(&self, method: HttpMethod, url: impl Into<String>, scripted: Scripted) {
            self.responses
                .lock()
                .unwrap()
                .entry((method, url.into()))
                .or_default()
                .push_back(scripted);
        }

        /// Queue a raw response for a URL
        pub fn mock_response(
            &self,
            method: HttpMethod,
            url: impl Into<String>,
            status: u16,
            body: impl Into<String>,
        ) {
            let reply = MockReply::Response(SimpleHttpResponse::new(status, body));
            self.push(method, url, Scripted { reply, delay: None });
        }

        /// Queue a JSON response
        pub fn mock_json<T: serde::Serialize>(
            &self,
            method: HttpMethod,
            url: impl Into<String>,
            status: u16,
            data: &T,
        ) {
            let body = serde_json::to_string(data).unwrap();
            let response = SimpleHttpResponse::new(status, body)
                .with_header("content-type", "application/json");
            self.push(
                method,
                url,
                Scripted {
                    reply: MockReply::Response(response),
                    delay: None,
                },
            );
        }

        /// Queue a JSON response that only arrives after `delay`
        pub fn mock_json_delayed<T: serde::Serialize>(
            &self,
            method: HttpMethod,
            url: impl Into<String>,
            status: u16,
            data: &T,
            delay: Duration,
        ) {
            let body = serde_json::to_string(data).unwrap();
            self.push(
                method,
                url,
                Scripted {
                    reply: MockReply::Response(SimpleHttpResponse::new(status, body)),
                    delay: Some(delay),
                },
            );
        }

        /// Queue a transport failure
        pub fn mock_failure(&self, method: HttpMethod, url: impl Into<String>, message: &str) {
            self.push(
                method,
                url,
                Scripted {
                    reply: MockReply::Failure(message.to_string()),
                    delay: None,
                },
            );
        }

        /// Get the list of recorded requests
        pub fn get_requests(&self) -> Vec<RecordedRequest> {
            self.requests.lock().unwrap().clone()
        }

        /// Recorded requests for one URL
        pub fn requests_to(&self, url: &str) -> Vec<RecordedRequest> {
            self.get_requests()
                .into_iter()
                .filter(|r| r.url == url)
                .collect()
        }

        async fn respond(
            &self,
            method: HttpMethod,
            url: &str,
            headers: HashMap<String, String>,
            body: Option<String>,
        ) -> Result<SimpleHttpResponse> {
            self.requests.lock().unwrap().push(RecordedRequest {
                method,
                url: url.to_string(),
                headers,
                body,
            });

            let scripted = {
                let mut responses = self.responses.lock().unwrap();
                let queue = responses
                    .get_mut(&(method, url.to_string()))
                    .ok_or_else(|| Error::transient(format!("No mock response configured for {method} {url}")))?;
                if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                }
            }
            .ok_or_else(|| Error::transient(format!("No mock response configured for {method} {url}")))?;

            if let Some(delay) = scripted.delay {
                tokio::time::sleep(delay).await;
            }

            match scripted.reply {
                MockReply::Response(response) => Ok(response),
                MockReply::Failure(message) => Err(Error::transient(message)),
            }
        }
    }

    #[async_trait::async_trait]
    impl HttpClient for MockHttpClient {
        async fn get(
            &self,
            url: &str,
            headers: HashMap<String, String>,
        ) -> Result<SimpleHttpResponse> {
            self.respond(HttpMethod::GET, url, headers, None).await
        }

        async fn post(
            &self,
            url: &str,
            headers: HashMap<String, String>,
            body: String,
        ) -> Result<SimpleHttpResponse> {
            self.respond(HttpMethod::POST, url, headers, Some(body)).await
        }
    }
}
