pub mod envelope;
pub mod http_client;
pub mod pipeline;

use std::collections::HashMap;

pub use http_client::{HttpClient, HttpMethod, ReqwestHttpClient, SimpleHttpResponse};
pub use pipeline::{ApiRequest, Attempt, RequestPipeline};

/// Join an endpoint path onto the configured base URL
pub fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Headers carrying a bearer token
pub fn bearer_header(token: &str) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    headers.insert("Authorization".to_string(), format!("Bearer {}", token));
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_slashes() {
        assert_eq!(endpoint("http://h/api/", "/auth/me"), "http://h/api/auth/me");
        assert_eq!(endpoint("http://h/api", "auth/me"), "http://h/api/auth/me");
    }
}
