//! Request plumbing shared by the upstream clients

use std::sync::Arc;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{ApiError, ConfigError};
use crate::schema::{ValidatedRecord, ValidationFailure};

/// HTTP access to one upstream service
///
/// Requests made through the same `Upstream` (or its clones) are issued one at
/// a time, so a burst of calls to one service queues instead of tripping its
/// rate limit. Different services never wait on each other.
#[derive(Debug, Clone)]
pub(crate) struct Upstream {
    service: &'static str,
    client: Client,
    gate: Arc<Mutex<()>>,
}

impl Upstream {
    pub fn new(service: &'static str) -> Self {
        Self::with_client(service, Client::new())
    }

    pub fn with_client(service: &'static str, client: Client) -> Self {
        Self {
            service,
            client,
            gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.client.get(url)
    }

    /// Sends the request and parses the body as JSON
    ///
    /// Transport failures and non-2xx statuses become `UpstreamUnavailable`;
    /// a body that is not JSON becomes `SchemaMismatch` against `schema`.
    /// Error reasons never include the request URL, which may carry a key.
    pub async fn fetch_json(
        &self,
        request: RequestBuilder,
        schema: &'static str,
    ) -> Result<Value, ApiError> {
        let request = request
            .build()
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;

        let _turn = self.gate.lock().await;
        debug!(service = self.service, path = request.url().path(), "requesting");

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| self.unavailable(None, e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.unavailable(Some(status.as_u16()), format!("HTTP {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.unavailable(Some(status.as_u16()), e.without_url().to_string()))?;

        serde_json::from_str(&body).map_err(|_| ApiError::SchemaMismatch {
            service: self.service,
            failure: ValidationFailure::unreadable(schema, "non-JSON body"),
        })
    }

    /// Decodes a validated record into its typed upstream struct
    pub fn decode<T: DeserializeOwned>(
        &self,
        schema: &'static str,
        record: ValidatedRecord,
    ) -> Result<T, ApiError> {
        record.decode().map_err(|_| ApiError::SchemaMismatch {
            service: self.service,
            failure: ValidationFailure::unreadable(schema, "undecodable record"),
        })
    }

    pub fn mismatch(&self, failure: ValidationFailure) -> ApiError {
        ApiError::SchemaMismatch {
            service: self.service,
            failure,
        }
    }

    fn unavailable(&self, status: Option<u16>, reason: String) -> ApiError {
        ApiError::UpstreamUnavailable {
            service: self.service,
            status,
            reason,
        }
    }
}

/// Returns the credential, or fails if it is absent or blank
pub fn require_credential(
    name: &'static str,
    value: Option<String>,
) -> Result<String, ConfigError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ConfigError::MissingCredential(name)),
    }
}

/// Returns the trimmed parameter, or fails if it is blank
pub(crate) fn require_param<'a>(name: &str, value: &'a str) -> Result<&'a str, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        Err(ApiError::InvalidRequest(format!("{} must not be empty", name)))
    } else {
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[test]
    fn test_require_credential() {
        assert_eq!(
            require_credential("KEY", Some(" abc ".to_string())),
            Ok("abc".to_string())
        );
        assert_eq!(
            require_credential("KEY", Some("   ".to_string())),
            Err(ConfigError::MissingCredential("KEY"))
        );
        assert_eq!(
            require_credential("KEY", None),
            Err(ConfigError::MissingCredential("KEY"))
        );
    }

    #[test]
    fn test_require_param() {
        assert_eq!(require_param("user", " rj ").unwrap(), "rj");
        let err = require_param("playlist id", "").unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(ref msg) if msg.contains("playlist id")));
    }

    #[tokio::test]
    async fn test_non_success_status_is_upstream_unavailable() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/feed")
            .with_status(503)
            .with_body("maintenance")
            .create_async()
            .await;

        let upstream = Upstream::new("test");
        let err = upstream
            .fetch_json(upstream.get(&format!("{}/feed", server.url())), "feed")
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert_eq!(err.status(), Some(503));
        assert!(matches!(err, ApiError::UpstreamUnavailable { service: "test", .. }));
    }

    #[tokio::test]
    async fn test_non_json_body_is_schema_mismatch() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/feed")
            .with_status(200)
            .with_body("<html>oops</html>")
            .create_async()
            .await;

        let upstream = Upstream::new("test");
        let err = upstream
            .fetch_json(upstream.get(&format!("{}/feed", server.url())), "feed")
            .await
            .unwrap_err();

        match err {
            ApiError::SchemaMismatch { failure, .. } => {
                assert_eq!(failure.schema, "feed");
                assert_eq!(failure.issues[0].path, "/");
            }
            other => panic!("expected SchemaMismatch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connection_failure_has_no_status() {
        let upstream = Upstream::new("test");
        // Port 9 (discard) on localhost is not expected to accept HTTP
        let err = upstream
            .fetch_json(upstream.get("http://127.0.0.1:9/feed"), "feed")
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::UpstreamUnavailable { status: None, .. }));
    }

    #[tokio::test]
    async fn test_connection_failure_omits_query_credentials() {
        let upstream = Upstream::new("test");
        let request = upstream
            .get("http://127.0.0.1:9/feed")
            .query(&[("api_key", "SECRET-KEY-42")]);

        let err = upstream.fetch_json(request, "feed").await.unwrap_err();

        let text = format!("{} {:?}", err, err);
        assert!(!text.contains("SECRET-KEY-42"), "credential leaked: {}", text);
        assert!(!text.contains("api_key"));
    }
}
