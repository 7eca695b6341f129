//! # External Lookup
//!
//! One HTTP GET per attempt against a URL template with a single `{name}`
//! placeholder. Failures are mapped so the retry policy can classify them:
//!
//! | What happened | `TaskError` | Retried |
//! |---------------|-------------|---------|
//! | Sentinel in the name | `Failed` | yes |
//! | Connection or transport failure | `Failed` | yes |
//! | Non-2xx response | `Status` | only 5xx |
//! | Body is not JSON | `Fatal` | no |

use super::Sentinel;
use crate::model::LookupRequest;
use async_trait::async_trait;
use delivery_framework::{FallibleTask, TaskError};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};

pub const DEFAULT_LOOKUP_URL: &str = "https://pokeapi.co/api/v2/pokemon/{name}";

#[derive(Debug, Clone)]
pub struct LookupClient {
    http: reqwest::Client,
    url_template: String,
    sentinel: Sentinel,
}

impl LookupClient {
    pub fn new(
        url_template: impl Into<String>,
        sentinel: Sentinel,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url_template: url_template.into(),
            sentinel,
        })
    }

    pub fn url_for(&self, name: &str) -> String {
        self.url_template.replace("{name}", name)
    }

    #[instrument(skip(self))]
    pub async fn fetch(&self, name: &str) -> Result<Value, TaskError> {
        if self.sentinel.trips(name) {
            return Err(TaskError::Failed("Simulated Pokémon error".to_string()));
        }

        let url = self.url_for(name);
        debug!(%url, "Fetching");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| TaskError::Failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Lookup failed");
            return Err(TaskError::Status {
                code: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string(),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| TaskError::Fatal(format!("undecodable body: {e}")))
    }

    pub fn task(&self, request: LookupRequest) -> LookupTask {
        LookupTask {
            client: self.clone(),
            request,
        }
    }
}

/// `fetch-pokemon`: look one name up.
pub struct LookupTask {
    client: LookupClient,
    request: LookupRequest,
}

#[async_trait]
impl FallibleTask for LookupTask {
    type Item = LookupRequest;
    type Output = Value;

    fn item(&self) -> &LookupRequest {
        &self.request
    }

    async fn attempt(&self) -> Result<Value, TaskError> {
        self.client.fetch(&self.request.name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use delivery_framework::{FailureClass, RetryPolicy};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> LookupClient {
        LookupClient::new(
            format!("{}/api/v2/pokemon/{{name}}", server.uri()),
            Sentinel::default(),
            Duration::from_secs(2),
        )
        .unwrap()
    }

    #[test]
    fn url_template_substitutes_name() {
        let client = LookupClient::new(DEFAULT_LOOKUP_URL, Sentinel::default(), Duration::from_secs(1))
            .unwrap();
        assert_eq!(
            client.url_for("pikachu"),
            "https://pokeapi.co/api/v2/pokemon/pikachu"
        );
    }

    #[tokio::test]
    async fn returns_decoded_body_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/pokemon/pikachu"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "pikachu", "id": 25})))
            .mount(&server)
            .await;

        let body = client_for(&server).fetch("pikachu").await.unwrap();
        assert_eq!(body, json!({"name": "pikachu", "id": 25}));
    }

    #[tokio::test]
    async fn sentinel_fails_without_a_request() {
        let server = MockServer::start().await;

        let result = client_for(&server).fetch("error-mon").await;

        assert_eq!(result, Err(TaskError::Failed("Simulated Pokémon error".into())));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn server_errors_are_retryable_and_client_errors_are_not() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/pokemon/busy"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/pokemon/missingno"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let client = client_for(&server);

        let busy = client.fetch("busy").await.unwrap_err();
        assert_eq!(busy.status(), Some(503));
        assert_eq!(RetryPolicy::classify(&busy), FailureClass::Retryable);

        let missing = client.fetch("missingno").await.unwrap_err();
        assert_eq!(
            missing,
            TaskError::Status {
                code: 404,
                message: "Not Found".into()
            }
        );
        assert_eq!(RetryPolicy::classify(&missing), FailureClass::Fatal);
    }

    #[tokio::test]
    async fn undecodable_body_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let error = client_for(&server).fetch("pikachu").await.unwrap_err();
        assert!(matches!(error, TaskError::Fatal(_)));
    }

    #[tokio::test]
    async fn connection_failure_has_no_status() {
        let client = LookupClient::new(
            "http://127.0.0.1:1/{name}",
            Sentinel::default(),
            Duration::from_secs(2),
        )
        .unwrap();

        let error = client.fetch("pikachu").await.unwrap_err();
        assert!(matches!(error, TaskError::Failed(_)));
        assert_eq!(RetryPolicy::classify(&error), FailureClass::Retryable);
    }
}
