//! HTTP client for a remote automation service.
//!
//! | Method | Path                                     | Body / result                 |
//! |--------|------------------------------------------|-------------------------------|
//! | POST   | `/api/v1/generate/from-natural-language` | GenerationRequest → Response  |
//! | POST   | `/api/v1/execution/run`                  | ExecutionRequest → Execution  |
//! | GET    | `/api/v1/execution/history?limit=`       | → [TestExecution]             |
//! | GET    | `/api/v1/execution/{id}`                 | → TestExecution               |
//! | GET    | `/api/v1/tests?skip=&limit=&tag=`        | → [TestCase]                  |
//! | POST   | `/api/v1/tests`                          | TestCaseCreate → TestCase     |

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::Settings;
use crate::errors::ErrorCode;
use crate::protocol::{
    ExecutionRequest, GenerationRequest, GenerationResponse, TestCase, TestCaseCreate, TestExecution,
};
use crate::store::ListQuery;

/// Generous: a remote run may take minutes.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("service returned {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ClientError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::TEST_NOT_FOUND,
            Self::InvalidRequest(_) => ErrorCode::INVALID_REQUEST,
            Self::Http(_) | Self::Status { .. } => ErrorCode::INTERNAL_ERROR,
        }
    }
}

/// FastAPI-style error body.
#[derive(Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

pub struct ServiceClient {
    client: Client,
    base_url: String,
}

impl ServiceClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ClientError> {
        Self::new(settings.service_url.clone())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    #[instrument(skip_all, fields(description_len = request.description.len()))]
    pub async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse, ClientError> {
        self.send(self.client.post(self.url("/generate/from-natural-language")).json(request))
            .await
    }

    /// Runs a stored or inline test case remotely.
    #[instrument(skip_all)]
    pub async fn run(&self, request: &ExecutionRequest) -> Result<TestExecution, ClientError> {
        request
            .source()
            .map_err(|e| ClientError::InvalidRequest(e.to_string()))?;
        self.send(self.client.post(self.url("/execution/run")).json(request)).await
    }

    pub async fn history(&self, limit: usize) -> Result<Vec<TestExecution>, ClientError> {
        self.send(
            self.client
                .get(self.url("/execution/history"))
                .query(&[("limit", limit)]),
        )
        .await
    }

    pub async fn execution(&self, execution_id: &str) -> Result<TestExecution, ClientError> {
        let path = format!("/execution/{}", urlencoding::encode(execution_id));
        self.send(self.client.get(self.url(&path))).await
    }

    pub async fn list_tests(&self, query: &ListQuery) -> Result<Vec<TestCase>, ClientError> {
        let mut params = vec![("skip", query.skip.to_string()), ("limit", query.limit.to_string())];
        if let Some(tag) = &query.tag {
            params.push(("tag", tag.clone()));
        }
        self.send(self.client.get(self.url("/tests")).query(&params)).await
    }

    pub async fn create_test(&self, create: &TestCaseCreate) -> Result<TestCase, ClientError> {
        self.send(self.client.post(self.url("/tests")).json(create)).await
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = request.send().await?;
        let status = response.status();
        debug!(status = status.as_u16(), url = %response.url(), "Service responded");

        if status.is_success() {
            return Ok(response.json().await?);
        }

        let text = response.text().await.unwrap_or_default();
        let detail = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(ErrorBody {
                detail: serde_json::Value::String(s),
            }) => s,
            Ok(ErrorBody { detail }) => detail.to_string(),
            Err(_) => text,
        };

        Err(match status {
            StatusCode::NOT_FOUND => ClientError::NotFound(detail),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ClientError::InvalidRequest(detail),
            other => ClientError::Status {
                status: other.as_u16(),
                detail,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::ExecutionFold;
    use crate::protocol::{ActionKind, ExecutionStatus, TestStep};
    use mockito::Matcher;

    fn execution() -> TestExecution {
        let now = chrono::Utc::now();
        ExecutionFold::with_id("exec-1", "Login", now).finish(now, Some("https://a.test".into()))
    }

    fn create() -> TestCaseCreate {
        TestCaseCreate {
            name: "Login".into(),
            description: String::new(),
            tags: vec!["smoke".into()],
            steps: vec![TestStep::new(1, ActionKind::Navigate, "Open").with_value("https://a.test")],
            setup_steps: vec![],
            teardown_steps: vec![],
        }
    }

    #[tokio::test]
    async fn test_run_posts_request_and_parses_execution() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/execution/run")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "test_id": "t-1",
                "browser": "chromium",
                "stop_on_failure": true
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(serde_json::to_string(&execution()).unwrap())
            .create_async()
            .await;

        let client = ServiceClient::new(server.url()).unwrap();
        let result = client.run(&ExecutionRequest::for_test("t-1")).await.unwrap();

        assert_eq!(result.execution_id, "exec-1");
        assert_eq!(result.status, ExecutionStatus::Skipped);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_run_rejects_sourceless_request_locally() {
        let client = ServiceClient::new("http://127.0.0.1:9").unwrap();
        let mut request = ExecutionRequest::for_test("t-1");
        request.test_id = None;
        let err = client.run(&request).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidRequest(_)));
        assert_eq!(err.code(), ErrorCode::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_execution_maps_to_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/execution/nope")
            .with_status(404)
            .with_header("content-type", "application/json")
            .with_body(r#"{"detail":"Execution nope not found"}"#)
            .create_async()
            .await;

        let client = ServiceClient::new(server.url()).unwrap();
        match client.execution("nope").await {
            Err(ClientError::NotFound(detail)) => assert_eq!(detail, "Execution nope not found"),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_history_and_list_send_query() {
        let mut server = mockito::Server::new_async().await;
        let history = server
            .mock("GET", "/api/v1/execution/history")
            .match_query(Matcher::UrlEncoded("limit".into(), "5".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(serde_json::to_string(&vec![execution()]).unwrap())
            .create_async()
            .await;
        let tests = server
            .mock("GET", "/api/v1/tests")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("skip".into(), "0".into()),
                Matcher::UrlEncoded("limit".into(), "50".into()),
                Matcher::UrlEncoded("tag".into(), "smoke test".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("[]")
            .create_async()
            .await;

        let client = ServiceClient::new(format!("{}/", server.url())).unwrap();
        assert_eq!(client.history(5).await.unwrap().len(), 1);

        let query = ListQuery {
            tag: Some("smoke test".into()),
            ..ListQuery::default()
        };
        assert!(client.list_tests(&query).await.unwrap().is_empty());

        history.assert_async().await;
        tests.assert_async().await;
    }

    #[tokio::test]
    async fn test_generate_and_validation_error() {
        let mut server = mockito::Server::new_async().await;
        let ok = GenerationResponse::generated(create(), 321, "gpt-4o-mini");
        let _generate = server
            .mock("POST", "/api/v1/generate/from-natural-language")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(serde_json::to_string(&ok).unwrap())
            .create_async()
            .await;
        let _create = server
            .mock("POST", "/api/v1/tests")
            .with_status(422)
            .with_header("content-type", "application/json")
            .with_body(r#"{"detail":[{"loc":["body","name"],"msg":"field required"}]}"#)
            .create_async()
            .await;

        let client = ServiceClient::new(server.url()).unwrap();
        let response = client
            .generate(&GenerationRequest::new("Log in and check the dashboard"))
            .await
            .unwrap();
        assert!(response.success);
        assert_eq!(response.tokens_used, 321);

        match client.create_test(&create()).await {
            Err(ClientError::InvalidRequest(detail)) => assert!(detail.contains("field required")),
            other => panic!("expected InvalidRequest, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_server_error_keeps_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/execution/history")
            .match_query(Matcher::Any)
            .with_status(503)
            .with_body("upstream down")
            .create_async()
            .await;

        let client = ServiceClient::new(server.url()).unwrap();
        match client.history(20).await {
            Err(ClientError::Status { status, detail }) => {
                assert_eq!(status, 503);
                assert_eq!(detail, "upstream down");
            }
            other => panic!("expected Status, got {:?}", other),
        }
    }
}
