//! Query engine reached over an HTTP statement API.
//!
//! A statement is POSTed to `<endpoint>/v1/statement`. While the response
//! carries a `nextUri` the query is still running and that URI is polled.
//! An `error` object in any response means the statement failed.

use crate::engine::QueryEngine;
use crate::error::{EngineError, Result};
use crate::http::{HttpClient, HttpResponse};
use crate::sql::SqlRenderer;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_MAX_POLLS: usize = 1200;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    next_uri: Option<String>,
    #[serde(default)]
    error: Option<StatementError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    error_name: Option<String>,
}

pub struct HttpQueryEngine<C: HttpClient> {
    client: C,
    endpoint: String,
    user: String,
    renderer: SqlRenderer,
    poll_interval: Duration,
    max_polls: usize,
}

impl<C: HttpClient> HttpQueryEngine<C> {
    pub fn new(
        client: C,
        endpoint: impl Into<String>,
        user: impl Into<String>,
        renderer: SqlRenderer,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            user: user.into(),
            renderer,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
        }
    }

    pub fn with_polling(mut self, interval: Duration, max_polls: usize) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }

    fn headers(&self) -> Vec<(String, String)> {
        vec![
            ("X-Trino-User".to_string(), self.user.clone()),
            ("Content-Type".to_string(), "text/plain".to_string()),
        ]
    }

    fn parse(response: HttpResponse) -> Result<StatementResponse> {
        if !response.is_success() {
            return Err(EngineError::Status {
                status: response.status,
                body: response.body_string(),
            });
        }
        response
            .json::<StatementResponse>()
            .map_err(|e| EngineError::Protocol(e.to_string()))
    }
}

#[async_trait]
impl<C: HttpClient> QueryEngine for HttpQueryEngine<C> {
    fn name(&self) -> &str {
        "http"
    }

    fn renderer(&self) -> &SqlRenderer {
        &self.renderer
    }

    async fn execute(&self, statement: &str) -> Result<bool> {
        let url = format!("{}/v1/statement", self.endpoint);
        debug!(%url, statement, "Submitting statement");

        let response = self
            .client
            .post(&url, self.headers(), statement.as_bytes().to_vec())
            .await
            .map_err(EngineError::Transport)?;
        let mut state = Self::parse(response)?;
        let mut polls = 0;

        loop {
            if let Some(error) = state.error {
                warn!(
                    query_id = state.id.as_deref().unwrap_or("-"),
                    error_name = error.error_name.as_deref().unwrap_or("-"),
                    message = %error.message,
                    statement,
                    "Query engine rejected statement"
                );
                return Ok(false);
            }

            let Some(next_uri) = state.next_uri else {
                return Ok(true);
            };

            if polls >= self.max_polls {
                return Err(EngineError::Timeout { polls });
            }
            polls += 1;

            tokio::time::sleep(self.poll_interval).await;
            let response = self
                .client
                .get(&next_uri, self.headers())
                .await
                .map_err(EngineError::Transport)?;
            state = Self::parse(response)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::Mutex;

    struct MockHttpClient {
        responses: Mutex<Vec<HttpResponse>>,
        requests: Mutex<Vec<(String, String, Option<Vec<u8>>)>>,
    }

    impl MockHttpClient {
        fn new(bodies: Vec<(u16, &str)>) -> Self {
            let responses = bodies
                .into_iter()
                .map(|(status, body)| HttpResponse {
                    status,
                    body: body.as_bytes().to_vec(),
                })
                .collect();
            Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(vec![]),
            }
        }
    }

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn request(
            &self,
            method: &str,
            url: &str,
            _headers: Vec<(String, String)>,
            body: Option<Vec<u8>>,
        ) -> anyhow::Result<HttpResponse> {
            self.requests
                .lock()
                .unwrap()
                .push((method.to_string(), url.to_string(), body));
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(anyhow!("No more mock responses"));
            }
            Ok(responses.remove(0))
        }
    }

    fn engine(client: MockHttpClient) -> HttpQueryEngine<MockHttpClient> {
        let renderer = SqlRenderer::new("dns", vec!["qname".into()]).unwrap();
        HttpQueryEngine::new(client, "http://engine:8080/", "loader", renderer)
            .with_polling(Duration::from_millis(1), 10)
    }

    #[tokio::test]
    async fn test_follows_next_uri_until_finished() {
        let client = MockHttpClient::new(vec![
            (200, r#"{"id":"q1","nextUri":"http://engine:8080/v1/statement/q1/1"}"#),
            (200, r#"{"id":"q1","nextUri":"http://engine:8080/v1/statement/q1/2"}"#),
            (200, r#"{"id":"q1","stats":{"state":"FINISHED"}}"#),
        ]);
        let engine = engine(client);

        assert!(engine.execute("SELECT 1").await.unwrap());

        let requests = engine.client.requests.lock().unwrap();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].0, "POST");
        assert_eq!(requests[0].1, "http://engine:8080/v1/statement");
        assert_eq!(requests[0].2.as_deref(), Some("SELECT 1".as_bytes()));
        assert_eq!(requests[2].0, "GET");
        assert_eq!(requests[2].1, "http://engine:8080/v1/statement/q1/2");
    }

    #[tokio::test]
    async fn test_engine_error_is_reported_as_false() {
        let client = MockHttpClient::new(vec![
            (200, r#"{"id":"q2","nextUri":"http://engine:8080/v1/statement/q2/1"}"#),
            (
                200,
                r#"{"id":"q2","error":{"message":"Table dns.queries does not exist","errorName":"TABLE_NOT_FOUND"}}"#,
            ),
        ]);

        assert!(!engine(client).execute("ALTER TABLE ...").await.unwrap());
    }

    #[tokio::test]
    async fn test_http_failure_is_an_error() {
        let client = MockHttpClient::new(vec![(503, "overloaded")]);
        let err = engine(client).execute("SELECT 1").await.unwrap_err();
        assert!(matches!(err, EngineError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_transport_failure_is_an_error() {
        let client = MockHttpClient::new(vec![]);
        let err = engine(client).execute("SELECT 1").await.unwrap_err();
        assert!(matches!(err, EngineError::Transport(_)));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_polls() {
        let next = r#"{"id":"q3","nextUri":"http://engine:8080/v1/statement/q3/1"}"#;
        let client = MockHttpClient::new(vec![(200, next); 20]);
        let engine = engine(client).with_polling(Duration::from_millis(1), 3);

        let err = engine.execute("SELECT 1").await.unwrap_err();
        assert!(matches!(err, EngineError::Timeout { polls: 3 }));
    }

    #[tokio::test]
    async fn test_add_partition_posts_rendered_sql() {
        let client = MockHttpClient::new(vec![(200, r#"{"id":"q4"}"#)]);
        let engine = engine(client);

        let partitions = vec![
            crate::Partition::int("year", 2024),
            crate::Partition::string("server", "ns1"),
        ];
        assert!(engine
            .add_partition("queries", &partitions, "/out/queries/year=2024/server=ns1")
            .await
            .unwrap());

        let requests = engine.client.requests.lock().unwrap();
        let body = String::from_utf8(requests[0].2.clone().unwrap()).unwrap();
        assert!(body.starts_with("ALTER TABLE dns.queries ADD IF NOT EXISTS PARTITION"));
    }
}
