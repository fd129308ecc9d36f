//! JSON-RPC client for the lily job API

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::endpoints::{self, METHOD_JOB_LIST, METHOD_WALK};
use super::types::{JobListResult, JobSubmitResult, WalkConfig};
use super::{Connector, LilyApi};
use crate::error::{ExportError, Result};

/// Default timeout for a single API request
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 60;

#[derive(Serialize)]
struct RpcRequest<P> {
    jsonrpc: &'static str,
    method: &'static str,
    params: P,
    id: u64,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// One connection to a lily node
pub struct LilyClient {
    client: Client,
    url: String,
    token: Option<String>,
}

impl LilyClient {
    pub fn new(url: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            token,
        })
    }

    async fn call<P, T>(&self, method: &'static str, params: P) -> Result<T>
    where
        P: Serialize + Send,
        T: DeserializeOwned + Send,
    {
        let request = RpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: 1,
        };

        let mut builder = self.client.post(&self.url).json(&request);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        debug!(method, url = %self.url, "calling lily api");
        let response: RpcResponse<T> = builder.send().await?.error_for_status()?.json().await?;

        if let Some(err) = response.error {
            return Err(ExportError::Rpc {
                method,
                code: err.code,
                message: err.message,
            });
        }
        response
            .result
            .ok_or(ExportError::EmptyRpcResponse { method })
    }
}

#[async_trait]
impl LilyApi for LilyClient {
    async fn walk(&self, cfg: &WalkConfig) -> Result<JobSubmitResult> {
        self.call(METHOD_WALK, [cfg]).await
    }

    async fn job_list(&self) -> Result<Vec<JobListResult>> {
        self.call(METHOD_JOB_LIST, [(); 0]).await
    }
}

/// Opens a fresh [`LilyClient`] for every attempt
#[derive(Debug, Clone)]
pub struct HttpConnector {
    url: String,
    token: Option<String>,
    timeout: Duration,
}

impl HttpConnector {
    /// `addr` is a multiaddr or an http(s) URL
    pub fn new(addr: &str, token: Option<String>) -> Result<Self> {
        Ok(Self {
            url: endpoints::rpc_url(addr)?,
            token: token.filter(|t| !t.is_empty()),
            timeout: Duration::from_secs(DEFAULT_API_TIMEOUT_SECS),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for HttpConnector {
    async fn connect(&self) -> Result<Box<dyn LilyApi>> {
        let client = LilyClient::new(self.url.clone(), self.token.clone(), self.timeout)?;
        Ok(Box::new(client))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::lily::JobId;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn walk_config() -> WalkConfig {
        WalkConfig {
            name: "arch0102-2021-01-01".to_string(),
            tasks: vec!["blocks".to_string(), "consensus".to_string()],
            window: 0,
            from: 1,
            to: 2,
            restart_delay: 0,
            restart_on_completion: false,
            restart_on_failure: false,
            storage: "CSV".to_string(),
        }
    }

    async fn connect(server: &MockServer) -> Box<dyn LilyApi> {
        HttpConnector::new(&server.uri(), Some("secret".to_string()))
            .unwrap()
            .connect()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_walk_posts_config_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc/v0"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(json!({
                "method": "Filecoin.LilyWalk",
                "params": [{"Name": "arch0102-2021-01-01", "From": 1, "To": 2}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": {"ID": 42, "Name": "arch0102-2021-01-01"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = connect(&server).await;
        let res = api.walk(&walk_config()).await.unwrap();
        assert_eq!(res.id, JobId(42));
    }

    #[tokio::test]
    async fn test_job_list_decodes_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "Filecoin.LilyJobList", "params": []})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": [{
                    "ID": 3,
                    "Name": "arch0102-2021-01-01",
                    "Type": "walk",
                    "Error": "",
                    "Tasks": ["blocks"],
                    "Running": false,
                    "Params": {"storage": "CSV", "minHeight": "1", "maxHeight": "2"}
                }]
            })))
            .mount(&server)
            .await;

        let jobs = connect(&server).await.job_list().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, JobId(3));
        assert!(!jobs[0].running);
    }

    #[tokio::test]
    async fn test_rpc_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": -32601, "message": "method not found"}
            })))
            .mount(&server)
            .await;

        let err = connect(&server).await.job_list().await.unwrap_err();
        match err {
            ExportError::Rpc { method, code, .. } => {
                assert_eq!(method, METHOD_JOB_LIST);
                assert_eq!(code, -32601);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_http_failure_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let err = connect(&server).await.job_list().await.unwrap_err();
        assert!(matches!(err, ExportError::Http(_)));
    }
}
