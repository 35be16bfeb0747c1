//! Relay-aware HTTP transport built on reqwest.

use async_trait::async_trait;
use regflow_core::error::{RegflowError, Result};
use regflow_core::relay::RelayEndpoint;
use regflow_core::transport::{StepRequest, StepResponse, Transport};
use regflow_infrastructure::EgressPool;
use reqwest::{Client, Proxy, StatusCode};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Error bodies are cut to this many characters.
const ERROR_BODY_LIMIT: usize = 200;

/// Posts step payloads as JSON, one relay per call.
///
/// A client is built per relay up front (reqwest binds proxies at build
/// time), so picking a relay at call time is just an index into the pool.
pub struct HttpTransport {
    direct: Client,
    relayed: Vec<Client>,
    pool: Arc<EgressPool>,
}

impl HttpTransport {
    /// # Arguments
    ///
    /// * `pool` - Shared relay pool; empty means direct calls
    /// * `timeout` - Per-call timeout covering connect, send and body
    pub fn new(pool: Arc<EgressPool>, timeout: Duration) -> Result<Self> {
        let direct = Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| RegflowError::config(format!("Failed to build HTTP client: {e}")))?;

        let relayed = pool
            .endpoints()
            .iter()
            .map(|endpoint| build_relayed_client(endpoint, timeout))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            direct,
            relayed,
            pool,
        })
    }

    fn pick(&self) -> (&Client, Option<&RelayEndpoint>) {
        match self.pool.select_index() {
            Some(index) => (&self.relayed[index], self.pool.endpoints().get(index)),
            None => (&self.direct, None),
        }
    }
}

fn build_relayed_client(endpoint: &RelayEndpoint, timeout: Duration) -> Result<Client> {
    let proxy = Proxy::all(endpoint.uri())
        .map_err(|e| RegflowError::config(format!("Invalid relay {endpoint}: {e}")))?;
    Client::builder()
        .timeout(timeout)
        .proxy(proxy)
        .build()
        .map_err(|e| RegflowError::config(format!("Failed to build client for {endpoint}: {e}")))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn submit(&self, request: StepRequest) -> Result<StepResponse> {
        let (client, relay) = self.pick();
        let via = relay
            .map(|r| r.to_string())
            .unwrap_or_else(|| "direct".to_string());
        tracing::debug!(step = %request.step, url = %request.url, via = %via, "Submitting step");

        let mut builder = client.post(&request.url).json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|err| {
            RegflowError::transport(
                &request.step,
                None,
                format!("request via {via} failed: {err}"),
            )
        })?;

        let status = response.status();
        if status != StatusCode::OK {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(map_http_error(&request.step, status, &body_text));
        }

        let body: serde_json::Value = response.json().await.map_err(|err| {
            RegflowError::transport(
                &request.step,
                Some(status.as_u16()),
                format!("malformed JSON body: {err}"),
            )
        })?;

        Ok(StepResponse {
            status: status.as_u16(),
            body,
        })
    }
}

fn map_http_error(step: &str, status: StatusCode, body: &str) -> RegflowError {
    let message: String = body.chars().take(ERROR_BODY_LIMIT).collect();
    RegflowError::transport(step, Some(status.as_u16()), message)
}
