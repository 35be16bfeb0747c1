//! Transport abstraction for workflow steps.

use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// One outbound JSON request.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRequest {
    /// Step name, for error reporting and logs.
    pub step: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: serde_json::Value,
}

/// A successful (HTTP 200, JSON) response.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

/// Executes a single request/response exchange.
///
/// Implementations classify the outcome: only an HTTP 200 with a JSON body
/// is `Ok`. Anything else is a `Transport` error. Nothing is retried here.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn submit(&self, request: StepRequest) -> Result<StepResponse>;
}
