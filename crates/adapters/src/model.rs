// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Text-model API boundary used by the built-in workflows.

use async_trait::async_trait;
use quill_engine::WorkflowError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model API unavailable: {0}")]
    Unavailable(String),
    #[error("model API returned {status}: {body}")]
    Api { status: u16, body: String },
}

impl From<ModelError> for WorkflowError {
    fn from(e: ModelError) -> Self {
        WorkflowError::Execution(e.to_string())
    }
}

/// One completion request. `quality` is the job's opaque tier, mapped to a
/// concrete model server-side.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub prompt: String,
    pub quality: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    text: String,
}

/// The long-running, cost-bearing operation at the bottom of every phase.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ModelError>;
}

/// HTTP implementation against the model service.
pub struct HttpModelClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpModelClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), api_key: None, client: reqwest::Client::new() }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ModelError> {
        let url = format!("{}/v1/complete", self.base_url);
        let mut call = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }
        let response =
            call.send().await.map_err(|e| ModelError::Unavailable(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api { status: status.as_u16(), body });
        }
        let completion: CompletionResponse =
            response.json().await.map_err(|e| ModelError::Unavailable(e.to_string()))?;
        Ok(completion.text)
    }
}
