// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Usage/billing API client backing the budget tracker.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quill_engine::{CostSource, CostSourceError, RunRecord};
use serde::Deserialize;
use tracing::debug;

/// Wire shape of one run returned by the usage API.
#[derive(Debug, Deserialize)]
pub(crate) struct RunDto {
    pub id: String,
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub total_cost: f64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// One page of the runs listing.
#[derive(Debug, Deserialize)]
pub(crate) struct RunsPage {
    pub runs: Vec<RunDto>,
    #[serde(default)]
    pub next_page: Option<u64>,
}

impl RunsPage {
    /// Completed top-level runs only; in-flight runs carry no final cost.
    pub(crate) fn completed(self) -> Vec<RunRecord> {
        self.runs
            .into_iter()
            .filter(|r| r.status == "completed")
            .map(|r| RunRecord {
                id: r.id,
                name: r.name,
                total_cost: r.total_cost,
                total_tokens: r.total_tokens,
            })
            .collect()
    }
}

/// HTTP client for the usage/billing API.
pub struct UsageApiCostSource {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl UsageApiCostSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), api_key: None, client: reqwest::Client::new() }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    async fn fetch_page(
        &self,
        project: &str,
        since: DateTime<Utc>,
        page: u64,
    ) -> Result<RunsPage, CostSourceError> {
        let url = format!(
            "{}/v1/projects/{}/runs?since={}&page={}",
            self.base_url,
            project,
            since.to_rfc3339(),
            page
        );
        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| CostSourceError::Unavailable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(CostSourceError::ProjectNotFound(project.to_string()));
        }
        if !response.status().is_success() {
            return Err(CostSourceError::Unavailable(format!(
                "usage API returned {}",
                response.status()
            )));
        }
        response.json().await.map_err(|e| CostSourceError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl CostSource for UsageApiCostSource {
    async fn completed_runs(
        &self,
        project: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<RunRecord>, CostSourceError> {
        let mut records = Vec::new();
        let mut page = 0;
        loop {
            let listing = self.fetch_page(project, since, page).await?;
            let next = listing.next_page;
            records.extend(listing.completed());
            match next {
                Some(n) => page = n,
                None => break,
            }
        }
        debug!(project, runs = records.len(), "fetched completed runs");
        Ok(records)
    }
}

#[cfg(test)]
#[path = "cost_tests.rs"]
mod tests;
