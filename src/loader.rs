// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The Loader stage: bulk-indexes a batch of documents into the search
//! engine and reports which ids were accepted versus rejected.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::error::ProjectorError;
use crate::model::DocumentBatch;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub accepted: Vec<Uuid>,
    pub rejected: Vec<(Uuid, String)>,
}

impl LoadReport {
    pub fn accepted_plus_rejected(&self) -> usize {
        self.accepted.len() + self.rejected.len()
    }
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn bulk_index(&self, index: &str, items: Vec<(Uuid, serde_json::Value)>) -> Result<LoadReport, ProjectorError>;
}

/// Production [`SearchIndex`], speaking the bulk NDJSON wire format over
/// plain HTTP rather than a dedicated client crate.
pub struct ElasticLoader {
    client: reqwest::Client,
    base_url: url::Url,
}

impl ElasticLoader {
    pub fn new(base_url: &str) -> Result<Self, ProjectorError> {
        let base_url = url::Url::parse(base_url)
            .map_err(|e| ProjectorError::Config(format!("invalid --elastic-url: {e}")))?;
        Ok(ElasticLoader {
            client: reqwest::Client::new(),
            base_url,
        })
    }

    fn bulk_url(&self) -> Result<url::Url, ProjectorError> {
        self.base_url
            .join("_bulk")
            .map_err(|e| ProjectorError::Config(format!("invalid --elastic-url: {e}")))
    }
}

#[derive(Serialize)]
struct BulkAction<'a> {
    index: BulkActionMeta<'a>,
}

#[derive(Serialize)]
struct BulkActionMeta<'a> {
    #[serde(rename = "_index")]
    index: &'a str,
    #[serde(rename = "_id")]
    id: Uuid,
}

#[derive(serde::Deserialize)]
struct BulkResponse {
    items: Vec<HashMap<String, BulkItemResult>>,
}

#[derive(serde::Deserialize)]
struct BulkItemResult {
    #[serde(rename = "_id")]
    id: Uuid,
    status: u16,
    error: Option<serde_json::Value>,
}

#[async_trait]
impl SearchIndex for ElasticLoader {
    async fn bulk_index(&self, index: &str, items: Vec<(Uuid, serde_json::Value)>) -> Result<LoadReport, ProjectorError> {
        if items.is_empty() {
            return Ok(LoadReport::default());
        }

        let mut body = String::new();
        for (id, doc) in &items {
            let action = BulkAction {
                index: BulkActionMeta { index, id: *id },
            };
            body.push_str(&serde_json::to_string(&action).expect("bulk action serializes"));
            body.push('\n');
            body.push_str(&serde_json::to_string(doc).expect("document serializes"));
            body.push('\n');
        }

        let url = self.bulk_url()?;
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(|e| ProjectorError::LoadUnavailable(e.into()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ProjectorError::LoadUnavailable(anyhow::anyhow!(
                "bulk request to {index} failed with status {status}: {text}"
            )));
        }

        let parsed: BulkResponse = response
            .json()
            .await
            .map_err(|e| ProjectorError::LoadUnavailable(e.into()))?;

        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        for item in parsed.items {
            let Some(result) = item.into_values().next() else {
                continue;
            };
            if (200..300).contains(&result.status) {
                accepted.push(result.id);
            } else {
                let reason = result
                    .error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| format!("status {}", result.status));
                warn!(id = %result.id, index, reason = %reason, "document rejected by bulk index");
                rejected.push((result.id, reason));
            }
        }

        Ok(LoadReport { accepted, rejected })
    }
}

pub async fn load(index: &dyn SearchIndex, batch: DocumentBatch) -> Result<LoadReport, ProjectorError> {
    let index_name = batch.index_name().to_string();
    let attempted = batch.len();
    let items = batch.into_bulk_items();
    let report = index.bulk_index(&index_name, items).await?;

    if !report.rejected.is_empty() {
        return Err(ProjectorError::LoadPartial {
            index: index_name,
            accepted: report.accepted.len(),
            accepted_plus_rejected: attempted,
            rejected: report.rejected,
        });
    }
    Ok(report)
}

#[cfg(any(test, feature = "test-util"))]
pub mod fake {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeSearchIndex {
        pub indexed: Mutex<Vec<(String, Uuid, serde_json::Value)>>,
        pub reject_ids: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl SearchIndex for FakeSearchIndex {
        async fn bulk_index(&self, index: &str, items: Vec<(Uuid, serde_json::Value)>) -> Result<LoadReport, ProjectorError> {
            let reject_ids = self.reject_ids.lock().unwrap();
            let mut accepted = Vec::new();
            let mut rejected = Vec::new();
            for (id, doc) in items {
                if reject_ids.contains(&id) {
                    rejected.push((id, "simulated rejection".to_string()));
                } else {
                    self.indexed.lock().unwrap().push((index.to_string(), id, doc));
                    accepted.push(id);
                }
            }
            Ok(LoadReport { accepted, rejected })
        }
    }
}
