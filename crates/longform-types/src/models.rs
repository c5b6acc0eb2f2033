//! Pipeline DTOs shared across fetcher, strategies, and orchestrator

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::OnceCell;

use crate::block::Block;
use crate::error::Result;

/// One fetched HTTP page, shared across strategies via the context.
///
/// `payload` holds the decoded text for textual responses and is empty for
/// binary bodies; `headers` keys are lower-cased.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedPage {
    pub requested_url: String,
    pub final_url: String,
    pub content_type: String,
    pub payload: String,
    pub status_code: u16,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// Seam between strategies and the HTTP layer, so tests can inject a fake.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchedPage>;
}

/// Per-request state shared by every strategy in one orchestration.
pub struct ExtractionContext {
    pub url: String,
    pub task_id: Option<String>,
    pub timeout: Duration,
    pub max_chars: usize,
    fetcher: Arc<dyn PageFetcher>,
    page: OnceCell<FetchedPage>,
}

impl ExtractionContext {
    pub fn new(
        url: impl Into<String>,
        task_id: Option<String>,
        timeout: Duration,
        max_chars: usize,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Self {
        Self {
            url: url.into(),
            task_id,
            timeout,
            max_chars,
            fetcher,
            page: OnceCell::new(),
        }
    }

    /// The shared page, fetched at most once per context.
    pub async fn page(&self) -> Result<&FetchedPage> {
        self.page
            .get_or_try_init(|| self.fetcher.fetch(&self.url, self.timeout))
            .await
    }
}

/// One strategy's produced document before/after scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionCandidate {
    pub strategy_name: String,
    pub url: String,
    pub canonical_url: String,
    pub title: Option<String>,
    pub content_format: String,
    pub raw_content: String,
    #[serde(default)]
    pub extraction_meta: Map<String, Value>,
    #[serde(default)]
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub quality_score: f64,
    #[serde(default)]
    pub quality_confidence: f64,
}

/// Trace entry for one strategy execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionAttempt {
    pub strategy_name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub score: Option<f64>,
    pub confidence: Option<f64>,
    pub reason: Option<String>,
}

/// The winning candidate plus the full attempt trace.
#[derive(Debug, Clone)]
pub struct ExtractionDecision {
    pub candidate: ExtractionCandidate,
    pub attempts: Vec<ExtractionAttempt>,
    pub duration_seconds: f64,
}

impl ExtractionDecision {
    pub fn into_webhook_result(self, project_id: Option<String>) -> WebhookResult {
        WebhookResult {
            success: true,
            url: self.candidate.url,
            canonical_url: self.candidate.canonical_url,
            title: self.candidate.title,
            content_format: self.candidate.content_format,
            raw_content: self.candidate.raw_content,
            blocks: self.candidate.blocks,
            quality_score: self.candidate.quality_score,
            quality_confidence: self.candidate.quality_confidence,
            strategy_used: self.candidate.strategy_name,
            extraction_trace: self.attempts,
            extraction_meta: self.candidate.extraction_meta,
            duration: self.duration_seconds,
            project_id,
        }
    }
}

/// The `result` object delivered to the external job system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookResult {
    pub success: bool,
    pub url: String,
    pub canonical_url: String,
    pub title: Option<String>,
    pub content_format: String,
    pub raw_content: String,
    pub blocks: Vec<Block>,
    pub quality_score: f64,
    pub quality_confidence: f64,
    pub strategy_used: String,
    pub extraction_trace: Vec<ExtractionAttempt>,
    pub extraction_meta: Map<String, Value>,
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

/// The envelope posted back to the job system's webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    pub task_id: String,
    pub status: String,
    pub result: Option<WebhookResult>,
    pub error: Option<String>,
}

impl WebhookEnvelope {
    pub fn completed(task_id: impl Into<String>, result: WebhookResult) -> Self {
        Self {
            task_id: task_id.into(),
            status: "completed".into(),
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(task_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            status: "failed".into(),
            result: None,
            error: Some(error.into()),
        }
    }
}
