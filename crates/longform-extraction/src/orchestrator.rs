//! Strategy orchestration
//!
//! Validates the URL, builds the shared context, races the strategies in
//! declared order, scores every successful candidate, and returns the
//! best one once it clears the acceptance threshold or all strategies
//! have run.

use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use longform_fetch::UrlGuard;
use longform_types::{
    ExtractError, ExtractionAttempt, ExtractionCandidate, ExtractionContext, ExtractionDecision,
    OrchestratorConfig, PageFetcher, Result, WebhookResult,
};

use crate::adaptive::AdaptiveEngine;
use crate::scoring::score_candidate;
use crate::strategies::{
    ArxivHtmlStrategy, DomainAdapterStrategy, ExtractorStrategy, HttpReadabilityStrategy,
    JsonLdStrategy, LlmAdaptiveStrategy, XStatusApiStrategy,
};

/// Caller-supplied sink for short human-readable progress strings.
pub type StatusCallback = dyn Fn(&str) + Send + Sync;

/// One extraction request.
#[derive(Debug, Clone, Default)]
pub struct ExtractionRequest {
    pub url: String,
    pub task_id: Option<String>,
    pub project_id: Option<String>,
}

impl ExtractionRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            task_id: None,
            project_id: None,
        }
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }
}

pub struct WebDocumentExtractionOrchestrator {
    config: OrchestratorConfig,
    guard: Arc<dyn UrlGuard>,
    fetcher: Arc<dyn PageFetcher>,
    strategies: Vec<Box<dyn ExtractorStrategy>>,
}

impl WebDocumentExtractionOrchestrator {
    /// Orchestrator with the full declared strategy order: X-status,
    /// domain adapter, arXiv HTML, JSON-LD, HTTP readability, LLM
    /// adaptive.
    pub fn new(
        config: OrchestratorConfig,
        guard: Arc<dyn UrlGuard>,
        fetcher: Arc<dyn PageFetcher>,
        engine: Arc<AdaptiveEngine>,
    ) -> Self {
        let strategies: Vec<Box<dyn ExtractorStrategy>> = vec![
            Box::new(XStatusApiStrategy::new()),
            Box::new(DomainAdapterStrategy::new(engine.store())),
            Box::new(ArxivHtmlStrategy::new()),
            Box::new(JsonLdStrategy::new()),
            Box::new(HttpReadabilityStrategy::new()),
            Box::new(LlmAdaptiveStrategy::new(engine)),
        ];
        Self::with_strategies(config, guard, fetcher, strategies)
    }

    /// Orchestrator over an explicit strategy list (tests, embeddings).
    pub fn with_strategies(
        config: OrchestratorConfig,
        guard: Arc<dyn UrlGuard>,
        fetcher: Arc<dyn PageFetcher>,
        strategies: Vec<Box<dyn ExtractorStrategy>>,
    ) -> Self {
        Self {
            config,
            guard,
            fetcher,
            strategies,
        }
    }

    pub async fn run(
        &self,
        request: ExtractionRequest,
        status_callback: Option<&StatusCallback>,
        cancel: Option<&CancellationToken>,
    ) -> Result<WebhookResult> {
        let emit = |message: &str| {
            if let Some(callback) = status_callback {
                callback(message);
            }
        };

        emit("Preparing extraction pipeline");
        self.guard.validate(&request.url).await?;

        let context = ExtractionContext::new(
            request.url.clone(),
            request.task_id.clone(),
            self.config.timeout,
            self.config.max_chars,
            self.fetcher.clone(),
        );

        let mut attempts: Vec<ExtractionAttempt> = Vec::new();
        let mut best_candidate: Option<ExtractionCandidate> = None;
        let started_at = Instant::now();

        for strategy in &self.strategies {
            if cancel.map(|token| token.is_cancelled()).unwrap_or(false) {
                debug!(strategy = strategy.name(), "extraction cancelled at strategy boundary");
                break;
            }

            emit(&format!("Extracting content ({})", strategy.name()));
            let strategy_started = Instant::now();
            match strategy.extract(&context).await {
                Ok(mut candidate) => {
                    let score_result = score_candidate(&candidate);
                    candidate.quality_score = score_result.score;
                    candidate.quality_confidence = score_result.confidence;
                    candidate
                        .extraction_meta
                        .insert("quality_features".into(), json!(score_result.features));

                    attempts.push(ExtractionAttempt {
                        strategy_name: strategy.name().into(),
                        success: true,
                        duration_ms: strategy_started.elapsed().as_millis() as u64,
                        score: Some(score_result.score),
                        confidence: Some(score_result.confidence),
                        reason: None,
                    });

                    let improved = best_candidate
                        .as_ref()
                        .map(|best| candidate.quality_score > best.quality_score)
                        .unwrap_or(true);
                    if improved {
                        best_candidate = Some(candidate);
                    }

                    let accepted = best_candidate
                        .as_ref()
                        .map(|best| best.quality_score >= self.config.acceptance_threshold)
                        .unwrap_or(false);
                    if accepted {
                        info!(
                            strategy = strategy.name(),
                            "candidate cleared the acceptance threshold"
                        );
                        break;
                    }
                }
                Err(err) => {
                    debug!(strategy = strategy.name(), error = %err, "strategy failed");
                    attempts.push(ExtractionAttempt {
                        strategy_name: strategy.name().into(),
                        success: false,
                        duration_ms: strategy_started.elapsed().as_millis() as u64,
                        score: None,
                        confidence: None,
                        reason: Some(err.to_string()),
                    });
                }
            }
        }

        let Some(best_candidate) = best_candidate else {
            let failure_reasons = attempts
                .iter()
                .filter(|attempt| !attempt.success)
                .map(|attempt| {
                    format!(
                        "{}: {}",
                        attempt.strategy_name,
                        attempt.reason.as_deref().unwrap_or("unknown error")
                    )
                })
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ExtractError::ExtractionFailed(failure_reasons));
        };
        if best_candidate.quality_score < self.config.minimum_acceptable_score {
            return Err(ExtractError::QualityBelowThreshold {
                score: best_candidate.quality_score,
                minimum: self.config.minimum_acceptable_score,
            });
        }

        emit("Content extracted");
        let decision = ExtractionDecision {
            candidate: best_candidate,
            attempts,
            duration_seconds: started_at.elapsed().as_secs_f64(),
        };
        Ok(decision.into_webhook_result(request.project_id))
    }
}
