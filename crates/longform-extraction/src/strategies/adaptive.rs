//! LLM adaptive strategy: cached rules, synthesis, and promotion

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use longform_types::{ExtractError, ExtractionCandidate, ExtractionContext, Result};

use super::{host_of, ExtractorStrategy};
use crate::adaptive::{apply_rule, AdaptiveEngine};

pub struct LlmAdaptiveStrategy {
    engine: Arc<AdaptiveEngine>,
}

impl LlmAdaptiveStrategy {
    pub fn new(engine: Arc<AdaptiveEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl ExtractorStrategy for LlmAdaptiveStrategy {
    fn name(&self) -> &'static str {
        "llm_adaptive"
    }

    async fn extract(&self, context: &ExtractionContext) -> Result<ExtractionCandidate> {
        let page = context.page().await?;
        let final_url = if page.final_url.is_empty() {
            context.url.clone()
        } else {
            page.final_url.clone()
        };
        let host = host_of(&final_url);

        // Samples are captured unconditionally so cached-rule hits still
        // grow the replay corpus used for promotion.
        self.engine
            .record_replay_sample(&host, &final_url, &page.content_type, &page.payload);

        if let Some(cached_rule) = self.engine.cached_rule(&host) {
            match apply_rule(
                &context.url,
                &page.payload,
                &page.content_type,
                &cached_rule,
                false,
                context.max_chars,
            ) {
                Ok(candidate) => return Ok(candidate),
                Err(err) => {
                    debug!(%host, error = %err, "cached rule failed, synthesizing a fresh one");
                }
            }
        }

        let Some(generated_rule) = self
            .engine
            .synthesize_rule(&host, &context.url, &page.payload)
            .await
        else {
            return Err(ExtractError::LlmUnavailable(
                "No valid LLM adaptive rule available.".into(),
            ));
        };

        let mut candidate = apply_rule(
            &context.url,
            &page.payload,
            &page.content_type,
            &generated_rule,
            true,
            context.max_chars,
        )?;
        let promotion = self
            .engine
            .evaluate_and_promote(&host, &generated_rule, context.max_chars);
        candidate
            .extraction_meta
            .insert("promotion".into(), json!(promotion));
        Ok(candidate)
    }
}
