//! Regex-driven extraction through static and promoted domain adapters

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map};

use longform_html::{
    build_reader_blocks, extract_canonical_url, extract_title, normalize_text_preserve_paragraphs,
    truncate_chars,
};
use longform_rules::{adapter_for_host, RuleStore};
use longform_types::{ExtractError, ExtractionCandidate, ExtractionContext, Result};

use super::{host_of, ExtractorStrategy, MIN_CONTENT_CHARS};
use crate::adaptive::{apply_drop_patterns, container_fragments, longest_text_projection};

pub struct DomainAdapterStrategy {
    store: Arc<RuleStore>,
}

impl DomainAdapterStrategy {
    pub fn new(store: Arc<RuleStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ExtractorStrategy for DomainAdapterStrategy {
    fn name(&self) -> &'static str {
        "domain_adapter"
    }

    async fn extract(&self, context: &ExtractionContext) -> Result<ExtractionCandidate> {
        let page = context.page().await?;
        let final_url = if page.final_url.is_empty() {
            context.url.clone()
        } else {
            page.final_url.clone()
        };
        let host = host_of(&final_url);
        let Some(adapter) = adapter_for_host(&host, &self.store) else {
            return Err(ExtractError::NoMatch(
                "No domain adapter configured for host.".into(),
            ));
        };

        let fragments = container_fragments(&page.payload, &adapter.html_container_patterns);
        if fragments.is_empty() {
            return Err(ExtractError::NoMatch(format!(
                "Adapter {} found no matching containers.",
                adapter.name
            )));
        }

        let raw_content = longest_text_projection(&fragments);
        if raw_content.is_empty() {
            return Err(ExtractError::NoMatch(format!(
                "Adapter {} produced empty content.",
                adapter.name
            )));
        }

        let raw_content = apply_drop_patterns(raw_content, &adapter.drop_text_patterns);
        let raw_content = normalize_text_preserve_paragraphs(&raw_content);
        if raw_content.chars().count() < MIN_CONTENT_CHARS {
            return Err(ExtractError::ContentTooShort(format!(
                "Adapter {} content too short.",
                adapter.name
            )));
        }

        let title = extract_title(&page.payload);
        let canonical_url = extract_canonical_url(&page.payload, &final_url);

        let mut extraction_meta = Map::new();
        extraction_meta.insert("method".into(), json!("domain_adapter"));
        extraction_meta.insert("adapter_name".into(), json!(adapter.name));
        extraction_meta.insert("host".into(), json!(host));
        extraction_meta.insert("content_type".into(), json!(page.content_type));

        let blocks = build_reader_blocks(&raw_content);
        Ok(ExtractionCandidate {
            strategy_name: self.name().into(),
            url: canonical_url.clone(),
            canonical_url,
            title,
            content_format: "text".into(),
            raw_content: truncate_chars(&raw_content, context.max_chars),
            extraction_meta,
            blocks,
            quality_score: 0.0,
            quality_confidence: 0.0,
        })
    }
}
