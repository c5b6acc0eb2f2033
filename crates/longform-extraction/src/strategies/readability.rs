//! Generic HTTP readability fallback

use async_trait::async_trait;
use serde_json::{json, Map};

use longform_fetch::{is_binary_content_type, is_probably_blocked_page};
use longform_html::{
    build_reader_blocks, extract_canonical_url, extract_primary_html_candidates, extract_title,
    normalize_text_preserve_paragraphs, truncate_chars,
};
use longform_types::{ExtractError, ExtractionCandidate, ExtractionContext, Result};

use super::{host_of, ExtractorStrategy, MIN_CONTENT_CHARS};
use crate::adaptive::longest_text_projection;

#[derive(Default)]
pub struct HttpReadabilityStrategy;

impl HttpReadabilityStrategy {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExtractorStrategy for HttpReadabilityStrategy {
    fn name(&self) -> &'static str {
        "http_readability"
    }

    async fn extract(&self, context: &ExtractionContext) -> Result<ExtractionCandidate> {
        let page = context.page().await?;
        let payload = page.payload.as_str();
        let content_type = page.content_type.as_str();

        if is_binary_content_type(content_type) {
            return Err(ExtractError::BinaryPayload);
        }
        if is_probably_blocked_page(payload, content_type) {
            return Err(ExtractError::BlockedPage);
        }

        let final_url = if page.final_url.is_empty() {
            context.url.clone()
        } else {
            page.final_url.clone()
        };

        let (raw_content, title, canonical_url) =
            if content_type.contains("text/html") || payload.to_lowercase().contains("<html") {
                let fragments = extract_primary_html_candidates(payload);
                let raw_content = longest_text_projection(&fragments);
                (
                    raw_content,
                    extract_title(payload),
                    extract_canonical_url(payload, &final_url),
                )
            } else {
                (
                    normalize_text_preserve_paragraphs(payload),
                    None,
                    final_url.clone(),
                )
            };

        if raw_content.chars().count() < MIN_CONTENT_CHARS {
            return Err(ExtractError::ContentTooShort(
                "Could not extract enough readable article content from URL.".into(),
            ));
        }

        let mut extraction_meta = Map::new();
        extraction_meta.insert("method".into(), json!("http_readability"));
        extraction_meta.insert("host".into(), json!(host_of(&final_url)));
        extraction_meta.insert("content_type".into(), json!(content_type));

        let blocks = build_reader_blocks(&raw_content);
        Ok(ExtractionCandidate {
            strategy_name: self.name().into(),
            url: context.url.clone(),
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
