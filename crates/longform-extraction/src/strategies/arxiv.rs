//! ArXiv HTML strategy over the structural parser

use async_trait::async_trait;
use serde_json::{json, Map};

use longform_fetch::is_binary_content_type;
use longform_html::{
    build_reader_blocks, extract_arxiv_structured_content, extract_canonical_url, extract_title,
    truncate_chars,
};
use longform_types::{ExtractError, ExtractionCandidate, ExtractionContext, Result};

use super::{host_of, ExtractorStrategy, MIN_CONTENT_CHARS};

const ARXIV_HOST_SUFFIX: &str = "arxiv.org";

fn is_arxiv_url(url: &str) -> bool {
    let host = host_of(url);
    host == ARXIV_HOST_SUFFIX || host.ends_with(&format!(".{ARXIV_HOST_SUFFIX}"))
}

fn has_html_path(url: &str) -> bool {
    url::Url::parse(url)
        .map(|parsed| parsed.path().to_lowercase().contains("/html/"))
        .unwrap_or(false)
}

#[derive(Default)]
pub struct ArxivHtmlStrategy;

impl ArxivHtmlStrategy {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExtractorStrategy for ArxivHtmlStrategy {
    fn name(&self) -> &'static str {
        "arxiv_html"
    }

    async fn extract(&self, context: &ExtractionContext) -> Result<ExtractionCandidate> {
        if !is_arxiv_url(&context.url) {
            return Err(ExtractError::NoMatch("URL is not an arXiv host.".into()));
        }

        let page = context.page().await?;
        let final_url = if page.final_url.is_empty() {
            context.url.clone()
        } else {
            page.final_url.clone()
        };
        if !is_arxiv_url(&final_url) {
            return Err(ExtractError::NoMatch("URL is not an arXiv host.".into()));
        }
        if !has_html_path(&final_url) {
            return Err(ExtractError::NoMatch(
                "URL is not an arXiv HTML document path.".into(),
            ));
        }
        if is_binary_content_type(&page.content_type) {
            return Err(ExtractError::BinaryPayload);
        }
        if !page.payload.to_lowercase().contains("<html") {
            return Err(ExtractError::NoMatch(
                "arXiv HTML payload is empty or malformed.".into(),
            ));
        }

        let structured =
            extract_arxiv_structured_content(&page.payload, &final_url, context.max_chars);
        if structured.raw_content.chars().count() < MIN_CONTENT_CHARS {
            return Err(ExtractError::ContentTooShort(
                "arXiv HTML extraction produced insufficient readable content.".into(),
            ));
        }

        let title = extract_title(&page.payload);
        let canonical_url = extract_canonical_url(&page.payload, &final_url);
        let blocks = if structured.blocks.is_empty() {
            build_reader_blocks(&structured.raw_content)
        } else {
            structured.blocks
        };

        let mut extraction_meta = Map::new();
        extraction_meta.insert("method".into(), json!("arxiv_html"));
        extraction_meta.insert("host".into(), json!(host_of(&final_url)));
        extraction_meta.insert("content_type".into(), json!(page.content_type));
        extraction_meta.insert("block_counts".into(), json!(structured.block_counts));

        Ok(ExtractionCandidate {
            strategy_name: self.name().into(),
            url: canonical_url.clone(),
            canonical_url,
            title,
            content_format: "text".into(),
            raw_content: truncate_chars(&structured.raw_content, context.max_chars),
            extraction_meta,
            blocks,
            quality_score: 0.0,
            quality_confidence: 0.0,
        })
    }
}
