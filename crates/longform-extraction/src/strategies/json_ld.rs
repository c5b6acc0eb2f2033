//! JSON-LD structured-data extraction

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use longform_html::{
    build_reader_blocks, extract_canonical_url, extract_jsonld_payloads, extract_title,
    normalize_text_preserve_paragraphs, truncate_chars,
};
use longform_types::{ExtractError, ExtractionCandidate, ExtractionContext, Result};

use super::{host_of, ExtractorStrategy, MIN_CONTENT_CHARS};

fn decode_json_objects(page_html: &str) -> Vec<Value> {
    let mut decoded: Vec<Value> = Vec::new();
    for body in extract_jsonld_payloads(page_html) {
        match serde_json::from_str::<Value>(&body) {
            Ok(Value::Object(object)) => decoded.push(Value::Object(object)),
            Ok(Value::Array(items)) => {
                decoded.extend(items.into_iter().filter(|item| item.is_object()));
            }
            _ => {}
        }
    }
    decoded
}

/// Depth-first search for the first sufficiently long article-body field.
fn find_long_text_field(node: &Value) -> Option<&str> {
    match node {
        Value::Object(object) => {
            for key in ["articleBody", "text", "description"] {
                if let Some(Value::String(value)) = object.get(key) {
                    if value.trim().chars().count() >= MIN_CONTENT_CHARS {
                        return Some(value);
                    }
                }
            }
            object.values().find_map(find_long_text_field)
        }
        Value::Array(items) => items.iter().find_map(find_long_text_field),
        _ => None,
    }
}

#[derive(Default)]
pub struct JsonLdStrategy;

impl JsonLdStrategy {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExtractorStrategy for JsonLdStrategy {
    fn name(&self) -> &'static str {
        "json_ld"
    }

    async fn extract(&self, context: &ExtractionContext) -> Result<ExtractionCandidate> {
        let page = context.page().await?;
        let json_candidates = decode_json_objects(&page.payload);
        if json_candidates.is_empty() {
            return Err(ExtractError::NoMatch("No JSON-LD payload found.".into()));
        }

        let mut best_text: Option<&str> = None;
        let mut title: Option<String> = None;
        for candidate in &json_candidates {
            if title.is_none() {
                for title_key in ["headline", "name", "title"] {
                    if let Some(Value::String(value)) = candidate.get(title_key) {
                        title = Some(value.clone());
                        break;
                    }
                }
            }
            if let Some(text) = find_long_text_field(candidate) {
                let longer = best_text
                    .map(|best| text.chars().count() > best.chars().count())
                    .unwrap_or(true);
                if longer {
                    best_text = Some(text);
                }
            }
        }

        let Some(best_text) = best_text else {
            return Err(ExtractError::NoMatch(
                "JSON-LD did not contain a usable article body.".into(),
            ));
        };

        let raw_content = normalize_text_preserve_paragraphs(best_text);
        if raw_content.chars().count() < MIN_CONTENT_CHARS {
            return Err(ExtractError::ContentTooShort(
                "JSON-LD content too short.".into(),
            ));
        }

        let final_url = if page.final_url.is_empty() {
            context.url.clone()
        } else {
            page.final_url.clone()
        };
        let mut extraction_meta = Map::new();
        extraction_meta.insert("method".into(), json!("json_ld"));
        extraction_meta.insert("host".into(), json!(host_of(&final_url)));
        extraction_meta.insert("content_type".into(), json!(page.content_type));

        let blocks = build_reader_blocks(&raw_content);
        Ok(ExtractionCandidate {
            strategy_name: self.name().into(),
            url: context.url.clone(),
            canonical_url: extract_canonical_url(&page.payload, &final_url),
            title: title.or_else(|| extract_title(&page.payload)),
            content_format: "text".into(),
            raw_content: truncate_chars(&raw_content, context.max_chars),
            extraction_meta,
            blocks,
            quality_score: 0.0,
            quality_confidence: 0.0,
        })
    }
}
