//! X/Twitter status extraction over the fxtwitter and vxtwitter JSON
//! proxies

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use longform_html::{build_reader_blocks, normalize_text_preserve_paragraphs, truncate_chars};
use longform_types::{
    Block, ExtractError, ExtractionCandidate, ExtractionContext, Result, RichText,
};

use super::{ExtractorStrategy, MIN_CONTENT_CHARS};

const X_STATUS_HOSTS: &[&str] = &[
    "x.com",
    "www.x.com",
    "twitter.com",
    "www.twitter.com",
    "mobile.x.com",
    "mobile.twitter.com",
];

/// `(user, status id)` for recognized status paths, `None` otherwise.
pub(crate) fn parse_x_status_url(url: &str) -> Option<(Option<String>, String)> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    if !X_STATUS_HOSTS.contains(&host.as_str()) {
        return None;
    }

    let segments: Vec<&str> = parsed
        .path()
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();
    let is_id = |segment: &str| !segment.is_empty() && segment.chars().all(|ch| ch.is_ascii_digit());

    // /i/status/{id}
    if segments.len() >= 3 && segments[0] == "i" && segments[1] == "status" && is_id(segments[2]) {
        return Some((None, segments[2].to_string()));
    }
    // /i/web/status/{id}
    if segments.len() >= 4
        && segments[0] == "i"
        && segments[1] == "web"
        && segments[2] == "status"
        && is_id(segments[3])
    {
        return Some((None, segments[3].to_string()));
    }
    // /status/{id}
    if segments.len() >= 2 && segments[0] == "status" && is_id(segments[1]) {
        return Some((None, segments[1].to_string()));
    }
    // /{user}/status/{id}
    if segments.len() >= 3 && segments[1] == "status" && is_id(segments[2]) {
        return Some((Some(segments[0].to_string()), segments[2].to_string()));
    }
    None
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => String::new(),
    }
}

fn field_text(object: &Value, key: &str) -> String {
    object.get(key).map(text_of).unwrap_or_default()
}

fn positive_int(value: Option<&Value>) -> Option<u32> {
    let parsed = match value? {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    }?;
    u32::try_from(parsed).ok().filter(|parsed| *parsed > 0)
}

fn image_url_from_media_entity(entity: &Value) -> Option<String> {
    if let Some(media_info) = entity.get("media_info").filter(|info| info.is_object()) {
        for key in ["original_img_url", "url", "media_url_https", "media_url"] {
            let value = field_text(media_info, key).trim().to_string();
            if !value.is_empty() {
                return Some(value);
            }
        }
    }
    for key in ["url", "media_url_https", "media_url", "image"] {
        let value = field_text(entity, key).trim().to_string();
        if !value.is_empty() {
            return Some(value);
        }
    }
    None
}

/// Flatten a draft-js entityMap into a lookup keyed by both the outer map
/// key and the entry's own `key` field.
fn normalize_draft_entity_map(entity_map: Option<&Value>) -> HashMap<String, Value> {
    let mut normalized = HashMap::new();
    let entries: Vec<(String, &Value)> = match entity_map {
        Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(index, value)| (index.to_string(), value))
            .collect(),
        _ => Vec::new(),
    };

    for (outer_key, raw_value) in entries {
        let Value::Object(raw_object) = raw_value else {
            continue;
        };
        let candidate = match raw_object.get("value") {
            Some(Value::Object(inner)) => Value::Object(inner.clone()),
            _ => Value::Object(raw_object.clone()),
        };
        normalized.insert(outer_key, candidate.clone());
        let inner_key = field_text(raw_value, "key").trim().to_string();
        if !inner_key.is_empty() {
            normalized.insert(inner_key, candidate);
        }
    }
    normalized
}

fn build_media_lookup(article: &Value) -> HashMap<String, Value> {
    let mut lookup = HashMap::new();
    let entries: Vec<(String, &Value)> = match article.get("media_entities") {
        Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(index, value)| (index.to_string(), value))
            .collect(),
        _ => Vec::new(),
    };

    for (key, value) in entries {
        if !value.is_object() {
            continue;
        }
        lookup.insert(key, value.clone());
        for id_key in ["media_id", "media_key"] {
            let id = field_text(value, id_key).trim().to_string();
            if !id.is_empty() {
                lookup.insert(id, value.clone());
            }
        }
    }
    lookup
}

#[allow(clippy::too_many_arguments)]
fn append_unique_image_block(
    blocks: &mut Vec<Block>,
    seen_image_urls: &mut HashSet<String>,
    block_id: &str,
    image_url: &str,
    caption: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    source: &str,
) {
    let normalized_url = image_url.trim().to_string();
    if normalized_url.is_empty() || seen_image_urls.contains(&normalized_url) {
        return;
    }
    seen_image_urls.insert(normalized_url.clone());
    blocks.push(Block::Image {
        id: block_id.to_string(),
        image_url: normalized_url,
        caption: caption.filter(|caption| !caption.is_empty()),
        width,
        height,
        source: Some(source.to_string()),
    });
}

/// Keep a text block unless it duplicates (or is contained in, at ≥32
/// chars) an already-kept block.
fn append_unique_text(text_blocks: &mut Vec<String>, text: &str) {
    let normalized = normalize_text_preserve_paragraphs(text);
    if normalized.is_empty() {
        return;
    }
    let lowered = normalized.to_lowercase();
    for existing in text_blocks.iter() {
        let existing_lowered = existing.to_lowercase();
        if lowered == existing_lowered {
            return;
        }
        if lowered.chars().count() >= 32 && existing_lowered.contains(&lowered) {
            return;
        }
        if existing_lowered.chars().count() >= 32 && lowered.contains(&existing_lowered) {
            return;
        }
    }
    text_blocks.push(normalized);
}

fn cover_dimensions(cover_media: &Value) -> (Option<u32>, Option<u32>) {
    match cover_media.get("media_info") {
        Some(info) if info.is_object() => (
            positive_int(info.get("original_img_width")),
            positive_int(info.get("original_img_height")),
        ),
        _ => (None, None),
    }
}

fn collect_atomic_media_blocks(
    entry: &Value,
    block_id: &str,
    entity_map: &HashMap<String, Value>,
    media_lookup: &HashMap<String, Value>,
    blocks: &mut Vec<Block>,
    seen_image_urls: &mut HashSet<String>,
) {
    let Some(Value::Array(entity_ranges)) = entry.get("entityRanges") else {
        return;
    };
    for entity_range in entity_ranges {
        let entity_key = field_text(entity_range, "key").trim().to_string();
        if entity_key.is_empty() {
            continue;
        }
        let Some(entity) = entity_map.get(&entity_key) else {
            continue;
        };
        if field_text(entity, "type").trim().to_uppercase() != "MEDIA" {
            continue;
        }
        let Some(Value::Array(media_items)) =
            entity.get("data").and_then(|data| data.get("mediaItems"))
        else {
            continue;
        };
        for media_item in media_items {
            let media_id = {
                let primary = field_text(media_item, "mediaId").trim().to_string();
                if primary.is_empty() {
                    field_text(media_item, "media_id").trim().to_string()
                } else {
                    primary
                }
            };
            let Some(media_entity) = media_lookup.get(&media_id) else {
                continue;
            };
            let Some(image_url) = image_url_from_media_entity(media_entity) else {
                continue;
            };
            let (width, height) = cover_dimensions(media_entity);
            append_unique_image_block(
                blocks,
                seen_image_urls,
                &format!("{block_id}-img"),
                &image_url,
                None,
                width,
                height,
                "media_entity",
            );
        }
    }
}

/// Assemble a candidate from a fxtwitter tweet payload. Long-form article
/// blocks are preferred; `preview_text` only backfills when no blocks
/// survive, and the plain tweet text is the last resort.
pub(crate) fn build_candidate_from_fxtwitter(
    source_url: &str,
    payload: &Value,
) -> Option<ExtractionCandidate> {
    let tweet = payload.get("tweet").filter(|tweet| tweet.is_object())?;
    let article = tweet.get("article");

    let mut text_blocks: Vec<String> = Vec::new();
    let mut blocks: Vec<Block> = Vec::new();
    let mut seen_image_urls: HashSet<String> = HashSet::new();
    let mut title: Option<String> = None;

    if let Some(article) = article.filter(|article| article.is_object()) {
        let article_title = field_text(article, "title").trim().to_string();
        if !article_title.is_empty() {
            title = Some(article_title);
        }
        let media_lookup = build_media_lookup(article);
        let entity_map = normalize_draft_entity_map(
            article
                .get("content")
                .filter(|content| content.is_object())
                .and_then(|content| content.get("entityMap")),
        );

        if let Some(cover_media) = article.get("cover_media").filter(|cover| cover.is_object()) {
            let (width, height) = cover_dimensions(cover_media);
            if let Some(cover_url) = image_url_from_media_entity(cover_media) {
                append_unique_image_block(
                    &mut blocks,
                    &mut seen_image_urls,
                    "fx-cover",
                    &cover_url,
                    title.clone(),
                    width,
                    height,
                    "cover_media",
                );
            }
        }

        if let Some(Value::Array(block_entries)) = article
            .get("content")
            .and_then(|content| content.get("blocks"))
        {
            for (index, entry) in block_entries.iter().enumerate() {
                if !entry.is_object() {
                    continue;
                }
                let block_id = {
                    let key = field_text(entry, "key").trim().to_string();
                    if key.is_empty() {
                        format!("fx-{}", index + 1)
                    } else {
                        key
                    }
                };
                let block_type = field_text(entry, "type").trim().to_lowercase();

                if block_type == "atomic" {
                    collect_atomic_media_blocks(
                        entry,
                        &block_id,
                        &entity_map,
                        &media_lookup,
                        &mut blocks,
                        &mut seen_image_urls,
                    );
                    continue;
                }

                let text_value = field_text(entry, "text");
                let before_count = text_blocks.len();
                append_unique_text(&mut text_blocks, &text_value);
                if text_blocks.len() == before_count {
                    continue;
                }
                blocks.push(Block::Paragraph(RichText::plain(
                    block_id,
                    text_blocks.last().unwrap().clone(),
                )));
            }
        }

        if text_blocks.is_empty() {
            append_unique_text(&mut text_blocks, &field_text(article, "preview_text"));
        }
    }

    if text_blocks.is_empty() {
        let raw_text = tweet
            .get("raw_text")
            .filter(|raw| raw.is_object())
            .map(|raw| field_text(raw, "text"))
            .unwrap_or_default();
        let tweet_text = field_text(tweet, "text");
        append_unique_text(
            &mut text_blocks,
            if tweet_text.is_empty() { &raw_text } else { &tweet_text },
        );
    }

    let raw_content = text_blocks.join("\n\n").trim().to_string();
    if raw_content.chars().count() < MIN_CONTENT_CHARS {
        return None;
    }

    let canonical_url = {
        let tweet_url = field_text(tweet, "url").trim().to_string();
        if tweet_url.is_empty() {
            source_url.to_string()
        } else {
            tweet_url
        }
    };
    let author = tweet.get("author").filter(|author| author.is_object());
    let author_name = author
        .map(|author| {
            let screen_name = field_text(author, "screen_name").trim().to_string();
            if screen_name.is_empty() {
                field_text(author, "name").trim().to_string()
            } else {
                screen_name
            }
        })
        .unwrap_or_default();
    let title = title.or_else(|| {
        Some(if author_name.is_empty() {
            "X post".to_string()
        } else {
            format!("X post by @{author_name}")
        })
    });

    let mut extraction_meta = Map::new();
    extraction_meta.insert("method".into(), json!("x_status_api"));
    extraction_meta.insert("provider".into(), json!("api.fxtwitter.com"));
    extraction_meta.insert("tweet_id".into(), json!(field_text(tweet, "id")));
    extraction_meta.insert("author".into(), json!(author_name));

    let blocks = if blocks.is_empty() {
        build_reader_blocks(&raw_content)
    } else {
        blocks
    };

    Some(ExtractionCandidate {
        strategy_name: "x_status_api".into(),
        url: source_url.to_string(),
        canonical_url,
        title,
        content_format: "text".into(),
        raw_content,
        extraction_meta,
        blocks,
        quality_score: 0.0,
        quality_confidence: 0.0,
    })
}

/// Assemble a candidate from a vxtwitter payload: article title, preview,
/// and tweet text merged (deduped), plus an optional cover image block.
pub(crate) fn build_candidate_from_vxtwitter(
    source_url: &str,
    payload: &Value,
) -> Option<ExtractionCandidate> {
    let text = normalize_text_preserve_paragraphs(&field_text(payload, "text"));
    let fallback_author = {
        let user_name = field_text(payload, "user_name").trim().to_string();
        if user_name.is_empty() {
            let screen_name = field_text(payload, "user_screen_name").trim().to_string();
            if screen_name.is_empty() {
                "unknown".to_string()
            } else {
                screen_name
            }
        } else {
            user_name
        }
    };
    let tweet_id = field_text(payload, "tweetID");

    let mut extraction_meta = Map::new();
    extraction_meta.insert("method".into(), json!("x_status_api"));
    extraction_meta.insert("provider".into(), json!("api.vxtwitter.com"));
    extraction_meta.insert("tweet_id".into(), json!(tweet_id));

    let Some(article) = payload.get("article").filter(|article| article.is_object()) else {
        if text.chars().count() < MIN_CONTENT_CHARS {
            return None;
        }
        let blocks = build_reader_blocks(&text);
        return Some(ExtractionCandidate {
            strategy_name: "x_status_api".into(),
            url: source_url.to_string(),
            canonical_url: source_url.to_string(),
            title: Some(format!("X post by @{fallback_author}")),
            content_format: "text".into(),
            raw_content: text,
            extraction_meta,
            blocks,
            quality_score: 0.0,
            quality_confidence: 0.0,
        });
    };

    let preview = normalize_text_preserve_paragraphs(&field_text(article, "preview_text"));
    let title = normalize_text_preserve_paragraphs(&field_text(article, "title"));
    let parts: Vec<&str> = [title.as_str(), preview.as_str(), text.as_str()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect();
    let raw_content = parts.join("\n\n").trim().to_string();
    if raw_content.chars().count() < MIN_CONTENT_CHARS {
        return None;
    }

    let mut blocks = build_reader_blocks(&raw_content);
    let image_url = normalize_text_preserve_paragraphs(&field_text(article, "image"));
    if !image_url.is_empty() {
        blocks.insert(
            0,
            Block::Image {
                id: "vx-cover".into(),
                image_url,
                caption: None,
                width: None,
                height: None,
                source: Some("article.image".into()),
            },
        );
    }

    Some(ExtractionCandidate {
        strategy_name: "x_status_api".into(),
        url: source_url.to_string(),
        canonical_url: source_url.to_string(),
        title: Some(if title.is_empty() {
            format!("X post by @{fallback_author}")
        } else {
            title
        }),
        content_format: "text".into(),
        raw_content,
        extraction_meta,
        blocks,
        quality_score: 0.0,
        quality_confidence: 0.0,
    })
}

type ProviderBuilder = fn(&str, &Value) -> Option<ExtractionCandidate>;

/// Strategy that resolves X/Twitter status links through public JSON
/// proxy providers, fxtwitter first.
pub struct XStatusApiStrategy {
    client: reqwest::Client,
    fxtwitter_base: String,
    vxtwitter_base: String,
}

impl Default for XStatusApiStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl XStatusApiStrategy {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            fxtwitter_base: "https://api.fxtwitter.com".into(),
            vxtwitter_base: "https://api.vxtwitter.com".into(),
        }
    }

    /// Override the provider endpoints (test servers).
    pub fn with_provider_bases(
        mut self,
        fxtwitter_base: impl Into<String>,
        vxtwitter_base: impl Into<String>,
    ) -> Self {
        self.fxtwitter_base = fxtwitter_base.into();
        self.vxtwitter_base = vxtwitter_base.into();
        self
    }
}

#[async_trait]
impl ExtractorStrategy for XStatusApiStrategy {
    fn name(&self) -> &'static str {
        "x_status_api"
    }

    async fn extract(&self, context: &ExtractionContext) -> Result<ExtractionCandidate> {
        let Some((user, status_id)) = parse_x_status_url(&context.url) else {
            return Err(ExtractError::NoMatch(
                "URL is not an X/Twitter status link.".into(),
            ));
        };

        let path_prefix = match user {
            Some(user) => format!("/{user}/status/{status_id}"),
            None => format!("/status/{status_id}"),
        };
        let providers: [(&str, String, ProviderBuilder); 2] = [
            (
                "api.fxtwitter.com",
                format!("{}{path_prefix}", self.fxtwitter_base),
                build_candidate_from_fxtwitter,
            ),
            (
                "api.vxtwitter.com",
                format!("{}{path_prefix}", self.vxtwitter_base),
                build_candidate_from_vxtwitter,
            ),
        ];

        let timeout = Duration::from_secs(context.timeout.as_secs().clamp(6, 20));
        let mut last_error: Option<String> = None;
        for (provider_name, provider_url, builder) in providers {
            let response = self
                .client
                .get(&provider_url)
                .header(reqwest::header::USER_AGENT, "Mozilla/5.0")
                .timeout(timeout)
                .send()
                .await;
            match response {
                Ok(response) if response.status().is_success() => {
                    match response.json::<Value>().await {
                        Ok(payload) => {
                            if let Some(mut candidate) = builder(&context.url, &payload) {
                                candidate.raw_content =
                                    truncate_chars(&candidate.raw_content, context.max_chars);
                                candidate
                                    .extraction_meta
                                    .insert("provider_url".into(), json!(provider_url));
                                return Ok(candidate);
                            }
                            last_error =
                                Some(format!("{provider_name} returned no usable content"));
                        }
                        Err(err) => {
                            last_error = Some(format!("{provider_name} failed: {err}"));
                        }
                    }
                }
                Ok(response) => {
                    last_error = Some(format!(
                        "{provider_name} failed: HTTP status {}",
                        response.status().as_u16()
                    ));
                }
                Err(err) => {
                    last_error = Some(format!("{provider_name} failed: {err}"));
                }
            }
            debug!(provider = provider_name, "x status provider unusable, trying next");
        }

        Err(ExtractError::NoMatch(
            last_error.unwrap_or_else(|| "X status API extraction failed.".into()),
        ))
    }
}
