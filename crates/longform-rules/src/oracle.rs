//! LLM rule-synthesis oracle
//!
//! The synthesizer sits behind a narrow seam: it receives the host, URL,
//! and a truncated HTML sample and either returns a rule draft or nothing.
//! Transient failures never propagate as errors.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use longform_types::{AdaptiveConfig, ExtractError, Result};

const MAX_CONTAINER_REGEXES: usize = 5;
const MAX_DROP_PATTERNS: usize = 10;
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

static FENCED_JSON_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)```(?:json)?\s*([\s\S]*?)```").unwrap());

/// An unvalidated rule proposal from the oracle.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleDraft {
    pub container_regexes: Vec<String>,
    pub drop_text_patterns: Vec<String>,
    pub confidence: f64,
}

fn string_list(value: Option<&Value>, cap: usize) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .take(cap)
                .collect()
        })
        .unwrap_or_default()
}

fn draft_from_value(parsed: &Value) -> Result<RuleDraft> {
    let container_regexes = string_list(parsed.get("container_regexes"), MAX_CONTAINER_REGEXES);
    if container_regexes.is_empty() {
        return Err(ExtractError::LlmRejected(
            "rule has no container regexes".into(),
        ));
    }
    let drop_text_patterns = string_list(parsed.get("drop_text_patterns"), MAX_DROP_PATTERNS);
    let confidence = parsed
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(0.0);
    Ok(RuleDraft {
        container_regexes,
        drop_text_patterns,
        confidence,
    })
}

/// Parse the oracle's JSON answer, tolerating a fenced code block wrapper.
pub fn parse_rule_json(raw: &str) -> Result<RuleDraft> {
    let payload = raw.trim();
    if payload.is_empty() {
        return Err(ExtractError::LlmRejected("empty model output".into()));
    }

    if let Ok(parsed) = serde_json::from_str::<Value>(payload) {
        return draft_from_value(&parsed);
    }

    for captures in FENCED_JSON_RE.captures_iter(payload) {
        if let Ok(parsed) = serde_json::from_str::<Value>(captures[1].trim()) {
            return draft_from_value(&parsed);
        }
    }
    Err(ExtractError::LlmRejected(
        "model did not return valid JSON".into(),
    ))
}

/// Narrow oracle seam: `None` on any transient failure, so callers simply
/// degrade to "no rule available".
#[async_trait]
pub trait RuleSynthesizer: Send + Sync {
    async fn synthesize(&self, host: &str, url: &str, html_sample: &str) -> Option<RuleDraft>;
}

fn build_rule_prompt(host: &str, url: &str, html_sample: &str) -> String {
    format!(
        r#"You are an expert web content extraction engineer.
You need to create robust parsing rules for the host: {host}
URL: {url}

Return ONLY valid JSON with this exact schema:
{{
  "container_regexes": ["..."],
  "drop_text_patterns": ["..."],
  "confidence": 0.0
}}

Constraints:
- container_regexes: 1-5 regex patterns. Prefer non-greedy patterns. Include a capture group for main content.
- drop_text_patterns: 0-10 regex patterns to remove boilerplate.
- confidence: 0-1 float indicating reliability.
- Do NOT include explanation text.

The HTML sample is truncated:
{html_sample}"#
    )
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiResponseContent,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

/// Default oracle over the Gemini `generateContent` API.
pub struct GeminiRuleSynthesizer {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
    base_url: String,
}

impl GeminiRuleSynthesizer {
    pub fn new(config: &AdaptiveConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: std::env::var("GOOGLE_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            model: config.model.clone(),
            timeout: config.timeout,
            base_url: DEFAULT_GEMINI_BASE_URL.into(),
        }
    }

    /// Point the synthesizer at a different endpoint (test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

#[async_trait]
impl RuleSynthesizer for GeminiRuleSynthesizer {
    async fn synthesize(&self, host: &str, url: &str, html_sample: &str) -> Option<RuleDraft> {
        let Some(api_key) = self.api_key.as_deref() else {
            debug!(%host, "no oracle credential configured, skipping rule synthesis");
            return None;
        };

        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".into(),
                parts: vec![GeminiPart {
                    text: build_rule_prompt(host, url, html_sample),
                }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: 0.1,
                response_mime_type: "application/json".into(),
            },
        };

        let endpoint = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, api_key
        );
        let response = match self
            .client
            .post(&endpoint)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                warn!(%host, error = %err, "rule synthesis request failed");
                return None;
            }
        };
        if !response.status().is_success() {
            warn!(%host, status = %response.status(), "rule synthesis returned an error status");
            return None;
        }

        let parsed: GeminiResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(%host, error = %err, "rule synthesis response was not decodable");
                return None;
            }
        };
        let text: String = parsed
            .candidates
            .first()
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .iter()
                    .map(|part| part.text.as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        match parse_rule_json(&text) {
            Ok(draft) => Some(draft),
            Err(err) => {
                warn!(%host, error = %err, "oracle answer failed rule parsing");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn parses_direct_json() {
        let draft = parse_rule_json(
            r#"{"container_regexes": ["<article[^>]*>(.*?)</article>"], "drop_text_patterns": ["Subscribe"], "confidence": 0.9}"#,
        )
        .unwrap();
        assert_eq!(draft.container_regexes.len(), 1);
        assert_eq!(draft.drop_text_patterns, vec!["Subscribe".to_string()]);
        assert_eq!(draft.confidence, 0.9);
    }

    #[test]
    fn parses_fenced_json_block() {
        let raw = "Here is the rule:\n```json\n{\"container_regexes\": [\"<main>(.*?)</main>\"], \"confidence\": 0.7}\n```";
        let draft = parse_rule_json(raw).unwrap();
        assert_eq!(draft.container_regexes, vec!["<main>(.*?)</main>".to_string()]);
    }

    #[test]
    fn rejects_empty_and_patternless_output() {
        assert!(parse_rule_json("").is_err());
        assert!(parse_rule_json("not json at all").is_err());
        assert!(parse_rule_json(r#"{"container_regexes": [], "confidence": 0.9}"#).is_err());
    }

    #[test]
    fn caps_pattern_counts() {
        let many: Vec<String> = (0..9).map(|i| format!("pattern-{i}")).collect();
        let raw = serde_json::json!({
            "container_regexes": many,
            "drop_text_patterns": (0..15).map(|i| format!("drop-{i}")).collect::<Vec<_>>(),
            "confidence": 0.8,
        })
        .to_string();
        let draft = parse_rule_json(&raw).unwrap();
        assert_eq!(draft.container_regexes.len(), 5);
        assert_eq!(draft.drop_text_patterns.len(), 10);
    }

    #[tokio::test]
    async fn synthesizer_extracts_rule_from_candidate_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"/models/.+:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": {
                        "parts": [{
                            "text": "{\"container_regexes\": [\"<article[^>]*>(.*?)</article>\"], \"drop_text_patterns\": [], \"confidence\": 0.82}"
                        }]
                    }
                }]
            })))
            .mount(&server)
            .await;

        let synthesizer = GeminiRuleSynthesizer::new(&AdaptiveConfig::default())
            .with_api_key("test-key")
            .with_base_url(server.uri());
        let draft = synthesizer
            .synthesize("example.com", "https://example.com/post", "<html></html>")
            .await
            .unwrap();
        assert_eq!(draft.confidence, 0.82);
        assert_eq!(draft.container_regexes.len(), 1);
    }

    #[tokio::test]
    async fn synthesizer_degrades_to_none_on_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"/models/.+:generateContent"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let synthesizer = GeminiRuleSynthesizer::new(&AdaptiveConfig::default())
            .with_api_key("test-key")
            .with_base_url(server.uri());
        assert!(synthesizer
            .synthesize("example.com", "https://example.com/post", "<html></html>")
            .await
            .is_none());
    }
}
