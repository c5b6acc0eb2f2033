//! Adaptive rule engine
//!
//! Ties the rule store, the in-process rule cache, and the synthesis
//! oracle together: resolve a cached rule, synthesize a new one, apply it
//! to a payload, and evaluate promotion against captured replay samples.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::{Regex, RegexBuilder};
use serde_json::{json, Map};
use tracing::{debug, info, warn};

use longform_html::{
    build_reader_blocks, extract_canonical_url, extract_title, normalize_text_preserve_paragraphs,
    strip_html_to_text, truncate_chars,
};
use longform_rules::{
    AdaptiveRule, PromotedAdapter, PromotionEvaluation, RuleStore, RuleSynthesizer,
};
use longform_types::{AdaptiveConfig, ExtractError, ExtractionCandidate, PromotionConfig, Result};

use crate::scoring::score_candidate;

const MIN_RULE_CONTENT_CHARS: usize = 120;

/// Compiled-pattern cache shared by every rule application; invalid
/// patterns are remembered as misses.
static REGEX_CACHE: Lazy<Mutex<HashMap<String, Option<Regex>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

pub(crate) fn compile_cached(pattern: &str, dot_all: bool) -> Option<Regex> {
    let key = format!("{}:{pattern}", u8::from(dot_all));
    let mut cache = REGEX_CACHE.lock();
    cache
        .entry(key)
        .or_insert_with(|| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .dot_matches_new_line(dot_all)
                .build()
                .ok()
        })
        .clone()
}

fn now_epoch() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or(0.0)
}

/// Collect every container-regex match from the payload, preferring
/// capture group 1 when the pattern has one.
pub(crate) fn container_fragments(payload: &str, patterns: &[String]) -> Vec<String> {
    let mut fragments: Vec<String> = Vec::new();
    for pattern in patterns {
        let Some(regex) = compile_cached(pattern, true) else {
            continue;
        };
        for captures in regex.captures_iter(payload) {
            let fragment = if captures.len() > 1 {
                captures.get(1).map(|group| group.as_str()).unwrap_or("")
            } else {
                captures.get(0).map(|group| group.as_str()).unwrap_or("")
            };
            let fragment = fragment.trim();
            if !fragment.is_empty() {
                fragments.push(fragment.to_string());
            }
        }
    }
    fragments
}

/// Longest text projection over the fragments (first wins on ties).
pub(crate) fn longest_text_projection(fragments: &[String]) -> String {
    let mut best = String::new();
    let mut best_chars = 0usize;
    for fragment in fragments {
        let text = strip_html_to_text(fragment);
        let chars = text.chars().count();
        if chars > best_chars {
            best = text;
            best_chars = chars;
        }
    }
    best.trim().to_string()
}

pub(crate) fn apply_drop_patterns(mut text: String, patterns: &[String]) -> String {
    for pattern in patterns {
        let Some(regex) = compile_cached(pattern, false) else {
            continue;
        };
        text = regex.replace_all(&text, "").into_owned();
    }
    text
}

/// Apply a learned rule to a payload and build the candidate.
pub fn apply_rule(
    url: &str,
    payload: &str,
    content_type: &str,
    rule: &AdaptiveRule,
    generated: bool,
    max_chars: usize,
) -> Result<ExtractionCandidate> {
    let fragments = container_fragments(payload, &rule.container_regexes);
    if fragments.is_empty() {
        return Err(ExtractError::NoMatch(
            "LLM rule produced no matching content fragments.".into(),
        ));
    }

    let raw_content = longest_text_projection(&fragments);
    let raw_content = apply_drop_patterns(raw_content, &rule.drop_text_patterns);
    let raw_content = normalize_text_preserve_paragraphs(&raw_content);
    if raw_content.chars().count() < MIN_RULE_CONTENT_CHARS {
        return Err(ExtractError::ContentTooShort(
            "LLM rule content too short.".into(),
        ));
    }

    let canonical_url = extract_canonical_url(payload, url);
    let title = extract_title(payload);
    let host = url::Url::parse(if canonical_url.is_empty() {
        url
    } else {
        &canonical_url
    })
    .ok()
    .and_then(|parsed| parsed.host_str().map(str::to_string))
    .unwrap_or_default();

    let mut extraction_meta = Map::new();
    extraction_meta.insert("method".into(), json!("llm_adaptive"));
    extraction_meta.insert("host".into(), json!(host));
    extraction_meta.insert("content_type".into(), json!(content_type));
    extraction_meta.insert("rule_confidence".into(), json!(rule.confidence));
    extraction_meta.insert("rule_model".into(), json!(rule.model));
    extraction_meta.insert("rule_generated".into(), json!(generated));

    let blocks = build_reader_blocks(&raw_content);
    Ok(ExtractionCandidate {
        strategy_name: if generated {
            "llm_adaptive_generated".into()
        } else {
            "llm_adaptive_cached".into()
        },
        url: url.to_string(),
        canonical_url,
        title,
        content_format: "text".into(),
        raw_content: truncate_chars(&raw_content, max_chars),
        extraction_meta,
        blocks,
        quality_score: 0.0,
        quality_confidence: 0.0,
    })
}

/// The closed-loop rule engine shared by orchestrations.
pub struct AdaptiveEngine {
    store: Arc<RuleStore>,
    synthesizer: Arc<dyn RuleSynthesizer>,
    cache: Mutex<HashMap<String, AdaptiveRule>>,
    adaptive: AdaptiveConfig,
    promotion: PromotionConfig,
}

impl AdaptiveEngine {
    pub fn new(
        store: Arc<RuleStore>,
        synthesizer: Arc<dyn RuleSynthesizer>,
        adaptive: AdaptiveConfig,
        promotion: PromotionConfig,
    ) -> Self {
        Self {
            store,
            synthesizer,
            cache: Mutex::new(HashMap::new()),
            adaptive,
            promotion,
        }
    }

    pub fn store(&self) -> Arc<RuleStore> {
        self.store.clone()
    }

    fn cache_get(&self, host: &str) -> Option<AdaptiveRule> {
        let mut cache = self.cache.lock();
        let expired = match cache.get(host) {
            Some(rule) => now_epoch() - rule.generated_at > self.adaptive.cache_ttl.as_secs_f64(),
            None => return None,
        };
        if expired {
            cache.remove(host);
            return None;
        }
        cache.get(host).cloned()
    }

    fn cache_put(&self, rule: AdaptiveRule) {
        let mut cache = self.cache.lock();
        cache.insert(rule.host.clone(), rule);
        if cache.len() <= self.adaptive.cache_size {
            return;
        }
        // Over capacity: evict the entry with the oldest generated_at.
        if let Some(oldest) = cache
            .iter()
            .min_by(|a, b| {
                a.1.generated_at
                    .partial_cmp(&b.1.generated_at)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(key, _)| key.clone())
        {
            cache.remove(&oldest);
        }
    }

    /// Resolve a cached rule from memory, then from the store.
    pub fn cached_rule(&self, host: &str) -> Option<AdaptiveRule> {
        let lowered = host.trim().to_lowercase();
        if lowered.is_empty() {
            return None;
        }

        if let Some(cached) = self.cache_get(&lowered) {
            return Some(cached);
        }

        match self.store.generated_rule(&lowered) {
            Ok(Some(stored)) => {
                if stored.container_regexes.is_empty() {
                    return None;
                }
                self.cache_put(stored.clone());
                Some(stored)
            }
            Ok(None) => None,
            Err(err) => {
                warn!(host = %lowered, error = %err, "rule store read failed, continuing without cached rule");
                None
            }
        }
    }

    /// Synthesize a rule via the oracle, validating confidence and caching
    /// the result in memory and in the store.
    pub async fn synthesize_rule(
        &self,
        host: &str,
        url: &str,
        payload: &str,
    ) -> Option<AdaptiveRule> {
        if !self.adaptive.enabled {
            return None;
        }
        let lowered = host.trim().to_lowercase();
        if lowered.is_empty() {
            return None;
        }

        if let Some(cached) = self.cached_rule(&lowered) {
            return Some(cached);
        }
        if payload.is_empty() {
            return None;
        }

        let html_sample = truncate_chars(payload, self.adaptive.max_html_chars);
        let draft = self.synthesizer.synthesize(&lowered, url, &html_sample).await?;
        if draft.container_regexes.is_empty() {
            return None;
        }
        if draft.confidence < self.adaptive.min_confidence {
            info!(
                host = %lowered,
                confidence = draft.confidence,
                "adaptive rule rejected below confidence floor"
            );
            return None;
        }

        let rule = AdaptiveRule {
            host: lowered.clone(),
            container_regexes: draft.container_regexes,
            drop_text_patterns: draft.drop_text_patterns,
            confidence: draft.confidence,
            model: self.adaptive.model.clone(),
            generated_at: now_epoch(),
        };
        self.cache_put(rule.clone());
        if let Err(err) = self.store.save_generated_rule(&lowered, &rule) {
            warn!(host = %lowered, error = %err, "failed to persist generated rule");
        }
        Some(rule)
    }

    /// Capture a replay sample; store failures only log.
    pub fn record_replay_sample(&self, host: &str, url: &str, content_type: &str, payload: &str) {
        let lowered = host.trim().to_lowercase();
        if lowered.is_empty() {
            return;
        }
        if let Err(err) = self
            .store
            .record_replay_sample(&lowered, url, content_type, payload)
        {
            warn!(host = %lowered, error = %err, "failed to record replay sample");
        }
    }

    /// Replay the rule against recent samples and promote it into a
    /// first-class adapter when it clears every threshold. Promotion is
    /// write-once per host.
    pub fn evaluate_and_promote(
        &self,
        host: &str,
        rule: &AdaptiveRule,
        max_chars: usize,
    ) -> PromotionEvaluation {
        let lowered = host.trim().to_lowercase();
        let reject = |reason: &str| PromotionEvaluation {
            promoted: false,
            reason: Some(reason.to_string()),
            ..PromotionEvaluation::default()
        };

        if lowered.is_empty() {
            return reject("invalid_host");
        }
        if !self.promotion.enabled {
            return reject("promotion_disabled");
        }

        match self.store.promoted_adapter_for_host(&lowered) {
            Ok(Some(_)) => return reject("already_promoted"),
            Ok(None) => {}
            Err(err) => {
                warn!(host = %lowered, error = %err, "promotion lookup failed");
                return reject("store_unavailable");
            }
        }

        let samples = match self
            .store
            .replay_samples(&lowered, Some(self.promotion.max_samples))
        {
            Ok(samples) => samples,
            Err(err) => {
                warn!(host = %lowered, error = %err, "replay sample read failed");
                return reject("store_unavailable");
            }
        };
        if samples.len() < self.promotion.min_samples {
            return PromotionEvaluation {
                promoted: false,
                reason: Some("insufficient_samples".into()),
                sample_count: samples.len(),
                ..PromotionEvaluation::default()
            };
        }

        let mut successful = 0usize;
        let mut errors = 0usize;
        let mut scores: Vec<f64> = Vec::new();
        for sample in &samples {
            match apply_rule(
                &sample.url,
                &sample.payload,
                &sample.content_type,
                rule,
                false,
                max_chars,
            ) {
                Ok(candidate) => {
                    let result = score_candidate(&candidate);
                    scores.push(result.score);
                    if result.score >= self.promotion.min_sample_score {
                        successful += 1;
                    }
                }
                Err(err) => {
                    debug!(host = %lowered, error = %err, "replay application failed");
                    errors += 1;
                }
            }
        }

        let sample_count = samples.len();
        let success_rate = successful as f64 / sample_count.max(1) as f64;
        let avg_score = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };
        let promoted = success_rate >= self.promotion.min_success_rate
            && avg_score >= self.promotion.min_avg_score;

        let evaluation = PromotionEvaluation {
            promoted,
            reason: None,
            sample_count,
            successful,
            errors,
            success_rate,
            avg_score,
            evaluated_at: now_epoch(),
        };

        if promoted {
            let adapter = PromotedAdapter {
                name: format!("llm-promoted:{lowered}"),
                host: lowered.clone(),
                host_suffixes: vec![lowered.clone()],
                container_regexes: rule.container_regexes.clone(),
                drop_text_patterns: rule.drop_text_patterns.clone(),
                source_model: rule.model.clone(),
                source_confidence: rule.confidence,
                generated_at: rule.generated_at,
                promoted_at: 0.0,
                evaluation: Some(evaluation.clone()),
            };
            if let Err(err) = self.store.save_promoted_adapter(&lowered, adapter) {
                warn!(host = %lowered, error = %err, "failed to persist promoted adapter");
            } else {
                info!(host = %lowered, success_rate, avg_score, "promoted adaptive rule to adapter");
            }
        }
        evaluation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use longform_rules::RuleDraft;
    use longform_types::StoreConfig;

    fn sample_rule() -> AdaptiveRule {
        AdaptiveRule {
            host: "example.com".into(),
            container_regexes: vec![r"<article[^>]*>(.*?)</article>".into()],
            drop_text_patterns: vec!["subscribe now".into(), "privacy policy".into()],
            confidence: 0.92,
            model: "mock".into(),
            generated_at: 0.0,
        }
    }

    const ARTICLE_HTML: &str = r#"
    <html>
      <head><title>Test Article</title></head>
      <body>
        <div class="header">Subscribe now</div>
        <article>
          <p>First section of the article with meaningful information.</p>
          <p>Second section describing robust extraction and normalization.</p>
          <p>Third section includes conclusion and practical guidance.</p>
        </article>
        <footer>privacy policy</footer>
      </body>
    </html>
    "#;

    #[test]
    fn apply_rule_extracts_main_content() {
        let candidate = apply_rule(
            "https://example.com/post",
            ARTICLE_HTML,
            "text/html",
            &sample_rule(),
            true,
            10_000,
        )
        .unwrap();
        assert!(candidate.raw_content.contains("First section"));
        assert!(candidate.raw_content.to_lowercase().contains("robust extraction"));
        assert_eq!(candidate.strategy_name, "llm_adaptive_generated");
        assert_eq!(
            candidate.extraction_meta.get("rule_generated"),
            Some(&serde_json::Value::Bool(true))
        );
        assert_eq!(candidate.title.as_deref(), Some("Test Article"));
        assert!(!candidate.blocks.is_empty());
    }

    #[test]
    fn apply_rule_is_deterministic_for_the_same_payload() {
        let first = apply_rule(
            "https://example.com/post",
            ARTICLE_HTML,
            "text/html",
            &sample_rule(),
            false,
            10_000,
        )
        .unwrap();
        let second = apply_rule(
            "https://example.com/post",
            ARTICLE_HTML,
            "text/html",
            &sample_rule(),
            false,
            10_000,
        )
        .unwrap();
        assert_eq!(first.raw_content, second.raw_content);
        assert_eq!(first.extraction_meta, second.extraction_meta);
        assert_eq!(first.strategy_name, "llm_adaptive_cached");
    }

    #[test]
    fn apply_rule_rejects_unmatched_and_short_payloads() {
        let err = apply_rule(
            "https://example.com/post",
            "<html><body><main>nothing here</main></body></html>",
            "text/html",
            &sample_rule(),
            true,
            10_000,
        )
        .unwrap_err();
        assert!(matches!(err, ExtractError::NoMatch(_)));

        let err = apply_rule(
            "https://example.com/post",
            "<article>too short</article>",
            "text/html",
            &sample_rule(),
            true,
            10_000,
        )
        .unwrap_err();
        assert!(matches!(err, ExtractError::ContentTooShort(_)));
    }

    #[test]
    fn invalid_patterns_are_skipped_not_fatal() {
        let rule = AdaptiveRule {
            container_regexes: vec!["([unclosed".into(), r"<article[^>]*>(.*?)</article>".into()],
            ..sample_rule()
        };
        let candidate = apply_rule(
            "https://example.com/post",
            ARTICLE_HTML,
            "text/html",
            &rule,
            true,
            10_000,
        )
        .unwrap();
        assert!(candidate.raw_content.contains("First section"));
    }

    struct FixedSynthesizer {
        confidence: f64,
    }

    #[async_trait]
    impl RuleSynthesizer for FixedSynthesizer {
        async fn synthesize(&self, _host: &str, _url: &str, _html: &str) -> Option<RuleDraft> {
            Some(RuleDraft {
                container_regexes: vec![r"<article[^>]*>(.*?)</article>".into()],
                drop_text_patterns: vec![],
                confidence: self.confidence,
            })
        }
    }

    fn engine_with(
        dir: &tempfile::TempDir,
        confidence: f64,
        promotion: PromotionConfig,
    ) -> AdaptiveEngine {
        let store = Arc::new(RuleStore::new(StoreConfig {
            path: dir.path().join("rules.json"),
            ..StoreConfig::default()
        }));
        AdaptiveEngine::new(
            store,
            Arc::new(FixedSynthesizer { confidence }),
            AdaptiveConfig::default(),
            promotion,
        )
    }

    #[tokio::test]
    async fn synthesized_rules_are_cached_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(&dir, 0.9, PromotionConfig::default());

        let rule = engine
            .synthesize_rule("example.com", "https://example.com/post", ARTICLE_HTML)
            .await
            .unwrap();
        assert_eq!(rule.host, "example.com");
        assert!(engine.cached_rule("example.com").is_some());
        assert!(engine
            .store()
            .generated_rule("example.com")
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn low_confidence_rules_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(&dir, 0.2, PromotionConfig::default());
        assert!(engine
            .synthesize_rule("example.com", "https://example.com/post", ARTICLE_HTML)
            .await
            .is_none());
        assert!(engine.store().generated_rule("example.com").unwrap().is_none());
    }

    fn replay_sample_html(seed: usize) -> String {
        format!(
            r#"
            <html>
              <head><title>Example Article {seed}</title></head>
              <body>
                <article>
                  <p>This is an article paragraph about robust extraction quality and scoring controls.</p>
                  <p>It contains enough text to be considered high quality for replay evaluation and promotion.</p>
                  <p>Sample id {seed} extends the replay corpus for host-based adaptation in production systems.</p>
                  <p>The paragraph density is sufficient and noise ratio is low, improving quality score.</p>
                </article>
              </body>
            </html>
            "#
        )
    }

    fn lenient_promotion() -> PromotionConfig {
        PromotionConfig {
            enabled: true,
            min_samples: 3,
            max_samples: 6,
            min_success_rate: 0.60,
            min_avg_score: 0.30,
            min_sample_score: 0.30,
        }
    }

    #[tokio::test]
    async fn replay_evaluation_promotes_a_proven_rule() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(&dir, 0.91, lenient_promotion());

        for index in 1..=3 {
            engine.record_replay_sample(
                "example.com",
                &format!("https://example.com/post-{index}"),
                "text/html",
                &replay_sample_html(index),
            );
        }

        let rule = AdaptiveRule {
            generated_at: 456.0,
            model: "gemini-test".into(),
            drop_text_patterns: vec![],
            ..sample_rule()
        };
        let evaluation = engine.evaluate_and_promote("example.com", &rule, 80_000);
        assert!(evaluation.promoted, "evaluation: {evaluation:?}");
        assert_eq!(evaluation.sample_count, 3);

        let promoted = engine
            .store()
            .promoted_adapter_for_host("example.com")
            .unwrap()
            .unwrap();
        assert_eq!(promoted.source_model, "gemini-test");
        assert_eq!(promoted.name, "llm-promoted:example.com");
        assert!(promoted.promoted_at > 0.0);

        let adapter =
            longform_rules::adapter_for_host("example.com", &engine.store()).unwrap();
        assert_eq!(adapter.name, "llm-promoted:example.com");

        // Promotion is write-once per host.
        let second = engine.evaluate_and_promote("example.com", &rule, 80_000);
        assert!(!second.promoted);
        assert_eq!(second.reason.as_deref(), Some("already_promoted"));
    }

    #[tokio::test]
    async fn promotion_requires_enough_samples() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(&dir, 0.91, lenient_promotion());
        engine.record_replay_sample(
            "example.com",
            "https://example.com/post-1",
            "text/html",
            &replay_sample_html(1),
        );
        let evaluation = engine.evaluate_and_promote("example.com", &sample_rule(), 80_000);
        assert!(!evaluation.promoted);
        assert_eq!(evaluation.reason.as_deref(), Some("insufficient_samples"));
        assert_eq!(evaluation.sample_count, 1);
    }

    #[tokio::test]
    async fn promotion_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(
            &dir,
            0.91,
            PromotionConfig {
                enabled: false,
                ..lenient_promotion()
            },
        );
        let evaluation = engine.evaluate_and_promote("example.com", &sample_rule(), 80_000);
        assert_eq!(evaluation.reason.as_deref(), Some("promotion_disabled"));
    }
}
