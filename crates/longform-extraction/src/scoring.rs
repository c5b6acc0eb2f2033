//! Candidate quality scoring
//!
//! Seven clamped features weighted into one bounded score, minus a penalty
//! when anti-bot boilerplate shows up in the text. The confidence value
//! grows with the score and with whichever of length or paragraph density
//! is stronger.

use std::collections::{BTreeMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use longform_types::ExtractionCandidate;

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z0-9][a-z0-9_-]+").unwrap());
static PARAGRAPH_SPLIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{2,}").unwrap());

const NOISE_MARKERS: &[&str] = &["cookie", "subscribe", "javascript", "privacy", "advertisement"];
const BLOCKED_MARKERS: &[&str] = &[
    "verify you are human",
    "access denied",
    "captcha",
    "request blocked",
];

/// The scorer's verdict on one candidate.
#[derive(Debug, Clone)]
pub struct ScoreResult {
    pub score: f64,
    pub confidence: f64,
    pub features: BTreeMap<String, f64>,
}

fn clamp(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    TOKEN_RE
        .find_iter(&lowered)
        .map(|token| token.as_str().to_string())
        .collect()
}

fn paragraphs(text: &str) -> Vec<&str> {
    PARAGRAPH_SPLIT_RE
        .split(text)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect()
}

fn score_length(text: &str) -> f64 {
    clamp(text.chars().count() as f64 / 8000.0)
}

fn score_paragraph_density(text: &str) -> f64 {
    clamp(paragraphs(text).len() as f64 / 18.0)
}

fn score_noise_ratio(text: &str) -> f64 {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return 0.0;
    }
    let noisy = tokens
        .iter()
        .filter(|token| {
            NOISE_MARKERS.contains(&token.as_str())
                || token.starts_with("http")
                || token.contains(".com")
        })
        .count();
    let ratio = noisy as f64 / tokens.len().max(1) as f64;
    clamp(1.0 - ratio * 3.0)
}

fn score_title_coherence(title: Option<&str>, text: &str) -> f64 {
    let Some(title) = title else {
        return 0.4;
    };
    let title_tokens: HashSet<String> = tokenize(title).into_iter().collect();
    if title_tokens.is_empty() {
        return 0.4;
    }
    let lead: String = text.chars().take(1200).collect();
    let lead_tokens: HashSet<String> = tokenize(&lead).into_iter().collect();
    let overlap = title_tokens.intersection(&lead_tokens).count();
    clamp(overlap as f64 / title_tokens.len().max(2) as f64)
}

fn score_language_continuity(text: &str) -> f64 {
    if text.is_empty() {
        return 0.0;
    }
    let alpha = text.chars().filter(|ch| ch.is_alphabetic()).count();
    let printable = text.chars().filter(|ch| !ch.is_control()).count();
    clamp(alpha as f64 / printable.max(1) as f64 * 2.0)
}

fn score_dedup(text: &str) -> f64 {
    let paragraphs = paragraphs(text);
    if paragraphs.is_empty() {
        return 0.0;
    }
    let unique: HashSet<&str> = paragraphs.iter().copied().collect();
    clamp(unique.len() as f64 / paragraphs.len() as f64)
}

fn score_structure_diversity(candidate: &ExtractionCandidate) -> f64 {
    if candidate.blocks.is_empty() {
        return 0.25;
    }
    let kinds: HashSet<&str> = candidate.blocks.iter().map(|block| block.kind_name()).collect();
    match kinds.len() {
        count if count >= 3 => 1.0,
        2 => 0.7,
        _ => 0.45,
    }
}

fn penalty_for_blocked_content(text: &str) -> f64 {
    let lowered = text.to_lowercase();
    if BLOCKED_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        0.35
    } else {
        0.0
    }
}

/// Score a candidate's raw content and structure.
pub fn score_candidate(candidate: &ExtractionCandidate) -> ScoreResult {
    let text = candidate.raw_content.as_str();
    let mut features = BTreeMap::new();
    features.insert("length".to_string(), score_length(text));
    features.insert(
        "paragraph_density".to_string(),
        score_paragraph_density(text),
    );
    features.insert("noise_ratio".to_string(), score_noise_ratio(text));
    features.insert(
        "title_coherence".to_string(),
        score_title_coherence(candidate.title.as_deref(), text),
    );
    features.insert(
        "language_continuity".to_string(),
        score_language_continuity(text),
    );
    features.insert("deduplication".to_string(), score_dedup(text));
    features.insert(
        "structure_diversity".to_string(),
        score_structure_diversity(candidate),
    );

    let weighted = 0.20 * features["length"]
        + 0.15 * features["paragraph_density"]
        + 0.20 * features["noise_ratio"]
        + 0.15 * features["title_coherence"]
        + 0.10 * features["language_continuity"]
        + 0.10 * features["deduplication"]
        + 0.10 * features["structure_diversity"];
    let score = clamp(weighted - penalty_for_blocked_content(text));

    let strongest_bulk = features["length"].max(features["paragraph_density"]);
    let confidence = clamp(0.40 + 0.45 * score + 0.15 * strongest_bulk);

    ScoreResult {
        score,
        confidence,
        features,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use longform_types::{Block, RichText};
    use serde_json::Map;

    fn candidate(raw_content: &str, title: Option<&str>, blocks: Vec<Block>) -> ExtractionCandidate {
        ExtractionCandidate {
            strategy_name: "test".into(),
            url: "https://example.com/a".into(),
            canonical_url: "https://example.com/a".into(),
            title: title.map(str::to_string),
            content_format: "text".into(),
            raw_content: raw_content.into(),
            extraction_meta: Map::new(),
            blocks,
            quality_score: 0.0,
            quality_confidence: 0.0,
        }
    }

    #[test]
    fn richer_content_outscores_short_content() {
        let short = candidate("hello world", Some("Tiny"), vec![]);
        let long = candidate(
            "Paragraph one explains model behavior.\n\n\
             Paragraph two covers evaluation methodology.\n\n\
             Paragraph three discusses results and implications for production systems.",
            Some("Long Content"),
            vec![Block::Paragraph(RichText::plain("1", "p"))],
        );
        assert!(score_candidate(&long).score > score_candidate(&short).score);
    }

    #[test]
    fn score_and_confidence_stay_in_bounds() {
        let empty = candidate("", None, vec![]);
        let result = score_candidate(&empty);
        assert!((0.0..=1.0).contains(&result.score));
        assert!((0.0..=1.0).contains(&result.confidence));

        let huge = candidate(&"word ".repeat(10_000), Some("word"), vec![]);
        let result = score_candidate(&huge);
        assert!((0.0..=1.0).contains(&result.score));
        assert!((0.0..=1.0).contains(&result.confidence));
    }

    #[test]
    fn blocked_markers_apply_a_penalty() {
        let body = "A paragraph of perfectly reasonable content about extraction systems.\n\n\
             Another paragraph that keeps the density and language scores healthy.";
        let clean = candidate(body, Some("Reasonable"), vec![]);
        let blocked = candidate(
            &format!("{body}\n\nPlease verify you are human before continuing."),
            Some("Reasonable"),
            vec![],
        );
        let clean_score = score_candidate(&clean).score;
        let blocked_score = score_candidate(&blocked).score;
        assert!(clean_score - blocked_score > 0.2);
    }

    #[test]
    fn missing_title_scores_neutral_coherence() {
        let result = score_candidate(&candidate("some body text here", None, vec![]));
        assert_eq!(result.features["title_coherence"], 0.4);
    }

    #[test]
    fn structure_diversity_reflects_distinct_block_kinds() {
        let none = candidate("x", None, vec![]);
        assert_eq!(score_candidate(&none).features["structure_diversity"], 0.25);

        let one = candidate("x", None, vec![Block::Paragraph(RichText::plain("1", "a"))]);
        assert_eq!(score_candidate(&one).features["structure_diversity"], 0.45);

        let three = candidate(
            "x",
            None,
            vec![
                Block::Paragraph(RichText::plain("1", "a")),
                Block::Heading(RichText::plain("2", "b")),
                Block::Code {
                    id: "3".into(),
                    text: "c".into(),
                },
            ],
        );
        assert_eq!(score_candidate(&three).features["structure_diversity"], 1.0);
    }

    #[test]
    fn duplicate_paragraphs_lower_the_dedup_feature() {
        let repeated = candidate("same\n\nsame\n\nsame", None, vec![]);
        let unique = candidate("one\n\ntwo\n\nthree", None, vec![]);
        assert!(
            score_candidate(&unique).features["deduplication"]
                > score_candidate(&repeated).features["deduplication"]
        );
    }
}
