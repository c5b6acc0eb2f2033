//! Naive readability fallback: container candidates, HTML-to-text
//! projection, and the reader-block paragraph splitter

use once_cell::sync::Lazy;
use regex::Regex;

use longform_types::{Block, RichText};

use crate::text::normalize_text_preserve_paragraphs;

static SCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script>").unwrap());
static STYLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<style\b[^>]*>.*?</style>").unwrap());
static SVG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<svg\b[^>]*>.*?</svg>").unwrap());
static NOSCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<noscript\b[^>]*>.*?</noscript>").unwrap());
static COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static BLOCK_CLOSER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)</(p|div|li|h\d|br|tr|section|article|main|blockquote|pre)>").unwrap()
});
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static ARTICLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<article[^>]*>(.*?)</article>").unwrap());
static MAIN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<main[^>]*>(.*?)</main>").unwrap());
static BODY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<body[^>]*>(.*?)</body>").unwrap());
static PARAGRAPH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<p[^>]*>.*?</p>").unwrap());
static PARAGRAPH_SPLIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{2,}").unwrap());

/// Remove script/style/svg/noscript blocks and comments, turn block-closing
/// tags into newlines, strip residual tags, and normalize whitespace while
/// preserving paragraph breaks.
pub fn strip_html_to_text(page_html: &str) -> String {
    let without_script = SCRIPT_RE.replace_all(page_html, " ");
    let without_script = STYLE_RE.replace_all(&without_script, " ");
    let without_script = SVG_RE.replace_all(&without_script, " ");
    let without_script = NOSCRIPT_RE.replace_all(&without_script, " ");
    let without_comments = COMMENT_RE.replace_all(&without_script, " ");
    let with_line_breaks = BLOCK_CLOSER_RE.replace_all(&without_comments, "\n");
    let text = TAG_RE.replace_all(&with_line_breaks, " ");
    normalize_text_preserve_paragraphs(&text)
}

/// Ordered candidate fragments for readability extraction: every
/// `<article>`/`<main>` inner body, then `<body>`, then all `<p>` blocks
/// concatenated, then the whole document as a last resort.
pub fn extract_primary_html_candidates(page_html: &str) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();

    for regex in [&*ARTICLE_RE, &*MAIN_RE] {
        for captures in regex.captures_iter(page_html) {
            let fragment = captures[1].trim();
            if !fragment.is_empty() {
                candidates.push(fragment.to_string());
            }
        }
    }

    if let Some(captures) = BODY_RE.captures(page_html) {
        let body = &captures[1];
        if !body.is_empty() {
            candidates.push(body.to_string());
        }
    }

    let paragraph_block = PARAGRAPH_RE
        .find_iter(page_html)
        .map(|found| found.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    if !paragraph_block.is_empty() {
        candidates.push(paragraph_block);
    }

    if candidates.is_empty() {
        candidates.push(page_html.to_string());
    }
    candidates
}

/// Split a plain-text candidate into reader blocks on blank-line
/// boundaries; a chunk is a heading iff it is at most 90 chars with no
/// terminal punctuation.
pub fn build_reader_blocks(raw_content: &str) -> Vec<Block> {
    let normalized = normalize_text_preserve_paragraphs(raw_content);
    if normalized.is_empty() {
        return Vec::new();
    }

    PARAGRAPH_SPLIT_RE
        .split(&normalized)
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .enumerate()
        .map(|(index, chunk)| {
            let is_heading_like = chunk.chars().count() <= 90
                && !chunk.ends_with('.')
                && !chunk.ends_with('!')
                && !chunk.ends_with('?');
            let rich = RichText::plain(format!("b{}", index + 1), chunk);
            if is_heading_like {
                Block::Heading(rich)
            } else {
                Block::Paragraph(rich)
            }
        })
        .collect()
}
