//! Inline-run rich text model
//!
//! An inline run is a leaf or wrapper node composing a block's rich text.
//! Runs are normalized so adjacent text leaves merge, empty wrappers elide,
//! and links always carry at least one text child. Plain-text and markdown
//! projections are pure recursive functions over the normalized tree.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A leaf or wrapper node in a block's rich-text tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InlineRun {
    Text { text: String },
    Math { text: String },
    Link { href: String, children: Vec<InlineRun> },
    Em { children: Vec<InlineRun> },
    Strong { children: Vec<InlineRun> },
    Code { children: Vec<InlineRun> },
    Sub { children: Vec<InlineRun> },
    Sup { children: Vec<InlineRun> },
    Underline { children: Vec<InlineRun> },
    Strike { children: Vec<InlineRun> },
    Smallcaps { children: Vec<InlineRun> },
}

impl InlineRun {
    /// Build a sanitized text leaf, or `None` when nothing remains.
    pub fn text(value: &str) -> Option<InlineRun> {
        let text = sanitize_inline_text(value);
        if text.is_empty() {
            None
        } else {
            Some(InlineRun::Text { text })
        }
    }

    fn children(&self) -> Option<&[InlineRun]> {
        match self {
            InlineRun::Text { .. } | InlineRun::Math { .. } => None,
            InlineRun::Link { children, .. }
            | InlineRun::Em { children }
            | InlineRun::Strong { children }
            | InlineRun::Code { children }
            | InlineRun::Sub { children }
            | InlineRun::Sup { children }
            | InlineRun::Underline { children }
            | InlineRun::Strike { children }
            | InlineRun::Smallcaps { children } => Some(children),
        }
    }

    fn with_children(&self, children: Vec<InlineRun>) -> InlineRun {
        match self {
            InlineRun::Link { href, .. } => InlineRun::Link {
                href: href.clone(),
                children,
            },
            InlineRun::Em { .. } => InlineRun::Em { children },
            InlineRun::Strong { .. } => InlineRun::Strong { children },
            InlineRun::Code { .. } => InlineRun::Code { children },
            InlineRun::Sub { .. } => InlineRun::Sub { children },
            InlineRun::Sup { .. } => InlineRun::Sup { children },
            InlineRun::Underline { .. } => InlineRun::Underline { children },
            InlineRun::Strike { .. } => InlineRun::Strike { children },
            InlineRun::Smallcaps { .. } => InlineRun::Smallcaps { children },
            other => other.clone(),
        }
    }
}

/// Strip zero-width characters and map non-breaking spaces to plain spaces.
pub fn sanitize_inline_text(value: &str) -> String {
    value
        .replace('\u{a0}', " ")
        .replace('\u{200b}', "")
        .replace('\u{feff}', "")
}

static COLLAPSE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static SPACE_BEFORE_PUNCT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+([,.;:!?%)\]\}])").unwrap());
static SPACE_AFTER_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"([(\[\{])\s+").unwrap());
static SPACE_BEFORE_CLOSE_QUOTE: Lazy<Regex> = Lazy::new(|| Regex::new("\\s+([’”])").unwrap());
static SPACE_AFTER_OPEN_QUOTE: Lazy<Regex> = Lazy::new(|| Regex::new("([‘“])\\s+").unwrap());

/// Collapse runs of whitespace and tuck spaces against punctuation the way
/// rendered HTML reads.
pub fn normalize_inline_spacing(value: &str) -> String {
    let normalized = sanitize_inline_text(value);
    let normalized = COLLAPSE_WS.replace_all(&normalized, " ");
    let normalized = SPACE_BEFORE_PUNCT.replace_all(&normalized, "$1");
    let normalized = SPACE_AFTER_OPEN.replace_all(&normalized, "$1");
    let normalized = SPACE_BEFORE_CLOSE_QUOTE.replace_all(&normalized, "$1");
    let normalized = SPACE_AFTER_OPEN_QUOTE.replace_all(&normalized, "$1");
    normalized.trim().to_string()
}

/// Strip zero-width characters and exactly one pair of `$$…$$` or `\[…\]`
/// display-math delimiters.
pub fn clean_equation_tex(value: &str) -> String {
    let cleaned = value
        .replace('\u{200b}', "")
        .replace('\u{feff}', "")
        .trim()
        .to_string();
    if cleaned.len() > 4 {
        if cleaned.starts_with("$$") && cleaned.ends_with("$$") {
            return cleaned[2..cleaned.len() - 2].trim().to_string();
        }
        if cleaned.starts_with("\\[") && cleaned.ends_with("\\]") {
            return cleaned[2..cleaned.len() - 2].trim().to_string();
        }
    }
    cleaned
}

/// Merge adjacent text leaves, drop empty wrappers, and splice href-less
/// links into their children. Normalization is idempotent.
pub fn normalize_runs(runs: Vec<InlineRun>) -> Vec<InlineRun> {
    let mut normalized: Vec<InlineRun> = Vec::new();

    fn push_text(normalized: &mut Vec<InlineRun>, text: String) {
        if text.is_empty() {
            return;
        }
        if let Some(InlineRun::Text { text: existing }) = normalized.last_mut() {
            existing.push_str(&text);
            return;
        }
        normalized.push(InlineRun::Text { text });
    }

    for run in runs {
        match run {
            InlineRun::Text { text } => {
                push_text(&mut normalized, sanitize_inline_text(&text));
            }
            InlineRun::Math { text } => {
                let text = clean_equation_tex(&text);
                if !text.is_empty() {
                    normalized.push(InlineRun::Math { text });
                }
            }
            InlineRun::Link { href, children } => {
                let children = normalize_runs(children);
                let href = href.trim().to_string();
                if href.is_empty() {
                    normalized.extend(children);
                } else if !children.is_empty() {
                    normalized.push(InlineRun::Link { href, children });
                }
            }
            wrapper => {
                let children = normalize_runs(wrapper.children().unwrap_or(&[]).to_vec());
                if !children.is_empty() {
                    normalized.push(wrapper.with_children(children));
                }
            }
        }
    }
    normalized
}

/// Project runs to plain text (math renders as its TeX source).
pub fn runs_to_plain_text(runs: &[InlineRun]) -> String {
    let mut parts = String::new();
    for run in runs {
        match run {
            InlineRun::Text { text } => parts.push_str(&sanitize_inline_text(text)),
            InlineRun::Math { text } => parts.push_str(&clean_equation_tex(text)),
            other => {
                if let Some(children) = other.children() {
                    parts.push_str(&runs_to_plain_text(children));
                }
            }
        }
    }
    parts
}

/// Escape characters markdown would otherwise interpret.
pub fn escape_markdown_text(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '`' => escaped.push_str("\\`"),
            '*' => escaped.push_str("\\*"),
            '_' => escaped.push_str("\\_"),
            '[' => escaped.push_str("\\["),
            ']' => escaped.push_str("\\]"),
            '<' => escaped.push_str("\\<"),
            '>' => escaped.push_str("\\>"),
            '$' => escaped.push_str("\\$"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn escape_markdown_link_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('[', "\\[")
        .replace(']', "\\]")
}

/// Project runs to inline markdown.
pub fn runs_to_markdown(runs: &[InlineRun]) -> String {
    let mut parts = String::new();
    for run in runs {
        match run {
            InlineRun::Text { text } => parts.push_str(&escape_markdown_text(text)),
            InlineRun::Math { text } => {
                let value = clean_equation_tex(text);
                if !value.is_empty() {
                    parts.push_str(&format!("${value}$"));
                }
            }
            InlineRun::Link { href, children } => {
                let label = normalize_inline_spacing(&runs_to_plain_text(children));
                let href = href.trim();
                if !href.is_empty() && !label.is_empty() {
                    parts.push_str(&format!("[{}](<{href}>)", escape_markdown_link_label(&label)));
                } else if !label.is_empty() {
                    parts.push_str(&escape_markdown_text(&label));
                }
            }
            wrapper => {
                let content = runs_to_markdown(wrapper.children().unwrap_or(&[]));
                if content.is_empty() {
                    continue;
                }
                match wrapper {
                    InlineRun::Em { .. } => parts.push_str(&format!("*{content}*")),
                    InlineRun::Strong { .. } => parts.push_str(&format!("**{content}**")),
                    InlineRun::Code { .. } => {
                        parts.push_str(&format!("`{}`", content.replace('`', "\\`")));
                    }
                    InlineRun::Strike { .. } => parts.push_str(&format!("~~{content}~~")),
                    _ => parts.push_str(&content),
                }
            }
        }
    }
    parts
}

/// Whether the run list carries anything richer than plain text.
pub fn runs_have_structure(runs: &[InlineRun]) -> bool {
    runs.iter().any(|run| !matches!(run, InlineRun::Text { .. }))
}
