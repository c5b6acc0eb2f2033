//! Bibliography reference blocks and link auto-detection

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::ElementRef;
use url::form_urlencoded;

use longform_types::{Block, ReferenceLink};

use super::{element_text_space, normalize_text_single_line};
use crate::text::truncate_chars;

const MAX_REFERENCE_CHARS: usize = 1400;

static ANCHOR_SLUG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9_-]+").unwrap());
static ARXIV_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\barXiv:([A-Za-z\-]+/\d{7}|\d{4}\.\d{4,5})(?:v\d+)?\b").unwrap()
});
static DOI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(10\.\d{4,9}/[-._;()/:A-Z0-9]+)\b").unwrap());
static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)https?://[^\s)>\]]+").unwrap());

/// Slug an element id (or URL fragment) into a stable in-document anchor.
pub(crate) fn reference_anchor_id(value: &str) -> String {
    let slug = ANCHOR_SLUG_RE
        .replace_all(value.trim(), "-")
        .trim_matches('-')
        .to_lowercase();
    if slug.is_empty() {
        "article-ref-item".to_string()
    } else {
        format!("article-ref-{slug}")
    }
}

fn push_unique_link(links: &mut Vec<ReferenceLink>, href: String, label: String, kind: &str) {
    let href = href.trim().to_string();
    let label = label.trim().to_string();
    if href.is_empty() || label.is_empty() {
        return;
    }
    if links.iter().any(|link| link.href == href) {
        return;
    }
    links.push(ReferenceLink {
        href,
        label,
        kind: kind.to_string(),
    });
}

/// Detect reference links in priority order: arXiv id, DOI, raw URLs, and
/// finally a Scholar search over the leading text.
pub(crate) fn detect_reference_links(reference_text: &str) -> Vec<ReferenceLink> {
    let mut links: Vec<ReferenceLink> = Vec::new();
    let normalized_text = reference_text.trim();
    if normalized_text.is_empty() {
        return links;
    }

    if let Some(captures) = ARXIV_ID_RE.captures(normalized_text) {
        let identifier = captures[1].trim().to_string();
        if !identifier.is_empty() {
            push_unique_link(
                &mut links,
                format!("https://arxiv.org/abs/{identifier}"),
                format!("arXiv:{identifier}"),
                "arxiv",
            );
        }
    }

    if let Some(captures) = DOI_RE.captures(normalized_text) {
        let doi = captures[1].trim_end_matches(['.', ',', ';', ')']).to_string();
        if !doi.is_empty() {
            push_unique_link(
                &mut links,
                format!("https://doi.org/{doi}"),
                "DOI".to_string(),
                "doi",
            );
        }
    }

    for url_match in URL_RE.find_iter(normalized_text) {
        let url_value = url_match
            .as_str()
            .trim_end_matches(['.', ',', ';', ')'])
            .to_string();
        if !url_value.is_empty() {
            let label = truncate_chars(
                url_value
                    .trim_start_matches("https://")
                    .trim_start_matches("http://"),
                72,
            );
            push_unique_link(&mut links, url_value, label, "url");
        }
    }

    if links.is_empty() {
        let query: String =
            form_urlencoded::byte_serialize(truncate_chars(normalized_text, 320).as_bytes())
                .collect();
        push_unique_link(
            &mut links,
            format!("https://scholar.google.com/scholar?q={query}"),
            "Scholar".to_string(),
            "search",
        );
    }

    links
}

/// One `ltx_bibitem` entry with anchor id and detected links.
pub(crate) fn reference_block(el: ElementRef, block_index: usize) -> Option<Block> {
    let mut reference_text = normalize_text_single_line(&element_text_space(el));
    if reference_text.is_empty() {
        return None;
    }
    if reference_text.chars().count() > MAX_REFERENCE_CHARS {
        reference_text = truncate_chars(&reference_text, MAX_REFERENCE_CHARS)
            .trim_end()
            .to_string();
    }

    let links = detect_reference_links(&reference_text);
    let anchor_id = el
        .value()
        .attr("id")
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .map(reference_anchor_id);

    Some(Block::Reference {
        id: format!("arxiv-{block_index}"),
        text: reference_text,
        anchor_id,
        links,
    })
}
