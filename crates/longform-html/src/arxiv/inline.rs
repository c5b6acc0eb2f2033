//! Inline-run extraction from arXiv HTML elements

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Node};
use url::Url;

use longform_types::inline::{
    clean_equation_tex, normalize_inline_spacing, normalize_runs,
};
use longform_types::InlineRun;

use super::refs::reference_anchor_id;
use super::{element_text_concat, element_text_space, has_class};

static CITE_PART_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\s*[(\[]?\s*)(.*?)(\s*[)\]]?\s*)$").unwrap());

const TEX_ANNOTATION_ENCODINGS: &[&str] = &["application/x-tex", "application/tex", "latex"];

fn is_display_block_math(el: ElementRef) -> bool {
    el.value().name() == "math"
        && el
            .value()
            .attr("display")
            .map(|display| display.to_lowercase() == "block")
            .unwrap_or(false)
}

/// Elements that stay independent structural blocks when a paragraph
/// container is projected to inline runs.
pub(crate) fn is_structural_descendant(el: ElementRef) -> bool {
    matches!(
        el.value().name(),
        "figure" | "ul" | "ol" | "pre" | "blockquote" | "table"
    ) || has_class(el, "ltx_equation")
        || is_display_block_math(el)
}

/// Resolve an inline href against the page URL, rewriting same-document
/// fragments to `#article-ref-<slug>` anchors.
pub(crate) fn normalize_inline_href(base_url: Option<&Url>, raw_href: &str) -> String {
    let href = raw_href.trim();
    if href.is_empty() {
        return String::new();
    }

    match base_url {
        Some(base) => {
            let resolved = match base.join(href) {
                Ok(resolved) => resolved,
                Err(_) => return href.to_string(),
            };
            let fragment = resolved.fragment().unwrap_or_default();
            let same_document = resolved.scheme() == base.scheme()
                && resolved.host_str() == base.host_str()
                && resolved.port_or_known_default() == base.port_or_known_default()
                && resolved.path() == base.path();
            if !fragment.is_empty() && (href.starts_with('#') || same_document) {
                return format!("#{}", reference_anchor_id(fragment));
            }
            resolved.to_string()
        }
        None => {
            if let Some(fragment) = href.strip_prefix('#') {
                if !fragment.is_empty() {
                    return format!("#{}", reference_anchor_id(fragment));
                }
            }
            href.to_string()
        }
    }
}

/// TeX source of an inline `<math>` element: annotation, then `alttext`,
/// then the rendered text.
pub(crate) fn inline_math_text(el: ElementRef) -> String {
    for annotation in el
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|node| node.value().name() == "annotation")
    {
        let encoding = annotation
            .value()
            .attr("encoding")
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        if !TEX_ANNOTATION_ENCODINGS.contains(&encoding.as_str()) {
            continue;
        }
        let tex = clean_equation_tex(&element_text_space(annotation));
        if !tex.is_empty() {
            return tex;
        }
    }

    let alt_text = el.value().attr("alttext").unwrap_or_default().trim();
    if !alt_text.is_empty() {
        let cleaned = clean_equation_tex(alt_text);
        if !cleaned.is_empty() {
            return cleaned;
        }
    }

    normalize_inline_spacing(&element_text_concat(el))
}

fn wrap_citation_part(part: &str, href: &str) -> Vec<InlineRun> {
    if part.trim().is_empty() {
        return InlineRun::text(part).into_iter().collect();
    }

    let (prefix, label, suffix) = match CITE_PART_RE.captures(part) {
        Some(captures) => (
            captures[1].to_string(),
            captures[2].to_string(),
            captures[3].to_string(),
        ),
        None => (String::new(), part.trim().to_string(), String::new()),
    };

    let normalized_label = normalize_inline_spacing(&label);
    if normalized_label.is_empty() {
        return InlineRun::text(part).into_iter().collect();
    }

    let mut runs: Vec<InlineRun> = Vec::new();
    runs.extend(InlineRun::text(&prefix));
    runs.push(InlineRun::Link {
        href: href.to_string(),
        children: vec![InlineRun::Text {
            text: normalized_label,
        }],
    });
    runs.extend(InlineRun::text(&suffix));
    runs
}

/// `<cite>` gets special treatment: one `<a>` wraps the whole citation
/// text; N `<a>`s wrap the `;`-separated parts when the counts line up;
/// otherwise the raw text is kept.
fn cite_runs(el: ElementRef, base_url: Option<&Url>) -> Vec<InlineRun> {
    let plain_text = normalize_inline_spacing(&element_text_space(el));
    if plain_text.is_empty() {
        return Vec::new();
    }

    let links: Vec<String> = el
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|node| node.value().name() == "a")
        .filter_map(|anchor| {
            let href = normalize_inline_href(base_url, anchor.value().attr("href").unwrap_or_default());
            if href.is_empty() {
                None
            } else {
                Some(href)
            }
        })
        .collect();

    if links.is_empty() {
        return InlineRun::text(&plain_text).into_iter().collect();
    }

    if links.len() == 1 {
        return wrap_citation_part(&plain_text, &links[0]);
    }

    let citation_parts: Vec<&str> = plain_text.split(';').collect();
    if citation_parts.len() != links.len() {
        return InlineRun::text(&plain_text).into_iter().collect();
    }

    let mut rendered: Vec<InlineRun> = Vec::new();
    for (index, (raw_part, href)) in citation_parts.iter().zip(links.iter()).enumerate() {
        rendered.extend(wrap_citation_part(raw_part, href));
        if index + 1 < citation_parts.len() {
            rendered.extend(InlineRun::text("; "));
        }
    }
    normalize_runs(rendered)
}

fn children_runs(el: ElementRef, base_url: Option<&Url>, skip_structural: bool) -> Vec<InlineRun> {
    let collected: Vec<InlineRun> = el
        .children()
        .flat_map(|child| node_runs(child, base_url, skip_structural))
        .collect();
    normalize_runs(collected)
}

fn node_runs(
    node: ego_tree::NodeRef<'_, Node>,
    base_url: Option<&Url>,
    skip_structural: bool,
) -> Vec<InlineRun> {
    if let Some(text) = node.value().as_text() {
        let value: &str = &text.text;
        return InlineRun::text(value).into_iter().collect();
    }

    let Some(el) = ElementRef::wrap(node) else {
        return Vec::new();
    };
    let name = el.value().name();

    if matches!(name, "script" | "style" | "annotation") {
        return Vec::new();
    }
    if skip_structural && is_structural_descendant(el) {
        return Vec::new();
    }
    if name == "br" {
        return vec![InlineRun::Text { text: " ".into() }];
    }
    if name == "cite" {
        return cite_runs(el, base_url);
    }
    if name == "math" && !is_display_block_math(el) {
        let tex = inline_math_text(el);
        if tex.is_empty() {
            return Vec::new();
        }
        return vec![InlineRun::Math { text: tex }];
    }
    if name == "a" {
        let href = normalize_inline_href(base_url, el.value().attr("href").unwrap_or_default());
        let child_runs = children_runs(el, base_url, skip_structural);
        if href.is_empty() {
            return child_runs;
        }
        let children = if child_runs.is_empty() {
            let label = normalize_inline_spacing(&element_text_space(el));
            if label.is_empty() {
                return Vec::new();
            }
            vec![InlineRun::Text { text: label }]
        } else {
            child_runs
        };
        return vec![InlineRun::Link { href, children }];
    }

    let child_runs = children_runs(el, base_url, skip_structural);
    if child_runs.is_empty() {
        return Vec::new();
    }

    let is_italic = matches!(name, "em" | "i") || has_class(el, "ltx_font_italic");
    let is_bold = matches!(name, "strong" | "b") || has_class(el, "ltx_font_bold");
    let is_code = matches!(name, "code" | "tt") || has_class(el, "ltx_font_typewriter");
    let is_sub = name == "sub" || has_class(el, "ltx_font_subscript");
    let is_sup = name == "sup" || has_class(el, "ltx_font_superscript");
    let is_underline = matches!(name, "u" | "ins") || has_class(el, "ltx_font_underline");
    let is_strike = matches!(name, "s" | "strike" | "del")
        || has_class(el, "ltx_font_strike")
        || has_class(el, "ltx_font_strikethrough");
    let is_smallcaps = has_class(el, "ltx_font_smallcaps") || has_class(el, "ltx_font_smallcap");

    let mut wrapped = child_runs;
    if is_italic {
        wrapped = vec![InlineRun::Em { children: wrapped }];
    }
    if is_bold {
        wrapped = vec![InlineRun::Strong { children: wrapped }];
    }
    if is_code {
        wrapped = vec![InlineRun::Code { children: wrapped }];
    }
    if is_underline {
        wrapped = vec![InlineRun::Underline { children: wrapped }];
    }
    if is_strike {
        wrapped = vec![InlineRun::Strike { children: wrapped }];
    }
    if is_smallcaps {
        wrapped = vec![InlineRun::Smallcaps { children: wrapped }];
    }
    if is_sub {
        wrapped = vec![InlineRun::Sub { children: wrapped }];
    }
    if is_sup {
        wrapped = vec![InlineRun::Sup { children: wrapped }];
    }
    wrapped
}

/// Normalized inline runs for an element's children.
pub(crate) fn extract_inline_runs(
    el: ElementRef,
    base_url: Option<&Url>,
    skip_structural: bool,
) -> Vec<InlineRun> {
    children_runs(el, base_url, skip_structural)
}
