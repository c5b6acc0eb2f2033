//! Structural parser for arXiv HTML papers
//!
//! Walks the document from the best root (`article.ltx_document`,
//! `article`, `main`, then `body`) and emits typed blocks with inline runs.
//! Once a tag produces a structural block its whole subtree is skipped,
//! except paragraph-like `div.ltx_para` containers whose nested structures
//! (equations, tables, figures, lists) stay independent blocks.

mod inline;
mod refs;
mod table;

use std::collections::{BTreeMap, HashSet};

use ego_tree::NodeId;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use longform_types::inline::{
    clean_equation_tex, normalize_inline_spacing, runs_have_structure, runs_to_markdown,
    runs_to_plain_text,
};
use longform_types::{Block, InlineRun, RichText};

use crate::text::{normalize_text_preserve_paragraphs, truncate_chars};
use inline::extract_inline_runs;

const MAX_LIST_ITEMS: usize = 20;
const MAX_CODE_CHARS: usize = 3000;
const MAX_EQUATION_CHARS: usize = 1200;
const SEGMENT_DEDUP_MIN_CHARS: usize = 64;

const EQUATION_CLASSES: &[&str] = &["ltx_equation", "MathJax_Display", "math-display", "equation"];
const REJECTED_IMAGE_MARKERS: &[&str] = &["logo", "icon", "badge", "favicon", "orcid"];

static ROOT_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    ["article.ltx_document", "article", "main", "body"]
        .iter()
        .map(|selector| Selector::parse(selector).unwrap())
        .collect()
});
static EQUATION_NUMBER_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    [".ltx_tag_equation", ".ltx_eqn_tag", ".ltx_tag"]
        .iter()
        .map(|selector| Selector::parse(selector).unwrap())
        .collect()
});

/// The parsed document: ordered blocks, their plain-text projection, and
/// per-type block counts.
#[derive(Debug, Clone)]
pub struct ArxivStructuredContent {
    pub raw_content: String,
    pub blocks: Vec<Block>,
    pub block_counts: BTreeMap<String, usize>,
}

pub(crate) fn has_class(el: ElementRef, class: &str) -> bool {
    el.value().classes().any(|candidate| candidate == class)
}

pub(crate) fn direct_children<'a>(el: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    el.children().filter_map(ElementRef::wrap)
}

pub(crate) fn find_descendant<'a>(el: ElementRef<'a>, name: &str) -> Option<ElementRef<'a>> {
    el.descendants()
        .filter_map(ElementRef::wrap)
        .find(|node| node.value().name() == name && node.id() != el.id())
}

pub(crate) fn parent_or_self_figure(el: ElementRef) -> Option<ElementRef<'_>> {
    if el.value().name() == "figure" {
        return Some(el);
    }
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|node| node.value().name() == "figure")
}

/// Descendant text joined with single spaces, each fragment trimmed.
pub(crate) fn element_text_space(el: ElementRef) -> String {
    el.text()
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Descendant text concatenated verbatim.
pub(crate) fn element_text_concat(el: ElementRef) -> String {
    el.text().collect()
}

/// Single-line normalization for captions, notes, and reference text.
pub(crate) fn normalize_text_single_line(value: &str) -> String {
    normalize_text_preserve_paragraphs(value)
        .replace('\n', " ")
        .trim()
        .to_string()
}

fn is_paragraph_tag(el: ElementRef) -> bool {
    match el.value().name() {
        "p" => true,
        "div" => has_class(el, "ltx_para"),
        _ => false,
    }
}

fn is_equation_tag(el: ElementRef) -> bool {
    if el.value().name() == "math"
        && el
            .value()
            .attr("display")
            .map(|display| display.to_lowercase() == "block")
            .unwrap_or(false)
    {
        return true;
    }
    EQUATION_CLASSES.iter().any(|class| has_class(el, class))
}

fn is_data_table_tag(el: ElementRef) -> bool {
    el.value().name() == "table" && !has_class(el, "ltx_equation")
}

fn is_span_data_table_figure(el: ElementRef) -> bool {
    el.value().name() == "figure" && has_class(el, "ltx_table")
}

fn is_reference_item_tag(el: ElementRef) -> bool {
    matches!(el.value().name(), "li" | "div") && has_class(el, "ltx_bibitem")
}

fn heading_variant(name: &str) -> Option<fn(RichText) -> Block> {
    match name {
        "h1" => Some(Block::H1),
        "h2" => Some(Block::H2),
        "h3" => Some(Block::H3),
        "h4" | "h5" | "h6" => Some(Block::H3),
        _ => None,
    }
}

fn rich_from_runs(id: String, runs: Vec<InlineRun>, min_chars: usize) -> Option<RichText> {
    let text = normalize_inline_spacing(&runs_to_plain_text(&runs));
    if text.chars().count() < min_chars {
        return None;
    }
    let inline_markdown = {
        let markdown = normalize_inline_spacing(&runs_to_markdown(&runs));
        (!markdown.is_empty() && markdown != text).then_some(markdown)
    };
    let inline_runs = runs_have_structure(&runs).then_some(runs);
    Some(RichText {
        id,
        text,
        inline_markdown,
        inline_runs,
    })
}

fn heading_block(el: ElementRef, block_index: usize) -> Option<Block> {
    let variant = heading_variant(el.value().name())?;
    let runs = extract_inline_runs(el, None, false);
    let rich = rich_from_runs(format!("arxiv-{block_index}"), runs, 2)?;
    Some(variant(rich))
}

fn paragraph_block(el: ElementRef, base_url: Option<&Url>, block_index: usize) -> Option<Block> {
    let is_container_div = el.value().name() == "div";
    if is_container_div {
        // A container holding further paragraph containers produces nothing
        // itself; the children are visited on their own.
        let has_nested_paragraph = direct_children(el)
            .filter(|child| matches!(child.value().name(), "p" | "div"))
            .any(is_paragraph_tag);
        if has_nested_paragraph {
            return None;
        }
    }

    let runs = extract_inline_runs(el, base_url, is_container_div);
    let rich = rich_from_runs(format!("arxiv-{block_index}"), runs, 20)?;
    Some(Block::Paragraph(rich))
}

fn blockquote_block(el: ElementRef, base_url: Option<&Url>, block_index: usize) -> Option<Block> {
    let runs = extract_inline_runs(el, base_url, false);
    let rich = rich_from_runs(format!("arxiv-{block_index}"), runs, 10)?;
    Some(Block::Blockquote(rich))
}

fn list_block(el: ElementRef, block_index: usize) -> Option<Block> {
    // Bibliography lists are emitted as reference blocks instead.
    let has_bib_items = direct_children(el)
        .filter(|child| matches!(child.value().name(), "li" | "div"))
        .any(is_reference_item_tag);
    if has_bib_items {
        return None;
    }

    let mut items: Vec<String> = Vec::new();
    for item in direct_children(el).filter(|child| child.value().name() == "li") {
        let runs = extract_inline_runs(item, None, false);
        let text = normalize_inline_spacing(&runs_to_plain_text(&runs));
        if text.is_empty() {
            continue;
        }
        items.push(text);
        if items.len() >= MAX_LIST_ITEMS {
            break;
        }
    }
    if items.is_empty() {
        return None;
    }

    Some(Block::List {
        id: format!("arxiv-{block_index}"),
        ordered: el.value().name() == "ol",
        items,
    })
}

fn resolve_asset_url(base_url: Option<&Url>, relative_url: &str) -> String {
    let relative = relative_url.trim();
    if relative.is_empty() {
        return String::new();
    }
    let Some(base) = base_url else {
        return relative.to_string();
    };

    // Treat the final document URL as a directory so relative assets like
    // `x1.png` resolve under the HTML document path.
    let mut asset_base = base.clone();
    asset_base.set_query(None);
    asset_base.set_fragment(None);
    asset_base.set_path(&format!("{}/", base.path().trim_end_matches('/')));
    asset_base
        .join(relative)
        .map(|resolved| resolved.to_string())
        .unwrap_or_default()
}

fn figure_block(el: ElementRef, base_url: Option<&Url>, block_index: usize) -> Option<Block> {
    let image = find_descendant(el, "img")?;
    let src = image.value().attr("src").unwrap_or_default().trim();
    if src.is_empty() {
        return None;
    }
    let image_url = resolve_asset_url(base_url, src);
    if image_url.is_empty() {
        return None;
    }
    let lowered = image_url.to_lowercase();
    if REJECTED_IMAGE_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
    {
        return None;
    }

    let caption = find_descendant(el, "figcaption")
        .map(|figcaption| normalize_text_single_line(&element_text_space(figcaption)))
        .filter(|caption| !caption.is_empty());

    Some(Block::Image {
        id: format!("arxiv-{block_index}"),
        image_url,
        caption,
        width: None,
        height: None,
        source: Some("arxiv_html_figure".into()),
    })
}

fn code_block(el: ElementRef, block_index: usize) -> Option<Block> {
    let joined = el
        .text()
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    let code_text = normalize_text_preserve_paragraphs(&joined);
    if code_text.is_empty() {
        return None;
    }
    let code_text = truncate_chars(&code_text, MAX_CODE_CHARS).trim_end().to_string();
    Some(Block::Code {
        id: format!("arxiv-{block_index}"),
        text: code_text,
    })
}

fn equation_number(el: ElementRef) -> String {
    for selector in EQUATION_NUMBER_SELECTORS.iter() {
        if let Some(number_el) = el.select(selector).next() {
            let value = normalize_text_single_line(&element_text_space(number_el));
            if !value.is_empty() {
                return value;
            }
        }
    }
    String::new()
}

fn equation_text(el: ElementRef) -> String {
    let mut candidates: Vec<String> = Vec::new();
    for math_el in el
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|node| node.value().name() == "math" && node.id() != el.id())
    {
        for annotation in math_el
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
            if !matches!(
                encoding.as_str(),
                "application/x-tex" | "application/tex" | "latex"
            ) {
                continue;
            }
            let tex = clean_equation_tex(&element_text_space(annotation));
            if !tex.is_empty() {
                candidates.push(tex);
            }
        }

        let alt_text = math_el.value().attr("alttext").unwrap_or_default().trim();
        if !alt_text.is_empty() {
            candidates.push(clean_equation_tex(alt_text));
        }
    }

    if !candidates.is_empty() {
        let mut unique: Vec<String> = Vec::new();
        for item in candidates {
            if item.is_empty() || unique.contains(&item) {
                continue;
            }
            unique.push(item);
        }
        if unique.len() == 1 {
            return unique.remove(0);
        }
        return unique.join(" \\\\ ");
    }

    for attr in ["data-tex", "latex", "tex"] {
        let value = clean_equation_tex(el.value().attr(attr).unwrap_or_default());
        if !value.is_empty() {
            return value;
        }
    }

    let mut fallback_text = normalize_text_single_line(&element_text_space(el));
    let number = equation_number(el);
    if !number.is_empty() && fallback_text.ends_with(&number) {
        fallback_text = fallback_text[..fallback_text.len() - number.len()]
            .trim()
            .to_string();
    }
    clean_equation_tex(&fallback_text)
}

fn equation_block(el: ElementRef, block_index: usize) -> Option<Block> {
    let equation = equation_text(el).trim().to_string();
    if equation.is_empty() {
        return None;
    }
    let equation = truncate_chars(&equation, MAX_EQUATION_CHARS)
        .trim_end()
        .to_string();
    let number = equation_number(el);
    Some(Block::Equation {
        id: format!("arxiv-{block_index}"),
        equation_tex: equation,
        equation_number: (!number.is_empty()).then_some(number),
    })
}

fn select_root<'a>(document: &'a Html) -> ElementRef<'a> {
    for selector in ROOT_SELECTORS.iter() {
        if let Some(node) = document.select(selector).next() {
            return node;
        }
    }
    document.root_element()
}

fn dispatch_block(el: ElementRef, base_url: Option<&Url>, block_index: usize) -> Option<Block> {
    let name = el.value().name();
    if heading_variant(name).is_some() {
        return heading_block(el, block_index);
    }
    if is_reference_item_tag(el) {
        return refs::reference_block(el, block_index);
    }
    if is_equation_tag(el) {
        return equation_block(el, block_index);
    }
    if is_data_table_tag(el) {
        return table::table_block(el, block_index);
    }
    if is_span_data_table_figure(el) {
        return table::span_table_figure_block(el, block_index);
    }
    if name == "figure" {
        return figure_block(el, base_url, block_index);
    }
    if matches!(name, "ul" | "ol") {
        return list_block(el, block_index);
    }
    if name == "pre" {
        return code_block(el, block_index);
    }
    if name == "blockquote" {
        return blockquote_block(el, base_url, block_index);
    }
    if is_paragraph_tag(el) {
        return paragraph_block(el, base_url, block_index);
    }
    None
}

fn append_unique_segment(segments: &mut Vec<String>, text: &str) {
    let normalized = normalize_text_preserve_paragraphs(text);
    if normalized.is_empty() {
        return;
    }
    let lowered = normalized.to_lowercase();
    let lowered_len = lowered.chars().count();
    for existing in segments.iter() {
        let existing_lowered = existing.to_lowercase();
        if lowered == existing_lowered {
            return;
        }
        if lowered_len >= SEGMENT_DEDUP_MIN_CHARS && existing_lowered.contains(&lowered) {
            return;
        }
        if existing_lowered.chars().count() >= SEGMENT_DEDUP_MIN_CHARS
            && lowered.contains(&existing_lowered)
        {
            return;
        }
    }
    segments.push(normalized);
}

/// Parse an arXiv HTML paper into typed blocks and a deduplicated
/// plain-text projection truncated to `max_chars`.
pub fn extract_arxiv_structured_content(
    page_html: &str,
    base_url: &str,
    max_chars: usize,
) -> ArxivStructuredContent {
    let document = Html::parse_document(page_html);
    let root = select_root(&document);
    let root_id = root.id();
    let parsed_base = Url::parse(base_url).ok();

    let mut selected_tag_ids: HashSet<NodeId> = HashSet::new();
    let mut blocks: Vec<Block> = Vec::new();
    let mut block_index = 1usize;

    for node in root.descendants() {
        if node.id() == root_id {
            continue;
        }
        let Some(el) = ElementRef::wrap(node) else {
            continue;
        };
        if node
            .ancestors()
            .any(|ancestor| selected_tag_ids.contains(&ancestor.id()))
        {
            continue;
        }

        let Some(block) = dispatch_block(el, parsed_base.as_ref(), block_index) else {
            continue;
        };

        let is_non_exclusive_paragraph_container =
            matches!(block, Block::Paragraph(_)) && el.value().name() == "div";
        if !is_non_exclusive_paragraph_container {
            selected_tag_ids.insert(node.id());
        }
        blocks.push(block);
        block_index += 1;
    }

    let mut text_segments: Vec<String> = Vec::new();
    for block in &blocks {
        let text = block.projection_text();
        if !text.is_empty() {
            append_unique_segment(&mut text_segments, &text);
        }
    }

    let raw_content = normalize_text_preserve_paragraphs(&text_segments.join("\n\n"));
    let raw_content = if raw_content.chars().count() > max_chars {
        truncate_chars(&raw_content, max_chars).trim_end().to_string()
    } else {
        raw_content
    };

    let mut block_counts: BTreeMap<String, usize> = BTreeMap::new();
    for block in &blocks {
        *block_counts.entry(block.kind_name().to_string()).or_insert(0) += 1;
    }

    ArxivStructuredContent {
        raw_content,
        blocks,
        block_counts,
    }
}

#[cfg(test)]
mod tests;
